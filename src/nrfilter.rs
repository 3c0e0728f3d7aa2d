use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::NrParams;
use crate::cst;
use crate::denoise::denoise_plane;
use crate::error::NrError;
use crate::partition::partition;
use crate::pixels::{ChannelPlanes, RgbaImage};

/// Cooperative cancellation token shared between a running filter and its
/// caller. Cloning hands out another handle to the same flag; the running
/// filter polls it at every loop granularity and unwinds with
/// [`NrError::Cancelled`] without completing the remaining passes.
#[derive(Clone, Debug, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn ensure(&self) -> Result<(), NrError> {
        if self.cancelled() {
            Err(NrError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress observer, called with integer percentage milestones.
pub type ProgressFn = dyn Fn(u32) + Send + Sync;

/// Wavelet noise-reduction filter.
///
/// One instance describes one run: per-channel parameters, the work
/// partition width, an optional progress observer and the cancellation
/// flag. The pipeline is plane extraction, sRGB -> YCbCr, the per-channel
/// wavelet denoise loop, YCbCr -> sRGB, clip and write-back, with alpha
/// copied through unchanged.
pub struct NrFilter {
    params: NrParams,
    pieces: usize,
    progress: Option<Box<ProgressFn>>,
    flag: RunFlag,
}

impl NrFilter {
    pub fn new(params: NrParams) -> Self {
        Self {
            params,
            pieces: rayon::current_num_threads(),
            progress: None,
            flag: RunFlag::new(),
        }
    }

    /// Number of ranges the flat pixel index space is partitioned into for
    /// the parallel statistics and thresholding passes.
    pub fn with_parallelism(mut self, pieces: usize) -> Self {
        self.pieces = pieces.max(1);
        self
    }

    pub fn with_progress(mut self, observer: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(observer));
        self
    }

    /// A handle for cancelling this filter run from outside.
    pub fn run_flag(&self) -> RunFlag {
        self.flag.clone()
    }

    fn report(&self, percent: u32) {
        if let Some(observer) = &self.progress {
            observer(percent);
        }
    }

    /// Run the filter, producing a denoised image of identical width,
    /// height and bit depth.
    ///
    /// A cancelled run returns [`NrError::Cancelled`]; partial results are
    /// never surfaced.
    pub fn run(&self, src: &RgbaImage) -> Result<RgbaImage, NrError> {
        self.flag.ensure()?;
        // computed once per image size, reused for every level and channel
        let ranges = partition(src.pixel_count(), self.pieces);

        let mut planes = ChannelPlanes::from_image(src, &self.flag)?;
        self.report(10);

        cst::srgb2ycbcr(&mut planes.planes);
        self.flag.ensure()?;
        self.report(20);

        let (width, height) = (planes.width(), planes.height());
        self.report(30);
        for (i, channel) in self.params.channels().into_iter().enumerate() {
            // threshold 0 means "leave this channel alone"
            if channel.threshold > 0.0 {
                denoise_plane(
                    &mut planes.planes[i],
                    width,
                    height,
                    channel.threshold,
                    channel.softness,
                    &ranges,
                    &self.flag,
                )?;
            }
            self.report(40 + 10 * i as u32);
        }

        cst::ycbcr2srgb(&mut planes.planes);
        self.flag.ensure()?;
        self.report(70);

        planes.clip();
        self.flag.ensure()?;
        self.report(80);

        let out = planes.into_image(&self.flag)?;
        self.report(90);
        self.report(100);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::Stats;
    use crate::pixels::SubPixel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    /// Flat gray 8-bit image with pseudo-gaussian noise (sum of uniforms).
    fn noisy_gray(width: usize, height: usize, amplitude: SubPixel, seed: u64) -> RgbaImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..width * height)
            .map(|_| {
                let n: SubPixel = (0..12).map(|_| rng.random::<SubPixel>()).sum::<SubPixel>() - 6.0;
                let v = (128.0 + amplitude * n).clamp(0.0, 255.0) as u16;
                [v, v, v, 255]
            })
            .collect();
        RgbaImage::from_pixels(width, height, false, data).unwrap()
    }

    fn luma(image: &RgbaImage) -> Vec<SubPixel> {
        image
            .data
            .iter()
            .map(|[r, g, b, _]| {
                0.299 * *r as SubPixel + 0.587 * *g as SubPixel + 0.114 * *b as SubPixel
            })
            .collect()
    }

    fn mean_abs_diff(a: &RgbaImage, b: &RgbaImage) -> SubPixel {
        let total: SubPixel = a
            .data
            .iter()
            .zip(&b.data)
            .map(|(pa, pb)| {
                (0..3)
                    .map(|c| (pa[c] as SubPixel - pb[c] as SubPixel).abs())
                    .sum::<SubPixel>()
            })
            .sum();
        total / (a.pixel_count() * 3) as SubPixel
    }

    #[test]
    fn test_denoise_reduces_noise_variance() {
        let noisy = noisy_gray(64, 64, 8.0, 7);
        let out = NrFilter::new(NrParams::default()).run(&noisy).unwrap();

        let sd_in = luma(&noisy).iter().sd();
        let sd_out = luma(&out).iter().sd();
        assert!(
            sd_out < sd_in,
            "output sd {sd_out} not below input sd {sd_in}"
        );
    }

    #[test]
    fn test_second_pass_changes_less() {
        let noisy = noisy_gray(64, 64, 8.0, 11);
        let filter = NrFilter::new(NrParams::default());
        let once = filter.run(&noisy).unwrap();
        let twice = filter.run(&once).unwrap();

        let first_change = mean_abs_diff(&once, &noisy);
        let second_change = mean_abs_diff(&twice, &once);
        assert!(
            second_change < first_change,
            "second pass moved {second_change} vs first {first_change}"
        );
    }

    #[test]
    fn test_zero_threshold_skips_all_channels() {
        let noisy = noisy_gray(32, 32, 8.0, 3);
        let out = NrFilter::new(NrParams::uniform(0.0, 0.9))
            .run(&noisy)
            .unwrap();

        // only the color transform round trip applies, so every sample must
        // survive within quantization distance
        for (pa, pb) in out.data.iter().zip(&noisy.data) {
            for c in 0..3 {
                assert!((pa[c] as i32 - pb[c] as i32).abs() <= 1);
            }
            assert_eq!(pa[3], pb[3]);
        }
    }

    #[test]
    fn test_zero_luma_threshold_preserves_luma() {
        let noisy = noisy_gray(32, 32, 8.0, 5);
        let mut params = NrParams::default();
        params.luma.threshold = 0.0;
        let out = NrFilter::new(params).run(&noisy).unwrap();

        let y_in = luma(&noisy);
        let y_out = luma(&out);
        for (a, b) in y_in.iter().zip(&y_out) {
            assert!((a - b).abs() <= 1.5, "luma moved from {a} to {b}");
        }
    }

    #[test]
    fn test_outlier_pixel_is_attenuated() {
        let mut data = vec![[128, 128, 128, 255]; 16];
        data[0] = [255, 0, 0, 255];
        let image = RgbaImage::from_pixels(4, 4, false, data).unwrap();

        let out = NrFilter::new(NrParams::uniform(1.2, 0.9)).run(&image).unwrap();

        // soft thresholding only nudges a strong impulse, so measure the
        // pull toward the surround summed over the channels
        let mut deviation_in = 0.0;
        let mut deviation_out = 0.0;
        for c in 0..3 {
            let surround: SubPixel =
                (1..16).map(|i| out.data[i][c] as SubPixel).sum::<SubPixel>() / 15.0;
            deviation_in += (image.data[0][c] as SubPixel - 128.0).abs();
            deviation_out += (out.data[0][c] as SubPixel - surround).abs();
        }
        assert!(
            deviation_out < deviation_in,
            "deviation {deviation_out} not below {deviation_in}"
        );
        for i in 1..16 {
            for c in 0..3 {
                assert!(
                    (out.data[i][c] as i32 - 128).abs() <= 2,
                    "pixel {i} channel {c} moved to {}",
                    out.data[i][c]
                );
            }
        }
    }

    #[test]
    fn test_progress_milestones() {
        let noisy = noisy_gray(16, 16, 4.0, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        NrFilter::new(NrParams::default())
            .with_progress(move |p| sink.lock().unwrap().push(p))
            .run(&noisy)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn test_cancel_before_run() {
        let noisy = noisy_gray(16, 16, 4.0, 2);
        let filter = NrFilter::new(NrParams::default());
        filter.run_flag().cancel();
        assert_eq!(filter.run(&noisy).unwrap_err(), NrError::Cancelled);
    }

    #[test]
    fn test_cancel_mid_run_discards_output() {
        let noisy = noisy_gray(32, 32, 4.0, 4);
        let filter = NrFilter::new(NrParams::default());
        let flag = filter.run_flag();
        // cancel as soon as the first channel milestone fires
        let filter = filter.with_progress(move |p| {
            if p >= 40 {
                flag.cancel();
            }
        });
        assert_eq!(filter.run(&noisy).unwrap_err(), NrError::Cancelled);
    }

    #[test]
    fn test_empty_image_passes_through() {
        for (width, height) in [(0, 4), (4, 0), (0, 0)] {
            let image = RgbaImage::from_pixels(width, height, false, Vec::new()).unwrap();
            let out = NrFilter::new(NrParams::default()).run(&image).unwrap();
            assert_eq!(out, image);
        }
    }

    #[test]
    fn test_output_shape_and_depth_match_input() {
        let noisy = noisy_gray(24, 17, 4.0, 9);
        let out = NrFilter::new(NrParams::default()).run(&noisy).unwrap();
        assert_eq!(out.width, noisy.width);
        assert_eq!(out.height, noisy.height);
        assert_eq!(out.sixteen_bit, noisy.sixteen_bit);
    }

    #[test]
    fn test_sixteen_bit_roundtrip() {
        let data = (0..64)
            .map(|i| {
                let v = (i * 1000) as u16;
                [v, v / 2, v / 3, 65535]
            })
            .collect();
        let image = RgbaImage::from_pixels(8, 8, true, data).unwrap();
        let out = NrFilter::new(NrParams::default()).run(&image).unwrap();
        assert_eq!(out.sixteen_bit, true);
        assert_eq!(out.pixel_count(), 64);
    }
}
