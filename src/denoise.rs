use std::ops::Range;

use rayon::prelude::*;

use crate::error::NrError;
use crate::nrfilter::RunFlag;
use crate::partition::{split_ranges, split_ranges_mut};
use crate::pixels::{alloc_plane, Plane, SubPixel};
use crate::wavelets::HatTransform;

pub const LEVELS: usize = 5;
const BUCKETS: usize = 5;

/// Quintile bucket by low-pass intensity, making the noise threshold
/// adaptive to local brightness.
#[inline]
fn bucket(intensity: SubPixel) -> usize {
    if intensity > 0.8 {
        0
    } else if intensity > 0.6 {
        1
    } else if intensity > 0.4 {
        2
    } else if intensity > 0.2 {
        3
    } else {
        4
    }
}

/// Base threshold bounding which detail coefficients enter the statistics
/// of a level.
#[inline]
fn base_threshold(level: usize) -> SubPixel {
    5.0 / 64.0 * (-2.6 * ((level + 1) as SubPixel).sqrt()).exp() * 0.8002
        / (-2.6 as SubPixel).exp()
}

/// Squared-sum accumulators bucketed by low-pass intensity. Each worker
/// fills a private copy over its partition range; the copies are merged by
/// summation at the join, so the hot loop needs no locks or atomics.
#[derive(Clone, Copy, Default)]
struct BucketStats {
    accum: [SubPixel; BUCKETS],
    samples: [u64; BUCKETS],
}

impl BucketStats {
    fn merge(mut self, other: Self) -> Self {
        for b in 0..BUCKETS {
            self.accum[b] += other.accum[b];
            self.samples[b] += other.samples[b];
        }
        self
    }

    /// The +1 divisor absorbs empty buckets and biases them toward zero.
    fn stdev(&self) -> [SubPixel; BUCKETS] {
        let mut out = [0.0; BUCKETS];
        for b in 0..BUCKETS {
            out[b] = (self.accum[b] / (self.samples[b] + 1) as SubPixel).sqrt();
        }
        out
    }
}

/// Separable a-trous low-pass: hat transform over rows, then over columns,
/// each scaled by 0.25. Rows run in parallel (disjoint output rows); the
/// column pass rewrites `dst` in place.
fn wavelet_pass(
    src: &[SubPixel],
    dst: &mut [SubPixel],
    width: usize,
    height: usize,
    scale: usize,
    flag: &RunFlag,
) -> Result<(), NrError> {
    dst.par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, out_row)| {
            if flag.cancelled() {
                return;
            }
            let mut temp = vec![0.0; width];
            src[row * width..(row + 1) * width].hat_transform(&mut temp, 1, width, scale);
            for (out, t) in out_row.iter_mut().zip(&temp) {
                *out = t * 0.25;
            }
        });
    flag.ensure()?;

    let mut temp = vec![0.0; height];
    for col in 0..width {
        flag.ensure()?;
        dst[col..].hat_transform(&mut temp, width, height, scale);
        for (row, t) in temp.iter().enumerate() {
            dst[row * width + col] = t * 0.25;
        }
    }
    Ok(())
}

/// Replace the high-pass plane with the detail coefficients
/// (`highpass -= lowpass`) and gather their bucketed squared sums, in
/// parallel over the partition ranges.
fn stats_pass(
    hpass: &mut [SubPixel],
    lpass: &[SubPixel],
    thold: SubPixel,
    ranges: &[Range<usize>],
    flag: &RunFlag,
) -> BucketStats {
    let hp_parts = split_ranges_mut(hpass, ranges);
    let lp_parts = split_ranges(lpass, ranges);

    hp_parts
        .into_par_iter()
        .zip(lp_parts)
        .map(|(hp, lp)| {
            let mut partial = BucketStats::default();
            if flag.cancelled() {
                return partial;
            }
            for (h, l) in hp.iter_mut().zip(lp) {
                *h -= *l;
                if *h < thold && *h > -thold {
                    let b = bucket(*l);
                    partial.accum[b] += *h * *h;
                    partial.samples[b] += 1;
                }
            }
            partial
        })
        .reduce(BucketStats::default, BucketStats::merge)
}

/// Soft-threshold the detail coefficients against the per-bucket standard
/// deviations and, past the first level, add them into the accumulation
/// plane. Parallel over the partition ranges; every sample update is
/// independent.
#[allow(clippy::too_many_arguments)]
fn threshold_pass(
    hpass: &mut [SubPixel],
    lpass: &[SubPixel],
    accum: Option<&mut [SubPixel]>,
    stdev: &[SubPixel; BUCKETS],
    threshold: SubPixel,
    softness: SubPixel,
    ranges: &[Range<usize>],
    flag: &RunFlag,
) {
    let shrink = |h: &mut SubPixel, l: SubPixel| {
        let thold = threshold * stdev[bucket(l)];
        if *h < -thold {
            *h += thold - thold * softness;
        } else if *h > thold {
            *h -= thold - thold * softness;
        } else {
            *h *= softness;
        }
    };

    let hp_parts = split_ranges_mut(hpass, ranges);
    let lp_parts = split_ranges(lpass, ranges);
    match accum {
        Some(accum) => {
            let acc_parts = split_ranges_mut(accum, ranges);
            hp_parts
                .into_par_iter()
                .zip(lp_parts)
                .zip(acc_parts)
                .for_each(|((hp, lp), acc)| {
                    if flag.cancelled() {
                        return;
                    }
                    for ((h, l), a) in hp.iter_mut().zip(lp).zip(acc.iter_mut()) {
                        shrink(h, *l);
                        *a += *h;
                    }
                });
        }
        // level 0: the high-pass plane is the accumulation plane itself
        None => {
            hp_parts.into_par_iter().zip(lp_parts).for_each(|(hp, lp)| {
                if flag.cancelled() {
                    return;
                }
                for (h, l) in hp.iter_mut().zip(lp) {
                    shrink(h, *l);
                }
            });
        }
    }
}

/// Denoise one channel plane in place through the 5-level wavelet loop.
///
/// `channel` doubles as wavelet plane 0: the original signal going in, the
/// accumulated denoised reconstruction coming out. A `threshold` of exactly
/// zero is handled by the caller as a whole-channel skip and never reaches
/// this function.
#[allow(clippy::too_many_arguments)]
pub fn denoise_plane(
    channel: &mut Plane,
    width: usize,
    height: usize,
    threshold: SubPixel,
    softness: SubPixel,
    ranges: &[Range<usize>],
    flag: &RunFlag,
) -> Result<(), NrError> {
    debug_assert_eq!(channel.len(), width * height);
    let size = width * height;
    // a degenerate image has no samples to denoise
    if size == 0 {
        return Ok(());
    }
    let mut fimg1 = alloc_plane(size)?;
    let mut fimg2 = alloc_plane(size)?;

    let mut hpass = 0;
    for level in 0..LEVELS {
        flag.ensure()?;
        let lpass = (level & 1) + 1;
        let scale = 1 << level;

        match (hpass, lpass) {
            (0, 1) => wavelet_pass(channel, &mut fimg1, width, height, scale, flag)?,
            (1, 2) => wavelet_pass(&fimg1, &mut fimg2, width, height, scale, flag)?,
            (2, 1) => wavelet_pass(&fimg2, &mut fimg1, width, height, scale, flag)?,
            // plane indices alternate strictly as (level & 1) + 1
            _ => unreachable!(),
        }

        let thold = base_threshold(level);
        let stats = match (hpass, lpass) {
            (0, 1) => stats_pass(channel, &fimg1, thold, ranges, flag),
            (1, 2) => stats_pass(&mut fimg1, &fimg2, thold, ranges, flag),
            (2, 1) => stats_pass(&mut fimg2, &fimg1, thold, ranges, flag),
            _ => unreachable!(),
        };
        // the thresholding pass depends on the finished bucket statistics,
        // so the join above is a hard ordering point
        flag.ensure()?;
        let stdev = stats.stdev();

        match (hpass, lpass) {
            (0, 1) => threshold_pass(
                channel, &fimg1, None, &stdev, threshold, softness, ranges, flag,
            ),
            (1, 2) => threshold_pass(
                &mut fimg1,
                &fimg2,
                Some(channel.as_mut_slice()),
                &stdev,
                threshold,
                softness,
                ranges,
                flag,
            ),
            (2, 1) => threshold_pass(
                &mut fimg2,
                &fimg1,
                Some(channel.as_mut_slice()),
                &stdev,
                threshold,
                softness,
                ranges,
                flag,
            ),
            _ => unreachable!(),
        }
        flag.ensure()?;

        hpass = lpass;
    }

    // reconstruction: the final low-pass joins the accumulated details
    let final_lowpass = match (LEVELS - 1) & 1 {
        0 => &fimg1,
        _ => &fimg2,
    };
    channel
        .par_iter_mut()
        .zip(final_lowpass.par_iter())
        .for_each(|(c, l)| *c += *l);
    Ok(())
}
