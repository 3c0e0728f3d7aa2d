use ndarray::Array2;
use rayon::prelude::*;

use crate::config::{ChannelParams, NrParams};
use crate::cst;
use crate::error::NrError;
use crate::nrfilter::RunFlag;
use crate::pixels::{ChannelPlanes, RgbaImage, SubPixel, CHANNELS};

/// Number of homogeneous-color clusters the sample space is partitioned
/// into before measuring per-cluster noise.
pub const CLUSTER_COUNT: usize = 30;
const KMEANS_PASSES: usize = 10;

const LUMA_SOFTNESS: SubPixel = 0.9;
const CHROMA_SOFTNESS: SubPixel = 0.8;

/// Derive noise-reduction parameters from a representative image.
///
/// One-shot estimation: convert to YCbCr, k-means-cluster the 3-channel
/// sample space into homogeneous-color groups, measure per-channel standard
/// deviation inside each non-empty cluster, aggregate weighted by cluster
/// size and map the result onto soft-threshold scales.
pub fn estimate(image: &RgbaImage) -> Result<NrParams, NrError> {
    let flag = RunFlag::new();
    let mut planes = ChannelPlanes::from_image(image, &flag)?;
    cst::srgb2ycbcr(&mut planes.planes);

    let size = image.pixel_count();
    let samples = Array2::from_shape_fn((size, CHANNELS), |(i, c)| planes.planes[c][i]);

    let clusters = CLUSTER_COUNT.min(size);
    let assignments = kmeans(&samples, clusters, KMEANS_PASSES);
    let noise = weighted_cluster_stdev(&samples, &assignments, clusters);

    Ok(NrParams {
        luma: ChannelParams {
            threshold: map_luma(noise[0]),
            softness: LUMA_SOFTNESS,
        },
        chroma_blue: ChannelParams {
            threshold: map_chroma(noise[1]),
            softness: CHROMA_SOFTNESS,
        },
        chroma_red: ChannelParams {
            threshold: map_chroma(noise[2]),
            softness: CHROMA_SOFTNESS,
        },
    })
}

#[inline]
fn row(samples: &Array2<SubPixel>, i: usize) -> [SubPixel; CHANNELS] {
    [samples[[i, 0]], samples[[i, 1]], samples[[i, 2]]]
}

#[inline]
fn distance_sq(a: [SubPixel; CHANNELS], b: [SubPixel; CHANNELS]) -> SubPixel {
    let mut d = 0.0;
    for c in 0..CHANNELS {
        let diff = a[c] - b[c];
        d += diff * diff;
    }
    d
}

/// Fixed-pass k-means over the YCbCr sample rows. Centroids are seeded from
/// samples evenly spaced along the luma ordering so the initial spread
/// covers the intensity range deterministically.
fn kmeans(samples: &Array2<SubPixel>, k: usize, passes: usize) -> Vec<usize> {
    let n = samples.nrows();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| samples[[a, 0]].total_cmp(&samples[[b, 0]]));

    let mut centroids: Vec<[SubPixel; CHANNELS]> = (0..k)
        .map(|c| {
            let i = if k > 1 { c * (n - 1) / (k - 1) } else { n / 2 };
            row(samples, order[i])
        })
        .collect();

    let mut assignments = vec![0usize; n];
    for _ in 0..passes {
        assignments.par_iter_mut().enumerate().for_each(|(i, a)| {
            let point = row(samples, i);
            let mut best = 0;
            let mut best_d = SubPixel::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = distance_sq(point, *centroid);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            *a = best;
        });

        // recompute means; an empty cluster keeps its previous centroid
        let mut sums = vec![[0.0; CHANNELS]; k];
        let mut counts = vec![0usize; k];
        for (i, &a) in assignments.iter().enumerate() {
            let point = row(samples, i);
            for c in 0..CHANNELS {
                sums[a][c] += point[c];
            }
            counts[a] += 1;
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] > 0 {
                for ch in 0..CHANNELS {
                    centroid[ch] = sums[c][ch] / counts[c] as SubPixel;
                }
            }
        }
    }
    assignments
}

/// Sample-count-weighted mean of per-cluster standard deviations, per
/// channel. The +1 divisor matches the thresholding engine's handling of
/// degenerate (near-empty) groups.
fn weighted_cluster_stdev(
    samples: &Array2<SubPixel>,
    assignments: &[usize],
    k: usize,
) -> [SubPixel; CHANNELS] {
    let n = samples.nrows();
    let mut counts = vec![0usize; k];
    let mut sums = vec![[0.0; CHANNELS]; k];
    for (i, &a) in assignments.iter().enumerate() {
        let point = row(samples, i);
        for c in 0..CHANNELS {
            sums[a][c] += point[c];
        }
        counts[a] += 1;
    }

    let mut means = vec![[0.0; CHANNELS]; k];
    for c in 0..k {
        if counts[c] > 0 {
            for ch in 0..CHANNELS {
                means[c][ch] = sums[c][ch] / counts[c] as SubPixel;
            }
        }
    }

    let mut sq_dev = vec![[0.0; CHANNELS]; k];
    for (i, &a) in assignments.iter().enumerate() {
        let point = row(samples, i);
        for c in 0..CHANNELS {
            let diff = point[c] - means[a][c];
            sq_dev[a][c] += diff * diff;
        }
    }

    let mut weighted = [0.0; CHANNELS];
    for c in 0..k {
        if counts[c] == 0 {
            continue;
        }
        for ch in 0..CHANNELS {
            let sd = (sq_dev[c][ch] / (counts[c] + 1) as SubPixel).sqrt();
            weighted[ch] += counts[c] as SubPixel * sd;
        }
    }
    for w in weighted.iter_mut() {
        *w /= n as SubPixel;
    }
    weighted
}

/// Piecewise-linear fit from weighted noise stdev (in [0, 1] plane units)
/// to the luminance soft-threshold scale, clamped to [0, 9].
fn map_luma(sd: SubPixel) -> SubPixel {
    let threshold = if sd < 0.01 {
        40.0 * sd
    } else {
        0.4 + 20.0 * (sd - 0.01)
    };
    threshold.clamp(0.0, 9.0)
}

/// Chroma variant of [`map_luma`]: steeper, clamped to at most 7.
fn map_chroma(sd: SubPixel) -> SubPixel {
    let threshold = if sd < 0.01 {
        60.0 * sd
    } else {
        0.6 + 30.0 * (sd - 0.01)
    };
    threshold.clamp(0.0, 7.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_gray(amplitude: SubPixel, seed: u64) -> RgbaImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..32 * 32)
            .map(|_| {
                let mut px = [0u16; 4];
                for v in px.iter_mut().take(3) {
                    let n: SubPixel =
                        (0..12).map(|_| rng.random::<SubPixel>()).sum::<SubPixel>() - 6.0;
                    *v = (128.0 + amplitude * n).clamp(0.0, 255.0) as u16;
                }
                px[3] = 255;
                px
            })
            .collect();
        RgbaImage::from_pixels(32, 32, false, data).unwrap()
    }

    #[test]
    fn test_kmeans_separates_two_blobs() {
        let mut data = Vec::new();
        for i in 0..40 {
            let v = if i < 20 { 0.1 } else { 0.9 };
            data.extend_from_slice(&[v, 0.5, 0.5]);
        }
        let samples = Array2::from_shape_vec((40, 3), data).unwrap();
        let assignments = kmeans(&samples, 2, 5);

        let first = assignments[0];
        assert!(assignments[..20].iter().all(|&a| a == first));
        assert!(assignments[20..].iter().all(|&a| a != first));
    }

    #[test]
    fn test_flat_image_estimates_near_zero() {
        let image = RgbaImage::from_pixels(8, 8, false, vec![[100, 100, 100, 255]; 64]).unwrap();
        let params = estimate(&image).unwrap();
        assert!(params.luma.threshold < 0.1);
        assert!(params.chroma_blue.threshold < 0.1);
        assert!(params.chroma_red.threshold < 0.1);
    }

    #[test]
    fn test_noisier_image_gets_larger_threshold() {
        let faint = estimate(&noisy_gray(3.0, 21)).unwrap();
        let strong = estimate(&noisy_gray(12.0, 22)).unwrap();
        assert!(strong.luma.threshold > faint.luma.threshold);
        assert!(faint.luma.threshold > 0.0);
    }

    #[test]
    fn test_estimates_stay_within_bounds() {
        let params = estimate(&noisy_gray(40.0, 23)).unwrap();
        assert!(params.luma.threshold <= 9.0);
        assert!(params.chroma_blue.threshold <= 7.0);
        assert!(params.chroma_red.threshold <= 7.0);
        assert_eq!(params.luma.softness, LUMA_SOFTNESS);
        assert_eq!(params.chroma_blue.softness, CHROMA_SOFTNESS);
    }

    #[test]
    fn test_mapping_clamps() {
        assert_eq!(map_luma(1.0), 9.0);
        assert_eq!(map_chroma(1.0), 7.0);
        assert_eq!(map_luma(0.0), 0.0);
        assert!(map_luma(0.005) > 0.0);
    }
}
