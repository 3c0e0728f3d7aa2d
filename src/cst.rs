use crate::pixels::{Plane, SubPixel};
use rayon::prelude::*;

const SRGB_TO_YCBCR: [[SubPixel; 3]; 3] = [
    [0.299, 0.587, 0.114],
    [-0.1687, -0.3313, 0.5],
    [0.5, -0.4187, -0.0813],
];

// Chroma channels are centered on 0.5 so every plane stays in [0, 1].
const CHROMA_OFFSET: SubPixel = 0.5;

#[inline]
fn matmul(m: &[[SubPixel; 3]; 3], x: [SubPixel; 3]) -> [SubPixel; 3] {
    [
        m[0][0] * x[0] + m[0][1] * x[1] + m[0][2] * x[2],
        m[1][0] * x[0] + m[1][1] * x[1] + m[1][2] * x[2],
        m[2][0] * x[0] + m[2][1] * x[1] + m[2][2] * x[2],
    ]
}

/// In-place sRGB -> YCbCr over three whole planes.
pub fn srgb2ycbcr(planes: &mut [Plane; 3]) {
    let [r, g, b] = planes;
    r.par_iter_mut()
        .zip(g.par_iter_mut())
        .zip(b.par_iter_mut())
        .for_each(|((r, g), b)| {
            let [y, cb, cr] = matmul(&SRGB_TO_YCBCR, [*r, *g, *b]);
            *r = y;
            *g = cb + CHROMA_OFFSET;
            *b = cr + CHROMA_OFFSET;
        });
}

/// In-place YCbCr -> sRGB, the exact inverse of [`srgb2ycbcr`].
pub fn ycbcr2srgb(planes: &mut [Plane; 3]) {
    let [y, cb, cr] = planes;
    y.par_iter_mut()
        .zip(cb.par_iter_mut())
        .zip(cr.par_iter_mut())
        .for_each(|((y, cb), cr)| {
            let luma = *y;
            let b_diff = *cb - CHROMA_OFFSET;
            let r_diff = *cr - CHROMA_OFFSET;
            *y = luma + 1.402 * r_diff;
            *cb = luma - 0.34414 * b_diff - 0.71414 * r_diff;
            *cr = luma + 1.772 * b_diff;
        });
}
