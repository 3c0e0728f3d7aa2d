use crate::pixels::SubPixel;

/// Reflect an index back into `[0, size)` at both ends.
#[inline]
fn mirror(mut index: isize, size: usize) -> usize {
    if size == 1 {
        return 0;
    }
    let size = size as isize;
    loop {
        if index < 0 {
            index = -index;
        } else if index >= size {
            index = 2 * size - 2 - index;
        } else {
            return index as usize;
        }
    }
}

/// One dimensional dilated hat convolution, the building block of the
/// a-trous wavelet decomposition.
pub trait HatTransform {
    /// Convolve `size` samples read at `stride` with the dilated kernel
    /// `[1, 2, 1]` at dilation `scale`, writing densely into `temp`.
    ///
    /// `temp[i] = 2*base[st*i] + base[st*(i-sc)] + base[st*(i+sc)]` with the
    /// off-center taps mirrored at both boundaries. The kernel sums to 4, the
    /// caller scales by 0.25.
    fn hat_transform(&self, temp: &mut [SubPixel], stride: usize, size: usize, scale: usize);
}

impl HatTransform for [SubPixel] {
    fn hat_transform(&self, temp: &mut [SubPixel], stride: usize, size: usize, scale: usize) {
        let sc = scale as isize;
        for (i, out) in temp.iter_mut().take(size).enumerate() {
            let left = mirror(i as isize - sc, size);
            let right = mirror(i as isize + sc, size);
            *out = 2.0 * self[stride * i] + self[stride * left] + self[stride * right];
        }
    }
}
