use crate::error::NrError;
use crate::nrfilter::RunFlag;
use rayon::prelude::*;

pub type SubPixel = f32;
pub type Plane = Vec<SubPixel>;

pub const CHANNELS: usize = 3;

/// Allocate a zeroed plane, reporting allocation failure instead of aborting.
pub(crate) fn alloc_plane(len: usize) -> Result<Plane, NrError> {
    let mut plane = Plane::new();
    plane
        .try_reserve_exact(len)
        .map_err(|_| NrError::Allocation(len * std::mem::size_of::<SubPixel>()))?;
    plane.resize(len, 0.0);
    Ok(plane)
}

/// Interleaved RGBA image with 8 or 16 bits per sample. 8-bit samples live in
/// the low byte of each `u16`.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub sixteen_bit: bool,
    pub data: Vec<[u16; 4]>,
}

impl RgbaImage {
    pub fn new(width: usize, height: usize, sixteen_bit: bool) -> Result<Self, NrError> {
        let len = width * height;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| NrError::Allocation(len * std::mem::size_of::<[u16; 4]>()))?;
        data.resize(len, [0, 0, 0, 0]);
        Ok(Self {
            width,
            height,
            sixteen_bit,
            data,
        })
    }

    pub fn from_pixels(
        width: usize,
        height: usize,
        sixteen_bit: bool,
        data: Vec<[u16; 4]>,
    ) -> Result<Self, NrError> {
        if data.len() != width * height {
            return Err(NrError::InvalidBufferLength {
                got: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            sixteen_bit,
            data,
        })
    }

    /// Largest representable sample value: 255 or 65535.
    pub fn ceiling(&self) -> SubPixel {
        if self.sixteen_bit {
            65535.0
        } else {
            255.0
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u16; 4] {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, pixel: [u16; 4]) {
        self.data[y * self.width + x] = pixel;
    }
}

/// Per-channel float planes extracted from an `RgbaImage`, normalized into
/// [0, 1] by the bit-depth ceiling. Alpha is carried through untouched.
/// The planes are owned by one filter invocation and dropped with it.
pub struct ChannelPlanes {
    pub planes: [Plane; CHANNELS],
    alpha: Vec<u16>,
    width: usize,
    height: usize,
    sixteen_bit: bool,
}

impl ChannelPlanes {
    pub fn from_image(image: &RgbaImage, flag: &RunFlag) -> Result<Self, NrError> {
        let size = image.pixel_count();
        let mut planes = [alloc_plane(size)?, alloc_plane(size)?, alloc_plane(size)?];

        let mut alpha = Vec::new();
        alpha
            .try_reserve_exact(size)
            .map_err(|_| NrError::Allocation(size * std::mem::size_of::<u16>()))?;

        let scale = 1.0 / image.ceiling();
        for row in 0..image.height {
            flag.ensure()?;
            for col in 0..image.width {
                let i = row * image.width + col;
                let [r, g, b, a] = image.data[i];
                planes[0][i] = r as SubPixel * scale;
                planes[1][i] = g as SubPixel * scale;
                planes[2][i] = b as SubPixel * scale;
                alpha.push(a);
            }
        }

        Ok(Self {
            planes,
            alpha,
            width: image.width,
            height: image.height,
            sixteen_bit: image.sixteen_bit,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Clamp every sample back into [0, 1].
    pub fn clip(&mut self) {
        for plane in self.planes.iter_mut() {
            plane.par_iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
        }
    }

    /// Scale back by the bit-depth ceiling, round and clamp into a new image.
    pub fn into_image(self, flag: &RunFlag) -> Result<RgbaImage, NrError> {
        let mut out = RgbaImage::new(self.width, self.height, self.sixteen_bit)?;
        let ceiling = out.ceiling();

        let [r, g, b] = &self.planes;
        for row in 0..self.height {
            flag.ensure()?;
            for col in 0..self.width {
                let i = row * self.width + col;
                let quantize = |v: SubPixel| (v * ceiling + 0.5).min(ceiling) as u32 as u16;
                out.data[i] = [quantize(r[i]), quantize(g[i]), quantize(b[i]), self.alpha[i]];
            }
        }
        Ok(out)
    }
}
