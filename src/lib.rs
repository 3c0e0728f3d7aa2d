//! Wavelet-based photographic noise reduction: a 5-level a-trous
//! decomposition with intensity-adaptive soft-thresholding in YCbCr, plus a
//! k-means noise-level estimator for deriving the filter parameters.

pub mod config;
pub mod cst;
pub mod denoise;
pub mod error;
pub mod estimate;
pub mod helpers;
pub mod nrfilter;
pub mod partition;
pub mod pixels;
pub mod wavelets;

pub use config::{ChannelParams, NrParams};
pub use error::NrError;
pub use estimate::estimate;
pub use nrfilter::{NrFilter, RunFlag};
pub use pixels::RgbaImage;
