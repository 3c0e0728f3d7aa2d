use serde::{Deserialize, Serialize};

use crate::pixels::SubPixel;

/// Soft-threshold settings for one channel.
///
/// `threshold` scales the per-bucket standard deviations (typical range
/// 0-10); exactly 0 skips denoising the channel entirely. `softness` is the
/// fraction in [0, 1] of detail retained inside the threshold.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    pub threshold: SubPixel,
    pub softness: SubPixel,
}

/// Per-channel noise reduction parameters, in YCbCr order. Immutable input
/// to one filter run; produced by the estimator or supplied directly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NrParams {
    pub luma: ChannelParams,
    pub chroma_blue: ChannelParams,
    pub chroma_red: ChannelParams,
}

impl NrParams {
    pub fn channels(&self) -> [ChannelParams; 3] {
        [self.luma, self.chroma_blue, self.chroma_red]
    }

    /// Same threshold and softness on all three channels.
    pub fn uniform(threshold: SubPixel, softness: SubPixel) -> Self {
        let channel = ChannelParams {
            threshold,
            softness,
        };
        Self {
            luma: channel,
            chroma_blue: channel,
            chroma_red: channel,
        }
    }
}

impl Default for NrParams {
    fn default() -> Self {
        Self::uniform(1.2, 0.9)
    }
}

/// Parse filter parameters from a TOML document.
pub fn parse_params(text: &str) -> Result<NrParams, toml::de::Error> {
    toml::from_str(text)
}
