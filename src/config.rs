//! Configuration for ProMix

use crate::error::{ProMixError, Result};
use crate::handle::MAX_TRACKS;

/// Configuration descriptor for a mixer and the device it is opened on.
#[derive(Debug, Clone)]
pub struct ProMixDesc {
    /// Requested output sample rate in Hz
    pub sample_rate: u32,
    /// Requested number of frames per device callback
    pub block_size: usize,
    /// Requested output channels (the full-fidelity path needs 2)
    pub channels: u16,
    /// Number of playback tracks in the pool
    pub max_tracks: usize,
    /// Global left gain applied on top of every track's own volume
    pub volume_left: f32,
    /// Global right gain applied on top of every track's own volume
    pub volume_right: f32,
}

impl Default for ProMixDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            max_tracks: 16,
            volume_left: 1.0,
            volume_right: 1.0,
        }
    }
}

impl ProMixDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn max_tracks(mut self, max: usize) -> Self {
        self.max_tracks = max;
        self
    }

    pub fn volume(mut self, left: f32, right: f32) -> Self {
        self.volume_left = left;
        self.volume_right = right;
        self
    }

    /// Checks the descriptor before any device or pool is created.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ProMixError::Configuration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(ProMixError::Configuration(
                "Block size must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(ProMixError::Configuration(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if self.max_tracks == 0 || self.max_tracks > MAX_TRACKS {
            return Err(ProMixError::Configuration(format!(
                "Track count must be between 1 and {} (got {})",
                MAX_TRACKS, self.max_tracks
            )));
        }
        Ok(())
    }
}

/// How blocks are rendered, fixed when the mixer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Signed 16-bit stereo: volume, disparity, pitch and looping supported
    Stereo16,
    /// Device refused i16 stereo: plain saturating sum in the device's channel layout
    Saturating { channels: u16 },
}

impl RenderMode {
    /// Interleaved samples per output frame.
    pub fn output_channels(&self) -> usize {
        match self {
            Self::Stereo16 => 2,
            Self::Saturating { channels } => *channels as usize,
        }
    }
}

/// What the device actually granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    pub sample_rate: u32,
    pub block_size: usize,
    pub mode: RenderMode,
}

impl DeviceSpec {
    /// The spec a device would report if it honoured the request exactly.
    pub fn from_desc(desc: &ProMixDesc) -> Self {
        Self {
            sample_rate: desc.sample_rate,
            block_size: desc.block_size,
            mode: RenderMode::Stereo16,
        }
    }

    pub fn is_full_fidelity(&self) -> bool {
        self.mode == RenderMode::Stereo16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        assert!(ProMixDesc::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_desc() {
        assert!(ProMixDesc::new().sample_rate(0).validate().is_err());
        assert!(ProMixDesc::new().block_size(0).validate().is_err());
        assert!(ProMixDesc::new().max_tracks(0).validate().is_err());
        assert!(
            ProMixDesc::new()
                .max_tracks(MAX_TRACKS + 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_render_mode_channels() {
        assert_eq!(RenderMode::Stereo16.output_channels(), 2);
        assert_eq!(RenderMode::Saturating { channels: 6 }.output_channels(), 6);
    }
}
