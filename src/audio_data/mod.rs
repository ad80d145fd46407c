mod converter;
mod load_options;
mod wav_loader;

pub(crate) use converter::to_i16;
pub use converter::{LinearConverter, SampleConverter, TargetFormat};
pub use load_options::LoadOptions;

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Encoding description of caller-supplied raw audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// 8 = signed 8-bit, 16 = signed 16-bit little endian, 32 = f32 little endian
    pub bits_per_sample: u16,
}

impl SourceFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }
}

/// Raw, not yet converted audio as handed to [`Mixer::load_sample`](crate::Mixer::load_sample).
///
/// # Data Format
/// Bytes are **INTERLEAVED** little-endian samples as described by [`SourceFormat`].
#[derive(Debug, Clone)]
pub struct AudioSample {
    data: Vec<u8>,
    format: SourceFormat,
}

impl AudioSample {
    pub fn new(data: Vec<u8>, format: SourceFormat) -> Self {
        Self { data, format }
    }

    /// Wraps interleaved signed 16-bit samples.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, SourceFormat::new(sample_rate, channels, 16))
    }

    /// Wraps interleaved f32 samples in the -1.0..=1.0 range.
    pub fn from_f32(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, SourceFormat::new(sample_rate, channels, 32))
    }

    /// Decodes an uncompressed WAV file into a 16-bit sample.
    pub fn from_wav_path(path: &str) -> Result<Self> {
        wav_loader::load_wav(path)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.format.bits_per_sample
    }

    /// Number of complete frames in the raw data
    pub fn total_frames(&self) -> usize {
        match self.format.bytes_per_frame() {
            0 => 0,
            frame_bytes => self.data.len() / frame_bytes,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_frames() as f64 / self.format.sample_rate as f64)
    }
}

/// A sample converted to the mixer's working format and ready to be played.
///
/// # Data Format
/// Signed 16-bit, **INTERLEAVED**, at the device sample rate. The buffer is
/// shared with every track playing it and never mutated after creation.
#[derive(Debug, Clone)]
pub struct ConvertedSample {
    samples: Arc<[i16]>,
    channels: u16,
}

impl ConvertedSample {
    pub(crate) fn new(samples: Vec<i16>, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            channels,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<[i16]> {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_i16_layout() {
        let sample = AudioSample::from_i16(&[1, -2, 3, -4], 44100, 2);
        assert_eq!(sample.data(), &[1, 0, 0xfe, 0xff, 3, 0, 0xfc, 0xff]);
        assert_eq!(sample.total_frames(), 2);
        assert_eq!(sample.bits_per_sample(), 16);
        assert_eq!(sample.duration(), Duration::from_secs_f64(2.0 / 44100.0));
    }

    #[test]
    fn test_partial_frame_ignored() {
        let sample = AudioSample::new(vec![0; 7], SourceFormat::new(8000, 2, 16));
        assert_eq!(sample.total_frames(), 1);
    }

    #[test]
    fn test_converted_frames() {
        let converted = ConvertedSample::new(vec![0; 10], 2);
        assert_eq!(converted.total_frames(), 5);
        assert_eq!(ConvertedSample::new(vec![7], 2).total_frames(), 0);
    }
}
