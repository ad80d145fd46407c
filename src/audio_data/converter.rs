use crate::audio_data::AudioSample;
use crate::error::{ProMixError, Result};

/// Format the mixer wants loaded samples in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Converts raw audio into interleaved signed 16-bit samples.
///
/// The mixer treats the converter as a black box: it hands over the raw
/// sample and the target layout and stores whatever comes back. Implement
/// this to plug in a different channel mapping or rate converter.
///
/// # Example
///
/// ```ignore
/// use promix::audio_data::{AudioSample, SampleConverter, TargetFormat};
/// use promix::error::Result;
///
/// struct Silence;
///
/// impl SampleConverter for Silence {
///     fn convert(&self, sample: &AudioSample, target: TargetFormat) -> Result<Vec<i16>> {
///         Ok(vec![0; sample.total_frames() * target.channels as usize])
///     }
/// }
/// ```
pub trait SampleConverter: Send + Sync {
    fn convert(&self, sample: &AudioSample, target: TargetFormat) -> Result<Vec<i16>>;
}

/// Default converter: channel remap followed by linear-interpolation rate conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearConverter;

impl SampleConverter for LinearConverter {
    fn convert(&self, sample: &AudioSample, target: TargetFormat) -> Result<Vec<i16>> {
        let format = sample.format();
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(ProMixError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }
        if target.channels == 0 || target.sample_rate == 0 {
            return Err(ProMixError::Configuration(format!(
                "Invalid conversion target: {} channels at {} Hz",
                target.channels, target.sample_rate
            )));
        }

        let decoded = decode(sample)?;
        let remapped = remap_channels(&decoded, format.channels as usize, target.channels as usize);
        let resampled = resample_linear(
            &remapped,
            target.channels as usize,
            format.sample_rate,
            target.sample_rate,
        );

        Ok(resampled.into_iter().map(to_i16).collect())
    }
}

/// Decodes raw bytes into f32 values on the i16 scale.
fn decode(sample: &AudioSample) -> Result<Vec<f32>> {
    let format = sample.format();
    let usable = sample.total_frames() * format.bytes_per_frame();
    let data = &sample.data()[..usable];

    let decoded = match format.bits_per_sample {
        8 => data.iter().map(|&b| (b as i8) as f32 * 256.0).collect(),
        16 => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32)
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) * i16::MAX as f32)
            .collect(),
        bits => {
            return Err(ProMixError::UnsupportedFormat(format!(
                "{} bit samples not supported",
                bits
            )));
        }
    };

    Ok(decoded)
}

/// Maps interleaved frames from `source` to `target` channels.
///
/// Mono targets average every source channel, mono sources are duplicated,
/// otherwise surplus source channels are dropped and missing ones repeat
/// the last source channel.
fn remap_channels(samples: &[f32], source: usize, target: usize) -> Vec<f32> {
    if source == target {
        return samples.to_vec();
    }

    let frames = samples.len() / source;
    let mut out = Vec::with_capacity(frames * target);
    for frame in samples.chunks_exact(source) {
        if target == 1 {
            let sum: f32 = frame.iter().sum();
            out.push(sum / source as f32);
        } else {
            out.extend((0..target).map(|ch| frame[ch.min(source - 1)]));
        }
    }
    out
}

/// Linear-interpolation rate conversion of interleaved frames.
fn resample_linear(samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    if frames == 0 {
        return Vec::new();
    }

    let out_frames = (frames as u64 * target_rate as u64 / source_rate as u64) as usize;
    let step = source_rate as f64 / target_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);

    for k in 0..out_frames {
        let pos = k as f64 * step;
        let index = (pos as usize).min(frames - 1);
        let next = (index + 1).min(frames - 1);
        let weight = (pos - index as f64) as f32;
        for ch in 0..channels {
            let a = samples[index * channels + ch];
            let b = samples[next * channels + ch];
            out.push(a + (b - a) * weight);
        }
    }
    out
}

pub(crate) fn to_i16(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
