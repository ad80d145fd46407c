use crate::config::{DeviceSpec, ProMixDesc, RenderMode};
use crate::control::Mixer;
use crate::error::{ProMixError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, SupportedBufferSize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Set while an engine holds the output device.
static ENGINE_OPEN: AtomicBool = AtomicBool::new(false);

/// Stereo sample formats the mixer can feed at full fidelity, in order of preference.
const STEREO_FORMATS: [SampleFormat; 10] = [
    SampleFormat::I16,
    SampleFormat::F32,
    SampleFormat::I32,
    SampleFormat::U16,
    SampleFormat::F64,
    SampleFormat::I64,
    SampleFormat::U32,
    SampleFormat::U64,
    SampleFormat::I8,
    SampleFormat::U8,
];

/// Output device driving a [`Mixer`] from the cpal callback.
///
/// Only one engine can be open per process. Dropping it stops the stream
/// and releases the device.
pub struct ProMixEngine {
    mixer: Arc<Mixer>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

/// Result of format negotiation.
#[derive(Debug)]
struct Negotiated {
    config: cpal::StreamConfig,
    format: SampleFormat,
    spec: DeviceSpec,
}

impl ProMixEngine {
    /// Opens the default output device and starts rendering.
    ///
    /// Requests the configured sample rate in stereo with a fixed block
    /// size. If the device has no stereo config at that rate, its default
    /// config is used and the mixer runs in degraded mode.
    pub fn open(desc: ProMixDesc) -> Result<Self> {
        desc.validate()?;
        if ENGINE_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProMixError::AlreadyOpen);
        }

        Self::start(desc).inspect_err(|_| ENGINE_OPEN.store(false, Ordering::Release))
    }

    fn start(desc: ProMixDesc) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            ProMixError::AudioDevice("No default output device available".into())
        })?;

        let negotiated = negotiate(&device, &desc)?;
        let mixer = Arc::new(Mixer::new(desc, negotiated.spec)?);
        let is_running = Arc::new(AtomicBool::new(false));
        let frames_processed = Arc::new(AtomicUsize::new(0));

        macro_rules! stream_for {
            ($sample:ty) => {
                build_stream::<$sample>(
                    &device,
                    &negotiated,
                    mixer.clone(),
                    is_running.clone(),
                    frames_processed.clone(),
                )?
            };
        }

        let stream = match negotiated.format {
            SampleFormat::I8 => stream_for!(i8),
            SampleFormat::I16 => stream_for!(i16),
            SampleFormat::I32 => stream_for!(i32),
            SampleFormat::I64 => stream_for!(i64),
            SampleFormat::U8 => stream_for!(u8),
            SampleFormat::U16 => stream_for!(u16),
            SampleFormat::U32 => stream_for!(u32),
            SampleFormat::U64 => stream_for!(u64),
            SampleFormat::F32 => stream_for!(f32),
            SampleFormat::F64 => stream_for!(f64),
            other => {
                return Err(ProMixError::UnsupportedFormat(format!(
                    "Device sample format {:?} not supported",
                    other
                )));
            }
        };

        is_running.store(true, Ordering::Relaxed);
        stream
            .play()
            .map_err(|e| ProMixError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Audio device opened: {} Hz, {} channels, {:?}, buffer {:?}, {:?}",
            negotiated.spec.sample_rate,
            negotiated.config.channels,
            negotiated.format,
            negotiated.config.buffer_size,
            negotiated.spec.mode
        );

        Ok(Self {
            mixer,
            stream: Some(stream),
            is_running,
            frames_processed,
        })
    }

    /// The mixer this engine renders. Clone the `Arc` to control it from other threads.
    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Stops the stream. The device stays reserved until the engine is dropped.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!(
                "Audio device closed after {} frames",
                self.frames_processed()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Number of frames rendered since open
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }
}

impl Drop for ProMixEngine {
    fn drop(&mut self) {
        self.stop();
        ENGINE_OPEN.store(false, Ordering::Release);
    }
}

/// Picks the stream config: stereo at the requested rate if the device has
/// it, else the default config in degraded mode.
fn negotiate(device: &cpal::Device, desc: &ProMixDesc) -> Result<Negotiated> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| {
            ProMixError::AudioDevice(format!("Failed to query output configs: {}", e))
        })?
        .collect();

    if let Some(stereo) = choose_stereo(&supported, desc) {
        return Ok(stereo);
    }

    let default_config = device
        .default_output_config()
        .map_err(|e| ProMixError::AudioDevice(format!("Failed to get default config: {}", e)))?;
    log::warn!(
        "Device has no stereo output at {} Hz; falling back to {} Hz, {} channels, {:?} without volume, pitch, disparity or looping",
        desc.sample_rate,
        default_config.sample_rate().0,
        default_config.channels(),
        default_config.sample_format()
    );

    Ok(degraded(&default_config, desc))
}

/// First stereo range covering the requested rate, in [`STEREO_FORMATS`] order.
fn choose_stereo(
    supported: &[cpal::SupportedStreamConfigRange],
    desc: &ProMixDesc,
) -> Option<Negotiated> {
    let rate = cpal::SampleRate(desc.sample_rate);

    STEREO_FORMATS.iter().find_map(|&format| {
        let range = supported.iter().find(|range| {
            range.channels() == 2
                && range.sample_format() == format
                && range.min_sample_rate() <= rate
                && range.max_sample_rate() >= rate
        })?;

        Some(Negotiated {
            config: cpal::StreamConfig {
                channels: 2,
                sample_rate: rate,
                buffer_size: buffer_size_for(range.buffer_size(), desc.block_size),
            },
            format,
            spec: DeviceSpec {
                sample_rate: desc.sample_rate,
                block_size: desc.block_size,
                mode: RenderMode::Stereo16,
            },
        })
    })
}

/// Degraded setup on the device's own default config.
fn degraded(default_config: &cpal::SupportedStreamConfig, desc: &ProMixDesc) -> Negotiated {
    let channels = default_config.channels();

    Negotiated {
        config: cpal::StreamConfig {
            channels,
            sample_rate: default_config.sample_rate(),
            buffer_size: buffer_size_for(default_config.buffer_size(), desc.block_size),
        },
        format: default_config.sample_format(),
        spec: DeviceSpec {
            sample_rate: default_config.sample_rate().0,
            block_size: desc.block_size,
            mode: RenderMode::Saturating { channels },
        },
    }
}

/// Fixed block size if the device reports it as supported, else the host default.
fn buffer_size_for(supported: &SupportedBufferSize, block_size: usize) -> cpal::BufferSize {
    let requested = u32::try_from(block_size).ok();
    match (supported, requested) {
        (SupportedBufferSize::Range { min, max }, Some(frames)) if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => {
            log::debug!(
                "Block size {} not in supported range {:?}, using host default",
                block_size,
                supported
            );
            cpal::BufferSize::Default
        }
    }
}

/// Create a typed output stream that renders through `mixer`
fn build_stream<T>(
    device: &cpal::Device,
    negotiated: &Negotiated,
    mixer: Arc<Mixer>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = negotiated.config.channels.max(1) as usize;
    let mut scratch = vec![0i16; negotiated.spec.block_size.max(1) * channels];

    device
        .build_output_stream(
            &negotiated.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !is_running.load(Ordering::Relaxed) {
                    data.fill(T::from_sample(0i16));
                    return;
                }

                let frames = render_into(&mixer, &mut scratch, data);
                frames_processed.fetch_add(frames, Ordering::Relaxed);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| ProMixError::AudioDevice(format!("Failed to build stream: {}", e)))
}

/// Renders `data` through `scratch`, one scratch-sized chunk at a time.
///
/// `scratch` holds whole frames, so hosts handing out bigger blocks than
/// requested are served without allocating.
fn render_into<T>(mixer: &Mixer, scratch: &mut [i16], data: &mut [T]) -> usize
where
    T: SizedSample + FromSample<i16>,
{
    let mut frames = 0;
    for chunk in data.chunks_mut(scratch.len().max(1)) {
        let block = &mut scratch[..chunk.len()];
        frames += mixer.render(block);

        for (out, sample) in chunk.iter_mut().zip(block.iter()) {
            *out = T::from_sample(*sample);
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{AudioSample, LoadOptions};
    use crate::playback::TrackParams;
    use cpal::{Sample, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};

    const BUFFERS: SupportedBufferSize = SupportedBufferSize::Range { min: 64, max: 4096 };

    fn range(channels: u16, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(8000),
            SampleRate(96000),
            BUFFERS,
            format,
        )
    }

    #[test]
    fn test_prefers_i16_stereo() {
        let supported = [range(2, SampleFormat::F32), range(2, SampleFormat::I16)];
        let negotiated = choose_stereo(&supported, &ProMixDesc::default()).unwrap();
        assert_eq!(negotiated.format, SampleFormat::I16);
        assert_eq!(negotiated.config.channels, 2);
        assert_eq!(negotiated.config.buffer_size, cpal::BufferSize::Fixed(512));
        assert!(negotiated.spec.is_full_fidelity());
    }

    #[test]
    fn test_any_stereo_format_is_full_fidelity() {
        for format in [SampleFormat::I32, SampleFormat::F64, SampleFormat::U8, SampleFormat::I8] {
            let supported = [range(1, SampleFormat::I16), range(2, format)];
            let negotiated = choose_stereo(&supported, &ProMixDesc::default()).unwrap();
            assert_eq!(negotiated.format, format);
            assert_eq!(negotiated.spec.mode, RenderMode::Stereo16);
        }
    }

    #[test]
    fn test_no_stereo_at_rate() {
        let supported = [range(1, SampleFormat::I16), range(6, SampleFormat::F32)];
        assert!(choose_stereo(&supported, &ProMixDesc::default()).is_none());

        let desc = ProMixDesc::new().sample_rate(192000);
        assert!(choose_stereo(&[range(2, SampleFormat::I16)], &desc).is_none());
    }

    #[test]
    fn test_degraded_uses_device_layout() {
        let default_config =
            SupportedStreamConfig::new(6, SampleRate(44100), SupportedBufferSize::Unknown, SampleFormat::I32);
        let negotiated = degraded(&default_config, &ProMixDesc::default());
        assert_eq!(negotiated.format, SampleFormat::I32);
        assert_eq!(negotiated.config.channels, 6);
        assert_eq!(negotiated.config.buffer_size, cpal::BufferSize::Default);
        assert_eq!(negotiated.spec.sample_rate, 44100);
        assert_eq!(negotiated.spec.mode, RenderMode::Saturating { channels: 6 });
    }

    #[test]
    fn test_unsupported_block_size_uses_default() {
        assert_eq!(buffer_size_for(&BUFFERS, 512), cpal::BufferSize::Fixed(512));
        assert_eq!(buffer_size_for(&BUFFERS, 64), cpal::BufferSize::Fixed(64));
        assert_eq!(buffer_size_for(&BUFFERS, 8192), cpal::BufferSize::Default);
        assert_eq!(buffer_size_for(&BUFFERS, 32), cpal::BufferSize::Default);
        assert_eq!(
            buffer_size_for(&SupportedBufferSize::Unknown, 512),
            cpal::BufferSize::Default
        );
    }

    #[test]
    fn test_render_larger_block_in_chunks() {
        let desc = ProMixDesc::new().sample_rate(8000).max_tracks(1);
        let mixer = Mixer::new(desc.clone(), DeviceSpec::from_desc(&desc)).unwrap();
        let sample = AudioSample::from_i16(&[1000, 2000, 3000, 4000, 5000], 8000, 1);
        let id = mixer.load_sample(&sample, &LoadOptions::default()).unwrap();
        mixer.play(id, TrackParams::default()).unwrap();

        let mut scratch = vec![0i16; 4];
        let mut data = vec![0i32; 12];
        assert_eq!(render_into(&mixer, &mut scratch, &mut data), 6);

        let expected: Vec<i32> = [1000i16, 1000, 2000, 2000, 3000, 3000, 4000, 4000, 5000, 5000, 0, 0]
            .iter()
            .map(|&s| i32::from_sample(s))
            .collect();
        assert_eq!(data, expected);
        assert_eq!(scratch.len(), 4);
    }
}
