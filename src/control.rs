use crate::audio_data::{
    AudioSample, ConvertedSample, LinearConverter, LoadOptions, SampleConverter, TargetFormat,
    to_i16,
};
use crate::config::{DeviceSpec, ProMixDesc, RenderMode};
use crate::error::{ProMixError, Result};
use crate::events::{EVENT_QUEUE_CAPACITY, ProMixEvent};
use crate::handle::{SampleId, TrackHandle, next_generation};
use crate::mixer::{MixContext, mix_saturating, mix_stereo};
use crate::playback::{TrackParams, TrackPool};
use crate::sample_store::SampleStore;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// The mixer: sample store, track pool and the render entry point.
///
/// `Mixer` is shared between the control side (any thread calling the
/// load/play/update/stop methods) and the audio callback (calling
/// [`render`](Self::render)). Both sides go through the same track lock:
/// control methods hold it only for a few field assignments, and the render
/// side never waits for it.
///
/// # Architecture
///
/// - **Control threads**: convert and load samples, start/stop/update tracks
/// - **Audio callback**: `render()` mixes one block and retires finished tracks
///
/// Lock order is always samples, then tracks. Buffers released by a slot
/// are dropped after both locks are gone.
pub struct Mixer {
    desc: ProMixDesc,
    device: DeviceSpec,
    converter: Box<dyn SampleConverter>,
    samples: Mutex<SampleStore>,
    tracks: Mutex<TrackPool>,
    event_sender: Sender<ProMixEvent>,
    event_receiver: Receiver<ProMixEvent>,
}

impl Mixer {
    /// Creates a mixer rendering for `device` with the default converter.
    pub fn new(desc: ProMixDesc, device: DeviceSpec) -> Result<Self> {
        Self::with_converter(desc, device, LinearConverter)
    }

    /// Creates a mixer that loads samples through a custom converter.
    pub fn with_converter<C>(desc: ProMixDesc, device: DeviceSpec, converter: C) -> Result<Self>
    where
        C: SampleConverter + 'static,
    {
        desc.validate()?;
        if device.sample_rate == 0 || device.mode.output_channels() == 0 {
            return Err(ProMixError::Configuration(format!(
                "Invalid device spec: {:?}",
                device
            )));
        }

        let (event_sender, event_receiver) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        log::debug!(
            "Mixer created: {} tracks, {} Hz, {:?}",
            desc.max_tracks,
            device.sample_rate,
            device.mode
        );

        Ok(Self {
            tracks: Mutex::new(TrackPool::new(desc.max_tracks)),
            samples: Mutex::new(SampleStore::new()),
            converter: Box::new(converter),
            desc,
            device,
            event_sender,
            event_receiver,
        })
    }

    pub fn desc(&self) -> &ProMixDesc {
        &self.desc
    }

    pub fn device_spec(&self) -> DeviceSpec {
        self.device
    }

    /// Number of track slots.
    pub fn capacity(&self) -> usize {
        self.desc.max_tracks
    }

    fn lock_samples(&self) -> MutexGuard<'_, SampleStore> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracks(&self) -> MutexGuard<'_, TrackPool> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Converts `sample` to the working format and stores it.
    ///
    /// In full-fidelity mode the result is mono or stereo (mono when the
    /// source is mono or `options.convert_to_mono` is set); in degraded mode
    /// it uses the device's channel count. `options.volume` is baked in with
    /// clamping.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for bit depths other than 8, 16 and 32 (float),
    /// `EmptySample` if nothing is left after conversion. Failed loads do not
    /// consume an id.
    pub fn load_sample(&self, sample: &AudioSample, options: &LoadOptions) -> Result<SampleId> {
        let channels = match self.device.mode {
            RenderMode::Stereo16 if options.convert_to_mono || sample.channels() <= 1 => 1,
            RenderMode::Stereo16 => 2,
            RenderMode::Saturating { channels } => channels,
        };
        let target = TargetFormat {
            sample_rate: self.device.sample_rate,
            channels,
        };

        let mut converted = self
            .converter
            .convert(sample, target)
            .inspect_err(|e| log::warn!("Failed to convert sample: {}", e))?;

        if converted.len() < channels as usize {
            log::warn!("Sample has zero length");
            return Err(ProMixError::EmptySample);
        }

        if options.volume != 1.0 {
            adjust_volume(&mut converted, options.volume);
        }

        let converted = ConvertedSample::new(converted, channels);
        let frames = converted.total_frames();
        let id = self.lock_samples().insert(converted);
        log::debug!(
            "Loaded {}: {} frames, {} channels at {} Hz",
            id,
            frames,
            channels,
            self.device.sample_rate
        );
        Ok(id)
    }

    /// Decodes a WAV file and loads it, see [`load_sample`](Self::load_sample).
    pub fn load_sample_file(&self, path: &str, options: &LoadOptions) -> Result<SampleId> {
        let sample = AudioSample::from_wav_path(path)?;
        self.load_sample(&sample, options)
    }

    /// Removes a sample, stopping every track that plays it first.
    ///
    /// Returns `false` if `id` is unknown.
    pub fn destroy_sample(&self, id: SampleId) -> bool {
        let mut released = Vec::with_capacity(self.capacity());

        let mut samples = self.lock_samples();
        let Some(sample) = samples.remove(id) else {
            return false;
        };
        let stopped = self.lock_tracks().detach(sample.shared(), &mut released);
        drop(samples);

        log::debug!("Destroyed {} ({} playing tracks stopped)", id, stopped);
        drop(released);
        drop(sample);
        true
    }

    pub fn has_sample(&self, id: SampleId) -> bool {
        self.lock_samples().contains(id)
    }

    pub fn sample_count(&self) -> usize {
        self.lock_samples().len()
    }

    /// Plays `sample` once on the lowest free track.
    pub fn play(&self, sample: SampleId, params: TrackParams) -> Result<TrackHandle> {
        self.start(None, sample, params, false)
    }

    /// Plays `sample` once on `slot`, replacing whatever it was playing.
    pub fn play_on(&self, slot: usize, sample: SampleId, params: TrackParams) -> Result<TrackHandle> {
        self.start(Some(slot), sample, params, false)
    }

    /// Plays `sample` in a loop on the lowest free track.
    pub fn play_looped(&self, sample: SampleId, params: TrackParams) -> Result<TrackHandle> {
        self.start(None, sample, params, true)
    }

    /// Plays `sample` in a loop on `slot`, replacing whatever it was playing.
    pub fn play_looped_on(
        &self,
        slot: usize,
        sample: SampleId,
        params: TrackParams,
    ) -> Result<TrackHandle> {
        self.start(Some(slot), sample, params, true)
    }

    fn start(
        &self,
        slot: Option<usize>,
        sample: SampleId,
        params: TrackParams,
        looping: bool,
    ) -> Result<TrackHandle> {
        if let Some(slot) = slot {
            if slot >= self.capacity() {
                return Err(ProMixError::TrackOutOfRange {
                    slot,
                    capacity: self.capacity(),
                });
            }
        }

        let samples = self.lock_samples();
        let converted = samples
            .get(sample)
            .ok_or(ProMixError::UnknownSample(sample))?;
        let data = converted.shared().clone();
        let channels = converted.channels() as usize;
        let generation = next_generation();

        let (handle, previous) = {
            let mut pool = self.lock_tracks();
            let slot = match slot {
                Some(slot) => slot,
                None => pool.allocate_slot().ok_or(ProMixError::NoFreeTrack)?,
            };
            pool.occupy(slot, data, channels, params, looping, generation)
        };
        drop(samples);
        drop(previous);

        log::debug!("{} started {} (looping: {})", handle, sample, looping);
        Ok(handle)
    }

    /// Updates pause state and parameters of a playing track.
    ///
    /// Returns `false` without side effects if the handle is stale or the
    /// track already stopped.
    pub fn set_state(&self, handle: TrackHandle, paused: bool, params: TrackParams) -> bool {
        self.lock_tracks().update(handle, paused, params)
    }

    /// Stops a track. Returns `false` if it was not playing under this handle.
    pub fn stop(&self, handle: TrackHandle) -> bool {
        self.lock_tracks().stop(handle)
    }

    pub fn stop_all(&self) {
        self.lock_tracks().stop_all();
    }

    /// Number of playing (including paused) tracks.
    pub fn active_count(&self) -> usize {
        self.lock_tracks().active_count()
    }

    /// Whether the playback `handle` refers to is still running (or paused).
    pub fn is_active(&self, handle: TrackHandle) -> bool {
        self.lock_tracks().is_active(handle)
    }

    /// Renders one interleaved block into `output` and returns the frame count.
    ///
    /// `output` holds `frames * channels` samples where channels is 2 in
    /// full-fidelity mode and the device channel count otherwise. Called
    /// from the audio callback: never blocks, never allocates. If the track
    /// lock is busy the block is silent and no cursor moves.
    pub fn render(&self, output: &mut [i16]) -> usize {
        let frames = output.len() / self.device.mode.output_channels();

        let mut pool = match self.tracks.try_lock() {
            Ok(pool) => pool,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                output.fill(0);
                let _ = self
                    .event_sender
                    .try_send(ProMixEvent::RenderSkipped { frames });
                return frames;
            }
        };

        let sender = &self.event_sender;
        let on_finished = |handle| {
            let _ = sender.try_send(ProMixEvent::TrackFinished { handle });
        };

        match self.device.mode {
            RenderMode::Stereo16 => {
                let ctx = MixContext {
                    sample_rate: self.device.sample_rate,
                    volume_left: self.desc.volume_left,
                    volume_right: self.desc.volume_right,
                };
                mix_stereo(&mut pool, output, &ctx, on_finished)
            }
            RenderMode::Saturating { .. } => {
                mix_saturating(&mut pool, output, on_finished);
                frames
            }
        }
    }

    /// Drains events reported by the render callback since the last poll.
    pub fn poll_events(&self) -> Vec<ProMixEvent> {
        let events: Vec<ProMixEvent> = self.event_receiver.try_iter().collect();
        for event in events.iter().filter(|e| e.is_error()) {
            log::warn!("Render event: {:?}", event);
        }
        events
    }
}

/// Multiplies every sample by `volume`, clamping to the 16-bit range.
fn adjust_volume(samples: &mut [i16], volume: f32) {
    for sample in samples.iter_mut() {
        *sample = to_i16(*sample as f32 * volume);
    }
}
