//! Track slots and their state machine.
//!
//! This module provides the fixed pool of playback slots shared between the
//! control API and the render callback:
//! - [`PlayState`]: lifecycle of one slot (idle, playing, paused)
//! - [`TrackParams`]: caller-controlled volume / disparity / pitch
//! - [`Track`]: one slot with its playback cursor
//! - [`TrackPool`]: the fixed array of slots, addressed through [`TrackHandle`]s
//!
//! Everything in here runs under the mixer's track lock. Methods only do
//! field assignments; buffers that a slot lets go of are returned to the
//! caller so they can be dropped after the lock is released.

use crate::handle::TrackHandle;
use std::sync::Arc;

/// Represents the current playback state of a track slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    /// Free for allocation
    #[default]
    Idle,
    /// Contributing to the output and advancing
    Playing,
    /// Holds its position and contributes nothing
    Paused,
}

/// Caller-controlled playback parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    /// Left output gain (1.0 = unity)
    pub volume_left: f32,
    /// Right output gain (1.0 = unity)
    pub volume_right: f32,
    /// Inter-channel delay in seconds; negative delays the left ear, positive the right
    pub disparity: f32,
    /// Playback speed multiplier; the sign is ignored
    pub pitch: f32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            volume_left: 1.0,
            volume_right: 1.0,
            disparity: 0.0,
            pitch: 1.0,
        }
    }
}

impl TrackParams {
    pub fn new(volume_left: f32, volume_right: f32, disparity: f32, pitch: f32) -> Self {
        Self {
            volume_left,
            volume_right,
            disparity,
            pitch,
        }
    }

    pub fn volume(mut self, left: f32, right: f32) -> Self {
        self.volume_left = left;
        self.volume_right = right;
        self
    }

    pub fn disparity(mut self, disparity: f32) -> Self {
        self.disparity = disparity;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    /// True when the exact-read path can be used.
    pub fn is_direct(&self) -> bool {
        self.pitch == 1.0 && self.disparity == 0.0
    }

    /// Non-negative finite pitch, NaN pitch and disparity fall back to the defaults.
    fn normalized(mut self) -> Self {
        self.pitch = if self.pitch.is_nan() {
            1.0
        } else {
            self.pitch.abs().min(f32::MAX)
        };
        if self.disparity.is_nan() {
            self.disparity = 0.0;
        }
        self
    }
}

/// One playback slot.
#[derive(Debug, Default)]
pub struct Track {
    /// Shared samples of the bound sample (interleaved i16)
    pub(crate) data: Option<Arc<[i16]>>,
    /// Source channel count of `data`
    pub(crate) channels: usize,
    /// Length of `data` in frames
    pub(crate) length: usize,
    /// Read cursor in frames
    pub(crate) position: usize,
    pub(crate) params: TrackParams,
    pub(crate) looping: bool,
    pub(crate) state: PlayState,
    pub(crate) generation: u64,
}

impl Track {
    /// Playing or paused.
    pub fn is_playing(&self) -> bool {
        self.state != PlayState::Idle
    }

    /// Playing and not paused.
    pub fn is_audible(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn params(&self) -> TrackParams {
        self.params
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Sample of `channel` at `frame`; mono sources answer for both channels.
    #[inline]
    pub(crate) fn sample_at(data: &[i16], channels: usize, frame: usize, channel: usize) -> f32 {
        data[frame * channels + channel.min(channels - 1)] as f32
    }

    /// Frames the render callback must see pass the end before retiring a
    /// non-looping track, so the delayed channel can finish.
    pub(crate) fn tail_frames(&self, sample_rate: u32) -> usize {
        disparity_frames(self.params.disparity, sample_rate).saturating_mul(2)
    }

    pub(crate) fn retire(&mut self) {
        self.state = PlayState::Idle;
    }
}

/// Upper bound on a channel shift, keeps the render arithmetic in range.
pub(crate) const MAX_DISPARITY_FRAMES: usize = i32::MAX as usize;

/// Disparity converted to whole frames at `sample_rate`, capped at [`MAX_DISPARITY_FRAMES`].
#[inline]
pub(crate) fn disparity_frames(disparity: f32, sample_rate: u32) -> usize {
    ((disparity.abs() * sample_rate as f32) as usize).min(MAX_DISPARITY_FRAMES)
}

/// Fixed array of track slots.
#[derive(Debug)]
pub struct TrackPool {
    tracks: Box<[Track]>,
}

impl TrackPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            tracks: (0..capacity).map(|_| Track::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn get(&self, slot: usize) -> Option<&Track> {
        self.tracks.get(slot)
    }

    /// Lowest-index slot that is not playing.
    pub fn allocate_slot(&self) -> Option<usize> {
        self.tracks.iter().position(|track| !track.is_playing())
    }

    /// Binds `data` to `slot` and starts it from the beginning.
    ///
    /// The caller has already checked `slot` against the capacity. Returns
    /// the handle for the new occupancy and whatever buffer the slot held
    /// before, which must be dropped outside the lock.
    pub(crate) fn occupy(
        &mut self,
        slot: usize,
        data: Arc<[i16]>,
        channels: usize,
        params: TrackParams,
        looping: bool,
        generation: u64,
    ) -> (TrackHandle, Option<Arc<[i16]>>) {
        let track = &mut self.tracks[slot];
        let length = data.len() / channels.max(1);
        let previous = track.data.replace(data);
        track.channels = channels.max(1);
        track.length = length;
        track.position = 0;
        track.params = params.normalized();
        track.looping = looping;
        track.state = PlayState::Playing;
        track.generation = generation;
        (TrackHandle::pack(generation, slot), previous)
    }

    /// Slot range and generation match, regardless of state.
    fn current(&self, handle: TrackHandle) -> Option<&Track> {
        self.tracks
            .get(handle.slot())
            .filter(|track| track.generation == handle.generation())
    }

    /// Slot range and generation match and the slot is still playing.
    fn live_mut(&mut self, handle: TrackHandle) -> Option<&mut Track> {
        self.tracks
            .get_mut(handle.slot())
            .filter(|track| track.generation == handle.generation() && track.is_playing())
    }

    pub fn update(&mut self, handle: TrackHandle, paused: bool, params: TrackParams) -> bool {
        let Some(track) = self.live_mut(handle) else {
            return false;
        };
        track.state = if paused {
            PlayState::Paused
        } else {
            PlayState::Playing
        };
        track.params = params.normalized();
        true
    }

    pub fn stop(&mut self, handle: TrackHandle) -> bool {
        let Some(track) = self.live_mut(handle) else {
            return false;
        };
        track.retire();
        true
    }

    pub fn stop_all(&mut self) {
        for track in self.tracks.iter_mut() {
            track.retire();
        }
    }

    pub fn is_active(&self, handle: TrackHandle) -> bool {
        self.current(handle).is_some_and(Track::is_playing)
    }

    pub fn active_count(&self) -> usize {
        self.tracks.iter().filter(|track| track.is_playing()).count()
    }

    /// Stops every slot bound to `data` and moves their references into `released`.
    ///
    /// `released` should have room for the whole pool so this never allocates.
    pub(crate) fn detach(&mut self, data: &Arc<[i16]>, released: &mut Vec<Arc<[i16]>>) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut() {
            if track.data.as_ref().is_some_and(|d| Arc::ptr_eq(d, data)) {
                if track.is_playing() {
                    stopped += 1;
                }
                track.retire();
                if let Some(old) = track.data.take() {
                    released.push(old);
                }
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: &[i16]) -> Arc<[i16]> {
        samples.to_vec().into()
    }

    #[test]
    fn test_allocate_lowest_free_slot() {
        let mut pool = TrackPool::new(3);
        assert_eq!(pool.allocate_slot(), Some(0));
        pool.occupy(0, buffer(&[1, 2]), 1, TrackParams::default(), false, 1);
        pool.occupy(1, buffer(&[1, 2]), 1, TrackParams::default(), false, 2);
        assert_eq!(pool.allocate_slot(), Some(2));
        let (handle, _) = pool.occupy(2, buffer(&[1]), 1, TrackParams::default(), false, 3);
        assert_eq!(pool.allocate_slot(), None);
        assert!(pool.stop(TrackHandle::pack(1, 0)));
        assert_eq!(pool.allocate_slot(), Some(0));
        assert!(pool.is_active(handle));
    }

    #[test]
    fn test_occupy_resets_state() {
        let mut pool = TrackPool::new(1);
        let params = TrackParams::new(0.5, 0.25, 0.0, -2.0);
        let (handle, previous) = pool.occupy(0, buffer(&[1, 2, 3, 4]), 2, params, true, 9);
        assert!(previous.is_none());
        assert_eq!(handle.slot(), 0);
        assert_eq!(handle.generation(), 9);

        let track = pool.get(0).unwrap();
        assert_eq!(track.length(), 2);
        assert_eq!(track.position(), 0);
        assert_eq!(track.params().pitch, 2.0);
        assert!(track.is_looping());
        assert_eq!(track.state(), PlayState::Playing);
    }

    #[test]
    fn test_occupy_returns_replaced_buffer() {
        let mut pool = TrackPool::new(1);
        let first = buffer(&[1]);
        pool.occupy(0, first.clone(), 1, TrackParams::default(), false, 1);
        let (_, previous) = pool.occupy(0, buffer(&[2]), 1, TrackParams::default(), false, 2);
        assert!(Arc::ptr_eq(&previous.unwrap(), &first));
    }

    #[test]
    fn test_stale_generation_rejected() {
        let mut pool = TrackPool::new(1);
        let (old, _) = pool.occupy(0, buffer(&[1]), 1, TrackParams::default(), false, 1);
        let (new, _) = pool.occupy(0, buffer(&[1]), 1, TrackParams::default(), false, 2);

        assert!(!pool.is_active(old));
        assert!(!pool.update(old, true, TrackParams::default()));
        assert!(!pool.stop(old));
        assert!(pool.is_active(new));
        assert_eq!(pool.get(0).unwrap().state(), PlayState::Playing);
    }

    #[test]
    fn test_out_of_range_handle() {
        let mut pool = TrackPool::new(2);
        let handle = TrackHandle::pack(1, 5);
        assert!(!pool.is_active(handle));
        assert!(!pool.stop(handle));
        assert!(!pool.update(handle, false, TrackParams::default()));
    }

    #[test]
    fn test_pause_toggle() {
        let mut pool = TrackPool::new(1);
        let (handle, _) = pool.occupy(0, buffer(&[1]), 1, TrackParams::default(), false, 1);

        assert!(pool.update(handle, true, TrackParams::default().volume(0.1, 0.2)));
        let track = pool.get(0).unwrap();
        assert_eq!(track.state(), PlayState::Paused);
        assert_eq!(track.params().volume_right, 0.2);
        assert!(pool.is_active(handle));
        assert_eq!(pool.active_count(), 1);

        assert!(pool.update(handle, false, TrackParams::default()));
        assert_eq!(pool.get(0).unwrap().state(), PlayState::Playing);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut pool = TrackPool::new(1);
        let (handle, _) = pool.occupy(0, buffer(&[1]), 1, TrackParams::default(), false, 1);
        assert!(pool.stop(handle));
        assert!(!pool.stop(handle));
        assert!(!pool.is_active(handle));
        assert!(!pool.update(handle, false, TrackParams::default()));
    }

    #[test]
    fn test_stop_all() {
        let mut pool = TrackPool::new(3);
        for slot in 0..3 {
            pool.occupy(slot, buffer(&[1]), 1, TrackParams::default(), true, slot as u64 + 1);
        }
        assert_eq!(pool.active_count(), 3);
        pool.stop_all();
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_detach_releases_matching_buffers() {
        let mut pool = TrackPool::new(3);
        let shared = buffer(&[1, 2]);
        let other = buffer(&[3]);
        pool.occupy(0, shared.clone(), 1, TrackParams::default(), false, 1);
        pool.occupy(1, other.clone(), 1, TrackParams::default(), false, 2);
        let (h2, _) = pool.occupy(2, shared.clone(), 1, TrackParams::default(), true, 3);
        pool.stop(h2);

        let mut released = Vec::with_capacity(pool.capacity());
        let stopped = pool.detach(&shared, &mut released);

        assert_eq!(stopped, 1);
        assert_eq!(released.len(), 2);
        assert_eq!(pool.active_count(), 1);
        assert!(pool.get(0).unwrap().data.is_none());
        assert!(pool.get(2).unwrap().data.is_none());
        assert!(pool.get(1).unwrap().is_playing());
    }

    #[test]
    fn test_tail_frames() {
        let mut pool = TrackPool::new(1);
        let params = TrackParams::default().disparity(-0.25);
        pool.occupy(0, buffer(&[1]), 1, params, false, 1);
        assert_eq!(pool.get(0).unwrap().tail_frames(400), 200);
    }

    #[test]
    fn test_extreme_params_are_bounded() {
        let mut pool = TrackPool::new(2);
        let wide = TrackParams::default().disparity(f32::NEG_INFINITY).pitch(f32::INFINITY);
        pool.occupy(0, buffer(&[1]), 1, wide, false, 1);
        let track = pool.get(0).unwrap();
        assert_eq!(track.params().pitch, f32::MAX);
        assert_eq!(disparity_frames(f32::INFINITY, 48000), MAX_DISPARITY_FRAMES);
        assert_eq!(track.tail_frames(48000), MAX_DISPARITY_FRAMES * 2);

        let invalid = TrackParams::default().disparity(f32::NAN).pitch(f32::NAN);
        pool.occupy(1, buffer(&[1]), 1, invalid, false, 2);
        let track = pool.get(1).unwrap();
        assert_eq!(track.params().pitch, 1.0);
        assert_eq!(track.params().disparity, 0.0);
        assert!(track.params().is_direct());
    }
}
