// Mixer module - renders one output block from the track pool.
// Runs on the audio callback: no allocation, no locking, no panics on bad offsets.

use crate::audio_data::to_i16;
use crate::handle::TrackHandle;
use crate::playback::{Track, TrackPool, disparity_frames};

/// Per-block constants of the device the block is rendered for.
#[derive(Debug, Clone, Copy)]
pub struct MixContext {
    /// Device sample rate, used to turn disparity seconds into frames
    pub sample_rate: u32,
    /// Global left gain
    pub volume_left: f32,
    /// Global right gain
    pub volume_right: f32,
}

/// Full-fidelity render into an interleaved stereo block.
///
/// Every audible track is summed in f32, the sum is clamped to the i16 range
/// once per output sample, then cursors advance and finished tracks retire.
/// `on_finished` is called once for each track that ran out this block.
///
/// Returns the number of frames written.
pub fn mix_stereo<F>(pool: &mut TrackPool, output: &mut [i16], ctx: &MixContext, on_finished: F) -> usize
where
    F: FnMut(TrackHandle),
{
    let frame_count = output.len() / 2;

    for (frame_idx, frame) in output.chunks_exact_mut(2).enumerate() {
        let mut left = 0.0f32;
        let mut right = 0.0f32;

        for track in pool.tracks() {
            if !track.is_audible() || track.length == 0 {
                continue;
            }
            let Some(data) = track.data.as_deref() else {
                continue;
            };

            let contribution = if track.params.is_direct() {
                direct_frame(track, data, frame_idx)
            } else {
                Some(interpolated_frame(track, data, frame_idx, ctx.sample_rate))
            };

            if let Some((l, r)) = contribution {
                left += l * ctx.volume_left * track.params.volume_left;
                right += r * ctx.volume_right * track.params.volume_right;
            }
        }

        frame[0] = to_i16(left);
        frame[1] = to_i16(right);
    }

    // odd trailing sample, if any
    for sample in output.iter_mut().skip(frame_count * 2) {
        *sample = 0;
    }

    advance_tracks(pool, frame_count, ctx.sample_rate, on_finished);
    frame_count
}

/// Exact read of frame `position + frame_idx`. `None` once a non-looping
/// track has run past its end.
#[inline]
fn direct_frame(track: &Track, data: &[i16], frame_idx: usize) -> Option<(f32, f32)> {
    let mut pos = track.position.saturating_add(frame_idx);
    if track.looping {
        pos %= track.length;
    } else if pos >= track.length {
        return None;
    }

    Some((
        Track::sample_at(data, track.channels, pos, 0),
        Track::sample_at(data, track.channels, pos, 1),
    ))
}

/// Resampled read with independent per-channel delay.
#[inline]
fn interpolated_frame(track: &Track, data: &[i16], frame_idx: usize, sample_rate: u32) -> (f32, f32) {
    let pos = track.position as f64 + frame_idx as f64 * track.params.pitch as f64;
    let base = pos.floor();
    let weight = (pos - base) as f32;
    let base = base as i64;

    let shift = disparity_frames(track.params.disparity, sample_rate) as i64;
    let (left_base, right_base) = if track.params.disparity < 0.0 {
        (base - shift, base)
    } else if track.params.disparity > 0.0 {
        (base, base - shift)
    } else {
        (base, base)
    };

    (
        interpolate(track, data, left_base, weight, 0),
        interpolate(track, data, right_base, weight, 1),
    )
}

/// Two-point linear interpolation between `frame` and the frame after it.
/// Silence when `frame` lies outside the buffer.
#[inline]
fn interpolate(track: &Track, data: &[i16], frame: i64, weight: f32, channel: usize) -> f32 {
    let length = track.length as i64;
    let frame = if track.looping {
        frame.rem_euclid(length)
    } else {
        frame
    };
    if frame < 0 || frame >= length {
        return 0.0;
    }

    let frame = frame as usize;
    let next = if frame + 1 < track.length {
        frame + 1
    } else if track.looping {
        0
    } else {
        frame
    };

    let a = Track::sample_at(data, track.channels, frame, channel);
    let b = Track::sample_at(data, track.channels, next, channel);
    a + (b - a) * weight
}

/// Moves every audible track forward by one block and retires the ones that ended.
fn advance_tracks<F>(pool: &mut TrackPool, frame_count: usize, sample_rate: u32, mut on_finished: F)
where
    F: FnMut(TrackHandle),
{
    for (slot, track) in pool.tracks_mut().iter_mut().enumerate() {
        if !track.is_audible() {
            continue;
        }

        let step = if track.params.pitch == 1.0 {
            frame_count
        } else {
            (frame_count as f32 * track.params.pitch) as usize
        };
        track.position = track.position.saturating_add(step);

        if track.looping {
            if track.length > 0 {
                track.position %= track.length;
            }
        } else if track.position >= track.length.saturating_add(track.tail_frames(sample_rate)) {
            track.retire();
            on_finished(TrackHandle::pack(track.generation, slot));
        }
    }
}

/// Degraded render for devices that refused i16 stereo.
///
/// Samples are already in the device's channel layout; each audible track is
/// added with saturation from its cursor onward. Volume, disparity, pitch
/// and looping are ignored and a track retires as soon as it is exhausted.
pub fn mix_saturating<F>(pool: &mut TrackPool, output: &mut [i16], mut on_finished: F) -> usize
where
    F: FnMut(TrackHandle),
{
    output.fill(0);

    for (slot, track) in pool.tracks_mut().iter_mut().enumerate() {
        if !track.is_audible() {
            continue;
        }
        let Some(data) = track.data.as_deref() else {
            continue;
        };

        let start = track.position.saturating_mul(track.channels).min(data.len());
        let remaining = &data[start..];
        let amount = remaining.len().min(output.len());
        for (out, sample) in output[..amount].iter_mut().zip(remaining) {
            *out = out.saturating_add(*sample);
        }

        track.position += amount / track.channels;
        if track.position >= track.length {
            track.retire();
            on_finished(TrackHandle::pack(track.generation, slot));
        }
    }

    output.len()
}
