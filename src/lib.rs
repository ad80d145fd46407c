//! Fixed-capacity software audio mixer.
//!
//! A [`Mixer`] owns a store of converted samples and a fixed pool of
//! playback tracks. Each `play` call returns a [`TrackHandle`] that stays
//! valid only for that playback, so stale handles are rejected after the
//! slot is reused. [`ProMixEngine`] drives the mixer from the default cpal
//! output device.
//!
//! ```no_run
//! use promix::{LoadOptions, ProMixDesc, ProMixEngine, TrackParams};
//!
//! # fn main() -> promix::error::Result<()> {
//! let engine = ProMixEngine::open(ProMixDesc::default())?;
//! let mixer = engine.mixer();
//!
//! let sample = mixer.load_sample_file("click.wav", &LoadOptions::default())?;
//! let handle = mixer.play_looped(sample, TrackParams::default().pitch(1.5))?;
//! mixer.set_state(handle, false, TrackParams::default().disparity(-0.0005));
//! mixer.stop(handle);
//! # Ok(())
//! # }
//! ```

pub mod audio_data;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod handle;
pub mod mixer;
pub mod playback;
mod sample_store;

pub use audio_data::{AudioSample, LoadOptions, SourceFormat};
pub use config::{DeviceSpec, ProMixDesc, RenderMode};
pub use control::Mixer;
pub use engine::ProMixEngine;
pub use error::ProMixError;
pub use events::ProMixEvent;
pub use handle::{MAX_TRACKS, SampleId, TrackHandle};
pub use playback::{PlayState, TrackParams};
