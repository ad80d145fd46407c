//! Error types for ProMix

use crate::handle::SampleId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProMixError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("An audio engine is already open in this process")]
    AlreadyOpen,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Sample has zero length after conversion")]
    EmptySample,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Unknown sample: {0}")]
    UnknownSample(SampleId),

    #[error("Track slot {slot} out of range (pool size: {capacity})")]
    TrackOutOfRange { slot: usize, capacity: usize },

    #[error("No free track available")]
    NoFreeTrack,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ProMixError>;
