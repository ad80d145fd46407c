use crate::{
    audio_data::{AudioSample, SourceFormat},
    error::{ProMixError, Result},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decodes a PCM WAV file into interleaved signed 16-bit little-endian bytes.
///
/// Only the uncompressed WAV/PCM codecs are compiled in, so any other
/// container or codec fails at the probe or decoder stage.
pub(crate) fn load_wav(path: &str) -> Result<AudioSample> {
    let file = File::open(path)?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ProMixError::AudioLoading(format!("Failed to probe audio format: {:?}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| ProMixError::AudioLoading("No default audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ProMixError::AudioLoading("Sample rate not found".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| ProMixError::AudioLoading("Channel count not found".to_string()))?
        .count() as u16;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ProMixError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

    let mut bytes: Vec<u8> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break, // end-of-file
            Err(e) => {
                return Err(ProMixError::AudioLoading(format!(
                    "Error reading packet: {:?}",
                    e
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break,
            Err(Error::DecodeError(_)) => continue, // recoverable corruption
            Err(e) => {
                return Err(ProMixError::AudioLoading(format!(
                    "Error decoding packet: {:?}",
                    e
                )));
            }
        };

        let spec = *decoded.spec();
        let mut tmp = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        tmp.copy_interleaved_ref(decoded);
        bytes.extend(tmp.samples().iter().flat_map(|s| s.to_le_bytes()));
    }

    log::debug!(
        "Decoded {}: {} Hz, {} channels, {} bytes",
        path,
        sample_rate,
        channels,
        bytes.len()
    );

    Ok(AudioSample::new(
        bytes,
        SourceFormat::new(sample_rate, channels, 16),
    ))
}
