use anyhow::{Context, Result};
use promix::{AudioSample, LoadOptions, ProMixDesc, ProMixEngine, ProMixEvent, SampleId, TrackParams};
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    // promix-demo [path.wav] [--tracks N]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut wav_path = None;
    let mut max_tracks = 16;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--tracks" => {
                max_tracks = iter
                    .next()
                    .context("--tracks needs a value")?
                    .parse()
                    .context("--tracks must be a number")?;
            }
            path => wav_path = Some(path.to_string()),
        }
    }

    let desc = ProMixDesc::new().max_tracks(max_tracks);
    let engine = ProMixEngine::open(desc.clone()).context("Failed to open audio device")?;
    let mixer = engine.mixer().clone();
    let device = mixer.device_spec();
    log::info!(
        "Mixing {} tracks at {} Hz (full fidelity: {})",
        mixer.capacity(),
        device.sample_rate,
        device.is_full_fidelity()
    );

    let (sample, options) = match &wav_path {
        Some(path) => (AudioSample::from_wav_path(path)?, LoadOptions::default()),
        None => (
            sine_tone(440.0, 0.5, desc.sample_rate),
            LoadOptions::new().volume(0.5),
        ),
    };
    log::info!(
        "Loading {:.2}s of audio ({} Hz, {} channels)",
        sample.duration().as_secs_f32(),
        sample.sample_rate(),
        sample.channels()
    );
    let sound = mixer.load_sample(&sample, &options)?;

    run_demo(&mixer, sound)?;

    mixer.stop_all();
    mixer.destroy_sample(sound);
    log::info!(
        "Demo finished after {} frames",
        engine.frames_processed()
    );
    Ok(())
}

fn run_demo(mixer: &promix::Mixer, sound: SampleId) -> Result<()> {
    log::info!("Playing once");
    let once = mixer.play(sound, TrackParams::default())?;
    wait_for(mixer, Duration::from_secs(1));
    log::info!("First playback still active: {}", mixer.is_active(once));

    log::info!("Looping, sweeping pitch");
    let looped = mixer.play_looped(sound, TrackParams::default())?;
    for step in 0..8 {
        let pitch = 0.5 + step as f32 * 0.25;
        mixer.set_state(looped, false, TrackParams::default().pitch(pitch));
        wait_for(mixer, Duration::from_millis(400));
    }

    log::info!("Moving the sound from left to right");
    for step in 0..=10 {
        let disparity = -0.0006 + step as f32 * 0.00012;
        mixer.set_state(looped, false, TrackParams::default().disparity(disparity));
        wait_for(mixer, Duration::from_millis(300));
    }

    log::info!("Pausing");
    mixer.set_state(looped, true, TrackParams::default());
    wait_for(mixer, Duration::from_secs(1));

    log::info!("Chord on pinned slots");
    let capacity = mixer.capacity();
    for (i, pitch) in [1.0f32, 1.25, 1.5].into_iter().enumerate() {
        if i + 1 < capacity {
            mixer.play_looped_on(i + 1, sound, TrackParams::default().volume(0.4, 0.4).pitch(pitch))?;
        }
    }
    wait_for(mixer, Duration::from_secs(2));
    log::info!("Active tracks: {}", mixer.active_count());

    mixer.stop(looped);
    Ok(())
}

/// Sleeps for `duration`, logging render events as they come in.
fn wait_for(mixer: &promix::Mixer, duration: Duration) {
    thread::sleep(duration);
    for event in mixer.poll_events() {
        match event {
            ProMixEvent::TrackFinished { handle } => log::info!("{} finished", handle),
            ProMixEvent::RenderSkipped { frames } => log::debug!("Skipped {} frames", frames),
        }
    }
}

fn sine_tone(frequency: f32, seconds: f32, sample_rate: u32) -> AudioSample {
    let frames = (seconds * sample_rate as f32) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect();
    AudioSample::from_f32(&samples, sample_rate, 1)
}
