//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spot::voice::{
    AudioEffect, AudioSource, BackgroundSpotter, KeywordSpotter, ListenerParts, NoiseSuppressor,
    SAMPLE_RATE, frame_rms, samples_to_wav,
};

mod common;

use common::{FRAME, Tally, ScriptedSource, ScriptedSpotter, WAKE, frame};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * 32767.0) as i16
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<i16> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0; num_samples]
}

#[test]
fn test_frame_rms_levels() {
    assert_eq!(frame_rms(&generate_silence(0.1)), 0.0);

    let loud = frame_rms(&generate_sine_samples(440.0, 0.1, 0.5));
    let quiet = frame_rms(&generate_sine_samples(440.0, 0.1, 0.05));
    assert!(loud > quiet * 5.0);
    // RMS of a sine is amplitude / sqrt(2)
    assert!((loud - 0.5 / std::f32::consts::SQRT_2).abs() < 0.01);
}

#[test]
fn test_noise_suppressor_gates_background_hum() {
    let mut suppressor = NoiseSuppressor::new();
    let hum = generate_sine_samples(60.0, 1.0, 0.01);

    let mut last = Vec::new();
    for chunk in hum.chunks(512) {
        let mut frame = chunk.to_vec();
        suppressor.process(&mut frame);
        last = frame;
    }

    let original = frame_rms(&hum[hum.len() - last.len()..]);
    assert!(frame_rms(&last) < original * 0.5);
    assert!(suppressor.noise_floor().is_some());
}

#[test]
fn test_noise_suppressor_keeps_speech_level() {
    let mut suppressor = NoiseSuppressor::new();
    for chunk in generate_sine_samples(60.0, 0.5, 0.01).chunks(512) {
        suppressor.process(&mut chunk.to_vec());
    }

    let speech = generate_sine_samples(300.0, 0.032, 0.5);
    let mut frame = speech.clone();
    suppressor.process(&mut frame);
    assert_eq!(frame, speech);
}

#[test]
fn test_samples_to_wav_round_trip_header() {
    let samples = generate_sine_samples(440.0, 0.25, 0.3);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    assert_eq!(&wav[..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_samples_to_wav_empty() {
    let wav = samples_to_wav(&[], SAMPLE_RATE).unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    assert_eq!(reader.len(), 0);
}

#[test]
fn test_background_spotter_reports_detection() {
    let tally = Arc::new(Tally::default());
    let listener_tally = Arc::clone(&tally);
    let mut spotter = BackgroundSpotter::spawn(FRAME, move || -> spot::Result<ListenerParts> {
        let source: Box<dyn AudioSource> = Box::new(ScriptedSource::new(
            vec![frame(0), frame(WAKE), frame(0)],
            Arc::clone(&listener_tally),
        ));
        let engine: Box<dyn KeywordSpotter> = Box::new(ScriptedSpotter {
            tally: listener_tally,
        });
        Ok((source, engine))
    })
    .unwrap();

    assert_eq!(spotter.frame_length(), FRAME);

    // The pipeline frame is ignored; detections come from the listener
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut detected = None;
    while detected.is_none() && Instant::now() < deadline {
        detected = spotter.try_process(&frame(0)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(detected, Some(0));

    spotter.release().unwrap();
    assert_eq!(tally.released(), vec!["spotter", "source"]);

    // Releasing twice is harmless
    spotter.release().unwrap();
    assert_eq!(tally.released().len(), 2);
}

#[test]
fn test_background_spotter_startup_failure() {
    let result = BackgroundSpotter::spawn(FRAME, || -> spot::Result<ListenerParts> {
        Err(spot::Error::ResourceInit("no keyword file".to_string()))
    });

    let Err(err) = result else {
        panic!("listener should not start");
    };
    assert!(err.to_string().contains("no keyword file"));
}

#[test]
fn test_scripted_source_requires_open() {
    let tally = Arc::new(Tally::default());
    let mut source = ScriptedSource::new(vec![frame(WAKE)], Arc::clone(&tally));
    let mut buf = [0i16; FRAME];

    assert!(source.read_frame(&mut buf).is_err());
    source.open().unwrap();
    assert_eq!(source.read_frame(&mut buf), Ok(FRAME));
    assert_eq!(buf[0], WAKE);
    source.close().unwrap();
    assert!(!source.is_open());
}
