//! End-to-end decode tests over generated WAV fixtures.
//!
//! These run the real pipeline (symphonia reader -> worker -> staging ->
//! buffer) without an audio device: the test drains the buffer the way an
//! output callback would.

use skim_common::PlayerConfig;
use skim_player::audio::decoder::SymphoniaReaderFactory;
use skim_player::audio::reader::ReaderRegistry;
use skim_player::playback::session::PlaybackSession;
use skim_player::playback::timeline::{self, FragmentedTimeline, TMSection};
use skim_player::playback::worker::MediaSource;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;

fn write_tone(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (seconds * SAMPLE_RATE as f64) as usize;
    for i in 0..frames {
        let t = i as f32 / SAMPLE_RATE as f32;
        let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
        writer.write_sample(sample).unwrap();
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

fn registry() -> Arc<ReaderRegistry> {
    let mut registry = ReaderRegistry::new();
    let factory = Arc::new(SymphoniaReaderFactory);
    for extension in SymphoniaReaderFactory::EXTENSIONS {
        registry.register(extension, factory.clone());
    }
    Arc::new(registry)
}

fn open(path: &Path, sections: Vec<TMSection>) -> PlaybackSession {
    PlaybackSession::open(
        MediaSource {
            path: path.to_path_buf(),
            stream_index: 0,
        },
        registry(),
        FragmentedTimeline::from_sections(sections),
        &PlayerConfig::default(),
    )
    .unwrap()
}

/// Drain the session's buffer until decoding finishes, like an output
/// callback would, and return everything read.
fn drain(session: &PlaybackSession) -> Vec<f32> {
    let buffer = session.buffer_handle();
    let mut collected = Vec::new();
    for _ in 0..1_000 {
        collected.extend(buffer.lock().unwrap().read(8_192));
        if session.decode_finished() && buffer.lock().unwrap().is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    collected
}

#[test]
fn edited_wav_decodes_to_virtual_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone(&path, 2.0);

    // Keep [0, 0.5) and [1.0, 1.5): one virtual second out of two.
    let mut session = open(
        &path,
        vec![
            TMSection::new(0.0, 0.5).unwrap(),
            TMSection::excluded(0.5, 1.0).unwrap(),
            TMSection::new(1.0, 1.5).unwrap(),
            TMSection::excluded(1.5, 2.0).unwrap(),
        ],
    );

    let samples = drain(&session);
    assert!(session.take_error().is_none());

    let frames = samples.len() / session.spec().channels as usize;
    let expected = SAMPLE_RATE as usize;
    assert!(
        frames.abs_diff(expected) <= 256,
        "expected ~{expected} frames of edited audio, got {frames}"
    );

    // Signal sanity: a real tone came through, nothing clipped.
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.3 && peak <= 1.01, "peak {peak}");

    session.stop();
}

#[test]
fn rate_section_halves_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone(&path, 1.0);

    let mut session = open(&path, vec![TMSection::with_rate(0.0, 1.0, 2.0).unwrap()]);

    let samples = drain(&session);
    assert!(session.take_error().is_none());

    let frames = samples.len() / session.spec().channels as usize;
    let expected = SAMPLE_RATE as usize / 2;
    assert!(
        frames.abs_diff(expected) <= 1_024,
        "expected ~{expected} frames at 2x, got {frames}"
    );

    session.stop();
}

#[test]
fn persisted_timeline_reconstructs_session() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("tone.wav");
    write_tone(&wav, 1.0);

    let json = dir.path().join("tone.timeline.json");
    std::fs::write(
        &json,
        r#"[
            {"source_begin": 0.0, "source_end": 0.25},
            {"source_begin": 0.25, "source_end": 1.0, "included": false}
        ]"#,
    )
    .unwrap();

    let sections = timeline::load_sections(&json).unwrap();
    let mut session = open(&wav, sections);
    assert!((session.virtual_duration() - 0.25).abs() < 1e-9);

    let samples = drain(&session);
    let frames = samples.len() / session.spec().channels as usize;
    assert!(
        frames.abs_diff(SAMPLE_RATE as usize / 4) <= 256,
        "got {frames} frames"
    );

    session.stop();
}
