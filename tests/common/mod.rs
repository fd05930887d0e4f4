#![allow(dead_code)]

use audio_dedup::config::EngineConfig;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// A sequence of notes, each a fundamental plus two harmonics with a short
/// fade in and out.
pub fn melody(notes: &[f32], note_secs: f32, rate: u32) -> Vec<f32> {
    let per_note = (note_secs * rate as f32) as usize;
    let fade = (0.01 * rate as f32) as usize;
    let mut samples = Vec::with_capacity(per_note * notes.len());
    for &freq in notes {
        for i in 0..per_note {
            let t = i as f32 / rate as f32;
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if per_note - i < fade {
                (per_note - i) as f32 / fade as f32
            } else {
                1.0
            };
            let tone = (2.0 * PI * freq * t).sin()
                + 0.5 * (2.0 * PI * 2.0 * freq * t).sin()
                + 0.25 * (2.0 * PI * 3.0 * freq * t).sin();
            samples.push(0.4 * envelope * tone);
        }
    }
    samples
}

fn interleave(samples: &[f32], channels: u16) -> impl Iterator<Item = f32> + '_ {
    samples
        .iter()
        .flat_map(move |&s| std::iter::repeat(s).take(channels as usize))
}

pub fn write_wav_i16(path: &Path, samples: &[f32], rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for s in interleave(samples, channels) {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

pub fn write_wav_f32(path: &Path, samples: &[f32], rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for s in interleave(samples, channels) {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

/// Copies a committed encoded fixture (see tests/fixtures/make_fixtures.py)
/// into `dir`.
pub fn copy_fixture(name: &str, dir: &Path) -> PathBuf {
    let source = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let dest = dir.join(name);
    std::fs::copy(&source, &dest).unwrap();
    dest
}

/// Garbage bytes with an audio extension.
pub fn write_corrupt(path: &Path) {
    std::fs::write(path, vec![0x5Au8; 8192]).unwrap();
}

pub fn test_config(cache_path: PathBuf) -> EngineConfig {
    EngineConfig {
        workers: 4,
        cache_path,
        ..Default::default()
    }
}
