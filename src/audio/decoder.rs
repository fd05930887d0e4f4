use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{downmix_interleaved, AudioDecoder, DecodedAudio};
use crate::error::ExtractError;

/// Decodes every container/codec symphonia ships with (wav, mp3, flac, ogg/vorbis, aac, m4a).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn open(&self, path: &Path, max_duration_secs: u32) -> Result<DecodedAudio, ExtractError> {
        let file = File::open(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| ExtractError::Unsupported(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(ExtractError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| ExtractError::Decode("unknown sample rate".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| ExtractError::Unsupported(e.to_string()))?;

        let max_frames = max_duration_secs as usize * sample_rate as usize;
        let mut mono: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        while mono.len() < max_frames {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(ExtractError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                // Corrupt packet: skip it and keep going
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(ExtractError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 {
                return Err(ExtractError::Decode("stream has no channels".to_string()));
            }

            let needed = decoded.capacity() * channels;
            if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                mono.extend(downmix_interleaved(buf.samples(), channels));
            }
        }

        mono.truncate(max_frames);
        if mono.is_empty() {
            return Err(ExtractError::EmptyAudio);
        }

        Ok(DecodedAudio {
            samples: mono,
            sample_rate,
        })
    }
}
