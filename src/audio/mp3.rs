//! MP3 decoding with symphonia.
//!
//! Output is mono f32 at the stream's own sample rate. Multi-channel audio is
//! averaged down. A truncated final frame ends decoding instead of failing,
//! so a prefix of a stream decodes to the audio it contains.

use crate::defaults;
use crate::error::{Result, TtsError};
use crate::playback::decoder::{BlobDecoder, DecodedAudio};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

fn decode_error(context: &str, err: impl std::fmt::Display) -> TtsError {
    TtsError::Decode {
        message: format!("{context}: {err}"),
    }
}

/// Decode `source`, handing each decoded packet to `on_samples` as mono
/// samples with their sample rate.
///
/// Returns the number of mono samples produced.
pub fn decode_source<F>(source: Box<dyn MediaSource>, mut on_samples: F) -> Result<usize>
where
    F: FnMut(&[f32], u32),
{
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    hint.with_extension(defaults::RESPONSE_FORMAT);
    hint.mime_type(defaults::AUDIO_MIME);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error("unrecognized audio stream", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track", "stream has no decodable track"))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error("unsupported codec", e))?;

    let mut produced = 0usize;
    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error("failed to read packet", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("skipping corrupt frame: {}", e);
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_error("failed to decode frame", e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        mono.clear();
        mono.extend(
            buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
        if !mono.is_empty() {
            produced += mono.len();
            on_samples(&mono, spec.rate);
        }
    }

    debug!(samples = produced, "mp3 decode finished");
    Ok(produced)
}

/// Decode a complete (or prefix of an) MP3 byte buffer.
pub fn decode_mp3(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut samples = Vec::new();
    let mut sample_rate = None;
    decode_source(Box::new(Cursor::new(bytes.to_vec())), |chunk, rate| {
        sample_rate.get_or_insert(rate);
        samples.extend_from_slice(chunk);
    })?;

    match sample_rate {
        Some(sample_rate) if !samples.is_empty() => Ok(DecodedAudio {
            samples,
            sample_rate,
        }),
        _ => Err(TtsError::Decode {
            message: "no audio frames".to_string(),
        }),
    }
}

/// Whole-blob decoder for the fallback playback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Decoder;

impl BlobDecoder for Mp3Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        decode_mp3(bytes)
    }
}
