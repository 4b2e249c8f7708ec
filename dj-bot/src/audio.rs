/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Audio decoding and normalization.
//!
//! A source file is decoded once, in full, into an [`AudioAsset`]: interleaved
//! signed 16-bit PCM regardless of the bit depth or integer/float encoding of
//! the file. WAV files go through `hound`, MP3 files through `symphonia`.

use crate::error::{DjBotError, Result};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Outbound packets carry the channel count in a single byte.
pub const MAX_CHANNELS: u16 = u8::MAX as u16;

/// Container formats the bot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// Numeric sample encoding found in the source file, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    SignedInt { bits: u16 },
    UnsignedInt { bits: u16 },
    Float { bits: u16 },
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::SignedInt { bits } => write!(f, "s{bits}"),
            SourceEncoding::UnsignedInt { bits } => write!(f, "u{bits}"),
            SourceEncoding::Float { bits } => write!(f, "f{bits}"),
        }
    }
}

/// A fully decoded, immutable buffer of interleaved 16-bit samples.
///
/// `samples().len() == len() * channels()` always holds.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
    source_encoding: SourceEncoding,
}

impl AudioAsset {
    /// Builds an asset from interleaved samples. A trailing partial frame is
    /// dropped; a channel count of zero is treated as mono.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        mut samples: Vec<i16>,
        source_encoding: SourceEncoding,
    ) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            sample_rate,
            channels,
            samples,
            source_encoding,
        }
    }

    /// Convenience for buffers that already are signed 16-bit PCM.
    pub fn from_pcm16(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self::new(
            sample_rate,
            channels,
            samples,
            SourceEncoding::SignedInt { bits: 16 },
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Length in sample frames.
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn source_encoding(&self) -> SourceEncoding {
        self.source_encoding
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    /// Sample at an interleaved index, or silence past the end of the buffer.
    #[inline]
    pub fn sample(&self, index: usize) -> i16 {
        self.samples.get(index).copied().unwrap_or(0)
    }
}

/// Checks that `path` is an existing regular file with a supported extension.
pub fn validate_audio_path(path: &Path) -> Result<AudioFormat> {
    let is_file = std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(DjBotError::InvalidPath(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "wav" => Ok(AudioFormat::Wav),
        "mp3" => Ok(AudioFormat::Mp3),
        _ => Err(DjBotError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension,
        }),
    }
}

/// Validates, decodes and normalizes an audio file into memory.
///
/// This blocks for the whole decode; callers on an async runtime should run
/// it through `spawn_blocking`.
pub fn load_audio_asset(path: &Path) -> Result<AudioAsset> {
    let format = validate_audio_path(path)?;
    info!("Loading {} file: {}", format.extension(), path.display());

    let asset = match format {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_compressed(path, format)?,
    };

    if asset.is_empty() {
        return Err(DjBotError::decode_failure(path, "file contains no audio frames"));
    }
    check_channel_count(path, asset.channels())?;

    info!(
        "Decoded {} -> {} Hz, {} ch, {} frames ({:.2} seconds), source encoding {}",
        path.display(),
        asset.sample_rate(),
        asset.channels(),
        asset.len(),
        asset.duration().as_secs_f64(),
        asset.source_encoding()
    );
    Ok(asset)
}

fn check_channel_count(path: &Path, channels: u16) -> Result<()> {
    if channels > MAX_CHANNELS {
        return Err(DjBotError::decode_failure(
            path,
            format!("{channels} channels exceeds the limit of {MAX_CHANNELS}"),
        ));
    }
    Ok(())
}

fn decode_wav(path: &Path) -> Result<AudioAsset> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| DjBotError::decode_failure(path, e))?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(DjBotError::decode_failure(
            path,
            format!(
                "invalid WAV spec: {} Hz, {} channels",
                spec.sample_rate, spec.channels
            ),
        ));
    }

    let (encoding, samples) = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let samples = reader
                .samples::<i32>()
                .map(|s| s.map(|value| int_to_i16(value, bits)))
                .collect::<std::result::Result<Vec<i16>, _>>();
            (SourceEncoding::SignedInt { bits }, samples)
        }
        hound::SampleFormat::Float => {
            let samples = reader
                .samples::<f32>()
                .map(|s| s.map(float_to_i16))
                .collect::<std::result::Result<Vec<i16>, _>>();
            (
                SourceEncoding::Float {
                    bits: spec.bits_per_sample,
                },
                samples,
            )
        }
    };
    let samples = samples.map_err(|e| DjBotError::decode_failure(path, e))?;

    Ok(AudioAsset::new(
        spec.sample_rate,
        spec.channels,
        samples,
        encoding,
    ))
}

fn decode_compressed(path: &Path, format: AudioFormat) -> Result<AudioAsset> {
    let file = File::open(path).map_err(|e| DjBotError::decode_failure(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DjBotError::decode_failure(path, format!("probe failed: {e}")))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .default_track()
        .ok_or_else(|| DjBotError::decode_failure(path, "no default audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DjBotError::decode_failure(path, format!("no decoder: {e}")))?;

    let mut encoding = None;
    let mut samples = Vec::<i16>::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DjBotError::decode_failure(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if encoding.is_none() {
                    encoding = Some(buffer_encoding(&decoded));
                }
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                channels = Some(spec.channels.count() as u16);

                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped, the rest of the stream still plays.
                warn!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(DjBotError::decode_failure(path, e)),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| DjBotError::decode_failure(path, "unknown sample rate"))?;
    let channels = channels
        .filter(|c| *c > 0)
        .ok_or_else(|| DjBotError::decode_failure(path, "unknown channel count"))?;
    let encoding = encoding.unwrap_or(SourceEncoding::Float { bits: 32 });
    debug!("{} decoded {} interleaved samples", path.display(), samples.len());

    Ok(AudioAsset::new(sample_rate, channels, samples, encoding))
}

fn buffer_encoding(buffer: &AudioBufferRef<'_>) -> SourceEncoding {
    match buffer {
        AudioBufferRef::U8(_) => SourceEncoding::UnsignedInt { bits: 8 },
        AudioBufferRef::U16(_) => SourceEncoding::UnsignedInt { bits: 16 },
        AudioBufferRef::U24(_) => SourceEncoding::UnsignedInt { bits: 24 },
        AudioBufferRef::U32(_) => SourceEncoding::UnsignedInt { bits: 32 },
        AudioBufferRef::S8(_) => SourceEncoding::SignedInt { bits: 8 },
        AudioBufferRef::S16(_) => SourceEncoding::SignedInt { bits: 16 },
        AudioBufferRef::S24(_) => SourceEncoding::SignedInt { bits: 24 },
        AudioBufferRef::S32(_) => SourceEncoding::SignedInt { bits: 32 },
        AudioBufferRef::F32(_) => SourceEncoding::Float { bits: 32 },
        AudioBufferRef::F64(_) => SourceEncoding::Float { bits: 64 },
    }
}

/// Rescales a signed integer sample of `bits` depth to 16 bits.
fn int_to_i16(value: i32, bits: u16) -> i16 {
    if bits <= 16 {
        (value << (16 - bits)) as i16
    } else {
        (value >> (bits - 16)) as i16
    }
}

fn float_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
