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
 */

//! Packets exchanged with the spatial-audio service.
//!
//! Every packet starts with a one-byte [`PacketType`] tag. Control packets
//! (`Join`, `Heartbeat`, `Leave`) carry a JSON body. `Audio` packets carry a
//! fixed little-endian header followed by interleaved signed 16-bit PCM:
//!
//! ```text
//! | tag | sequence u64 | sample_rate u32 | bits u8 | channels u8 | frames u32 | samples i16... |
//! ```

use crate::spatial::SpatialParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the audio header, tag included.
pub const AUDIO_HEADER_LEN: usize = 1 + 8 + 4 + 1 + 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Join = 1,
    Audio = 2,
    Heartbeat = 3,
    Leave = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Join),
            2 => Ok(PacketType::Audio),
            3 => Ok(PacketType::Heartbeat),
            4 => Ok(PacketType::Leave),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("audio packet declares {declared} samples but carries {actual}")]
    SampleCountMismatch { declared: usize, actual: usize },
    #[error("malformed packet body: {0}")]
    Json(#[from] serde_json::Error),
}

/// First packet sent on a fresh session: who we are and where we stand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPacket {
    pub user_id: String,
    pub space_id: String,
    pub spatial: SpatialParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPacket {
    pub user_id: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeavePacket {
    pub user_id: String,
}

/// One frame batch of outbound PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub sequence: u64,
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channel_count: u8,
    pub number_of_frames: u32,
    pub samples: Vec<i16>,
}

impl AudioPacket {
    /// Encodes a borrowed frame without building an intermediate packet.
    pub fn encode_frame(
        sequence: u64,
        sample_rate: u32,
        bits_per_sample: u8,
        channel_count: u8,
        number_of_frames: u32,
        samples: &[i16],
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(AUDIO_HEADER_LEN + samples.len() * 2);
        buf.push(PacketType::Audio as u8);
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.push(bits_per_sample);
        buf.push(channel_count);
        buf.extend_from_slice(&number_of_frames.to_le_bytes());
        for sample in samples {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        Self::encode_frame(
            self.sequence,
            self.sample_rate,
            self.bits_per_sample,
            self.channel_count,
            self.number_of_frames,
            &self.samples,
        )
    }

    fn decode_body(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < AUDIO_HEADER_LEN {
            return Err(PacketError::Truncated {
                expected: AUDIO_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let sequence = u64::from_le_bytes(read_array(&bytes[1..9]));
        let sample_rate = u32::from_le_bytes(read_array(&bytes[9..13]));
        let bits_per_sample = bytes[13];
        let channel_count = bytes[14];
        let number_of_frames = u32::from_le_bytes(read_array(&bytes[15..19]));

        let body = &bytes[AUDIO_HEADER_LEN..];
        if body.len() % 2 != 0 {
            return Err(PacketError::Truncated {
                expected: body.len() + 1,
                actual: body.len(),
            });
        }
        let samples: Vec<i16> = body
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        let declared = number_of_frames as usize * channel_count as usize;
        if declared != samples.len() {
            return Err(PacketError::SampleCountMismatch {
                declared,
                actual: samples.len(),
            });
        }

        Ok(Self {
            sequence,
            sample_rate,
            bits_per_sample,
            channel_count,
            number_of_frames,
            samples,
        })
    }
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Join(JoinPacket),
    Audio(AudioPacket),
    Heartbeat(HeartbeatPacket),
    Leave(LeavePacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Join(_) => PacketType::Join,
            Packet::Audio(_) => PacketType::Audio,
            Packet::Heartbeat(_) => PacketType::Heartbeat,
            Packet::Leave(_) => PacketType::Leave,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let body = match self {
            Packet::Audio(audio) => return Ok(audio.encode()),
            Packet::Join(join) => serde_json::to_vec(join)?,
            Packet::Heartbeat(heartbeat) => serde_json::to_vec(heartbeat)?,
            Packet::Leave(leave) => serde_json::to_vec(leave)?,
        };
        let mut buf = Vec::with_capacity(body.len() + 1);
        buf.push(self.packet_type() as u8);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let tag = *bytes.first().ok_or(PacketError::Empty)?;
        match PacketType::try_from(tag)? {
            PacketType::Audio => AudioPacket::decode_body(bytes).map(Packet::Audio),
            PacketType::Join => Ok(Packet::Join(serde_json::from_slice(&bytes[1..])?)),
            PacketType::Heartbeat => Ok(Packet::Heartbeat(serde_json::from_slice(&bytes[1..])?)),
            PacketType::Leave => Ok(Packet::Leave(serde_json::from_slice(&bytes[1..])?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Position;

    #[test]
    fn audio_header_layout() {
        let bytes = AudioPacket::encode_frame(7, 48_000, 16, 2, 1, &[1, -1]);
        assert_eq!(bytes.len(), AUDIO_HEADER_LEN + 4);
        assert_eq!(bytes[0], PacketType::Audio as u8);
        assert_eq!(&bytes[1..9], &7u64.to_le_bytes());
        assert_eq!(&bytes[9..13], &48_000u32.to_le_bytes());
        assert_eq!(bytes[13], 16);
        assert_eq!(bytes[14], 2);
        assert_eq!(&bytes[15..19], &1u32.to_le_bytes());
        assert_eq!(&bytes[19..21], &1i16.to_le_bytes());
        assert_eq!(&bytes[21..23], &(-1i16).to_le_bytes());
    }

    #[test]
    fn join_packet_survives_the_wire() {
        let packet = Packet::Join(JoinPacket {
            user_id: "dj".to_string(),
            space_id: "space-1".to_string(),
            spatial: SpatialParams::broadcast(Position::new(3.0, 4.0), 1.0),
        });
        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(matches!(
            Packet::decode(&[42, 0, 0]),
            Err(PacketError::UnknownType(42))
        ));
    }

    #[test]
    fn decode_rejects_empty_input() {
        assert!(matches!(Packet::decode(&[]), Err(PacketError::Empty)));
    }

    #[test]
    fn decode_rejects_truncated_audio_header() {
        let bytes = AudioPacket::encode_frame(0, 48_000, 16, 1, 4, &[0, 0, 0, 0]);
        assert!(matches!(
            Packet::decode(&bytes[..10]),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_rejects_frame_count_mismatch() {
        let bytes = AudioPacket::encode_frame(0, 48_000, 16, 2, 4, &[0, 0, 0, 0]);
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::SampleCountMismatch {
                declared: 8,
                actual: 4
            })
        ));
    }
}
