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

//! Outbound media sink.
//!
//! The sink hands one frame per tick to a synthetic audio source owned by
//! the transport. Nothing is buffered here; a slow source stalls the tick
//! that calls it, so sources must return quickly.

use crate::scheduler::OutboundFrame;
use spatial_audio_types::AudioPacket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{trace, warn};

/// Outbound PCM is always signed 16-bit.
pub const BITS_PER_SAMPLE: u8 = 16;

/// One frame batch as seen by a synthetic audio source.
#[derive(Debug, Clone, Copy)]
pub struct AudioData<'a> {
    pub samples: &'a [i16],
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channel_count: u16,
    pub number_of_frames: usize,
}

/// A transport-provided audio source that frames can be pushed into.
pub trait SyntheticAudioSource: Send + Sync {
    fn on_data(&self, data: AudioData<'_>);
}

/// Annotates outbound frames with their format and forwards them.
pub struct MediaSink {
    source: Arc<dyn SyntheticAudioSource>,
    sample_rate: u32,
    channel_count: u16,
}

impl MediaSink {
    pub fn new(source: Arc<dyn SyntheticAudioSource>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            source,
            sample_rate,
            channel_count,
        }
    }

    pub fn push(&self, frame: &OutboundFrame) {
        self.source.on_data(AudioData {
            samples: frame.samples(),
            sample_rate: self.sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            channel_count: self.channel_count,
            number_of_frames: frame.frames(),
        });
    }
}

/// Synthetic source that encodes frames as audio packets onto a bounded
/// channel. A full channel drops the frame instead of blocking the tick.
pub struct ChannelAudioSource {
    user_id: String,
    packet_sender: Sender<Vec<u8>>,
    sequence: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelAudioSource {
    pub fn new(user_id: String, packet_sender: Sender<Vec<u8>>) -> Self {
        Self {
            user_id,
            packet_sender,
            sequence: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SyntheticAudioSource for ChannelAudioSource {
    fn on_data(&self, data: AudioData<'_>) {
        let Ok(channel_count) = u8::try_from(data.channel_count) else {
            warn!(
                "Discarding frame for {}: {} channels do not fit an audio packet",
                self.user_id, data.channel_count
            );
            return;
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let packet = AudioPacket::encode_frame(
            sequence,
            data.sample_rate,
            data.bits_per_sample,
            channel_count,
            u32::try_from(data.number_of_frames).unwrap_or(u32::MAX),
            data.samples,
        );

        match self.packet_sender.try_send(packet) {
            Ok(()) => trace!("Queued audio frame {} for {}", sequence, self.user_id),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    warn!(
                        "Outbound audio queue full for {}, {} frames dropped so far",
                        self.user_id, dropped
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Audio channel closed for {}, frame discarded", self.user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_audio_types::{Packet, PacketType};
    use tokio::sync::mpsc;

    fn data(samples: &[i16]) -> AudioData<'_> {
        AudioData {
            samples,
            sample_rate: 48_000,
            bits_per_sample: BITS_PER_SAMPLE,
            channel_count: 1,
            number_of_frames: samples.len(),
        }
    }

    #[test]
    fn channel_source_encodes_sequenced_audio_packets() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = ChannelAudioSource::new("dj".to_string(), tx);

        source.on_data(data(&[1, 2, 3]));
        source.on_data(data(&[4, 5, 6]));

        for (expected_sequence, expected_samples) in [(0u64, vec![1, 2, 3]), (1, vec![4, 5, 6])] {
            let bytes = rx.try_recv().unwrap();
            assert_eq!(bytes[0], PacketType::Audio as u8);
            match Packet::decode(&bytes).unwrap() {
                Packet::Audio(audio) => {
                    assert_eq!(audio.sequence, expected_sequence);
                    assert_eq!(audio.sample_rate, 48_000);
                    assert_eq!(audio.bits_per_sample, 16);
                    assert_eq!(audio.number_of_frames, 3);
                    assert_eq!(audio.samples, expected_samples);
                }
                other => panic!("unexpected packet {other:?}"),
            }
        }
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let source = ChannelAudioSource::new("dj".to_string(), tx);

        source.on_data(data(&[0; 4]));
        source.on_data(data(&[0; 4]));
        source.on_data(data(&[0; 4]));

        assert_eq!(source.dropped_frames(), 2);
    }

    #[test]
    fn oversized_channel_count_is_never_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = ChannelAudioSource::new("dj".to_string(), tx);

        let samples = vec![0i16; 300];
        source.on_data(AudioData {
            channel_count: 300,
            number_of_frames: 1,
            ..data(&samples)
        });
        assert!(rx.try_recv().is_err());

        // The rejected frame does not consume a sequence number.
        source.on_data(data(&[9]));
        match Packet::decode(&rx.try_recv().unwrap()).unwrap() {
            Packet::Audio(audio) => assert_eq!(audio.sequence, 0),
            other => panic!("unexpected packet {other:?}"),
        }
    }
}
