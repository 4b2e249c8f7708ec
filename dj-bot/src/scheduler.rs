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

//! Frame scheduler.
//!
//! Every tick pulls the next contiguous slice of the asset into a reused
//! [`OutboundFrame`] and pushes it through the [`MediaSink`]. The asset loops
//! forever; reads past its end produce silence and the cursor returns to the
//! first frame once it reaches the end.
//!
//! Frames per tick are `floor(sample_rate * period)`, fixed for the whole
//! session. A fractional rate (22050 Hz at 10 ms gives 220.5) therefore
//! consumes slightly less audio than wall-clock time; the shortfall is logged
//! once at start rather than corrected tick by tick.

use crate::audio::AudioAsset;
use crate::sink::MediaSink;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

/// Sample frames delivered per tick, rounded down. Never less than one.
pub fn samples_per_tick(sample_rate: u32, period: Duration) -> usize {
    let exact = sample_rate as u128 * period.as_micros() / 1_000_000;
    (exact as usize).max(1)
}

fn is_fractional(sample_rate: u32, period: Duration) -> bool {
    (sample_rate as u128 * period.as_micros()) % 1_000_000 != 0
}

/// Position, in sample frames, into an [`AudioAsset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    position: usize,
    length: usize,
}

impl StreamCursor {
    pub fn new(length: usize) -> Self {
        Self {
            position: 0,
            length,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves forward, wrapping to zero once the end is reached.
    pub fn advance(&mut self, frames: usize) {
        self.position = self.position.saturating_add(frames);
        if self.position >= self.length {
            self.position = 0;
        }
    }
}

/// Exactly one tick worth of interleaved audio, overwritten every tick.
#[derive(Debug)]
pub struct OutboundFrame {
    samples: Vec<i16>,
    channels: usize,
    frames: usize,
}

impl OutboundFrame {
    pub fn new(channels: u16, frames: usize) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            samples: vec![0; channels * frames],
            channels,
            frames,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Copies the slice starting at `cursor`, padding with silence past the
    /// end of the asset.
    pub fn fill(&mut self, asset: &AudioAsset, cursor: &StreamCursor) {
        let channels = self.channels;
        for frame in 0..self.frames {
            let source = (cursor.position() + frame) * channels;
            let target = frame * channels;
            for channel in 0..channels {
                self.samples[target + channel] = asset.sample(source + channel);
            }
        }
    }
}

/// The per-session tick body: asset, cursor, frame and sink.
pub struct FramePump {
    asset: Arc<AudioAsset>,
    cursor: StreamCursor,
    frame: OutboundFrame,
    sink: MediaSink,
}

impl FramePump {
    pub fn new(asset: Arc<AudioAsset>, sink: MediaSink, period: Duration) -> Self {
        let frames = samples_per_tick(asset.sample_rate(), period);
        if is_fractional(asset.sample_rate(), period) {
            warn!(
                "{} Hz does not divide evenly into {:?} ticks; sending {} frames per tick",
                asset.sample_rate(),
                period,
                frames
            );
        }
        Self {
            cursor: StreamCursor::new(asset.len()),
            frame: OutboundFrame::new(asset.channels(), frames),
            asset,
            sink,
        }
    }

    pub fn frames_per_tick(&self) -> usize {
        self.frame.frames()
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    pub fn tick(&mut self) {
        self.frame.fill(&self.asset, &self.cursor);
        self.sink.push(&self.frame);
        self.cursor.advance(self.frame.frames());
    }
}

/// Drives a [`FramePump`] on a fixed period until stopped.
///
/// Ticks are scheduled against absolute deadlines (`start + n * period`), so
/// a late tick does not push back the ones after it.
pub struct FrameScheduler {
    quit: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FrameScheduler {
    /// Spawns the tick loop on the current tokio runtime.
    pub fn start(mut pump: FramePump, period: Duration) -> Self {
        let quit = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let quit_clone = quit.clone();
        let ticks_clone = ticks.clone();

        info!(
            "Frame scheduler started ({:?} period, {} frames per tick)",
            period,
            pump.frames_per_tick()
        );

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                interval.tick().await;
                if quit_clone.load(Ordering::Acquire) {
                    break;
                }
                pump.tick();
                let n = ticks_clone.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("tick {} cursor {}", n, pump.cursor().position());
            }
            debug!("Frame scheduler loop ended");
        });

        Self {
            quit,
            ticks,
            handle: Some(handle),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Halts the loop. Once this returns no further tick runs. Calling it
    /// again is a no-op.
    pub async fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            info!(
                "Frame scheduler stopped after {} ticks",
                self.tick_count()
            );
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{AudioData, SyntheticAudioSource};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSource {
        frames: Mutex<Vec<Vec<i16>>>,
    }

    impl SyntheticAudioSource for CapturingSource {
        fn on_data(&self, data: AudioData<'_>) {
            assert_eq!(data.samples.len(), data.number_of_frames * data.channel_count as usize);
            self.frames.lock().unwrap().push(data.samples.to_vec());
        }
    }

    fn pump_for(asset: AudioAsset) -> (FramePump, Arc<CapturingSource>) {
        let source = Arc::new(CapturingSource::default());
        let sink = MediaSink::new(source.clone(), asset.sample_rate(), asset.channels());
        (
            FramePump::new(Arc::new(asset), sink, DEFAULT_TICK_PERIOD),
            source,
        )
    }

    #[test]
    fn frames_per_tick_for_common_rates() {
        assert_eq!(samples_per_tick(48_000, DEFAULT_TICK_PERIOD), 480);
        assert_eq!(samples_per_tick(44_100, DEFAULT_TICK_PERIOD), 441);
        assert_eq!(samples_per_tick(16_000, DEFAULT_TICK_PERIOD), 160);
        assert_eq!(samples_per_tick(48_000, Duration::from_millis(20)), 960);
    }

    #[test]
    fn fractional_rates_round_down() {
        assert_eq!(samples_per_tick(22_050, DEFAULT_TICK_PERIOD), 220);
        assert_eq!(samples_per_tick(11_025, DEFAULT_TICK_PERIOD), 110);
        assert!(is_fractional(22_050, DEFAULT_TICK_PERIOD));
        assert!(!is_fractional(44_100, DEFAULT_TICK_PERIOD));
    }

    #[test]
    fn tiny_rates_still_advance() {
        assert_eq!(samples_per_tick(50, DEFAULT_TICK_PERIOD), 1);
    }

    #[test]
    fn frame_size_is_constant_across_a_fractional_session() {
        let (mut pump, source) = pump_for(AudioAsset::from_pcm16(22_050, 1, vec![1; 22_050]));
        for _ in 0..250 {
            pump.tick();
        }
        let frames = source.frames.lock().unwrap();
        assert_eq!(frames.len(), 250);
        assert!(frames.iter().all(|f| f.len() == 220));
    }

    #[test]
    fn cursor_wraps_at_exact_length() {
        let mut cursor = StreamCursor::new(960);
        cursor.advance(480);
        assert_eq!(cursor.position(), 480);
        cursor.advance(480);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn cursor_wraps_when_overshooting() {
        let mut cursor = StreamCursor::new(1_000);
        cursor.advance(960);
        cursor.advance(480);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn one_second_constant_asset_loops_after_100_ticks() {
        let (mut pump, source) = pump_for(AudioAsset::from_pcm16(48_000, 1, vec![42; 48_000]));

        for _ in 0..100 {
            pump.tick();
        }
        assert_eq!(pump.cursor().position(), 0);

        pump.tick();

        let frames = source.frames.lock().unwrap();
        assert_eq!(frames.len(), 101);
        for frame in frames.iter() {
            assert_eq!(frame.len(), 480);
            assert!(frame.iter().all(|s| *s == 42));
        }
    }

    #[test]
    fn partial_final_tick_is_padded_then_restarts_at_zero() {
        let ramp: Vec<i16> = (0..1_000).map(|i| i as i16).collect();
        let (mut pump, source) = pump_for(AudioAsset::from_pcm16(48_000, 1, ramp));

        for _ in 0..4 {
            pump.tick();
        }

        let frames = source.frames.lock().unwrap();
        let crossing = &frames[2];
        assert_eq!(crossing[0], 960);
        assert_eq!(crossing[39], 999);
        assert!(crossing[40..].iter().all(|s| *s == 0));

        let wrapped = &frames[3];
        assert_eq!(wrapped[0], 0);
        assert_eq!(wrapped[479], 479);
    }

    #[test]
    fn stereo_frames_stay_interleaved() {
        let samples: Vec<i16> = (0..960).flat_map(|i| [i as i16, -(i as i16)]).collect();
        let (mut pump, source) = pump_for(AudioAsset::from_pcm16(48_000, 2, samples));

        pump.tick();
        pump.tick();

        let frames = source.frames.lock().unwrap();
        assert_eq!(frames[0].len(), 960);
        assert_eq!(&frames[0][..4], &[0, 0, 1, -1]);
        assert_eq!(&frames[1][..2], &[480, -480]);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_ticks_once_per_period() {
        let (pump, source) = pump_for(AudioAsset::from_pcm16(48_000, 1, vec![42; 48_000]));
        let mut scheduler = FrameScheduler::start(pump, DEFAULT_TICK_PERIOD);

        time::sleep(Duration::from_millis(995)).await;
        assert_eq!(scheduler.tick_count(), 100);

        scheduler.stop().await;
        assert_eq!(source.frames.lock().unwrap().len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_final() {
        let (pump, source) = pump_for(AudioAsset::from_pcm16(48_000, 1, vec![1; 4_800]));
        let mut scheduler = FrameScheduler::start(pump, DEFAULT_TICK_PERIOD);

        time::sleep(Duration::from_millis(55)).await;
        scheduler.stop().await;
        let after_stop = scheduler.tick_count();
        assert!(!scheduler.is_running());

        scheduler.stop().await;
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(scheduler.tick_count(), after_stop);
        assert_eq!(source.frames.lock().unwrap().len() as u64, after_stop);
    }
}
