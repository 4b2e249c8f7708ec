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

//! Remote session boundary.
//!
//! A [`Communicator`] joins a spatial-audio space with an access token,
//! attaches a synthetic audio track as the participant's input, and leaves.
//! [`crate::webtransport_client::WebTransportCommunicator`] talks to a real
//! server; [`LoopbackCommunicator`] keeps everything in memory for dry runs
//! and tests.

use crate::sink::{AudioData, SyntheticAudioSource};
use anyhow::anyhow;
use async_trait::async_trait;
use spatial_audio_types::SpatialParams;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait Communicator: Send {
    /// Joins the space, announcing the initial spatial parameters.
    async fn connect(&mut self, access_token: &str, spatial: &SpatialParams) -> anyhow::Result<()>;

    /// Attaches a synthetic audio track as this participant's outbound audio
    /// and returns the source frames should be pushed into.
    fn set_input_audio(&mut self) -> anyhow::Result<Arc<dyn SyntheticAudioSource>>;

    /// Leaves the space. Safe to call when not connected.
    async fn disconnect(&mut self) -> anyhow::Result<()>;
}

/// How a [`LoopbackCommunicator`] answers `connect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    #[default]
    Accept,
    Reject,
    /// Never completes, to exercise handshake timeouts.
    Hang,
}

#[derive(Debug)]
struct LoopbackState {
    behavior: ConnectBehavior,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    last_token: Mutex<Option<String>>,
    last_spatial: Mutex<Option<SpatialParams>>,
    source: Arc<LoopbackSource>,
}

/// In-memory communicator. Clones share state, so a clone kept by the caller
/// observes what the session did with the original.
#[derive(Debug, Clone)]
pub struct LoopbackCommunicator {
    state: Arc<LoopbackState>,
}

impl Default for LoopbackCommunicator {
    fn default() -> Self {
        Self::new(ConnectBehavior::Accept)
    }
}

impl LoopbackCommunicator {
    /// Number of frames kept for inspection; later frames are only counted.
    pub const CAPTURE_LIMIT: usize = 1_000;

    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            state: Arc::new(LoopbackState {
                behavior,
                connected: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
                disconnect_calls: AtomicUsize::new(0),
                last_token: Mutex::new(None),
                last_spatial: Mutex::new(None),
                source: Arc::new(LoopbackSource::default()),
            }),
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub fn last_token(&self) -> Option<String> {
        self.state.last_token.lock().ok().and_then(|t| t.clone())
    }

    pub fn last_spatial(&self) -> Option<SpatialParams> {
        self.state.last_spatial.lock().ok().and_then(|s| *s)
    }

    pub fn frames_received(&self) -> u64 {
        self.state.source.received.load(Ordering::SeqCst)
    }

    /// Copies of the first [`Self::CAPTURE_LIMIT`] frames received.
    pub fn captured_frames(&self) -> Vec<Vec<i16>> {
        self.state
            .source
            .captured
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Communicator for LoopbackCommunicator {
    async fn connect(&mut self, access_token: &str, spatial: &SpatialParams) -> anyhow::Result<()> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut token) = self.state.last_token.lock() {
            *token = Some(access_token.to_string());
        }
        if let Ok(mut last) = self.state.last_spatial.lock() {
            *last = Some(*spatial);
        }

        match self.state.behavior {
            ConnectBehavior::Accept => {
                self.state.connected.store(true, Ordering::SeqCst);
                info!("Loopback session joined at {:?}", spatial.position);
                Ok(())
            }
            ConnectBehavior::Reject => Err(anyhow!("loopback handshake rejected")),
            ConnectBehavior::Hang => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
        }
    }

    fn set_input_audio(&mut self) -> anyhow::Result<Arc<dyn SyntheticAudioSource>> {
        if !self.is_connected() {
            return Err(anyhow!("loopback session is not connected"));
        }
        Ok(self.state.source.clone())
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        debug!(
            "Loopback session left after {} frames",
            self.frames_received()
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LoopbackSource {
    received: AtomicU64,
    captured: Mutex<Vec<Vec<i16>>>,
}

impl SyntheticAudioSource for LoopbackSource {
    fn on_data(&self, data: AudioData<'_>) {
        self.received.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut captured) = self.captured.lock() {
            if captured.len() < LoopbackCommunicator::CAPTURE_LIMIT {
                captured.push(data.samples.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_audio_types::Position;

    #[tokio::test]
    async fn input_audio_requires_a_connection() {
        let mut loopback = LoopbackCommunicator::default();
        assert!(loopback.set_input_audio().is_err());

        loopback
            .connect("token", &SpatialParams::spatialized(Position::default(), 1.0))
            .await
            .unwrap();
        assert!(loopback.set_input_audio().is_ok());
    }

    #[tokio::test]
    async fn clones_observe_the_same_session() {
        let observer = LoopbackCommunicator::new(ConnectBehavior::Reject);
        let mut session = observer.clone();

        let spatial = SpatialParams::broadcast(Position::new(1.0, 2.0), 0.5);
        assert!(session.connect("abc", &spatial).await.is_err());

        assert_eq!(observer.connect_calls(), 1);
        assert_eq!(observer.last_token().as_deref(), Some("abc"));
        assert_eq!(observer.last_spatial(), Some(spatial));
        assert!(!observer.is_connected());
    }
}
