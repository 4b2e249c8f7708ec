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

//! Session controller.
//!
//! Owns one streaming session end to end: validate and decode the audio,
//! join the space, attach the outbound track, run the frame scheduler, and
//! tear it all down again.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Streaming -> Disconnected
//! ```

use crate::audio::{load_audio_asset, AudioAsset};
use crate::communicator::Communicator;
use crate::error::{DjBotError, Result};
use crate::scheduler::{FramePump, FrameScheduler, DEFAULT_TICK_PERIOD};
use crate::sink::MediaSink;
use spatial_audio_types::{Position, SpatialParams};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

/// Timing knobs shared by every session a process runs.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub tick_period: Duration,
    pub connect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Parameters of a single `start` call.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub audio_path: PathBuf,
    pub position: Position,
    pub gain: f64,
    pub access_token: Option<String>,
    pub is_broadcast: bool,
}

/// Immutable per-session parameters, fixed at start.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub position: Position,
    pub gain: f64,
    pub is_broadcast: bool,
    pub access_token: String,
}

impl SessionConfig {
    pub fn new(position: Position, gain: f64, is_broadcast: bool, access_token: String) -> Self {
        Self {
            position,
            gain,
            is_broadcast,
            access_token,
        }
    }

    /// Broadcast sessions override attenuation and rolloff so the source is
    /// heard uniformly across the space.
    pub fn spatial_params(&self) -> SpatialParams {
        if self.is_broadcast {
            SpatialParams::broadcast(self.position, self.gain)
        } else {
            SpatialParams::spatialized(self.position, self.gain)
        }
    }
}

pub struct SessionController {
    user_id: String,
    communicator: Box<dyn Communicator>,
    settings: SessionSettings,
    state: SessionState,
    config: Option<SessionConfig>,
    scheduler: Option<FrameScheduler>,
}

impl SessionController {
    pub fn new(
        user_id: String,
        communicator: Box<dyn Communicator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            user_id,
            communicator,
            settings,
            state: SessionState::Disconnected,
            config: None,
            scheduler: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    /// Ticks delivered by the running scheduler, zero when idle.
    pub fn tick_count(&self) -> u64 {
        self.scheduler.as_ref().map_or(0, |s| s.tick_count())
    }

    /// Starts streaming. Token and audio problems are reported before any
    /// connection is attempted; a failed or timed out handshake leaves the
    /// session `Disconnected`. Starting a live session restarts it, but only
    /// once the new token and audio have been accepted.
    pub async fn start(&mut self, request: StartRequest) -> Result<()> {
        let access_token = request
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                DjBotError::TokenMissing(format!("no access token supplied for {}", self.user_id))
            })?;

        let asset = Self::load_asset(request.audio_path).await?;

        if self.state != SessionState::Disconnected {
            warn!("Restarting live session for {}", self.user_id);
            self.stop().await;
        }

        let config = SessionConfig::new(
            request.position,
            request.gain,
            request.is_broadcast,
            access_token,
        );
        let spatial = config.spatial_params();

        self.state = SessionState::Connecting;
        info!(
            "Session {} connecting (broadcast: {}, gain: {})",
            self.user_id, config.is_broadcast, config.gain
        );
        let handshake = tokio::time::timeout(
            self.settings.connect_timeout,
            self.communicator.connect(&config.access_token, &spatial),
        )
        .await;
        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Session {} handshake failed: {}", self.user_id, e);
                return Err(self.abort_connect(e.to_string()).await);
            }
            Err(_) => {
                let reason = format!(
                    "handshake timed out after {:?}",
                    self.settings.connect_timeout
                );
                error!("Session {} {}", self.user_id, reason);
                return Err(self.abort_connect(reason).await);
            }
        }
        self.state = SessionState::Connected;
        info!("Session {} connected", self.user_id);

        let source = match self.communicator.set_input_audio() {
            Ok(source) => source,
            Err(e) => {
                error!("Session {} could not attach audio: {}", self.user_id, e);
                return Err(self.abort_connect(e.to_string()).await);
            }
        };

        let sink = MediaSink::new(source, asset.sample_rate(), asset.channels());
        let pump = FramePump::new(asset, sink, self.settings.tick_period);
        self.scheduler = Some(FrameScheduler::start(pump, self.settings.tick_period));
        self.config = Some(config);
        self.state = SessionState::Streaming;
        info!("Session {} streaming", self.user_id);
        Ok(())
    }

    /// Stops streaming and leaves the space. Idle sessions ignore the call.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }

        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        if let Err(e) = self.communicator.disconnect().await {
            warn!("Session {} disconnect failed: {}", self.user_id, e);
        }
        self.config = None;
        self.state = SessionState::Disconnected;
        info!("Session {} disconnected", self.user_id);
    }

    async fn load_asset(path: PathBuf) -> Result<Arc<AudioAsset>> {
        let blocking_path = path.clone();
        let asset = tokio::task::spawn_blocking(move || load_audio_asset(&blocking_path))
            .await
            .map_err(|e| DjBotError::decode_failure(path, e))??;
        Ok(Arc::new(asset))
    }

    async fn abort_connect(&mut self, reason: String) -> DjBotError {
        if let Err(e) = self.communicator.disconnect().await {
            warn!("Session {} cleanup failed: {}", self.user_id, e);
        }
        self.state = SessionState::Disconnected;
        DjBotError::ConnectionFailed(reason)
    }
}
