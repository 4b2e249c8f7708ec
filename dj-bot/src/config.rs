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

use serde::{Deserialize, Serialize};
use spatial_audio_types::Position;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::session::{SessionSettings, StartRequest};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DjBotConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    pub insecure: Option<bool>, // Skip certificate verification
    /// Stream into an in-memory loopback instead of a server.
    #[serde(default)]
    pub dry_run: bool,
    pub connect_timeout_ms: Option<u64>,
    pub tick_period_ms: Option<u64>,
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
    pub ramp_up_delay_ms: Option<u64>,
    pub token_secret: Option<String>,
    pub token_ttl_secs: Option<i64>,
    pub sessions: Vec<DjSessionConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DjSessionConfig {
    pub user_id: String,
    pub space_id: String,
    #[serde(default)]
    pub space_name: String,
    /// A bare file name or a full storage link to it.
    pub audio_file_name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default)]
    pub is_broadcast: bool,
    pub access_token: Option<String>,
}

fn default_server_url() -> String {
    "https://localhost:4433".to_string()
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_gain() -> f64 {
    1.0
}

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl DjBotConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: DjBotConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_default() -> anyhow::Result<Self> {
        // Try to load from config file first
        if let Ok(config_path) = std::env::var("DJ_BOT_CONFIG_PATH") {
            return Self::from_file(&config_path);
        }

        let n_sessions = env_or("N_SESSIONS", 1usize);
        let default_space = std::env::var("SPACE_ID").unwrap_or_else(|_| "test-space".to_string());

        let mut sessions = Vec::new();
        for i in 0..n_sessions {
            let key = |field: &str| format!("SESSION_{i}_{field}");
            sessions.push(DjSessionConfig {
                user_id: std::env::var(key("USER_ID")).unwrap_or_else(|_| format!("dj{i:03}")),
                space_id: std::env::var(key("SPACE_ID")).unwrap_or_else(|_| default_space.clone()),
                space_name: std::env::var(key("SPACE_NAME")).unwrap_or_default(),
                audio_file_name: std::env::var(key("AUDIO_FILE"))
                    .unwrap_or_else(|_| "dj.mp3".to_string()),
                position: Position::new(env_or(&key("X"), 0.0), env_or(&key("Y"), 0.0)),
                gain: env_or(&key("GAIN"), default_gain()),
                is_broadcast: env_or(&key("BROADCAST"), false),
                access_token: std::env::var(key("ACCESS_TOKEN")).ok(),
            });
        }

        let config = DjBotConfig {
            server_url: std::env::var("SERVER_URL").unwrap_or_else(|_| default_server_url()),
            insecure: Some(env_or("INSECURE", false)),
            dry_run: env_or("DRY_RUN", false),
            connect_timeout_ms: env_opt("CONNECT_TIMEOUT_MS"),
            tick_period_ms: env_opt("TICK_PERIOD_MS"),
            audio_dir: std::env::var("AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_audio_dir()),
            ramp_up_delay_ms: Some(env_or("RAMP_UP_DELAY_MS", 1000)),
            token_secret: std::env::var("TOKEN_SECRET").ok().filter(|s| !s.is_empty()),
            token_ttl_secs: env_opt("TOKEN_TTL_SECS"),
            sessions,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.tick_period_ms == Some(0) {
            return Err(anyhow::anyhow!("tick_period_ms must be greater than zero"));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("connect_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn server_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.server_url).map_err(|e| anyhow::anyhow!("Invalid server URL: {e:?}"))
    }

    pub fn session_settings(&self) -> SessionSettings {
        let defaults = SessionSettings::default();
        SessionSettings {
            tick_period: self
                .tick_period_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_period),
            connect_timeout: self
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
        }
    }

    pub fn ramp_up_delay(&self) -> Duration {
        Duration::from_millis(self.ramp_up_delay_ms.unwrap_or(0))
    }

    pub fn token_ttl_secs(&self) -> i64 {
        self.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS)
    }
}

impl DjSessionConfig {
    pub fn start_request(&self, audio_dir: &Path, access_token: String) -> StartRequest {
        StartRequest {
            audio_path: resolve_audio_path(audio_dir, &self.audio_file_name),
            position: self.position,
            gain: self.gain,
            access_token: Some(access_token),
            is_broadcast: self.is_broadcast,
        }
    }
}

/// Storage links end in the stored file name; only that last segment is
/// looked up under `audio_dir`.
pub fn resolve_audio_path(audio_dir: &Path, audio_file_name: &str) -> PathBuf {
    let file_name = audio_file_name
        .rsplit('/')
        .next()
        .unwrap_or(audio_file_name);
    audio_dir.join(file_name)
}
