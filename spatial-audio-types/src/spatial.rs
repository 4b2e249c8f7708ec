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

//! Spatial placement of a participant inside a space.

use serde::{Deserialize, Serialize};

/// Attenuation used in broadcast mode. Close enough to zero that the
/// service applies no distance-based falloff.
pub const BROADCAST_ATTENUATION: f64 = 1e-10;

/// Rolloff used in broadcast mode.
pub const BROADCAST_ROLLOFF: f64 = 1e10;

/// A point in the space. `z` defaults to 0 when omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Initial spatial parameters handed to the service when joining.
///
/// `attenuation` and `rolloff` are only present when overriding the
/// service defaults, which the bot does for broadcast sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialParams {
    pub position: Position,
    pub gain: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attenuation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<f64>,
}

impl SpatialParams {
    /// Parameters for a source audible only near `position`.
    pub fn spatialized(position: Position, gain: f64) -> Self {
        Self {
            position,
            gain,
            attenuation: None,
            rolloff: None,
        }
    }

    /// Parameters for a source audible everywhere in the space.
    pub fn broadcast(position: Position, gain: f64) -> Self {
        Self {
            position,
            gain,
            attenuation: Some(BROADCAST_ATTENUATION),
            rolloff: Some(BROADCAST_ROLLOFF),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.attenuation == Some(BROADCAST_ATTENUATION) && self.rolloff == Some(BROADCAST_ROLLOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_z_defaults_to_zero() {
        let position: Position = serde_json::from_str(r#"{"x": 1.5, "y": -2.0}"#).unwrap();
        assert_eq!(position, Position::new(1.5, -2.0));
    }

    #[test]
    fn spatialized_params_omit_overrides_on_the_wire() {
        let params = SpatialParams::spatialized(Position::new(1.0, 2.0), 0.5);
        let json = serde_json::to_value(params).unwrap();
        assert!(json.get("attenuation").is_none());
        assert!(json.get("rolloff").is_none());
        assert!(!params.is_broadcast());
    }

    #[test]
    fn broadcast_params_carry_sentinels() {
        let params = SpatialParams::broadcast(Position::default(), 3.0);
        assert_eq!(params.attenuation, Some(1e-10));
        assert_eq!(params.rolloff, Some(1e10));
        assert!(params.is_broadcast());
    }
}
