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

//! Shared types for the spatial-audio DJ bot.
//!
//! This crate defines the contract between the bot and the spatial-audio
//! service: access token claims, spatial parameters, and the packets that
//! travel over the transport. It is intentionally I/O-free.

pub mod packet;
pub mod spatial;
pub mod token;

pub use packet::{AudioPacket, JoinPacket, Packet, PacketError, PacketType};
pub use spatial::{Position, SpatialParams};
pub use token::AccessTokenClaims;
