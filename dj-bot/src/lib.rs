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

//! A bot that streams an audio file into a spatial-audio space as a
//! synthetic participant.
//!
//! The file is decoded once into 16-bit PCM ([`audio`]), then a fixed-period
//! [`scheduler`] pushes one frame per tick through the outbound [`sink`] into
//! the transport, looping forever until the [`session`] is stopped.

pub mod audio;
pub mod communicator;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod token;
pub mod webtransport_client;

pub use error::{DjBotError, Result};
pub use session::{SessionController, SessionSettings, SessionState, StartRequest};
