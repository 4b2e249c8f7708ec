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

use async_trait::async_trait;
use spatial_audio_types::packet::{HeartbeatPacket, LeavePacket};
use spatial_audio_types::{JoinPacket, Packet, SpatialParams};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;
use web_transport_quinn::{ClientBuilder, Session};

use crate::communicator::Communicator;
use crate::sink::{ChannelAudioSource, SyntheticAudioSource};

/// Outbound packets queued between the tick loop and the network.
const PACKET_QUEUE_DEPTH: usize = 64;

pub struct WebTransportCommunicator {
    server_url: Url,
    insecure: bool,
    user_id: String,
    space_id: String,
    session: Option<Session>,
    quit: Arc<AtomicBool>,
    packet_sender: Sender<Vec<u8>>,
    packet_receiver: Option<Receiver<Vec<u8>>>,
}

impl WebTransportCommunicator {
    pub fn new(server_url: Url, insecure: bool, user_id: String, space_id: String) -> Self {
        let (packet_sender, packet_receiver) = mpsc::channel(PACKET_QUEUE_DEPTH);
        Self {
            server_url,
            insecure,
            user_id,
            space_id,
            session: None,
            quit: Arc::new(AtomicBool::new(false)),
            packet_sender,
            packet_receiver: Some(packet_receiver),
        }
    }

    /// `{server}/lobby?token=<JWT>`
    pub fn lobby_url(server_url: &Url, access_token: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/lobby",
            server_url.as_str().trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("token", access_token);
        Ok(url)
    }

    fn reset_packet_queue(&mut self) {
        let (sender, receiver) = mpsc::channel(PACKET_QUEUE_DEPTH);
        self.packet_sender = sender;
        self.packet_receiver = Some(receiver);
    }

    async fn send_packet(&self, packet: &Packet) -> anyhow::Result<()> {
        if let Some(session) = &self.session {
            Self::send_via_session(session, packet.encode()?).await
        } else {
            Err(anyhow::anyhow!("No WebTransport session available"))
        }
    }

    async fn send_via_session(session: &Session, data: Vec<u8>) -> anyhow::Result<()> {
        let mut stream = session.open_uni().await?;
        stream.write_all(&data).await?;
        stream.finish()?;
        Ok(())
    }

    fn start_heartbeat(&self, session: Session) {
        let user_id = self.user_id.clone();
        let quit = self.quit.clone();

        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;
                if quit.load(Ordering::Relaxed) {
                    break;
                }

                let timestamp_ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or_default();
                let heartbeat = Packet::Heartbeat(HeartbeatPacket {
                    user_id: user_id.clone(),
                    timestamp_ms,
                });

                let result = match heartbeat.encode() {
                    Ok(bytes) => Self::send_via_session(&session, bytes).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    warn!("Failed to send heartbeat for {}: {}", user_id, e);
                } else {
                    debug!("Sent heartbeat for {}", user_id);
                }
            }
        });
    }

    fn start_packet_sender(&self, session: Session, mut packet_receiver: Receiver<Vec<u8>>) {
        let user_id = self.user_id.clone();
        let quit = self.quit.clone();

        tokio::spawn(async move {
            while let Some(packet_data) = packet_receiver.recv().await {
                if quit.load(Ordering::Relaxed) {
                    break;
                }

                if let Err(e) = Self::send_via_session(&session, packet_data).await {
                    warn!("Failed to send audio packet for {}: {}", user_id, e);
                }
            }
            info!("Packet sender stopped for {}", user_id);
        });
    }
}

#[async_trait]
impl Communicator for WebTransportCommunicator {
    async fn connect(&mut self, access_token: &str, spatial: &SpatialParams) -> anyhow::Result<()> {
        info!("Connecting {} to {}", self.user_id, self.server_url);

        let client = if self.insecure {
            warn!("Certificate verification disabled (insecure)");
            // SAFETY: only reachable when the operator explicitly opts out of TLS verification
            unsafe { ClientBuilder::new().with_no_certificate_verification()? }
        } else {
            ClientBuilder::new().with_system_roots()?
        };

        let url = Self::lobby_url(&self.server_url, access_token)?;
        let session = client.connect(url).await?;
        info!("WebTransport session established for {}", self.user_id);

        // A reconnect starts with fresh background tasks and a fresh queue.
        self.quit = Arc::new(AtomicBool::new(false));
        if self.packet_receiver.is_none() {
            self.reset_packet_queue();
        }
        self.session = Some(session.clone());

        let join = Packet::Join(JoinPacket {
            user_id: self.user_id.clone(),
            space_id: self.space_id.clone(),
            spatial: *spatial,
        });
        self.send_packet(&join).await?;
        info!(
            "Joined space {} as {} at ({}, {}, {})",
            self.space_id, self.user_id, spatial.position.x, spatial.position.y, spatial.position.z
        );

        self.start_heartbeat(session);
        Ok(())
    }

    fn set_input_audio(&mut self) -> anyhow::Result<Arc<dyn SyntheticAudioSource>> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No WebTransport session available"))?;
        let receiver = self
            .packet_receiver
            .take()
            .ok_or_else(|| anyhow::anyhow!("Input audio already attached for {}", self.user_id))?;

        self.start_packet_sender(session, receiver);
        Ok(Arc::new(ChannelAudioSource::new(
            self.user_id.clone(),
            self.packet_sender.clone(),
        )))
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.quit.store(true, Ordering::Relaxed);
        let leave = Packet::Leave(LeavePacket {
            user_id: self.user_id.clone(),
        });
        if self.session.is_some() {
            if let Err(e) = self.send_packet(&leave).await {
                warn!("Failed to send leave packet for {}: {}", self.user_id, e);
            }
        }
        if let Some(session) = self.session.take() {
            session.close(0, b"leaving");
            info!("Stopping WebTransport client for {}", self.user_id);
        }
        // Dropping the old sender ends the packet forwarder once the audio
        // source holding the last clone is gone.
        self.reset_packet_queue();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_url_carries_token_as_query() {
        let server = Url::parse("https://media.example.com:4433/").unwrap();
        let url = WebTransportCommunicator::lobby_url(&server, "a.b.c").unwrap();
        assert_eq!(url.as_str(), "https://media.example.com:4433/lobby?token=a.b.c");
    }

    #[test]
    fn input_audio_requires_a_session() {
        let server = Url::parse("https://127.0.0.1:1").unwrap();
        let mut communicator =
            WebTransportCommunicator::new(server, true, "dj".to_string(), "space".to_string());
        assert!(communicator.set_input_audio().is_err());
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_no_op() {
        let server = Url::parse("https://127.0.0.1:1").unwrap();
        let mut communicator =
            WebTransportCommunicator::new(server, true, "dj".to_string(), "space".to_string());
        assert!(communicator.disconnect().await.is_ok());
        assert!(communicator.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_closes_the_outbound_queue() {
        let server = Url::parse("https://127.0.0.1:1").unwrap();
        let mut communicator =
            WebTransportCommunicator::new(server, true, "dj".to_string(), "space".to_string());
        let mut forwarded = communicator.packet_receiver.take().unwrap();

        communicator.disconnect().await.unwrap();

        // A forwarder parked on this receiver wakes up and exits.
        let recv = time::timeout(Duration::from_secs(1), forwarded.recv()).await;
        assert!(matches!(recv, Ok(None)));
        assert!(communicator.packet_receiver.is_some());
    }
}
