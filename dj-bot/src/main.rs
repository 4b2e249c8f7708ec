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

use dj_bot::communicator::{Communicator, LoopbackCommunicator};
use dj_bot::config::DjBotConfig;
use dj_bot::token::resolve_access_token;
use dj_bot::webtransport_client::WebTransportCommunicator;
use dj_bot::SessionController;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .finish(),
    )?;

    let config = DjBotConfig::from_env_or_default()?;
    let server_url = config.server_url()?;
    let settings = config.session_settings();
    let insecure = config.insecure.unwrap_or(false);

    info!(
        "Starting {} DJ session(s) against {}{}",
        config.sessions.len(),
        server_url,
        if config.dry_run { " (dry run)" } else { "" }
    );

    let mut controllers = Vec::new();
    for (i, session) in config.sessions.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(config.ramp_up_delay()).await;
        }

        let access_token = match resolve_access_token(
            session.access_token.as_deref(),
            config.token_secret.as_deref(),
            config.token_ttl_secs(),
            &session.user_id,
            &session.space_id,
            &session.space_name,
        ) {
            Ok(token) => token,
            Err(e) => {
                error!("Skipping session {}: {}", session.user_id, e);
                continue;
            }
        };

        let communicator: Box<dyn Communicator> = if config.dry_run {
            Box::new(LoopbackCommunicator::default())
        } else {
            Box::new(WebTransportCommunicator::new(
                server_url.clone(),
                insecure,
                session.user_id.clone(),
                session.space_id.clone(),
            ))
        };

        let mut controller =
            SessionController::new(session.user_id.clone(), communicator, settings);
        match controller
            .start(session.start_request(&config.audio_dir, access_token))
            .await
        {
            Ok(()) => controllers.push(controller),
            Err(e) => error!("Session {} failed to start: {}", session.user_id, e),
        }
    }

    if controllers.is_empty() {
        return Err(anyhow::anyhow!("no DJ session could be started"));
    }

    info!("{} session(s) streaming, press Ctrl-C to stop", controllers.len());
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    for controller in controllers.iter_mut() {
        let ticks = controller.tick_count();
        controller.stop().await;
        info!("Session {} stopped after {} ticks", controller.user_id(), ticks);
    }

    Ok(())
}
