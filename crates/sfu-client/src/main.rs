//! SFU Probe
//!
//! Headless client that joins a room through a TCP signaling peer, consumes
//! every participant and logs the participant view as it changes.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (JSON when `SFU_LOG_JSON=true`)
//! 3. Connect to the signaling peer and start the stream channel
//! 4. Spawn the session actor with the headless media engine
//! 5. Join the room, optionally sending the local feed
//! 6. Log view changes until ctrl-c or the session ends

#![warn(clippy::pedantic)]

use std::sync::Arc;

use sfu_client::actors::SessionActor;
use sfu_client::config::Config;
use sfu_client::engine::HeadlessEngine;
use sfu_client::projection::ParticipantView;
use sfu_client::signaling::StreamSignalingChannel;
use tokio::net::TcpStream;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config first: it decides the log format
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_filter.as_str().into());
    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting SFU probe");
    info!(
        signaling_address = %config.signaling_address,
        render_slots = config.session.render_slots,
        send_feed = config.send_feed,
        "Configuration loaded successfully"
    );

    let stream = TcpStream::connect(&config.signaling_address)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to signaling peer");
            e
        })?;
    info!("Signaling connection established");

    let shutdown_token = CancellationToken::new();
    let (channel, channel_events) =
        StreamSignalingChannel::spawn(stream, shutdown_token.child_token());

    let (session, session_task) = SessionActor::spawn(
        config.session,
        channel,
        channel_events,
        Arc::new(HeadlessEngine::new()),
        shutdown_token.child_token(),
    );

    let summary = session
        .join(config.display_name.clone(), config.room_id.clone())
        .await
        .map_err(|e| {
            error!(error = %e, "{}", e.user_message());
            e
        })?;
    info!(
        existing_participants = summary.existing_participants,
        "Joined room"
    );

    if config.send_feed {
        match session.enable_capture().await {
            Ok(_) => match session.send_feed().await {
                Ok(feed) => info!(audio_id = %feed.audio_id, video_id = %feed.video_id, "Local feed sent"),
                Err(e) => warn!(error = %e, "{}", e.user_message()),
            },
            Err(e) => warn!(error = %e, "{}", e.user_message()),
        }
    }

    let mut view = session.subscribe_view();
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Received shutdown signal");
                break;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    warn!("Session ended");
                    break;
                }
                log_view(&view.borrow_and_update());
            }
        }
    }

    shutdown_token.cancel();
    if let Err(e) = session_task.await {
        error!(error = %e, "Session task failed");
    }

    info!("SFU probe stopped");
    Ok(())
}

fn log_view(view: &ParticipantView) {
    let main_speaker = view.main_speaker().map(|feed| feed.display_name.as_str());
    let thumbnails: Vec<&str> = view
        .thumbnails()
        .map(|feed| feed.display_name.as_str())
        .collect();
    info!(
        phase = ?view.phase,
        degraded = view.degraded,
        main_speaker = main_speaker.unwrap_or("-"),
        thumbnails = ?thumbnails,
        "Participant view changed"
    );
}
