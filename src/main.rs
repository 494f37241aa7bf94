//! `chatsync` runs a sync session against the HTTP backend and replays push
//! frames read from stdin.
//!
//! Each stdin line is one JSON push frame (`{"type": ..., "payload": ...}`).
//! Outbound frames are written to stdout, one JSON line each. On EOF or
//! Ctrl-C the queued frames are drained and a state summary is logged.

use std::sync::Arc;

use chatsync::notify::LogNotifier;
use chatsync::{ChannelTransport, ChatSession, ErrorCode, EventBus, HttpChatApi, SyncConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "invalid configuration");
            std::process::exit(2);
        }
    };

    let api = match HttpChatApi::new(&config) {
        Ok(api) => api,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "HTTP client init failed");
            std::process::exit(1);
        }
    };

    let (transport, mut outbound) = ChannelTransport::new();
    let bus = EventBus::new();
    let mut session =
        match ChatSession::start(&config, Arc::new(api), Arc::new(transport), bus.clone(), Arc::new(LogNotifier)).await
        {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "session start failed");
                std::process::exit(1);
            }
        };

    let writer = tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            println!("{line}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() && !bus.publish_text(line) {
                        debug!("frame dropped");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.drain().await;
    info!(
        conversations = session.conversations().await.len(),
        unread = session.unread_count().await,
        active = ?session.active_conversation().await,
        "final state"
    );
    writer.abort();
}
