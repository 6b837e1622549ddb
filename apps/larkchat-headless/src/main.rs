//! Headless chat client.
//!
//! Drives the sync engine from stdin and prints engine events to stdout.
//! Lines are sent as messages; `/join <room>` switches rooms and `/quit`
//! exits.

mod config;
mod logging;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use sync_core::{EngineCommand, EngineEvent};
use sync_ws::{RoomDescriptor, RuntimeConfig, StaticTokenProvider, spawn_runtime};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match config::HeadlessConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let mut runtime_config = RuntimeConfig::new(config.ws_url.clone(), config.api_url.clone());
    runtime_config.history_limit = config.history_limit;

    let tokens = Arc::new(StaticTokenProvider::new(config.token.clone()));
    let rooms = vec![RoomDescriptor {
        display_key: config.room.clone(),
        canonical_key: config.canonical_room().to_owned(),
    }];

    let handle = match spawn_runtime(runtime_config, tokens, rooms, config.room.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    info!(room = %config.room, ws = %config.ws_url, "headless client started");

    let command_tx = handle.command_sender();
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_owned();
            let command = match line.as_str() {
                "" => continue,
                "/quit" => EngineCommand::Shutdown,
                _ if line.starts_with("/join ") => EngineCommand::SwitchRoom {
                    room_key: line["/join ".len()..].trim().to_owned(),
                },
                _ => EngineCommand::SendMessage {
                    content: line.clone(),
                    parent_id: None,
                },
            };
            let quitting = command == EngineCommand::Shutdown;
            if command_tx.send(command).await.is_err() || quitting {
                break;
            }
        }
        let _ = command_tx.send(EngineCommand::Shutdown).await;
    });

    let mut events = handle.subscribe();
    let printer = async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::StatusChanged { status }) => {
                    println!("[status] {}", status.label());
                }
                Ok(EngineEvent::TimelineChanged { room_key, messages }) => {
                    if let Some(last) = messages.last() {
                        let body = last.live_content().unwrap_or("(deleted)");
                        println!("[{room_key}] {}: {body}", last.author.display_name);
                    }
                }
                Ok(EngineEvent::TypingChanged { room_key, names }) => {
                    if names.is_empty() {
                        println!("[{room_key}] nobody is typing");
                    } else {
                        println!("[{room_key}] typing: {}", names.join(", "));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    // Print events until the runtime stops.
    tokio::select! {
        _ = printer => {}
        _ = handle.join() => {}
    }
    stdin_task.abort();
}
