//! Engine runtime: the single owner of all mutable sync state.
//!
//! One task drives socket frames, timers, and user intents through the
//! store, the presence tracker, and the REST collaborators. Nothing else
//! mutates that state, so the reconciler needs no synchronization beyond
//! this loop's in-order processing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sync_core::{
    Author, ClientCommand, ConnectionStatus, EngineCommand, EngineEvent, LocalIdentity,
    ReconnectPolicy, RoomStore, ServerFrame, TypingThrottle, TypingTracker, resolve_identity,
};

use crate::auth::TokenProvider;
use crate::endpoint::build_socket_url;
use crate::rest::{RestClient, RestError};
use crate::socket::ChatSocket;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Runtime tuning knobs. The defaults mirror the server's expectations.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// WebSocket base address, e.g. `wss://chat.example.org/ws`.
    pub ws_base_url: String,
    /// REST API base address, e.g. `https://chat.example.org/`.
    pub api_base_url: String,
    /// History page size requested once per room activation.
    pub history_limit: u16,
    /// How long a peer stays in the typing set without a refresh.
    pub typing_ttl: Duration,
    /// Minimum gap between outbound `typing.start` frames.
    pub typing_interval: Duration,
    /// Ping cadence while the socket is open.
    pub heartbeat_interval: Duration,
    /// Reconnect backoff schedule.
    pub reconnect: ReconnectPolicy,
}

impl RuntimeConfig {
    pub fn new(ws_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            api_base_url: api_base_url.into(),
            history_limit: 50,
            typing_ttl: Duration::from_secs(3),
            typing_interval: Duration::from_millis(1_500),
            heartbeat_interval: Duration::from_secs(25),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// One known room: the key the UI uses and the key the wire uses.
#[derive(Debug, Clone)]
pub struct RoomDescriptor {
    pub display_key: String,
    pub canonical_key: String,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Rest(#[from] RestError),
    /// The runtime task has stopped and no longer accepts commands.
    #[error("runtime command channel is closed")]
    CommandChannelClosed,
}

/// Handle to a spawned runtime task: the command inlet and the event
/// outlet for one engine instance.
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    task: JoinHandle<()>,
}

impl RuntimeHandle {
    /// Clone the command sender for a producer task such as an input loop.
    pub fn command_sender(&self) -> mpsc::Sender<EngineCommand> {
        self.command_tx.clone()
    }

    /// Subscribe to engine events. Each subscriber gets every event from
    /// this point on; slow subscribers may observe lag.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Send one command to the runtime.
    pub async fn send_command(&self, command: EngineCommand) -> Result<(), RuntimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }

    /// Wait for the runtime task to finish after a `Shutdown` command.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn the runtime task for a set of rooms, activating `initial_room`.
pub fn spawn_runtime(
    config: RuntimeConfig,
    tokens: Arc<dyn TokenProvider>,
    rooms: Vec<RoomDescriptor>,
    initial_room: impl Into<String>,
) -> Result<RuntimeHandle, RuntimeError> {
    let rest = RestClient::new(&config.api_base_url, Arc::clone(&tokens))?;
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let identity = match tokens.bearer_token() {
        Some(token) => resolve_identity(&token).unwrap_or_else(|err| {
            warn!(error = %err, "token claims unusable, using placeholder identity");
            LocalIdentity::anonymous()
        }),
        None => LocalIdentity::anonymous(),
    };

    let mut store = RoomStore::new();
    for room in &rooms {
        store.register_room(room.display_key.clone(), room.canonical_key.clone());
    }

    let runtime = RoomRuntime {
        config: config.clone(),
        tokens,
        rest,
        identity,
        store,
        typing: TypingTracker::new(config.typing_ttl),
        throttle: TypingThrottle::new(config.typing_interval),
        events: event_tx.clone(),
        socket: None,
        active_display: String::new(),
        active_canonical: String::new(),
    };
    let initial_room = initial_room.into();
    let task = tokio::spawn(runtime.run(command_rx, initial_room));

    Ok(RuntimeHandle {
        command_tx,
        event_tx,
        task,
    })
}

struct RoomRuntime {
    config: RuntimeConfig,
    tokens: Arc<dyn TokenProvider>,
    rest: RestClient,
    identity: LocalIdentity,
    store: RoomStore,
    typing: TypingTracker,
    throttle: TypingThrottle,
    events: broadcast::Sender<EngineEvent>,
    socket: Option<ChatSocket>,
    active_display: String,
    active_canonical: String,
}

type FrameRx = broadcast::Receiver<ServerFrame>;
type StatusRx = broadcast::Receiver<ConnectionStatus>;

impl RoomRuntime {
    async fn run(mut self, mut command_rx: mpsc::Receiver<EngineCommand>, initial_room: String) {
        let (mut frames, mut statuses) = self.activate_room(&initial_room).await;

        loop {
            let sweep_at = self
                .typing
                .next_expiry()
                .map(tokio::time::Instant::from_std);

            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        None | Some(EngineCommand::Shutdown) => break,
                        Some(EngineCommand::SwitchRoom { room_key }) => {
                            (frames, statuses) = self.activate_room(&room_key).await;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }
                frame = frames.recv() => {
                    match frame {
                        Ok(frame) => self.handle_frame(frame),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "frame subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("frame stream closed");
                        }
                    }
                }
                status = statuses.recv() => {
                    if let Ok(status) = status {
                        self.emit(EngineEvent::StatusChanged { status });
                    }
                }
                _ = tokio::time::sleep_until(sweep_at.unwrap_or_else(tokio::time::Instant::now)),
                    if sweep_at.is_some() =>
                {
                    for room_key in self.typing.sweep(Instant::now()) {
                        let names = self.typing.typers(&room_key);
                        self.emit(EngineEvent::TypingChanged { room_key, names });
                    }
                }
            }
        }

        if let Some(socket) = self.socket.take() {
            socket.disconnect().await;
        }
        info!("runtime stopped");
    }

    /// Tear down the current session and bring up a fresh one for `display`.
    ///
    /// Ordering matters: the old socket is fully disconnected and the old
    /// room's presence cleared before the new session exists, so no stale
    /// timer or frame can land in the wrong bucket.
    async fn activate_room(&mut self, display: &str) -> (FrameRx, StatusRx) {
        if let Some(old) = self.socket.take() {
            old.disconnect().await;
        }
        if !self.active_display.is_empty() {
            self.typing.clear(&self.active_display);
            self.emit(EngineEvent::TypingChanged {
                room_key: self.active_display.clone(),
                names: Vec::new(),
            });
        }
        self.throttle.reset();

        let canonical = self
            .store
            .registry()
            .to_canonical_key(display)
            .unwrap_or(display)
            .to_owned();
        self.active_display = display.to_owned();
        self.active_canonical = canonical.clone();

        match self
            .rest
            .fetch_history(&canonical, self.config.history_limit)
            .await
        {
            Ok(page) => {
                self.store.load_history(display, page);
                self.emit_timeline(display);
            }
            Err(err) => {
                // `display` can't be named inside tracing macros; they import
                // `tracing::field::display` into the expansion scope.
                let room = display;
                warn!(room, error = %err, "history fetch failed, starting empty");
            }
        }

        let socket = ChatSocket::new(self.config.reconnect, self.config.heartbeat_interval);
        let frames = socket.subscribe_frames();
        let statuses = socket.subscribe_status();

        // Queued now, flushed as the first command once the socket opens.
        socket.send(ClientCommand::RoomJoin {
            room_id: canonical.clone(),
        });

        let token = self.tokens.bearer_token();
        match build_socket_url(&self.config.ws_base_url, token.as_deref(), &canonical) {
            Ok(url) => socket.connect(url).await,
            Err(err) => {
                warn!(error = %err, "socket endpoint invalid, staying offline");
                self.emit(EngineEvent::StatusChanged {
                    status: ConnectionStatus::Offline,
                });
            }
        }

        self.socket = Some(socket);
        (frames, statuses)
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SendMessage { content, parent_id } => {
                let display = self.active_display.clone();
                let canonical = self.active_canonical.clone();
                let author = Author {
                    id: self.identity.user_id.clone(),
                    display_name: self.identity.display_name.clone(),
                };
                let temp_id = self.store.apply_optimistic_send(
                    &display,
                    &canonical,
                    content.clone(),
                    author,
                    parent_id.clone(),
                );
                self.emit_timeline(&display);

                self.socket_send(ClientCommand::MessageSend {
                    temp_id,
                    room_id: canonical,
                    content,
                    parent_id,
                });
            }
            EngineCommand::EditMessage {
                message_id,
                content,
            } => {
                if let Err(err) = self
                    .rest
                    .edit_message(&self.active_canonical, &message_id, &content)
                    .await
                {
                    warn!(message_id, error = %err, "edit request failed");
                }
            }
            EngineCommand::DeleteMessage { message_id, reason } => {
                if let Err(err) = self
                    .rest
                    .delete_message(&self.active_canonical, &message_id, reason.as_deref())
                    .await
                {
                    warn!(message_id, error = %err, "delete request failed");
                }
            }
            EngineCommand::ComposerTyping => {
                if self.throttle.should_emit(Instant::now()) {
                    self.socket_send(ClientCommand::TypingStart {
                        room_id: self.active_canonical.clone(),
                    });
                }
            }
            EngineCommand::ComposerIdle => {
                self.throttle.reset();
                self.socket_send(ClientCommand::TypingStop {
                    room_id: self.active_canonical.clone(),
                });
            }
            // Handled in the run loop.
            EngineCommand::SwitchRoom { .. } | EngineCommand::Shutdown => {}
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Hello | ServerFrame::ConnAck => {}
            ServerFrame::MessageCreated(event) => {
                let display = self.store.apply_created(event);
                self.emit_timeline(&display);
            }
            ServerFrame::MessageUpdated(event) => {
                if let Some(display) = self.store.apply_updated(event) {
                    self.emit_timeline(&display);
                }
            }
            ServerFrame::MessageDeleted(event) => {
                if let Some(display) = self.store.apply_deleted(event) {
                    self.emit_timeline(&display);
                }
            }
            ServerFrame::TypingStarted(event) => {
                if event.user_id == self.identity.user_id {
                    return;
                }
                let display = self
                    .store
                    .registry()
                    .to_display_key(&event.room_id)
                    .to_owned();
                self.typing.on_typing_start(
                    &display,
                    &event.user_id,
                    event.name.as_deref(),
                    Instant::now(),
                );
                self.emit_typing(&display);
            }
            ServerFrame::TypingStopped(event) => {
                let display = self
                    .store
                    .registry()
                    .to_display_key(&event.room_id)
                    .to_owned();
                if self.typing.on_typing_stop(&display, &event.user_id) {
                    self.emit_typing(&display);
                }
            }
            ServerFrame::ServerError { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unspecified"), "server error notice");
            }
        }
    }

    fn socket_send(&self, command: ClientCommand) {
        if let Some(socket) = &self.socket {
            if !socket.send(command) {
                debug!("command queued for next open");
            }
        }
    }

    /// Best-effort fan-out; lagged subscribers are handled by `broadcast`.
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn emit_timeline(&self, display: &str) {
        self.emit(EngineEvent::TimelineChanged {
            room_key: display.to_owned(),
            messages: self.store.messages(display).to_vec(),
        });
    }

    fn emit_typing(&self, display: &str) {
        self.emit(EngineEvent::TypingChanged {
            room_key: display.to_owned(),
            names: self.typing.typers(display),
        });
    }
}
