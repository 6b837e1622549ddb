//! Tokio driver for one chat socket session.
//!
//! A [`ChatSocket`] is an owned instance scoped to the active room view;
//! switching rooms disposes it and creates a fresh one. The driver task
//! owns all socket I/O and obeys the pure [`ConnectionSession`] state
//! machine for reconnects, queueing, and status.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use sync_core::{
    ClientCommand, ConnectionSession, ConnectionStatus, ReconnectPolicy, ServerFrame, decode_frame,
};

const FRAME_BUFFER: usize = 256;
const STATUS_BUFFER: usize = 16;

type Writer = mpsc::UnboundedSender<ClientCommand>;

#[derive(Debug)]
struct DriverHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// One duplex chat connection with automatic reconnect.
pub struct ChatSocket {
    session: Arc<Mutex<ConnectionSession>>,
    heartbeat_interval: Duration,
    frame_tx: broadcast::Sender<ServerFrame>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    writer: Arc<Mutex<Option<Writer>>>,
    driver: Mutex<Option<DriverHandle>>,
}

impl ChatSocket {
    pub fn new(policy: ReconnectPolicy, heartbeat_interval: Duration) -> Self {
        let (frame_tx, _) = broadcast::channel(FRAME_BUFFER);
        let (status_tx, _) = broadcast::channel(STATUS_BUFFER);
        Self {
            session: Arc::new(Mutex::new(ConnectionSession::new(policy))),
            heartbeat_interval,
            frame_tx,
            status_tx,
            writer: Arc::new(Mutex::new(None)),
            driver: Mutex::new(None),
        }
    }

    /// Subscribe to decoded inbound frames.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame> {
        self.frame_tx.subscribe()
    }

    /// Subscribe to connection status transitions.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.session).status()
    }

    /// Transmit now when connected, otherwise queue for the next open.
    /// Returns `true` only when the command was handed to a live writer.
    pub fn send(&self, command: ClientCommand) -> bool {
        if lock(&self.session).is_connected() {
            let delivered = lock(&self.writer)
                .as_ref()
                .is_some_and(|writer| writer.send(command.clone()).is_ok());
            if delivered {
                return true;
            }
        }
        lock(&self.session).enqueue(command);
        false
    }

    /// Start the driver for `url`, tearing down any previous driver first.
    /// The session's queued commands flush once the socket opens.
    pub async fn connect(&self, url: Url) {
        self.stop_driver().await;

        {
            let mut session = lock(&self.session);
            session.begin_connect();
        }
        let _ = self.status_tx.send(ConnectionStatus::Connecting);

        let stop = CancellationToken::new();
        let task = tokio::spawn(drive(
            url,
            stop.child_token(),
            self.heartbeat_interval,
            Arc::clone(&self.session),
            Arc::clone(&self.writer),
            self.frame_tx.clone(),
            self.status_tx.clone(),
        ));
        *lock(&self.driver) = Some(DriverHandle { stop, task });
    }

    /// Terminal, idempotent teardown. Cancels any pending reconnect timer;
    /// the outbound queue is retained for a later `connect`.
    pub async fn disconnect(&self) {
        self.stop_driver().await;
        lock(&self.session).disconnect();
        *lock(&self.writer) = None;
        let _ = self.status_tx.send(ConnectionStatus::Offline);
    }

    async fn stop_driver(&self) {
        let handle = lock(&self.driver).take();
        if let Some(handle) = handle {
            handle.stop.cancel();
            let _ = handle.task.await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drive(
    url: Url,
    stop: CancellationToken,
    heartbeat_interval: Duration,
    session: Arc<Mutex<ConnectionSession>>,
    writer: Arc<Mutex<Option<Writer>>>,
    frame_tx: broadcast::Sender<ServerFrame>,
    status_tx: broadcast::Sender<ConnectionStatus>,
) {
    loop {
        let connected = tokio::select! {
            _ = stop.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws, _response)) => {
                let (mut sink, mut stream) = ws.split();

                // The writer must exist before the status flips to
                // Connected: a send racing the queue flush then lands in
                // the writer channel, which the connected loop drains.
                let (writer_tx, mut writer_rx) = mpsc::unbounded_channel();
                *lock(&writer) = Some(writer_tx);

                let flushed = lock(&session).on_open();
                let _ = status_tx.send(ConnectionStatus::Connected);
                debug!(queued = flushed.len(), "socket open, flushing queue");

                match flush(&mut sink, flushed).await {
                    Err(unsent) => lock(&session).requeue_front(unsent),
                    Ok(()) => {
                        let mut heartbeat = tokio::time::interval_at(
                            tokio::time::Instant::now() + heartbeat_interval,
                            heartbeat_interval,
                        );

                        loop {
                            tokio::select! {
                                _ = stop.cancelled() => {
                                    park_writer(&writer, &mut writer_rx, &session);
                                    return;
                                }
                                _ = heartbeat.tick() => {
                                    if transmit(&mut sink, &ClientCommand::Ping).await.is_err() {
                                        break;
                                    }
                                }
                                command = writer_rx.recv() => {
                                    let Some(command) = command else { break };
                                    if transmit(&mut sink, &command).await.is_err() {
                                        lock(&session).requeue_front(vec![command]);
                                        break;
                                    }
                                }
                                inbound = stream.next() => {
                                    match inbound {
                                        Some(Ok(WsMessage::Text(text))) => {
                                            match decode_frame(text.as_str()) {
                                                Ok(frame) => {
                                                    let _ = frame_tx.send(frame);
                                                }
                                                Err(err) => {
                                                    warn!(error = %err, "dropping malformed frame");
                                                }
                                            }
                                        }
                                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                                        Some(Ok(WsMessage::Close(_))) | None => break,
                                        Some(Ok(_)) => {
                                            debug!("ignoring non-text frame");
                                        }
                                        Some(Err(err)) => {
                                            warn!(error = %err, "socket read failed");
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                park_writer(&writer, &mut writer_rx, &session);
            }
            Err(err) => {
                debug!(error = %err, "socket connect failed");
            }
        }

        let delay = lock(&session).on_closed();
        match delay {
            Some(delay) => {
                let _ = status_tx.send(ConnectionStatus::Connecting);
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                let _ = status_tx.send(ConnectionStatus::Offline);
                return;
            }
        }
    }
}

/// Retire the writer slot and move anything still sitting in its channel
/// back onto the session queue, so no command is lost across a reconnect
/// or teardown.
fn park_writer(
    writer: &Mutex<Option<Writer>>,
    writer_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    session: &Mutex<ConnectionSession>,
) {
    *lock(writer) = None;
    while let Ok(command) = writer_rx.try_recv() {
        lock(session).enqueue(command);
    }
}

/// Send queued commands in order; on failure hand back the unsent tail.
async fn flush<S>(sink: &mut S, commands: Vec<ClientCommand>) -> Result<(), Vec<ClientCommand>>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let mut pending = commands.into_iter();
    while let Some(command) = pending.next() {
        if transmit(sink, &command).await.is_err() {
            let mut unsent = vec![command];
            unsent.extend(pending);
            return Err(unsent);
        }
    }
    Ok(())
}

async fn transmit<S>(sink: &mut S, command: &ClientCommand) -> Result<(), ()>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let encoded = match command.encode() {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(error = %err, "dropping unencodable command");
            return Ok(());
        }
    };
    sink.send(WsMessage::text(encoded)).await.map_err(|_| {
        warn!("socket write failed");
    })
}
