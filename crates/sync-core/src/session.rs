//! Pure connection-session state machine.
//!
//! Holds everything about the socket lifecycle that does not require I/O:
//! status, reconnect attempt counter, and the FIFO outbound queue. The
//! tokio driver in the transport crate calls into this machine and obeys
//! its answers, which keeps every transition testable without a socket.

use std::collections::VecDeque;
use std::time::Duration;

use crate::protocol::ClientCommand;
use crate::retry::ReconnectPolicy;
use crate::types::ConnectionStatus;

#[derive(Debug)]
pub struct ConnectionSession {
    status: ConnectionStatus,
    should_reconnect: bool,
    attempt: u32,
    outbox: VecDeque<ClientCommand>,
    policy: ReconnectPolicy,
}

impl ConnectionSession {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: ConnectionStatus::Offline,
            should_reconnect: false,
            attempt: 0,
            outbox: VecDeque::new(),
            policy,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Start (or restart) the session. Any queue left over from a previous
    /// session is retained and will flush on the next open.
    pub fn begin_connect(&mut self) {
        self.should_reconnect = true;
        self.status = ConnectionStatus::Connecting;
    }

    /// The transport opened: reset backoff and drain the queue in FIFO
    /// order for immediate transmission.
    pub fn on_open(&mut self) -> Vec<ClientCommand> {
        self.status = ConnectionStatus::Connected;
        self.attempt = 0;
        self.outbox.drain(..).collect()
    }

    /// The transport closed or errored. Returns the backoff delay before
    /// the next attempt, or `None` when the session was terminated and no
    /// reconnect should happen.
    pub fn on_closed(&mut self) -> Option<Duration> {
        if !self.should_reconnect {
            self.status = ConnectionStatus::Offline;
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.status = ConnectionStatus::Connecting;
        Some(delay)
    }

    /// Terminal, idempotent teardown. The queue is retained for reuse by a
    /// later `begin_connect`; it is never flushed on the way out.
    pub fn disconnect(&mut self) {
        self.should_reconnect = false;
        self.status = ConnectionStatus::Offline;
        self.attempt = 0;
    }

    /// Queue a command for the next open.
    pub fn enqueue(&mut self, command: ClientCommand) {
        self.outbox.push_back(command);
    }

    /// Put commands back at the queue front, preserving their order.
    /// Used when a flush fails partway through transmission.
    pub fn requeue_front(&mut self, commands: Vec<ClientCommand>) {
        for command in commands.into_iter().rev() {
            self.outbox.push_front(command);
        }
    }

    pub fn queued_len(&self) -> usize {
        self.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ConnectionSession {
        ConnectionSession::new(ReconnectPolicy::new(500, 15_000))
    }

    fn join(room: &str) -> ClientCommand {
        ClientCommand::RoomJoin {
            room_id: room.to_owned(),
        }
    }

    #[test]
    fn walks_connect_open_close_reconnect_path() {
        let mut session = session();
        assert_eq!(session.status(), ConnectionStatus::Offline);

        session.begin_connect();
        assert_eq!(session.status(), ConnectionStatus::Connecting);

        session.on_open();
        assert_eq!(session.status(), ConnectionStatus::Connected);

        let delay = session.on_closed();
        assert_eq!(delay, Some(Duration::from_millis(500)));
        assert_eq!(session.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn backoff_grows_then_resets_on_open() {
        let mut session = session();
        session.begin_connect();

        assert_eq!(session.on_closed(), Some(Duration::from_millis(500)));
        assert_eq!(session.on_closed(), Some(Duration::from_millis(1_000)));
        assert_eq!(session.on_closed(), Some(Duration::from_millis(2_000)));

        session.on_open();
        assert_eq!(session.on_closed(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn backoff_is_capped() {
        let mut session = session();
        session.begin_connect();
        for _ in 0..10 {
            session.on_closed();
        }
        assert_eq!(session.on_closed(), Some(Duration::from_millis(15_000)));
    }

    #[test]
    fn disconnect_is_terminal_and_idempotent() {
        let mut session = session();
        session.begin_connect();
        session.on_open();

        session.disconnect();
        session.disconnect();
        assert_eq!(session.status(), ConnectionStatus::Offline);
        assert_eq!(session.on_closed(), None, "no reconnect after disconnect");
    }

    #[test]
    fn queue_flushes_fifo_on_open() {
        let mut session = session();
        session.begin_connect();
        session.enqueue(join("a"));
        session.enqueue(join("b"));
        session.enqueue(join("c"));

        let flushed = session.on_open();
        assert_eq!(flushed, vec![join("a"), join("b"), join("c")]);
        assert_eq!(session.queued_len(), 0);
    }

    #[test]
    fn queue_survives_disconnect_for_the_next_session() {
        let mut session = session();
        session.begin_connect();
        session.enqueue(join("a"));
        session.disconnect();
        assert_eq!(session.queued_len(), 1);

        session.begin_connect();
        assert_eq!(session.on_open(), vec![join("a")]);
    }

    #[test]
    fn requeue_front_preserves_order() {
        let mut session = session();
        session.enqueue(join("later"));
        session.requeue_front(vec![join("a"), join("b")]);

        session.begin_connect();
        assert_eq!(
            session.on_open(),
            vec![join("a"), join("b"), join("later")]
        );
    }
}
