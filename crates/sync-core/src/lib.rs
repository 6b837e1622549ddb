//! Core realtime sync engine shared between the transport runtime and
//! frontend consumers.
//!
//! This crate defines the wire codec, the room key registry, the message
//! reconciler, typing presence, the connection-session state machine, and
//! the common error abstractions. Everything here is pure logic; sockets,
//! HTTP, and the runtime's channels live in the transport crate.

/// Stable engine error types and HTTP classification helpers.
pub mod error;
/// Bearer-token identity resolution.
pub mod identity;
/// Typing presence tracking and the composer throttle.
pub mod presence;
/// Wire codec for socket frames and client commands.
pub mod protocol;
/// Display/canonical room key registry.
pub mod registry;
/// Backoff policy used by the reconnect loop.
pub mod retry;
/// Connection-session state machine.
pub mod session;
/// Per-room message store and reconciliation.
pub mod timeline;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use error::{EngineError, EngineErrorCategory, classify_http_status};
pub use identity::{IdentityError, LocalIdentity, resolve_identity};
pub use presence::{TypingThrottle, TypingTracker};
pub use protocol::{
    ClientCommand, FrameError, MessageCreated, MessageDeleted, MessageUpdated, ServerFrame,
    TypingStarted, TypingStopped, decode_frame,
};
pub use registry::RoomKeyRegistry;
pub use retry::ReconnectPolicy;
pub use session::ConnectionSession;
pub use timeline::RoomStore;
pub use types::{Author, ConnectionStatus, EngineCommand, EngineEvent, Message};
