//! Transport layer for the sync engine: the WebSocket session driver,
//! REST collaborators, endpoint construction, and the runtime task that
//! glues them to the pure engine in `sync-core`.

/// Bearer-token accessor trait and a fixed-token implementation.
pub mod auth;
/// Socket URL construction.
pub mod endpoint;
/// History/edit/delete REST contracts.
pub mod rest;
/// Engine runtime task.
pub mod runtime;
/// Reconnecting WebSocket session driver.
pub mod socket;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use endpoint::{EndpointError, build_socket_url};
pub use rest::{RestClient, RestError};
pub use runtime::{RoomDescriptor, RuntimeConfig, RuntimeError, RuntimeHandle, spawn_runtime};
pub use socket::ChatSocket;
