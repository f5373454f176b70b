//! # parley-server
//!
//! The chat hub and its WebSocket front end.
//!
//! - [`hub`]: the registry of connected sessions and the broadcast fan-out
//! - [`session`]: per-connection read/write loops and liveness
//! - [`transport`]: frame-level adapters over axum sockets and in-memory channels
//! - [`server`]: HTTP routes (`/ws`, `/health`) and the listener
//! - [`shutdown`]: cancellation-token based graceful shutdown

pub mod health;
pub mod hub;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use hub::{ChatHub, Hub, Member};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use session::{ReadEnd, Session, SessionSummary, WriteEnd};
pub use shutdown::ShutdownCoordinator;
