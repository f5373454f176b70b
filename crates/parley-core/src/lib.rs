//! Shared domain types for the parley chat hub: the wire [`Event`], branded
//! ids, liveness timing, and the error taxonomy used across crates.

pub mod errors;
pub mod events;
pub mod ids;
pub mod liveness;

pub use errors::{HubError, TransportError};
pub use events::Event;
pub use ids::{EventId, SessionId};
pub use liveness::Liveness;
