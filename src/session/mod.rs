//! High-level session facade over the Live protocol.
//!
//! [`LiveSession`] owns the transport and the turn/tool-use state machine,
//! and fans inbound traffic out as typed events. The low-level protocol
//! types stay reachable through `crate::protocol` when full control is
//! needed.

mod client;
pub mod events;
pub mod registry;
pub mod transport;

pub use client::{ConnectionState, LiveSession, LiveSessionBuilder, LiveSessionHandle};
pub use events::{EventKind, LiveEvent, LiveEventStream};
pub use registry::EventRegistry;
pub use transport::Transport;
