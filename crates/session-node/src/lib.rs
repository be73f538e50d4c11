//! Session client runtime.
//!
//! Drives the protocol engine against an injected network
//! [`transport::Transport`]: schedules pollers, dispatches decoded
//! messages to subscribers, and runs the outgoing encrypt-and-store
//! pipeline. [`session::Session`] is the entry point for embedders.

pub mod events;
pub mod logging;
pub mod outgoing;
pub mod poller;
pub mod session;
pub mod transport;

pub use events::{EventKind, HandlerId, MessageEvent};
pub use poller::{Poller, PollerHandle, PollerState, PollerStats};
pub use session::Session;
pub use transport::Transport;
