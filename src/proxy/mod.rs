//! Transport-level proxying.
//!
//! # Data Flow
//! ```text
//! Listener.accept()
//!     → dispatcher.rs (PoolHandle::next → backend, spawn session task)
//!     → session.rs (dial → two relays → half-close propagation → teardown)
//! ```
//!
//! # Design Decisions
//! - Byte-transparent: payloads are never parsed or modified
//! - One dial attempt per session; failures close the client
//! - Per-connection errors stay inside the session task

pub mod dispatcher;
pub mod session;

pub use dispatcher::{Dispatcher, SessionHandle};
pub use session::{
    Direction, ProxySession, RelayOutcome, SessionError, SessionReport, SessionSettings,
    SpliceOutcome,
};
