//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher / session / listener
//!     → tracing spans (session_id, peer_addr, backend)
//!     → logging.rs subscriber (pretty or JSON) → stdout
//! ```

pub mod logging;

pub use logging::init_logging;
