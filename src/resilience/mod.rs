//! Resilience patterns.
//!
//! # Design Decisions
//! - Single dial attempt per session; no retries to another backend
//! - Accept failures are paced with backoff so a persistent OS error
//!   (e.g. file descriptor exhaustion) does not spin the accept loop

pub mod backoff;

pub use backoff::{calculate_backoff, FailureStreak};
