//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! BalancerConfig.pools
//!     → pool.rs (BackendRegistry: class → ordered BackendPool)
//!     → round_robin.rs (Selector: one cursor per pool)
//!     → resolve(service_class) once at startup → PoolHandle
//!     → PoolHandle::next() per accepted connection
//! ```
//!
//! # Design Decisions
//! - Pools are immutable; no backend is added or removed at runtime
//! - Unknown or empty pools are rejected before the listener starts
//! - The cursor is the only state shared between sessions

pub mod pool;
pub mod round_robin;

pub use pool::{BackendAddr, BackendPool, BackendRegistry, RegistryError};
pub use round_robin::{PoolHandle, RoundRobin, Selector};
