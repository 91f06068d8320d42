//! Round-robin load balancing strategy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::pool::{BackendAddr, BackendPool, BackendRegistry, RegistryError};

/// Round-robin cursor.
/// Stores the next index to hand out, always in `[0, len)`.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current index and advance by one, wrapping at `len`.
    ///
    /// Read and advance happen in a single atomic step, so concurrent callers
    /// never observe the same index for the same turn.
    pub fn next_index(&self, len: usize) -> usize {
        debug_assert!(len > 0);
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev % len,
        }
    }
}

/// A pool bound to its cursor, resolved once at startup.
///
/// Cloning shares the cursor.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    pool: BackendPool,
    rr: Arc<RoundRobin>,
}

impl PoolHandle {
    /// Pick the next backend. Never fails: the pool is non-empty by construction.
    pub fn next(&self) -> BackendAddr {
        let index = self.rr.next_index(self.pool.len());
        self.pool.at(index).clone()
    }

    pub fn class(&self) -> &str {
        self.pool.class()
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }
}

/// Round-robin selector over every registered pool, one cursor per pool.
#[derive(Debug, Clone)]
pub struct Selector {
    handles: HashMap<String, PoolHandle>,
}

impl Selector {
    pub fn new(registry: &BackendRegistry) -> Self {
        let handles = registry
            .classes()
            .filter_map(|class| registry.get_pool(class).ok())
            .map(|pool| {
                (
                    pool.class().to_string(),
                    PoolHandle {
                        pool: pool.clone(),
                        rr: Arc::new(RoundRobin::new()),
                    },
                )
            })
            .collect();
        Self { handles }
    }

    /// Resolve a service class to its pool handle. Meant for startup validation.
    pub fn resolve(&self, service_class: &str) -> Result<PoolHandle, RegistryError> {
        self.handles
            .get(service_class)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownClass(service_class.to_string()))
    }

    /// Select the next backend for a service class.
    pub fn select(&self, service_class: &str) -> Result<BackendAddr, RegistryError> {
        self.handles
            .get(service_class)
            .map(PoolHandle::next)
            .ok_or_else(|| RegistryError::UnknownClass(service_class.to_string()))
    }
}
