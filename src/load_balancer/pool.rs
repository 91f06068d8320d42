//! Backend pool management.
//!
//! # Responsibilities
//! - Represent backend addresses and the ordered pools they belong to
//! - Group pools by service class
//! - Provide immutable lookup; nothing here changes after startup

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::BalancerConfig;

/// Errors raised while building or querying the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no pool configured for service class '{0}'")]
    UnknownClass(String),

    #[error("pool for service class '{0}' is empty")]
    EmptyPool(String),

    #[error("pool '{pool}' contains invalid backend address '{address}'")]
    InvalidAddress { pool: String, address: String },
}

/// A backend address in `host:port` form.
///
/// The host is kept unresolved so DNS names are looked up at dial time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddr(String);

impl BackendAddr {
    /// Parse a `host:port` string. Returns `None` when the port is missing or invalid.
    pub fn parse(address: &str) -> Option<Self> {
        let (host, port) = address.rsplit_once(':')?;
        if host.is_empty() || port.parse::<u16>().ok()? == 0 {
            return None;
        }
        Some(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered, non-empty list of backends for one service class.
#[derive(Debug, Clone)]
pub struct BackendPool {
    class: String,
    backends: Arc<[BackendAddr]>,
}

impl BackendPool {
    /// Build a pool, rejecting empty lists and malformed addresses.
    pub fn new(class: &str, addresses: &[String]) -> Result<Self, RegistryError> {
        if addresses.is_empty() {
            return Err(RegistryError::EmptyPool(class.to_string()));
        }

        let backends = addresses
            .iter()
            .map(|address| {
                BackendAddr::parse(address).ok_or_else(|| RegistryError::InvalidAddress {
                    pool: class.to_string(),
                    address: address.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            class: class.to_string(),
            backends: backends.into(),
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend at `index`, wrapping around the pool length.
    pub fn at(&self, index: usize) -> &BackendAddr {
        &self.backends[index % self.backends.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendAddr> {
        self.backends.iter()
    }
}

/// All configured pools, keyed by service class.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    pools: HashMap<String, BackendPool>,
}

impl BackendRegistry {
    /// Build the registry from configuration. Any empty or malformed pool is an error.
    pub fn from_config(config: &BalancerConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for (class, addresses) in &config.pools {
            registry.insert(BackendPool::new(class, addresses)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, pool: BackendPool) {
        tracing::debug!(service_class = %pool.class(), backends = pool.len(), "Registered pool");
        self.pools.insert(pool.class().to_string(), pool);
    }

    /// Look up the pool for a service class.
    pub fn get_pool(&self, service_class: &str) -> Result<&BackendPool, RegistryError> {
        self.pools
            .get(service_class)
            .ok_or_else(|| RegistryError::UnknownClass(service_class.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }
}
