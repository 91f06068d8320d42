//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (service class references an existing pool)
//! - Validate value ranges (timeouts > 0, buffer sizes, backend addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before the listener is bound

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::pool::BackendAddr;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a valid socket address")]
    BindAddress(String),

    #[error("service class '{0}' has no configured pool")]
    UnknownServiceClass(String),

    #[error("pool '{0}' is empty")]
    EmptyPool(String),

    #[error("pool '{pool}' entry '{address}' is not a host:port address")]
    BackendAddress { pool: String, address: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if !config.pools.contains_key(&config.service_class) {
        errors.push(ValidationError::UnknownServiceClass(
            config.service_class.clone(),
        ));
    }

    for (name, addresses) in &config.pools {
        if addresses.is_empty() {
            errors.push(ValidationError::EmptyPool(name.clone()));
        }
        for address in addresses {
            if BackendAddr::parse(address).is_none() {
                errors.push(ValidationError::BackendAddress {
                    pool: name.clone(),
                    address: address.clone(),
                });
            }
        }
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.relay.buffer_size == 0 {
        errors.push(ValidationError::Zero("relay.buffer_size"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&BalancerConfig::default()), Ok(()));
    }

    #[test]
    fn empty_selected_pool_is_rejected() {
        let mut config = BalancerConfig::default();
        config.pools.insert("plain".into(), Vec::new());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyPool("plain".into())]);
    }

    #[test]
    fn unknown_class_is_rejected() {
        let mut config = BalancerConfig::default();
        config.service_class = "websocket".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownServiceClass("websocket".into())));
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = BalancerConfig::default();
        config.listener.bind_address = "not an address".into();
        config.listener.max_connections = 0;
        config.relay.buffer_size = 0;
        config.pools.insert("plain".into(), vec!["no-port".into(), "host:99999".into()]);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::BackendAddress {
            pool: "plain".into(),
            address: "host:99999".into(),
        }));
    }
}
