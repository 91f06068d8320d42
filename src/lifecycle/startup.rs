//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the backend registry and selector from validated configuration
//! - Resolve the configured service class to a pool
//! - Bind the listener last, so traffic only arrives once everything is ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing is served
//! - Unknown classes and empty pools are caught here, never per connection

use thiserror::Error;

use crate::config::BalancerConfig;
use crate::load_balancer::{BackendRegistry, RegistryError, Selector};
use crate::net::{Listener, ListenerError};
use crate::proxy::Dispatcher;

/// Fatal startup failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid backend configuration: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Everything needed to start serving.
pub struct Prepared {
    pub dispatcher: Dispatcher,
    pub listener: Listener,
}

/// Build the dispatcher for the configured class without binding anything.
pub fn build_dispatcher(config: &BalancerConfig) -> Result<Dispatcher, StartupError> {
    let registry = BackendRegistry::from_config(config)?;
    let selector = Selector::new(&registry);
    let dispatcher = Dispatcher::from_config(config, &selector)?;

    tracing::info!(
        service_class = %config.service_class,
        pools = registry.classes().count(),
        "Backend registry ready"
    );
    Ok(dispatcher)
}

/// Build the dispatcher, then bind the listener.
pub async fn prepare(config: &BalancerConfig) -> Result<Prepared, StartupError> {
    let dispatcher = build_dispatcher(config)?;
    let listener = Listener::bind(&config.listener).await?;
    Ok(Prepared {
        dispatcher,
        listener,
    })
}
