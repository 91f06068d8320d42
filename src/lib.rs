//! Transparent TCP load balancer library.

pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod resilience;

pub use config::BalancerConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::{BackendRegistry, Selector};
pub use proxy::Dispatcher;
