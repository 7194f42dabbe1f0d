pub mod api;
pub mod broker;
pub mod config;
pub mod metrics;
pub mod queue;
pub mod worker_registry;

pub use broker::{Broker, BrokerStats};
pub use config::BrokerConfig;
