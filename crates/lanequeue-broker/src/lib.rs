pub mod api;
pub mod broker;
pub mod config;
mod error;
pub mod lane;
pub mod metrics;
mod session;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
