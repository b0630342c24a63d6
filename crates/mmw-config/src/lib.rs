//! Client configuration loading and validation.

pub mod config;
pub mod paths;

pub use config::{
    CacheConfig, ClientConfig, PollingConfig, RetryConfig, ServiceConfig, TransportConfig,
};
