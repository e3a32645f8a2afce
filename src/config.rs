//! Fabric configuration.
//!
//! One [`FabricConfig`] is shared by the Finder daemon and every router in a
//! process. Presets cover the common cases; the builder covers the rest.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain_types::{
    HelloIntervalMs, PayloadLimit, QueueCapacity, ReconnectDelayMs, RequestTimeoutMs,
};

/// Default Finder port, shared by every participating process.
pub const DEFAULT_FINDER_PORT: u16 = 19999;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("unparsable finder endpoint {0:?}")]
    BadEndpoint(String),
}

/// Complete fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Where the Finder listens, and where routers connect.
    pub finder_endpoint: SocketAddr,

    /// Ceiling on a single frame payload for finder-bound carriers.
    pub payload_limit: PayloadLimit,

    /// Bound on each carrier's writer queue; exceeding it is backpressure.
    pub writer_queue_capacity: QueueCapacity,

    /// Deadline applied to every outbound request.
    pub request_timeout: RequestTimeoutMs,

    /// Interval between Finder liveness hellos.
    pub hello_interval: HelloIntervalMs,

    /// Delay before a router retries a lost Finder connection.
    pub reconnect_delay: ReconnectDelayMs,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            finder_endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_FINDER_PORT),
            payload_limit: PayloadLimit::default(),
            writer_queue_capacity: QueueCapacity::default(),
            request_timeout: RequestTimeoutMs::default(),
            hello_interval: HelloIntervalMs::default(),
            reconnect_delay: ReconnectDelayMs::default(),
        }
    }
}

impl FabricConfig {
    #[must_use]
    pub fn builder() -> FabricConfigBuilder {
        FabricConfigBuilder::default()
    }

    /// Settings suited to tests: tight timeouts so failures surface fast.
    ///
    /// # Panics
    /// Panics if the hardcoded values fall outside their domain-type ranges.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            finder_endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            payload_limit: PayloadLimit::try_new(8_192).unwrap(),
            writer_queue_capacity: QueueCapacity::try_new(64).unwrap(),
            request_timeout: RequestTimeoutMs::try_new(2_000).unwrap(),
            hello_interval: HelloIntervalMs::try_new(200).unwrap(),
            reconnect_delay: ReconnectDelayMs::try_new(50).unwrap(),
        }
    }

    /// Parses `host[:port]` as used by the `-F` flag, defaulting the port.
    pub fn parse_finder_flag(flag: &str) -> Result<SocketAddr, ConfigError> {
        let bad = || ConfigError::BadEndpoint(flag.to_string());
        if let Ok(sa) = flag.parse::<SocketAddr>() {
            return Ok(sa);
        }
        // Bare host, bare v4 address, or host:port with a named host.
        if let Some((host, port)) = flag.rsplit_once(':') {
            let port: u16 = port.parse().map_err(|_| bad())?;
            let ip: IpAddr = host.parse().map_err(|_| bad())?;
            return Ok(SocketAddr::new(ip, port));
        }
        let ip: IpAddr = flag.parse().map_err(|_| bad())?;
        Ok(SocketAddr::new(ip, DEFAULT_FINDER_PORT))
    }
}

/// Builder for custom configurations.
#[derive(Debug, Default)]
pub struct FabricConfigBuilder {
    finder_endpoint: Option<SocketAddr>,
    payload_limit: Option<PayloadLimit>,
    writer_queue_capacity: Option<QueueCapacity>,
    request_timeout: Option<RequestTimeoutMs>,
    hello_interval: Option<HelloIntervalMs>,
    reconnect_delay: Option<ReconnectDelayMs>,
}

impl FabricConfigBuilder {
    #[must_use]
    pub fn finder_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.finder_endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn payload_limit(mut self, limit: PayloadLimit) -> Self {
        self.payload_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn writer_queue_capacity(mut self, capacity: QueueCapacity) -> Self {
        self.writer_queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: RequestTimeoutMs) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn hello_interval(mut self, interval: HelloIntervalMs) -> Self {
        self.hello_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn reconnect_delay(mut self, delay: ReconnectDelayMs) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<FabricConfig, ConfigError> {
        let defaults = FabricConfig::default();
        let config = FabricConfig {
            finder_endpoint: self.finder_endpoint.unwrap_or(defaults.finder_endpoint),
            payload_limit: self.payload_limit.unwrap_or(defaults.payload_limit),
            writer_queue_capacity: self
                .writer_queue_capacity
                .unwrap_or(defaults.writer_queue_capacity),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            hello_interval: self.hello_interval.unwrap_or(defaults.hello_interval),
            reconnect_delay: self.reconnect_delay.unwrap_or(defaults.reconnect_delay),
        };
        if config.request_timeout.as_duration() <= config.hello_interval.as_duration() {
            return Err(ConfigError::ValidationError {
                field: "request_timeout".to_string(),
                reason: "must exceed the hello interval".to_string(),
            });
        }
        Ok(config)
    }
}
