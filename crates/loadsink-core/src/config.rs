//! Server configuration
//!
//! Builder-style configuration with environment defaults. Values that
//! have a sane hard range (artificial delay, error rate) are clamped at
//! the builder; everything else is checked by [`ServerConfig::validate`],
//! which callers run before opening any socket.
//!
//! # Environment Variables
//!
//! - `LOADSINK_PORT` - listening port (default 8080)
//! - `LOADSINK_WORKERS` - worker thread count (default 4)
//! - `LOADSINK_DELAY_MS` - artificial response delay, 0..=5000
//! - `LOADSINK_ERRATE` - injected error rate, 0.0..=1.0
//! - `LOADSINK_BG` - background mode, disables the interactive toggle
//! - `LOADSINK_QUEUE_CAPACITY` - per-worker connection handoff queue

use crate::env::{env_get, env_get_bool};
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;
/// Workers in the pool. The pool size is fixed for the process lifetime.
pub const DEFAULT_WORKERS: usize = 4;
/// Upper bound for the artificial response delay.
pub const MAX_DELAY_MS: u64 = 5000;
/// Default capacity of each worker's connection handoff queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for a [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening port. 0 is rejected by `validate`.
    pub port: u16,
    /// Number of worker threads; never changes once the pool is started.
    pub num_workers: usize,
    /// Artificial delay applied before every response.
    pub delay: Duration,
    /// Fraction of requests answered with an injected error, 0.0..=1.0.
    pub error_rate: f32,
    /// Background mode: no interactive debug toggle on stdin.
    pub background: bool,
    /// Capacity of each worker's incoming-connection queue.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            num_workers: DEFAULT_WORKERS,
            delay: Duration::ZERO,
            error_rate: 0.0,
            background: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Defaults with `LOADSINK_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default()
            .port(env_get("LOADSINK_PORT", DEFAULT_PORT))
            .num_workers(env_get("LOADSINK_WORKERS", DEFAULT_WORKERS))
            .delay_ms(env_get("LOADSINK_DELAY_MS", 0u64))
            .error_rate(env_get("LOADSINK_ERRATE", 0.0f32))
            .background(env_get_bool("LOADSINK_BG", false))
            .queue_capacity(env_get("LOADSINK_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY))
    }

    // Builder methods

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    /// Artificial response delay in milliseconds, clamped to 0..=5000.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms.min(MAX_DELAY_MS));
        self
    }

    /// Injected error rate, clamped to 0.0..=1.0. NaN counts as 0.
    pub fn error_rate(mut self, rate: f32) -> Self {
        self.error_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    pub fn background(mut self, bg: bool) -> Self {
        self.background = bg;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    /// Requests between injected faults; 0 when injection is disabled.
    pub fn fault_cycle(&self) -> u32 {
        crate::fault::cycle_from_rate(self.error_rate)
    }

    /// Check the configuration. Callers treat a failure as fatal before
    /// any socket is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be 1-65535"));
        }
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > 256 {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.delay > Duration::from_millis(MAX_DELAY_MS) {
            return Err(ConfigError::InvalidValue("delay must be <= 5000 ms"));
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(ConfigError::InvalidValue("error_rate must be in [0, 1]"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("queue_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
