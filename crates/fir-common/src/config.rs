//! Configuration management for the fault-injection recommender
//!
//! Defaults come from `Config::default()` and are overridden by environment
//! variables with the `FIR_` prefix and `__` as the nesting separator, e.g.
//! `FIR_SERVER__PORT=9090`, `FIR_EXECUTOR__HOST=executor.local`,
//! `FIR_ANALYZER__BUG_WEIGHT=2.0`, `FIR_LOG_LEVEL=debug`.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub optimizer: OptimizerConfig,
    pub analyzer: AnalyzerSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub storage: StorageConfig,
    pub log_level: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote fault-execution service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub host: String,
    pub port: u16,
    /// Per-attempt HTTP timeout
    pub timeout_secs: u64,
}

impl ExecutorConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Search-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Default trial budget when a session does not specify one
    pub max_trials: u32,
    /// Trials drawn uniformly before the surrogate takes over
    pub cold_start_trials: u32,
    /// Candidate points scored per surrogate-guided proposal
    pub candidate_count: u32,
    /// Trees in the surrogate ensemble
    pub trees: u32,
    /// Fixed RNG seed; when absent, each session derives one from its id
    pub seed: Option<u64>,
    /// Upper bound on one iteration, enforced as the executor call's total
    /// retry window
    pub iteration_timeout_secs: u64,
    /// Consecutive trials without an observation before the session fails
    pub max_transport_failures: u32,
}

/// Severity-analyzer weights and latency reference points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    pub baseline_ms: f64,
    pub threshold_ms: f64,
    pub bug_weight: f64,
    pub perf_weight: f64,
    pub struct_weight: f64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            baseline_ms: 100.0,
            threshold_ms: 500.0,
            bug_weight: 1.0,
            perf_weight: 1.0,
            struct_weight: 1.0,
        }
    }
}

/// Exponential backoff settings (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub jitter_percent: f64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_percent: self.jitter_percent,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Session persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            executor: ExecutorConfig {
                host: "localhost".to_string(),
                port: 8001,
                timeout_secs: 30,
            },
            optimizer: OptimizerConfig {
                max_trials: 100,
                cold_start_trials: 5,
                candidate_count: 1000,
                trees: 100,
                seed: None,
                iteration_timeout_secs: 600,
                max_transport_failures: 10,
            },
            analyzer: AnalyzerSettings::default(),
            retry: RetrySettings {
                base_delay_ms: 500,
                max_delay_ms: 8000,
                max_attempts: 5,
                jitter_percent: 10.0,
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
            },
            storage: StorageConfig {
                path: PathBuf::from(".sessions"),
            },
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults overlaid with `FIR_*` environment
    /// variables
    pub fn load() -> Result<Self> {
        let loaded: Config = config::Config::builder()
            .add_source(
                config::Config::try_from(&Config::default())
                    .map_err(|e| Error::Configuration(e.to_string()))?,
            )
            .add_source(
                config::Environment::with_prefix("FIR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations that would silently break the loop
    pub fn validate(&self) -> Result<()> {
        if self.analyzer.baseline_ms <= 0.0 {
            return Err(Error::Configuration(
                "analyzer.baseline_ms must be positive".to_string(),
            ));
        }
        if self.analyzer.threshold_ms <= self.analyzer.baseline_ms {
            return Err(Error::Configuration(format!(
                "analyzer.threshold_ms ({}) must exceed baseline_ms ({})",
                self.analyzer.threshold_ms, self.analyzer.baseline_ms
            )));
        }
        for (name, w) in [
            ("bug_weight", self.analyzer.bug_weight),
            ("perf_weight", self.analyzer.perf_weight),
            ("struct_weight", self.analyzer.struct_weight),
        ] {
            if w < 0.0 {
                return Err(Error::Configuration(format!(
                    "analyzer.{name} must be non-negative"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.retry.jitter_percent) {
            return Err(Error::Configuration(
                "retry.jitter_percent must be within [0, 100]".to_string(),
            ));
        }
        if self.optimizer.cold_start_trials == 0 {
            return Err(Error::Configuration(
                "optimizer.cold_start_trials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
