//! Common types and utilities for the fault-injection recommender
//!
//! This crate provides the shared domain model (fault plans, observations,
//! sessions, search spaces), the configuration surface, and the transport
//! resilience primitives used across all components of the system.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod observation;
pub mod plan;
pub mod retry;
pub mod session;
pub mod space;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::Config;
pub use error::{Error, Result};
pub use observation::{Observation, Span, TraceData};
pub use plan::{FaultKind, FaultPlan, ParamValue, PlanParams};
pub use retry::RetryConfig;
pub use session::{BestResult, Session, SessionStatus, Trial, TrialStatus};
pub use space::{Condition, Dimension, Point, SearchSpace};
