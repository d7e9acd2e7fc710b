//! HTTP client for the remote fault-execution service
//!
//! Sends fault plans to the executor and returns its observations, with
//! retry-plus-backoff on transient failures and a circuit breaker guarding
//! against a dead executor.

mod client;

pub use client::{ExecutorClient, FaultExecutor};
