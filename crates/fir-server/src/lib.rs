//! HTTP boundary and session coordinator for the fault-injection
//! recommender
//!
//! This crate wires the proposer, analyzer, executor client, and session
//! store into per-session worker loops and exposes the REST API that
//! creates, inspects, and stops sessions.

pub mod api;
pub mod coordinator;
pub mod handlers;
pub mod server;

pub use coordinator::{ExecutorFactory, SessionCoordinator};
pub use server::Server;
