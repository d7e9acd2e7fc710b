//! Request and response models for the HTTP boundary

use chrono::Utc;
use fir_common::{FaultPlan, Session, TraceData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to create an optimization session
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub service_name: String,
    /// Search-space definition (dimensions, constraints)
    pub search_space_config: serde_json::Value,
    #[serde(default = "default_max_trials")]
    pub max_trials: u32,
    /// Reference trace for structural severity scoring
    #[serde(default)]
    pub baseline_trace: Option<TraceData>,
}

fn default_max_trials() -> u32 {
    100
}

/// Session status as exposed over the API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub id: String,
    pub service_name: String,
    pub status: String,
    pub trials_completed: u32,
    pub max_trials: u32,
    pub progress_percent: f64,
    pub best_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_fault: Option<FaultPlan>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Session> for SessionStatusResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            service_name: session.service_name.clone(),
            status: session.status.to_string(),
            trials_completed: session.trials_completed(),
            max_trials: session.max_trials,
            progress_percent: session.progress_percent(),
            best_score: session.best_score(),
            best_fault: session.best_result.as_ref().map(|b| b.plan.clone()),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

/// Request to stop a session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopSessionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Acknowledgement of a stop request
#[derive(Debug, Clone, Serialize)]
pub struct StopSessionResponse {
    pub id: String,
    pub status: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: String,
    pub executor_available: bool,
    pub details: HashMap<String, serde_json::Value>,
}

/// Structured error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
