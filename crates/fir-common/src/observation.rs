//! Observations returned by the fault-execution service

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One span of a distributed trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub operation_name: String,
    /// Span duration in microseconds
    pub duration_us: u64,
    #[serde(default = "default_span_status")]
    pub status: String,
    /// Explicit error flag, set by tracers that do not use span status
    #[serde(default)]
    pub error: bool,
}

fn default_span_status() -> String {
    "unset".to_string()
}

impl Span {
    /// A span is an error span when it carries the explicit flag or a
    /// status outside {ok, unset}
    pub fn is_error(&self) -> bool {
        self.error || !matches!(self.status.as_str(), "ok" | "unset")
    }
}

/// Distributed trace attached to an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl TraceData {
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    pub fn error_span_count(&self) -> usize {
        self.spans.iter().filter(|s| s.is_error()).count()
    }

    /// Operation names in trace order
    pub fn operation_names(&self) -> Vec<&str> {
        self.spans.iter().map(|s| s.operation_name.as_str()).collect()
    }
}

/// What the target system looked like after one plan was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_data: Option<TraceData>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Reject empty or out-of-range observations. Called on every payload
    /// received from the executor before it reaches the analyzer.
    pub fn validate(&self) -> Result<()> {
        let empty = self.status_code.is_none()
            && self.latency_ms.is_none()
            && self.error_rate.is_none()
            && self.error_logs.is_empty()
            && self.trace_data.is_none();
        if empty {
            return Err(Error::Validation(
                "observation must carry at least one signal".to_string(),
            ));
        }
        if let Some(code) = self.status_code {
            if !(100..=599).contains(&code) {
                return Err(Error::Validation(format!(
                    "status_code {code} outside [100, 599]"
                )));
            }
        }
        if let Some(latency) = self.latency_ms {
            if !latency.is_finite() || latency < 0.0 {
                return Err(Error::Validation(format!(
                    "latency_ms {latency} must be non-negative"
                )));
            }
        }
        if let Some(rate) = self.error_rate {
            if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                return Err(Error::Validation(format!(
                    "error_rate {rate} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
