//! Bug, performance, and structure scorers with weighted aggregation

use fir_common::config::AnalyzerSettings;
use fir_common::{Observation, Result, TraceData};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Log markers that indicate the target surfaced an error
const ERROR_MARKERS: &[&str] = &["ERROR", "FATAL", "CRITICAL", "PANIC", "EXCEPTION"];

/// Severity score with its per-axis breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityScore {
    pub total: f64,
    pub bug: f64,
    pub perf: f64,
    pub structure: f64,
}

/// Scores observations for one session
pub struct SeverityAnalyzer {
    settings: AnalyzerSettings,
    baseline_trace: Option<TraceData>,
}

impl SeverityAnalyzer {
    pub fn new(settings: AnalyzerSettings, baseline_trace: Option<TraceData>) -> Self {
        Self {
            settings,
            baseline_trace,
        }
    }

    /// Score one observation. Sub-scorer failures contribute 0.
    pub fn score(&self, observation: &Observation) -> SeverityScore {
        let bug = self.bug_score(observation).unwrap_or_else(|e| {
            warn!(error = %e, "bug scorer failed, contributing 0");
            0.0
        });
        let perf = self.perf_score(observation).unwrap_or_else(|e| {
            warn!(error = %e, "performance scorer failed, contributing 0");
            0.0
        });
        let structure = self.struct_score(observation).unwrap_or_else(|e| {
            warn!(error = %e, "structure scorer failed, contributing 0");
            0.0
        });

        let w_bug = self.settings.bug_weight;
        let w_perf = self.settings.perf_weight;
        let w_struct = self.settings.struct_weight;
        let weight_sum = w_bug + w_perf + w_struct;

        let total = if weight_sum <= 0.0 {
            0.0
        } else {
            ((w_bug * bug + w_perf * perf + w_struct * structure) / weight_sum).clamp(0.0, 10.0)
        };

        SeverityScore {
            total,
            bug,
            perf,
            structure,
        }
    }

    /// Discrete ladder over error signals; the highest matching rule wins
    fn bug_score(&self, observation: &Observation) -> Result<f64> {
        if let Some(code) = observation.status_code {
            if (500..=599).contains(&code) {
                return Ok(10.0);
            }
            if (400..=499).contains(&code) {
                return Ok(8.0);
            }
        }
        let has_error_log = observation
            .error_logs
            .iter()
            .any(|line| ERROR_MARKERS.iter().any(|marker| line.contains(marker)));
        if has_error_log {
            return Ok(6.0);
        }
        if observation.error_rate.map(|rate| rate > 0.0).unwrap_or(false) {
            return Ok(3.0);
        }
        Ok(0.0)
    }

    /// Linear latency degradation between baseline and threshold
    fn perf_score(&self, observation: &Observation) -> Result<f64> {
        let baseline = self.settings.baseline_ms;
        let threshold = self.settings.threshold_ms;
        if baseline <= 0.0 {
            return Ok(0.0);
        }
        let actual = match observation.latency_ms {
            Some(latency) => latency,
            None => return Ok(0.0),
        };
        if actual >= threshold {
            return Ok(10.0);
        }
        Ok(((actual - baseline) / (threshold - baseline) * 9.0).clamp(0.0, 10.0))
    }

    /// Structural divergence from the baseline trace: the strongest firing
    /// sub-signal wins, capped at 10
    fn struct_score(&self, observation: &Observation) -> Result<f64> {
        let baseline = match &self.baseline_trace {
            Some(trace) => trace,
            None => return Ok(0.0),
        };
        let current = match &observation.trace_data {
            Some(trace) => trace,
            None => return Ok(0.0),
        };

        let mut score = 0.0_f64;

        // span-count growth
        if baseline.span_count() >= 1
            && current.span_count() as f64 > 1.5 * baseline.span_count() as f64
        {
            score = score.max(3.0);
        }

        // operation-sequence change
        let distance =
            strsim::generic_levenshtein(&baseline.operation_names(), &current.operation_names());
        if distance > 2 {
            score = score.max(5.0);
        }

        // error spans
        if current.error_span_count() > 0 {
            score = score.max(2.0);
        }

        // per-operation latency spike
        let baseline_durations = max_duration_by_operation(baseline);
        let current_durations = max_duration_by_operation(current);
        for (operation, base_us) in &baseline_durations {
            if *base_us == 0 {
                continue;
            }
            if let Some(current_us) = current_durations.get(operation) {
                if *current_us as f64 / *base_us as f64 > 5.0 {
                    score = score.max(2.0);
                    break;
                }
            }
        }

        Ok(score.min(10.0))
    }
}

/// Worst-case duration per operation name; operations can repeat within a
/// trace
fn max_duration_by_operation(trace: &TraceData) -> HashMap<&str, u64> {
    let mut durations: HashMap<&str, u64> = HashMap::new();
    for span in &trace.spans {
        let entry = durations.entry(span.operation_name.as_str()).or_insert(0);
        *entry = (*entry).max(span.duration_us);
    }
    durations
}
