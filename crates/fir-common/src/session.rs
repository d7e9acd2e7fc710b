//! Optimization sessions and trials

use crate::config::AnalyzerSettings;
use crate::error::{Error, Result};
use crate::observation::{Observation, TraceData};
use crate::plan::FaultPlan;
use crate::space::SearchSpace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Pending,
    Running,
    Stopping,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Stopping => "STOPPING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tag for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    TransportFailed,
}

/// One (plan, observation, score) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub trial_id: u32,
    pub plan: FaultPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: TrialStatus,
}

impl Trial {
    pub fn completed(trial_id: u32, plan: FaultPlan, observation: Observation, score: f64) -> Self {
        Self {
            trial_id,
            plan,
            observation: Some(observation),
            severity_score: Some(score),
            timestamp: Utc::now(),
            status: TrialStatus::Completed,
        }
    }
}

/// Best-scoring plan found so far; a value copy, never a back-reference
/// into the trial list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub plan: FaultPlan,
    pub severity_score: f64,
    pub trial_id: u32,
    pub timestamp: DateTime<Utc>,
}

/// The top-level unit of work: one target service, one frozen search
/// space, one budget-limited trial sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub service_name: String,
    pub status: SessionStatus,
    pub search_space: SearchSpace,
    pub max_trials: u32,
    /// Per-session scoring parameters, frozen at creation
    pub analyzer: AnalyzerSettings,
    /// Reference trace for structural comparison, when the caller has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_trace: Option<TraceData>,
    #[serde(default)]
    pub trials: Vec<Trial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_result: Option<BestResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Session {
    pub fn new(
        service_name: impl Into<String>,
        search_space: SearchSpace,
        max_trials: u32,
        analyzer: AnalyzerSettings,
        baseline_trace: Option<TraceData>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            status: SessionStatus::Pending,
            search_space,
            max_trials,
            analyzer,
            baseline_trace,
            trials: Vec::new(),
            best_result: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    pub fn trials_completed(&self) -> u32 {
        self.trials.len() as u32
    }

    pub fn best_score(&self) -> f64 {
        self.best_result
            .as_ref()
            .map(|b| b.severity_score)
            .unwrap_or(0.0)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.max_trials == 0 {
            return 0.0;
        }
        (self.trials_completed() as f64 / self.max_trials as f64 * 100.0).min(100.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append the next trial. Trial ids must stay contiguous from zero.
    pub fn add_trial(&mut self, trial: Trial) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::Session(format!(
                "session {} is {} and accepts no more trials",
                self.id, self.status
            )));
        }
        if trial.trial_id != self.trials_completed() {
            return Err(Error::Session(format!(
                "trial id {} out of order, expected {}",
                trial.trial_id,
                self.trials_completed()
            )));
        }

        if let Some(score) = trial.severity_score {
            let improved = self
                .best_result
                .as_ref()
                .map(|best| score > best.severity_score)
                .unwrap_or(true);
            if improved {
                self.best_result = Some(BestResult {
                    plan: trial.plan.clone(),
                    severity_score: score,
                    trial_id: trial.trial_id,
                    timestamp: trial.timestamp,
                });
            }
        }

        self.trials.push(trial);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PENDING -> RUNNING
    pub fn start(&mut self) -> Result<()> {
        if self.status != SessionStatus::Pending {
            return Err(self.illegal_transition("RUNNING"));
        }
        self.status = SessionStatus::Running;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// RUNNING -> STOPPING
    pub fn begin_stopping(&mut self) -> Result<()> {
        if self.status != SessionStatus::Running {
            return Err(self.illegal_transition("STOPPING"));
        }
        self.status = SessionStatus::Stopping;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// RUNNING | STOPPING -> COMPLETED
    pub fn complete(&mut self) -> Result<()> {
        if !matches!(self.status, SessionStatus::Running | SessionStatus::Stopping) {
            return Err(self.illegal_transition("COMPLETED"));
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Any non-terminal state -> FAILED
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.is_terminal() {
            return Err(self.illegal_transition("FAILED"));
        }
        self.status = SessionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn illegal_transition(&self, target: &str) -> Error {
        Error::Session(format!(
            "illegal transition {} -> {} for session {}",
            self.status, target, self.id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FaultKind;
    use assert_matches::assert_matches;

    fn session(max_trials: u32) -> Session {
        Session::new("svc", space(), max_trials, AnalyzerSettings::default(), None)
    }

    fn space() -> SearchSpace {
        SearchSpace::from_json_value(serde_json::json!({
            "name": "s",
            "dimensions": [
                {"name": "percentage", "type": "integer", "bounds": [1, 100], "default": 50}
            ]
        }))
        .unwrap()
    }

    fn plan() -> FaultPlan {
        FaultPlan::new("svc", "/", 50, None, FaultKind::Delay { delay_ms: 100 }).unwrap()
    }

    fn trial(id: u32, score: f64) -> Trial {
        Trial::completed(
            id,
            plan(),
            Observation {
                status_code: Some(200),
                latency_ms: Some(100.0),
                error_rate: None,
                error_logs: Vec::new(),
                trace_data: None,
                timestamp: Utc::now(),
            },
            score,
        )
    }

    #[test]
    fn lifecycle_follows_the_state_machine() {
        let mut session = session(10);
        assert_eq!(session.status, SessionStatus::Pending);

        session.start().unwrap();
        assert_eq!(session.status, SessionStatus::Running);

        session.begin_stopping().unwrap();
        session.complete().unwrap();
        assert!(session.is_terminal());
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn illegal_transitions_fail_loudly() {
        let mut session = session(10);
        assert_matches!(session.begin_stopping(), Err(Error::Session(_)));
        assert_matches!(session.complete(), Err(Error::Session(_)));

        session.start().unwrap();
        assert_matches!(session.start(), Err(Error::Session(_)));

        session.complete().unwrap();
        assert_matches!(session.fail("late"), Err(Error::Session(_)));
    }

    #[test]
    fn fail_records_the_reason_from_any_live_state() {
        let mut session = session(10);
        session.fail("proposer blew up").unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure_reason.as_deref(), Some("proposer blew up"));
    }

    #[test]
    fn trial_ids_must_stay_contiguous() {
        let mut session = session(10);
        session.start().unwrap();

        session.add_trial(trial(0, 1.0)).unwrap();
        assert_matches!(session.add_trial(trial(2, 1.0)), Err(Error::Session(_)));
        session.add_trial(trial(1, 2.0)).unwrap();
        assert_eq!(session.trials_completed(), 2);
    }

    #[test]
    fn best_score_is_monotonically_non_decreasing() {
        let mut session = session(10);
        session.start().unwrap();

        let scores = [2.0, 7.5, 3.0, 7.5, 9.0, 1.0];
        let mut previous_best = 0.0;
        for (id, score) in scores.iter().enumerate() {
            session.add_trial(trial(id as u32, *score)).unwrap();
            assert!(session.best_score() >= previous_best);
            previous_best = session.best_score();
        }
        assert_eq!(session.best_score(), 9.0);
        assert_eq!(session.best_result.as_ref().unwrap().trial_id, 4);
    }

    #[test]
    fn terminal_sessions_accept_no_more_trials() {
        let mut session = session(10);
        session.start().unwrap();
        session.complete().unwrap();
        assert_matches!(session.add_trial(trial(0, 1.0)), Err(Error::Session(_)));
    }

    #[test]
    fn progress_tracks_the_trial_budget() {
        let mut session = session(4);
        session.start().unwrap();
        assert_eq!(session.progress_percent(), 0.0);
        session.add_trial(trial(0, 1.0)).unwrap();
        assert_eq!(session.progress_percent(), 25.0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut session = session(10);
        session.start().unwrap();
        session.add_trial(trial(0, 5.5)).unwrap();

        let json = serde_json::to_string_pretty(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
