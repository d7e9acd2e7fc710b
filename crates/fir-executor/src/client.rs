//! Executor client with retry and circuit-breaker discipline

use async_trait::async_trait;
use fir_common::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Config, Error, FaultKind, FaultPlan,
    Observation, Result, RetryConfig,
};
use std::time::Duration;
use tracing::{debug, error, warn};

/// What the session worker needs from an executor. Implemented by the HTTP
/// client; test doubles implement it to drive the loop without a network.
#[async_trait]
pub trait FaultExecutor: Send + Sync {
    /// Apply a plan and collect the resulting observation. `None` means the
    /// attempt budget was exhausted, the failure was permanent, or the
    /// circuit is open.
    async fn apply(&self, plan: &FaultPlan) -> Option<Observation>;

    /// Whether the executor answers its health endpoint
    async fn health(&self) -> bool;
}

/// HTTP client for the fault-execution service
pub struct ExecutorClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    /// Bound on one `apply` call including all retries and backoff sleeps
    call_window: Duration,
}

impl ExecutorClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
        breaker_config: CircuitBreakerConfig,
        call_window: Duration,
    ) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("fir/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            retry,
            breaker: CircuitBreaker::new("executor", breaker_config),
            call_window,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.executor.base_url(),
            config.executor.timeout(),
            config.retry.to_retry_config(),
            config.circuit_breaker.to_breaker_config(),
            Duration::from_secs(config.optimizer.iteration_timeout_secs),
        )
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    async fn try_apply(&self, plan: &FaultPlan) -> Option<Observation> {
        let url = format!("{}/v1/policies", self.base_url);
        let policy = policy_body(plan);

        for attempt in 0..self.retry.max_attempts {
            debug!(attempt, url = %url, "applying fault policy");
            match self.client.post(&url).json(&policy).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<Observation>().await {
                            Ok(observation) => {
                                if let Err(e) = observation.validate() {
                                    warn!(error = %e, "executor returned an invalid observation");
                                    self.breaker.record_failure().await;
                                    return None;
                                }
                                self.breaker.record_success().await;
                                return Some(observation);
                            }
                            Err(e) => {
                                warn!(error = %e, "failed to parse executor response");
                                self.breaker.record_failure().await;
                                return None;
                            }
                        }
                    }

                    if status.is_server_error() {
                        warn!(%status, attempt, "executor returned a server error, retrying");
                        self.breaker.record_failure().await;
                        self.backoff(attempt).await;
                        continue;
                    }

                    // 4xx is permanent; do not retry
                    error!(%status, "executor rejected the policy");
                    self.breaker.record_failure().await;
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "executor request failed, retrying");
                    self.breaker.record_failure().await;
                    self.backoff(attempt).await;
                }
            }
        }

        error!(
            attempts = self.retry.max_attempts,
            "all executor attempts exhausted"
        );
        None
    }

    async fn backoff(&self, attempt: u32) {
        if attempt + 1 >= self.retry.max_attempts {
            return;
        }
        let delay = self.retry.backoff_delay(attempt, &mut rand::thread_rng());
        debug!(?delay, "backing off before retry");
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl FaultExecutor for ExecutorClient {
    async fn apply(&self, plan: &FaultPlan) -> Option<Observation> {
        if !self.breaker.can_attempt().await {
            error!("circuit breaker is open, refusing executor call");
            return None;
        }

        match tokio::time::timeout(self.call_window, self.try_apply(plan)).await {
            Ok(result) => result,
            Err(_) => {
                error!(window = ?self.call_window, "executor call window exceeded");
                self.breaker.record_failure().await;
                None
            }
        }
    }

    async fn health(&self) -> bool {
        let url = format!("{}/v1/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => {
                let healthy = response.status().is_success();
                if healthy {
                    self.breaker.record_success().await;
                } else {
                    self.breaker.record_failure().await;
                }
                healthy
            }
            Err(e) => {
                warn!(error = %e, "executor health check failed");
                self.breaker.record_failure().await;
                false
            }
        }
    }
}

/// Wire form of a plan for `POST /v1/policies`
fn policy_body(plan: &FaultPlan) -> serde_json::Value {
    let mut body = serde_json::json!({
        "service": plan.service,
        "fault_type": plan.kind.name(),
    });
    if let Some(duration) = plan.duration_ms {
        body["duration_ms"] = duration.into();
    }
    match &plan.kind {
        FaultKind::Delay { delay_ms } => {
            body["delay_ms"] = (*delay_ms).into();
        }
        FaultKind::Abort { abort_status } => {
            body["abort_probability"] = (plan.percentage as f64 / 100.0).into();
            body["error_code"] = (*abort_status).into();
        }
        FaultKind::ErrorInjection { error_code } => {
            body["abort_probability"] = (plan.percentage as f64 / 100.0).into();
            if let Some(code) = error_code {
                body["error_code"] = (*code).into();
            }
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_policy_carries_its_window_and_delay() {
        let plan = FaultPlan::new(
            "svc",
            "/v1/charge",
            50,
            Some(30_000),
            FaultKind::Delay { delay_ms: 500 },
        )
        .unwrap();
        let body = policy_body(&plan);
        assert_eq!(body["service"], "svc");
        assert_eq!(body["fault_type"], "delay");
        assert_eq!(body["duration_ms"], 30_000);
        assert_eq!(body["delay_ms"], 500);
        assert!(body.get("abort_probability").is_none());
    }

    #[test]
    fn abort_policy_derives_probability_from_percentage() {
        let plan = FaultPlan::new(
            "svc",
            "/",
            25,
            None,
            FaultKind::Abort { abort_status: 503 },
        )
        .unwrap();
        let body = policy_body(&plan);
        assert_eq!(body["fault_type"], "abort");
        assert_eq!(body["abort_probability"], 0.25);
        assert_eq!(body["error_code"], 503);
        assert!(body.get("delay_ms").is_none());
    }

    #[test]
    fn error_injection_policy_omits_an_absent_code() {
        let plan = FaultPlan::new(
            "svc",
            "/",
            100,
            None,
            FaultKind::ErrorInjection { error_code: None },
        )
        .unwrap();
        let body = policy_body(&plan);
        assert_eq!(body["fault_type"], "error_injection");
        assert!(body.get("error_code").is_none());
    }
}
