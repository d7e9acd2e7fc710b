//! Session coordinator: lifecycle, worker loop, cancellation
//!
//! Each session is driven by exactly one worker task. Within a worker the
//! loop is strictly sequential: propose, apply, score, record, persist.
//! Cancellation is cooperative and checked at iteration boundaries; an
//! in-flight executor call is never aborted.

use crate::api::CreateSessionRequest;
use dashmap::DashMap;
use fir_analyzer::SeverityAnalyzer;
use fir_common::{
    plan, Config, Error, FaultPlan, Result, SearchSpace, Session, SessionStatus, Trial,
};
use fir_executor::{ExecutorClient, FaultExecutor};
use fir_optimizer::{Proposer, ProposerConfig};
use fir_store::SessionStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builds one executor client per session so circuit-breaker state is never
/// shared across workers
pub type ExecutorFactory = Box<dyn Fn() -> Result<Arc<dyn FaultExecutor>> + Send + Sync>;

struct WorkerHandle {
    stop: Arc<AtomicBool>,
}

/// Owns session lifecycles and their worker tasks
pub struct SessionCoordinator {
    config: Arc<Config>,
    store: Arc<SessionStore>,
    executor_factory: ExecutorFactory,
    /// Dedicated client used by the health endpoint
    probe: Arc<dyn FaultExecutor>,
    workers: Arc<DashMap<String, WorkerHandle>>,
}

impl SessionCoordinator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<SessionStore>,
        executor_factory: ExecutorFactory,
        probe: Arc<dyn FaultExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            executor_factory,
            probe,
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Coordinator wired to the HTTP executor from configuration
    pub fn with_http_executor(config: Arc<Config>, store: Arc<SessionStore>) -> Result<Self> {
        let probe: Arc<dyn FaultExecutor> = Arc::new(ExecutorClient::from_config(&config)?);
        let factory_config = Arc::clone(&config);
        let factory: ExecutorFactory = Box::new(move || {
            ExecutorClient::from_config(&factory_config)
                .map(|client| Arc::new(client) as Arc<dyn FaultExecutor>)
        });
        Ok(Self::new(config, store, factory, probe))
    }

    /// Validate the request, persist the new session, and start its worker
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<Session> {
        if request.service_name.trim().is_empty() {
            return Err(Error::Validation("service_name must not be empty".to_string()));
        }
        if request.max_trials == 0 || request.max_trials > 10_000 {
            return Err(Error::Validation(format!(
                "max_trials {} outside [1, 10000]",
                request.max_trials
            )));
        }

        let space = SearchSpace::from_json_value(request.search_space_config)?;
        plan::validate_plan_space(&space)?;

        let session = Session::new(
            request.service_name,
            space,
            request.max_trials,
            self.config.analyzer.clone(),
            request.baseline_trace,
        );
        self.store.save(&session).await?;
        self.spawn_worker(&session)?;

        info!(id = %session.id, service = %session.service_name, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.store.get(id).await
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.store.list().await
    }

    /// Request cooperative cancellation. On a RUNNING session the stop flag
    /// is raised and the returned snapshot reports STOPPING; the worker
    /// performs the durable transition at its next iteration boundary. On
    /// any other status this is an idempotent no-op.
    pub async fn stop_session(&self, id: &str) -> Result<Session> {
        let mut session = self
            .store
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;

        if session.status == SessionStatus::Running {
            if let Some(handle) = self.workers.get(id) {
                handle.stop.store(true, Ordering::SeqCst);
            }
            session.begin_stopping()?;
            info!(id, "stop requested");
        } else {
            debug!(id, status = %session.status, "stop is a no-op");
        }
        Ok(session)
    }

    /// Whether the executor answers its health endpoint
    pub async fn executor_available(&self) -> bool {
        self.probe.health().await
    }

    /// Session counts by status, for the health endpoint
    pub async fn status_counts(&self) -> std::collections::HashMap<String, usize> {
        self.store.status_counts().await
    }

    /// Sessions loaded in a non-terminal state have no worker after a
    /// restart; mark them failed so their status is truthful.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let mut recovered = 0;
        for mut session in self.store.list().await {
            if !session.is_terminal() {
                warn!(id = %session.id, status = %session.status, "session interrupted by restart");
                session.fail("interrupted by restart")?;
                self.store.save(&session).await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn spawn_worker(&self, session: &Session) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let executor = (self.executor_factory)()?;
        self.workers.insert(
            session.id.clone(),
            WorkerHandle {
                stop: Arc::clone(&stop),
            },
        );

        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let workers = Arc::clone(&self.workers);
        let session_id = session.id.clone();
        tokio::spawn(async move {
            drive_session(&store, &config, executor.as_ref(), &stop, &session_id).await;
            workers.remove(&session_id);
        });
        Ok(())
    }
}

/// Run one session to a terminal state, converting any uncaught error into
/// a FAILED transition
async fn drive_session(
    store: &SessionStore,
    config: &Config,
    executor: &dyn FaultExecutor,
    stop: &AtomicBool,
    session_id: &str,
) {
    let mut session = match store.get(session_id).await {
        Some(session) => session,
        None => {
            error!(id = session_id, "worker started for an unknown session");
            return;
        }
    };

    if let Err(e) = run_loop(&mut session, store, config, executor, stop).await {
        error!(id = session_id, error = %e, "session failed");
        if !session.is_terminal() {
            if let Err(transition) = session.fail(e.to_string()) {
                error!(id = session_id, error = %transition, "could not mark session failed");
            }
        }
        save_or_warn(store, &session).await;
    }
}

async fn run_loop(
    session: &mut Session,
    store: &SessionStore,
    config: &Config,
    executor: &dyn FaultExecutor,
    stop: &AtomicBool,
) -> Result<()> {
    let optimizer = &config.optimizer;
    let seed = optimizer
        .seed
        .unwrap_or_else(|| ProposerConfig::seed_for_session(&session.id));
    let mut proposer = Proposer::new(
        session.search_space.clone(),
        ProposerConfig {
            cold_start_trials: optimizer.cold_start_trials,
            candidate_count: optimizer.candidate_count,
            trees: optimizer.trees,
            xi: 0.01,
            seed,
        },
    )?;
    let analyzer = SeverityAnalyzer::new(session.analyzer.clone(), session.baseline_trace.clone());

    session.start()?;
    save_or_warn(store, session).await;
    info!(id = %session.id, max_trials = session.max_trials, "session running");

    let mut consecutive_transport_failures = 0u32;
    let mut trial_id: u32 = 0;
    while trial_id < session.max_trials {
        if stop.load(Ordering::SeqCst) {
            info!(id = %session.id, "stop flag seen at iteration boundary");
            break;
        }

        let params = proposer.propose()?;
        let plan = FaultPlan::from_params(&session.service_name, &params)?;
        debug!(id = %session.id, trial_id, ?plan, "proposed plan");

        let observation = match executor.apply(&plan).await {
            Some(observation) => observation,
            None => {
                consecutive_transport_failures += 1;
                warn!(
                    id = %session.id,
                    failures = consecutive_transport_failures,
                    "iteration yielded no observation"
                );
                if consecutive_transport_failures >= optimizer.max_transport_failures {
                    return Err(Error::Network(format!(
                        "executor unavailable after {consecutive_transport_failures} consecutive transport failures"
                    )));
                }
                // no trial is recorded and the counter does not advance
                continue;
            }
        };
        consecutive_transport_failures = 0;

        let severity = analyzer.score(&observation);
        info!(
            id = %session.id,
            trial_id,
            score = severity.total,
            bug = severity.bug,
            perf = severity.perf,
            structure = severity.structure,
            "trial scored"
        );

        // keep the durable status monotone when a stop raced this iteration
        if stop.load(Ordering::SeqCst) && session.status == SessionStatus::Running {
            session.begin_stopping()?;
        }
        session.add_trial(Trial::completed(trial_id, plan.clone(), observation, severity.total))?;
        proposer.record(&plan, severity.total)?;
        save_or_warn(store, session).await;
        trial_id += 1;
    }

    if session.status == SessionStatus::Running && stop.load(Ordering::SeqCst) {
        session.begin_stopping()?;
        save_or_warn(store, session).await;
    }
    session.complete()?;
    save_or_warn(store, session).await;
    info!(
        id = %session.id,
        trials = session.trials_completed(),
        best_score = session.best_score(),
        "session completed"
    );
    Ok(())
}

/// A failed save leaves durability uncertain but never crashes the worker
async fn save_or_warn(store: &SessionStore, session: &Session) {
    if let Err(e) = store.save(session).await {
        error!(id = %session.id, error = %e, "failed to persist session snapshot");
    }
}
