//! Concurrency-bounded scheduler.
//!
//! The scheduler keeps up to `max_concurrent` analysis calls outstanding and
//! drains the job queue without external polling:
//!
//! ```text
//!  submit ──► JobStore queue ──tick()──► spawned analysis task
//!                  ▲                              │
//!                  │                              ▼
//!                tick() ◄── apply() ◄── Settlement channel ◄── SettlementLoop
//! ```
//!
//! All store mutations happen synchronously under one lock that is never
//! held across an `.await`. Suspension only happens inside the analysis call.
//! Every settlement is a message handled by [`SettlementLoop`], which applies
//! the terminal transition and runs the next admission step.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::analysis::{AnalysisClient, AnalysisError};
use super::export;
use super::store::{Admission, JobStore, StoreError};
use crate::config::AppConfig;
use crate::models::job::{JobId, JobStatus, JobSummary, NewImage, Transition};
use crate::models::metadata::StockMetadata;
use crate::models::stats::QueueStats;

/// Default ceiling on simultaneous analysis calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    /// Watchdog applied to each analysis call. `None` waits forever.
    pub analysis_timeout: Option<Duration>,
    /// Admit new work as soon as a batch is submitted.
    pub auto_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            analysis_timeout: Some(Duration::from_secs(120)),
            auto_start: true,
        }
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_requests,
            analysis_timeout: config.analysis_timeout(),
            auto_start: config.auto_start,
        }
    }
}

/// Whether any analysis call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// Outcome of one analysis call, routed back to the scheduler.
#[derive(Debug)]
pub struct Settlement {
    pub job_id: JobId,
    pub outcome: Result<StockMetadata, AnalysisError>,
    pub elapsed: Duration,
}

/// Handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Mutex<JobStore>,
    client: Arc<dyn AnalysisClient>,
    config: SchedulerConfig,
    settlement_tx: mpsc::UnboundedSender<Settlement>,
    drained_tx: watch::Sender<bool>,
}

/// Receives settlements and feeds them back into the scheduler.
pub struct SettlementLoop {
    scheduler: Scheduler,
    settlement_rx: mpsc::UnboundedReceiver<Settlement>,
}

impl Scheduler {
    /// Creates a scheduler around an empty store.
    ///
    /// The returned [`SettlementLoop`] must be driven (usually with
    /// [`SettlementLoop::run`] on its own task) for settled jobs to leave the
    /// in-flight state.
    pub fn new(config: SchedulerConfig, client: Arc<dyn AnalysisClient>) -> (Self, SettlementLoop) {
        let (settlement_tx, settlement_rx) = mpsc::unbounded_channel();
        let (drained_tx, _) = watch::channel(true);

        let config = SchedulerConfig {
            max_concurrent: config.max_concurrent.max(1),
            ..config
        };

        let scheduler = Self {
            inner: Arc::new(Inner {
                store: Mutex::new(JobStore::new()),
                client,
                config,
                settlement_tx,
                drained_tx,
            }),
        };

        let settlement_loop = SettlementLoop {
            scheduler: scheduler.clone(),
            settlement_rx,
        };
        (scheduler, settlement_loop)
    }

    fn store(&self) -> MutexGuard<'_, JobStore> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Enqueues a batch. Admits work right away when auto-start is on.
    pub fn submit(&self, images: Vec<NewImage>) -> Vec<JobSummary> {
        let created = {
            let mut store = self.store();
            let created = store.submit(images);
            self.publish(&store);
            created
        };

        metrics::counter!("stockmeta_jobs_submitted_total").increment(created.len() as u64);
        tracing::info!(count = created.len(), "Batch submitted");

        if self.inner.config.auto_start {
            self.tick();
        }
        created
    }

    /// Starts processing queued work. Same as [`Scheduler::tick`].
    pub fn start(&self) -> usize {
        self.tick()
    }

    /// Admits queued jobs until the ceiling is reached or the queue is empty.
    ///
    /// Safe to call any number of times: each admission pops the queue and
    /// bumps the in-flight count in one locked step. Returns how many jobs
    /// were admitted by this call.
    pub fn tick(&self) -> usize {
        let admissions = {
            let mut store = self.store();
            let mut admissions = Vec::new();

            while store.in_flight() < self.inner.config.max_concurrent {
                match store.admit_next() {
                    Some(admission) => admissions.push(admission),
                    None => break,
                }
            }

            self.publish(&store);
            admissions
        };

        let admitted = admissions.len();
        for admission in admissions {
            self.spawn_analysis(admission);
        }
        admitted
    }

    fn spawn_analysis(&self, admission: Admission) {
        let Admission {
            job_id,
            filename,
            payload,
        } = admission;
        let client = Arc::clone(&self.inner.client);
        let settlement_tx = self.inner.settlement_tx.clone();
        let timeout = self.inner.config.analysis_timeout;

        tracing::debug!(job_id = %job_id, filename = %filename, bytes = payload.len(), "Admitted job");

        let span = tracing::info_span!("analysis", job_id = %job_id);
        tokio::spawn(
            async move {
                let start = Instant::now();
                let call = client.analyze(&payload);
                let outcome = match timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or_else(|_| Err(AnalysisError::Timeout(limit))),
                    None => call.await,
                };

                let settlement = Settlement {
                    job_id,
                    outcome,
                    elapsed: start.elapsed(),
                };
                if settlement_tx.send(settlement).is_err() {
                    tracing::debug!("Settlement loop closed, dropping result");
                }
            }
            .instrument(span),
        );
    }

    /// Applies a settlement and backfills the freed slot.
    ///
    /// Returns the job's new status, or `None` when the settlement was stale
    /// (the job was cleared) or rejected by the state machine.
    pub fn apply(&self, settlement: Settlement) -> Option<JobStatus> {
        let Settlement {
            job_id,
            outcome,
            elapsed,
        } = settlement;

        let transition = match outcome {
            Ok(meta) => Transition::Complete(meta),
            Err(e) => Transition::Fail(e.to_string()),
        };
        let target = transition.target();

        let applied = {
            let mut store = self.store();
            let result = store.transition(job_id, transition);
            self.publish(&store);
            result
        };

        let status = match applied {
            Ok(_) => {
                metrics::histogram!("stockmeta_analysis_seconds").record(elapsed.as_secs_f64());
                record_settlement(job_id, target, elapsed);
                Some(target)
            }
            Err(StoreError::UnknownJob(_)) => {
                tracing::debug!(job_id = %job_id, "Discarding stale settlement");
                None
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Settlement rejected by state machine");
                None
            }
        };

        self.tick();
        status
    }

    /// Discards every job. Settlements still in flight become stale.
    pub fn clear(&self) -> usize {
        let mut store = self.store();
        let discarded = store.clear();
        self.publish(&store);
        discarded
    }

    fn publish(&self, store: &JobStore) {
        let drained = store.is_drained();
        self.inner.drained_tx.send_if_modified(|current| {
            let changed = *current != drained;
            *current = drained;
            changed
        });

        metrics::gauge!("stockmeta_queue_depth").set(store.queue_depth() as f64);
        metrics::gauge!("stockmeta_jobs_in_flight").set(store.in_flight() as f64);
    }

    pub fn is_drained(&self) -> bool {
        self.store().is_drained()
    }

    /// Watch channel that holds `true` while nothing is queued or in flight.
    pub fn subscribe_drained(&self) -> watch::Receiver<bool> {
        self.inner.drained_tx.subscribe()
    }

    /// Resolves once the queue is empty and nothing is in flight.
    pub async fn wait_drained(&self) {
        let mut drained = self.subscribe_drained();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = drained.wait_for(|drained| *drained).await;
    }

    pub fn run_state(&self) -> RunState {
        if self.store().in_flight() > 0 {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.store().stats()
    }

    pub fn queue_depth(&self) -> usize {
        self.store().queue_depth()
    }

    pub fn in_flight(&self) -> usize {
        self.store().in_flight()
    }

    pub fn jobs(&self) -> Vec<JobSummary> {
        self.store().jobs().map(|job| job.summary()).collect()
    }

    /// Queued job ids in admission order.
    pub fn queued(&self) -> Vec<JobId> {
        self.store().queued().collect()
    }

    pub fn job(&self, job_id: JobId) -> Option<JobSummary> {
        self.store().get(job_id).map(|job| job.summary())
    }

    pub fn preview(&self, job_id: JobId) -> Option<Arc<[u8]>> {
        self.store().get(job_id).and_then(|job| job.preview().png())
    }

    /// Renders every job as marketplace CSV.
    pub fn export_csv(&self) -> String {
        export::to_csv(self.store().jobs())
    }
}

fn record_settlement(job_id: JobId, status: JobStatus, elapsed: Duration) {
    match status {
        JobStatus::Completed => {
            metrics::counter!("stockmeta_jobs_completed_total").increment(1);
            tracing::info!(
                job_id = %job_id,
                duration_ms = elapsed.as_millis() as u64,
                "Job completed"
            );
        }
        _ => {
            metrics::counter!("stockmeta_jobs_failed_total").increment(1);
            tracing::warn!(
                job_id = %job_id,
                duration_ms = elapsed.as_millis() as u64,
                "Job failed"
            );
        }
    }
}

impl SettlementLoop {
    /// Applies settlements until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            max_concurrent = self.scheduler.inner.config.max_concurrent,
            "Settlement loop started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Settlement loop shutting down");
                    break;
                }

                settlement = self.settlement_rx.recv() => match settlement {
                    Some(settlement) => {
                        self.scheduler.apply(settlement);
                    }
                    None => break,
                },
            }
        }
    }

    /// Waits for the next settlement without applying it.
    pub async fn next(&mut self) -> Option<Settlement> {
        self.settlement_rx.recv().await
    }

    /// Waits for the next settlement and applies it.
    pub async fn step(&mut self) -> Option<JobStatus> {
        let settlement = self.next().await?;
        self.scheduler.apply(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::ImagePayload;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl AnalysisClient for EchoClient {
        async fn analyze(&self, image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
            if image.bytes.starts_with(b"fail") {
                return Err(AnalysisError::Rejected("model refused".to_string()));
            }
            Ok(StockMetadata {
                title: String::from_utf8_lossy(&image.bytes).into_owned(),
                tags: vec!["echo".to_string()],
            })
        }
    }

    struct StalledClient;

    #[async_trait]
    impl AnalysisClient for StalledClient {
        async fn analyze(&self, _image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
            std::future::pending::<Result<StockMetadata, AnalysisError>>().await
        }
    }

    fn images(names: &[&str]) -> Vec<NewImage> {
        names
            .iter()
            .map(|name| NewImage::without_preview(*name, "image/png", name.as_bytes().to_vec()))
            .collect()
    }

    fn config(max_concurrent: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent,
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_submit_admits_up_to_ceiling() {
        let (scheduler, _loop) = Scheduler::new(config(2), Arc::new(EchoClient));
        scheduler.submit(images(&["a", "b", "c"]));

        assert_eq!(scheduler.in_flight(), 2);
        assert_eq!(scheduler.queue_depth(), 1);
        assert_eq!(scheduler.run_state(), RunState::Running);
        assert!(!scheduler.is_drained());
    }

    #[tokio::test]
    async fn test_redundant_ticks_admit_nothing() {
        let (scheduler, _loop) = Scheduler::new(config(2), Arc::new(EchoClient));
        scheduler.submit(images(&["a", "b", "c"]));

        assert_eq!(scheduler.tick(), 0);
        assert_eq!(scheduler.tick(), 0);
        assert_eq!(scheduler.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_step_settles_and_backfills() {
        let (scheduler, mut settlements) = Scheduler::new(config(1), Arc::new(EchoClient));
        scheduler.submit(images(&["a", "fail-b"]));

        assert_eq!(settlements.step().await, Some(JobStatus::Completed));
        assert_eq!(scheduler.in_flight(), 1);
        assert_eq!(settlements.step().await, Some(JobStatus::Failed));
        assert!(scheduler.is_drained());
        assert_eq!(scheduler.run_state(), RunState::Idle);

        let jobs = scheduler.jobs();
        assert_eq!(jobs[0].title.as_deref(), Some("a"));
        assert_eq!(jobs[1].error.as_deref(), Some("model refused"));
    }

    #[tokio::test]
    async fn test_manual_start_when_auto_start_off() {
        let config = SchedulerConfig {
            auto_start: false,
            ..config(3)
        };
        let (scheduler, _loop) = Scheduler::new(config, Arc::new(EchoClient));
        scheduler.submit(images(&["a", "b"]));

        assert_eq!(scheduler.in_flight(), 0);
        assert_eq!(scheduler.queue_depth(), 2);
        assert!(!scheduler.is_drained());
        assert_eq!(scheduler.run_state(), RunState::Idle);

        assert_eq!(scheduler.start(), 2);
        assert_eq!(scheduler.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_watchdog_fails_stalled_call() {
        let config = SchedulerConfig {
            analysis_timeout: Some(Duration::from_millis(20)),
            ..config(1)
        };
        let (scheduler, mut settlements) = Scheduler::new(config, Arc::new(StalledClient));
        let created = scheduler.submit(images(&["slow"]));

        assert_eq!(settlements.step().await, Some(JobStatus::Failed));
        let job = scheduler.job(created[0].id).unwrap();
        assert_eq!(job.error.as_deref(), Some("Analysis timed out after 20ms"));
        assert!(scheduler.is_drained());
    }

    #[tokio::test]
    async fn test_stale_settlement_after_clear() {
        let (scheduler, mut settlements) = Scheduler::new(config(3), Arc::new(EchoClient));
        scheduler.submit(images(&["a", "b"]));
        assert_eq!(scheduler.clear(), 2);
        assert!(scheduler.is_drained());

        assert_eq!(settlements.step().await, None);
        assert_eq!(settlements.step().await, None);
        assert!(scheduler.jobs().is_empty());
        assert_eq!(scheduler.stats(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_ceiling_of_zero_is_raised_to_one() {
        let (scheduler, _loop) = Scheduler::new(config(0), Arc::new(EchoClient));
        scheduler.submit(images(&["a", "b"]));
        assert_eq!(scheduler.in_flight(), 1);
    }
}
