use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::services::clock::Clock;

/// Upper bound on a single sleep so wall-clock jumps are noticed.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Callback invoked when a deferred job comes due.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: &str);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job {0} is already scheduled")]
    Duplicate(String),

    #[error("job runner is shut down")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub id: String,
    pub fire_at: NaiveDateTime,
}

struct ScheduledJob {
    fire_at: NaiveDateTime,
    payload: String,
    handler: Arc<dyn JobHandler>,
}

/// In-memory one-shot job schedule driven by a single background task.
///
/// Jobs are keyed by id, so at most one job per id is pending. Nothing is
/// persisted: pending jobs are lost when the process exits.
pub struct JobRunner {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    wake: Notify,
    stopped: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            clock,
        })
    }

    /// Registers a one-shot job. An existing job with the same id is left
    /// untouched and `JobError::Duplicate` is returned.
    pub fn schedule(
        &self,
        id: impl Into<String>,
        fire_at: NaiveDateTime,
        payload: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), JobError> {
        let id = id.into();
        {
            let mut jobs = self.jobs.lock().unwrap();
            // Checked under the lock so a concurrent shutdown can't miss the insert.
            if self.stopped.load(Ordering::SeqCst) {
                return Err(JobError::Unavailable);
            }
            if jobs.contains_key(&id) {
                return Err(JobError::Duplicate(id));
            }
            jobs.insert(
                id.clone(),
                ScheduledJob {
                    fire_at,
                    payload: payload.into(),
                    handler,
                },
            );
        }

        tracing::debug!(job_id = %id, fire_at = %fire_at, "job scheduled");
        self.wake.notify_one();
        Ok(())
    }

    /// Removes a pending job. Returns false if it was absent or already fired.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.jobs.lock().unwrap().remove(id).is_some();
        if removed {
            tracing::debug!(job_id = %id, "job cancelled");
            self.wake.notify_one();
        }
        removed
    }

    pub fn pending(&self) -> Vec<PendingJob> {
        let jobs = self.jobs.lock().unwrap();
        let mut pending: Vec<PendingJob> = jobs
            .iter()
            .map(|(id, job)| PendingJob {
                id: id.clone(),
                fire_at: job.fire_at,
            })
            .collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(id)
    }

    /// Stops the background loop and drops every pending job.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let dropped = {
            let mut jobs = self.jobs.lock().unwrap();
            let n = jobs.len();
            jobs.clear();
            n
        };
        if dropped > 0 {
            tracing::warn!(dropped, "job runner shut down with pending jobs");
        }
        self.wake.notify_one();
    }

    /// Starts the background loop. Call once per runner.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.run_loop().await })
    }

    async fn run_loop(self: Arc<Self>) {
        tracing::info!("job runner started");

        while !self.stopped.load(Ordering::SeqCst) {
            let now = self.clock.now();
            let (due, next) = self.take_due(now);

            for (id, job) in due {
                fire(id, job);
            }

            match next {
                Some(fire_at) => {
                    let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }

        tracing::info!("job runner stopped");
    }

    /// Removes and returns every job due at `now`, plus the earliest fire
    /// time still pending.
    fn take_due(&self, now: NaiveDateTime) -> (Vec<(String, ScheduledJob)>, Option<NaiveDateTime>) {
        let mut jobs = self.jobs.lock().unwrap();

        let due_ids: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.fire_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut due: Vec<(String, ScheduledJob)> = due_ids
            .into_iter()
            .filter_map(|id| jobs.remove(&id).map(|job| (id, job)))
            .collect();
        due.sort_by(|a, b| a.1.fire_at.cmp(&b.1.fire_at));

        let next = jobs.values().map(|job| job.fire_at).min();
        (due, next)
    }
}

/// Runs the handler on its own task so a panicking or slow job can't stall
/// the loop.
fn fire(id: String, job: ScheduledJob) {
    tracing::info!(job_id = %id, fire_at = %job.fire_at, "firing job");

    let ScheduledJob {
        payload, handler, ..
    } = job;
    let task = tokio::spawn(async move { handler.run(&payload).await });

    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(job_id = %id, error = %e, "job handler aborted");
        }
    });
}
