//! Queue consumers: claim → browser session → fill → record result.
//!
//! Nothing raised while processing a task escapes the loop; every failure
//! ends up as a `failed` task with a structured cause.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::apply::filler::FormFiller;
use crate::apply::session::{SessionError, SessionManager, SessionProvider};
use crate::models::application::{
    ApplicationTask, FailureCause, FailureStage, TaskResult, TaskStatus,
};
use crate::queue::store::{Completion, StoreError, TaskStore};

pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Leases are renewed this many times per lease period while a task runs.
const RENEWALS_PER_LEASE: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// How long a claimed task stays invisible to other consumers without a
    /// renewal. Renewed while the task runs.
    pub lease: Duration,
    /// Sleep between claim attempts when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct QueueConsumer<S> {
    store: Arc<dyn TaskStore>,
    sessions: Arc<SessionManager<S>>,
    filler: Arc<FormFiller>,
    settings: ConsumerSettings,
}

impl<S> Clone for QueueConsumer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            filler: self.filler.clone(),
            settings: self.settings,
        }
    }
}

impl<S: SessionProvider> QueueConsumer<S> {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sessions: Arc<SessionManager<S>>,
        filler: Arc<FormFiller>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            filler,
            settings,
        }
    }

    /// Claims and fully processes one task. `None` when nothing is claimable.
    pub async fn process_next(&self) -> Result<Option<(Uuid, TaskStatus)>, StoreError> {
        let Some(task) = self.store.claim_next(self.settings.lease).await? else {
            return Ok(None);
        };
        let task_id = task.id;
        info!(
            "Processing task {task_id} (attempt {}, batch member: {})",
            task.attempts, task.is_batch_member
        );

        let attempt = task.attempts;
        let result = self.process_leased(task).await;
        let status = result.status();
        match self.store.complete(task_id, attempt, &result).await? {
            Completion::Recorded => info!("Task {task_id} finished: {status}"),
            Completion::Ignored => warn!(
                "Task {task_id} attempt {attempt} no longer holds the claim; result dropped"
            ),
        }
        Ok(Some((task_id, status)))
    }

    /// Runs `process` while renewing the task's lease in the background.
    async fn process_leased(&self, task: ApplicationTask) -> TaskResult {
        let (task_id, attempt) = (task.id, task.attempts);
        let lease = self.settings.lease;
        let every = (lease / RENEWALS_PER_LEASE).max(Duration::from_millis(10));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + every, every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let work = self.process(task);
        tokio::pin!(work);
        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = heartbeat.tick() => match self.store.renew(task_id, attempt, lease).await {
                    Ok(true) => debug!("Renewed lease of task {task_id}"),
                    Ok(false) => warn!(
                        "Task {task_id} attempt {attempt} lost its claim while running"
                    ),
                    Err(e) => warn!("Renewing lease of task {task_id} failed: {e}"),
                },
            }
        }
    }

    async fn process(&self, task: ApplicationTask) -> TaskResult {
        let task_id = task.id;
        let filler = self.filler.clone();

        let outcome = self
            .sessions
            .with_session(move |page| async move { filler.fill(&task, page).await }.boxed())
            .await;

        match outcome {
            Ok(Ok(prepared)) => TaskResult::Ready(prepared),
            Ok(Err(failure)) => {
                error!("Task {task_id} failed: {failure}");
                TaskResult::Failed(failure.into())
            }
            Err(session) => {
                error!("Task {task_id} failed in session: {session}");
                TaskResult::Failed(session_failure(session))
            }
        }
    }

    /// Consumes tasks until `shutdown` flips to true. A task in flight always
    /// runs to its terminal outcome first.
    pub async fn run(self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        info!("Queue consumer #{worker} started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("Queue consumer #{worker} store error: {e}"),
            }

            tokio::select! {
                _ = sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Queue consumer #{worker} stopped");
    }
}

fn session_failure(error: SessionError) -> FailureCause {
    let stage = match error {
        SessionError::Launch(_) | SessionError::Context(_) => FailureStage::Session,
        SessionError::Panicked(_) => FailureStage::Worker,
    };
    FailureCause {
        stage,
        message: error.to_string(),
    }
}

/// Starts `count` independent consumer loops sharing one store and browser.
pub fn spawn_consumers<S: SessionProvider>(
    count: usize,
    consumer: QueueConsumer<S>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| tokio::spawn(consumer.clone().run(worker, shutdown.clone())))
        .collect()
}
