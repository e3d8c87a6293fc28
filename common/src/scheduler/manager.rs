// Schedule manager: owns the job table and the lifetime of each job task

use crate::broadcast::SubscriptionTrigger;
use crate::clock::Clock;
use crate::db::BroadcastStore;
use crate::errors::{ConfigurationError, SchedulingError, StorageError};
use crate::models::{Subscription, SubscriptionId};
use crate::scheduler::expression::CronTrigger;
use crate::telemetry;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Handle of a running job loop
struct JobHandle {
    expression: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Signal the loop and wait for it to exit; ticks already spawned keep running
    async fn stop(self, id: SubscriptionId) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(subscription_id = id, error = %e, "Job loop panicked");
            }
        }
    }
}

/// ScheduleManager maps subscription ids to their recurring jobs
pub struct ScheduleManager {
    jobs: Mutex<HashMap<SubscriptionId, JobHandle>>,
    store: Arc<dyn BroadcastStore>,
    trigger: Arc<dyn SubscriptionTrigger>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl ScheduleManager {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        trigger: Arc<dyn SubscriptionTrigger>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            store,
            trigger,
            clock,
            timezone,
        }
    }

    /// Register every enabled cron subscription
    ///
    /// A subscription that cannot be scheduled is logged and skipped. Returns
    /// the number of jobs registered.
    #[instrument(skip(self))]
    pub async fn init_scheduler(&self) -> Result<usize, StorageError> {
        let subscriptions = self.store.find_enabled_cron().await?;
        let mut registered = 0;

        for subscription in &subscriptions {
            match self.register_job(subscription).await {
                Ok(_) => registered += 1,
                Err(e) => {
                    let err = SchedulingError {
                        subscription_id: subscription.id,
                        reason: e.to_string(),
                    };
                    error!(subscription_id = subscription.id, error = %err, "Skipping subscription");
                }
            }
        }

        info!(
            registered = registered,
            skipped = subscriptions.len() - registered,
            "Scheduler initialized"
        );
        Ok(registered)
    }

    /// Start (or restart) the recurring job of `subscription`
    ///
    /// Returns the first fire time. An invalid expression leaves any
    /// existing job for the id untouched.
    #[instrument(skip(self, subscription), fields(subscription_id = subscription.id))]
    pub async fn register_job(
        &self,
        subscription: &Subscription,
    ) -> Result<DateTime<Utc>, ConfigurationError> {
        let id = subscription.id;
        let expression = subscription
            .trigger_config
            .cron
            .as_deref()
            .ok_or(ConfigurationError::MissingCronExpression(id))?;

        let cron = CronTrigger::parse(expression, self.timezone)?;
        let first = cron
            .next_after(self.clock.now())
            .ok_or_else(|| ConfigurationError::InvalidCronExpression {
                expression: expression.to_string(),
                reason: "expression never fires".to_string(),
            })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_job(
            id,
            cron,
            first,
            self.store.clone(),
            self.trigger.clone(),
            self.clock.clone(),
            stop_rx,
        ));
        let handle = JobHandle {
            expression: expression.to_string(),
            stop: stop_tx,
            task,
        };

        let (previous, active) = {
            let mut jobs = self.jobs.lock().await;
            let previous = jobs.insert(id, handle);
            (previous, jobs.len())
        };
        if let Some(previous) = previous {
            debug!(previous = %previous.expression, "Replacing existing job");
            previous.stop(id).await;
        }
        telemetry::update_active_jobs(active);

        self.record_next_trigger(id, Some(first)).await;
        info!(cron = %expression, next_trigger_at = %first, "Job registered");
        Ok(first)
    }

    /// Stop and remove the job of `id`; returns false when none was registered
    #[instrument(skip(self))]
    pub async fn unregister_job(&self, id: SubscriptionId) -> bool {
        let (handle, active) = {
            let mut jobs = self.jobs.lock().await;
            let handle = jobs.remove(&id);
            (handle, jobs.len())
        };

        let Some(handle) = handle else {
            return false;
        };
        handle.stop(id).await;
        telemetry::update_active_jobs(active);
        self.record_next_trigger(id, None).await;
        info!("Job unregistered");
        true
    }

    /// Stop every job and rebuild the table from the store
    #[instrument(skip(self))]
    pub async fn reload_all_jobs(&self) -> Result<usize, StorageError> {
        let stopped = self.stop_all().await;
        for id in &stopped {
            self.record_next_trigger(*id, None).await;
        }
        info!(stopped = stopped.len(), "Reloading all jobs");
        self.init_scheduler().await
    }

    /// Stop every job without touching the store
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let stopped = self.stop_all().await;
        info!(stopped = stopped.len(), "Scheduler stopped");
    }

    /// Ids with an active job, ascending
    pub async fn active_jobs(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self.jobs.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_scheduled(&self, id: SubscriptionId) -> bool {
        self.jobs.lock().await.contains_key(&id)
    }

    async fn stop_all(&self) -> Vec<SubscriptionId> {
        let drained: Vec<(SubscriptionId, JobHandle)> =
            self.jobs.lock().await.drain().collect();
        telemetry::update_active_jobs(0);

        let mut ids = Vec::with_capacity(drained.len());
        for (id, handle) in drained {
            handle.stop(id).await;
            ids.push(id);
        }
        ids
    }

    async fn record_next_trigger(&self, id: SubscriptionId, at: Option<DateTime<Utc>>) {
        if let Err(e) = self.store.update_next_trigger(id, at).await {
            warn!(subscription_id = id, error = %e, "Failed to record next trigger time");
        }
    }
}

/// Sleep until each fire time and spawn a detached tick
async fn run_job(
    id: SubscriptionId,
    cron: CronTrigger,
    first: DateTime<Utc>,
    store: Arc<dyn BroadcastStore>,
    trigger: Arc<dyn SubscriptionTrigger>,
    clock: Arc<dyn Clock>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut next = first;
    loop {
        let wait = (next - clock.now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = &mut stop => break,
            _ = clock.sleep(wait) => {}
        }

        let target = trigger.clone();
        tokio::spawn(async move {
            match target.trigger(id).await {
                Ok(result) => debug!(
                    subscription_id = id,
                    ok = result.ok,
                    status = result.status,
                    "Scheduled tick finished"
                ),
                Err(e) => warn!(subscription_id = id, error = %e, "Scheduled tick failed"),
            }
        });

        let reference = std::cmp::max(next, clock.now());
        match cron.next_after(reference) {
            Some(following) => {
                next = following;
                if let Err(e) = store.update_next_trigger(id, Some(next)).await {
                    warn!(subscription_id = id, error = %e, "Failed to record next trigger time");
                }
            }
            None => {
                warn!(subscription_id = id, cron = %cron.expression(), "Cron expression has no further fire times");
                break;
            }
        }
    }
}
