//! Cron-driven renewal of push-notification watch channels.
//!
//! Google expires watch channels after roughly a week. The scheduler wakes on
//! a cron schedule, asks the watch manager to renew every channel expiring
//! within the lookahead window, and logs the resulting report. Join handles
//! are tracked, cancellation is explicit, and every asynchronous operation is
//! wrapped in a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kindred_core::WatchChannelManager;
use kindred_domain::{RenewalReport, Result as DomainResult, WatchRenewalConfig};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// A single renewal pass.
#[async_trait]
pub trait WatchRenewer: Send + Sync {
    async fn renew_expiring(&self, lookahead: chrono::Duration) -> DomainResult<RenewalReport>;
}

#[async_trait]
impl WatchRenewer for WatchChannelManager {
    async fn renew_expiring(&self, lookahead: chrono::Duration) -> DomainResult<RenewalReport> {
        WatchChannelManager::renew_expiring(self, lookahead).await
    }
}

/// Configuration for the watch renewal scheduler.
#[derive(Debug, Clone)]
pub struct WatchRenewalSchedulerConfig {
    /// Cron expression (with seconds) describing the execution schedule.
    pub cron_expression: String,
    /// Channels expiring within this window are renewed.
    pub lookahead: chrono::Duration,
    /// Run one pass immediately after start.
    pub run_on_start: bool,
    /// Timeout applied to a single renewal pass.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for WatchRenewalSchedulerConfig {
    fn default() -> Self {
        Self::from(&WatchRenewalConfig::default())
    }
}

impl From<&WatchRenewalConfig> for WatchRenewalSchedulerConfig {
    fn from(config: &WatchRenewalConfig) -> Self {
        Self {
            cron_expression: config.cron.clone(),
            lookahead: chrono::Duration::hours(config.lookahead_hours),
            run_on_start: true,
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Watch renewal scheduler with explicit lifecycle management.
pub struct WatchRenewalScheduler {
    scheduler: Option<JobScheduler>,
    config: WatchRenewalSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    renewer: Arc<dyn WatchRenewer>,
}

impl WatchRenewalScheduler {
    pub fn new(config: WatchRenewalSchedulerConfig, renewer: Arc<dyn WatchRenewer>) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            renewer,
        }
    }

    /// Start the cron job and the monitor task.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, scheduler.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|err| SchedulerError::StartFailed(err.to_string()))?;

        self.scheduler = Some(scheduler);

        let cancel = self.cancellation.clone();
        let renewer = Arc::clone(&self.renewer);
        let run_on_start = self.config.run_on_start;
        let lookahead = self.config.lookahead;
        let job_timeout = self.config.job_timeout;
        self.monitor_handle = Some(tokio::spawn(async move {
            if run_on_start {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("initial renewal pass cancelled");
                        return;
                    }
                    _ = run_pass(renewer, lookahead, job_timeout) => {}
                }
            }
            cancel.cancelled().await;
            debug!("watch renewal monitor cancelled");
        }));

        info!("watch renewal scheduler started");
        Ok(())
    }

    /// Stop the cron job and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, scheduler.shutdown())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|err| SchedulerError::StopFailed(err.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!("watch renewal scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|err| SchedulerError::CreationFailed(err.to_string()))?;

        let renewer = Arc::clone(&self.renewer);
        let lookahead = self.config.lookahead;
        let job_timeout = self.config.job_timeout;
        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let renewer = Arc::clone(&renewer);
            Box::pin(async move {
                run_pass(renewer, lookahead, job_timeout).await;
            })
        })
        .map_err(|err| SchedulerError::JobRegistrationFailed(err.to_string()))?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|err| SchedulerError::JobRegistrationFailed(err.to_string()))?;

        debug!(cron = %self.config.cron_expression, %job_id, "registered watch renewal job");
        Ok(scheduler)
    }
}

async fn run_pass(renewer: Arc<dyn WatchRenewer>, lookahead: chrono::Duration, timeout: Duration) {
    let started = Instant::now();
    match tokio::time::timeout(timeout, renewer.renew_expiring(lookahead)).await {
        Ok(Ok(report)) => {
            debug!(
                checked = report.connections_checked,
                renewed = report.channels_renewed,
                failed = report.channels_failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "watch renewal pass finished"
            );
        }
        Ok(Err(err)) => error!(error = %err, "watch renewal pass failed"),
        Err(_) => warn!(timeout_secs = timeout.as_secs(), "watch renewal pass timed out"),
    }
}

impl Drop for WatchRenewalScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("WatchRenewalScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingRenewer {
        calls: AtomicUsize,
        lookaheads: Mutex<Vec<chrono::Duration>>,
    }

    #[async_trait]
    impl WatchRenewer for CountingRenewer {
        async fn renew_expiring(
            &self,
            lookahead: chrono::Duration,
        ) -> DomainResult<RenewalReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.lookaheads.lock().push(lookahead);
            Ok(RenewalReport { connections_checked: 1, ..Default::default() })
        }
    }

    fn config(cron: &str) -> WatchRenewalSchedulerConfig {
        WatchRenewalSchedulerConfig {
            cron_expression: cron.into(),
            lookahead: chrono::Duration::hours(48),
            ..Default::default()
        }
    }

    async fn wait_for_calls(renewer: &CountingRenewer, expected: usize) {
        for _ in 0..100 {
            if renewer.calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn config_follows_renewal_settings() {
        let settings =
            WatchRenewalConfig { enabled: true, cron: "0 30 2 * * *".into(), lookahead_hours: 12 };
        let config = WatchRenewalSchedulerConfig::from(&settings);
        assert_eq!(config.cron_expression, "0 30 2 * * *");
        assert_eq!(config.lookahead, chrono::Duration::hours(12));
        assert!(config.run_on_start);
    }

    #[tokio::test]
    async fn runs_a_pass_on_start_with_configured_lookahead() {
        let renewer = Arc::new(CountingRenewer::default());
        // Daily schedule: only the startup pass fires during the test.
        let mut scheduler = WatchRenewalScheduler::new(config("0 0 3 * * *"), renewer.clone());

        scheduler.start().await.expect("start");
        wait_for_calls(&renewer, 1).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(renewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renewer.lookaheads.lock()[0], chrono::Duration::hours(48));
    }

    #[tokio::test]
    async fn skips_startup_pass_when_disabled() {
        let renewer = Arc::new(CountingRenewer::default());
        let mut cfg = config("0 0 3 * * *");
        cfg.run_on_start = false;
        let mut scheduler = WatchRenewalScheduler::new(cfg, renewer.clone());

        scheduler.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await.expect("stop");

        assert_eq!(renewer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let renewer = Arc::new(CountingRenewer::default());
        let mut scheduler = WatchRenewalScheduler::new(config("0 0 3 * * *"), renewer);

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
        scheduler.start().await.expect("start");
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));
        scheduler.stop().await.expect("stop");
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected() {
        let renewer = Arc::new(CountingRenewer::default());
        let mut scheduler = WatchRenewalScheduler::new(config("not a cron"), renewer);

        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::JobRegistrationFailed(_))
        ));
        assert!(!scheduler.is_running());
    }
}
