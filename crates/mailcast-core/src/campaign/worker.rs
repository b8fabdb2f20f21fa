//! Campaign Worker - Starts due campaigns and drives their send batches

use super::manager::CampaignManager;
use super::pipeline::SendPipeline;
use chrono::Utc;
use mailcast_common::{Error, Result};
use mailcast_storage::models::CampaignStatus;
use mailcast_storage::repository::Repositories;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for running batches
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Campaign Worker
pub struct CampaignWorker {
    repos: Repositories,
    manager: Arc<CampaignManager>,
    pipeline: Arc<SendPipeline>,
    cancellation_token: CancellationToken,
    tasks: TaskTracker,
    /// Interval between processing cycles
    poll_interval: Duration,
}

impl CampaignWorker {
    pub fn new(
        repos: Repositories,
        manager: Arc<CampaignManager>,
        pipeline: Arc<SendPipeline>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            repos,
            manager,
            pipeline,
            cancellation_token,
            tasks: TaskTracker::new(),
            poll_interval: Duration::from_secs(30),
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs.max(1));
        self
    }

    /// Run until the cancellation token fires
    pub async fn run(&self) {
        let mut ticker = interval(self.poll_interval);

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Campaign worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Error processing campaigns");
                    }
                }
                () = self.cancellation_token.cancelled() => break,
            }
        }

        self.tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tasks.wait()).await.is_err() {
            warn!("Campaign batches still running at shutdown");
        }
        info!("Campaign worker stopped");
    }

    /// Promote due scheduled campaigns, then start a batch for every sending
    /// campaign that is not already being processed. Returns how many batches
    /// were started.
    pub async fn tick(&self) -> Result<usize> {
        for campaign_id in self.manager.promote_due(Utc::now()).await? {
            info!(campaign_id = %campaign_id, "Scheduled campaign started");
        }

        let sending: Vec<_> = self
            .repos
            .campaigns
            .list()
            .await?
            .into_iter()
            .filter(|c| c.status == CampaignStatus::Sending)
            .filter(|c| !self.pipeline.is_processing(c.id))
            .map(|c| c.id)
            .collect();

        for &campaign_id in &sending {
            let pipeline = self.pipeline.clone();
            self.tasks.spawn(async move {
                match pipeline.process_batch(campaign_id).await {
                    Ok(report) => debug!(
                        campaign_id = %campaign_id,
                        sent = report.sent,
                        failed = report.failed,
                        "Worker batch done"
                    ),
                    Err(Error::Conflict(_)) => {
                        debug!(campaign_id = %campaign_id, "Campaign already being processed")
                    }
                    Err(e @ Error::Configuration(_)) => {
                        warn!(campaign_id = %campaign_id, error = %e, "Campaign cannot send")
                    }
                    Err(e) => error!(campaign_id = %campaign_id, error = %e, "Campaign batch failed"),
                }
            });
        }

        Ok(sending.len())
    }

    /// Wait for batches started by [`tick`](Self::tick) to finish
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
