//! Shared application state

use mailcast_common::Config;
use mailcast_core::campaign::{CampaignManager, DirectSender, PipelineSettings, SendPipeline};
use mailcast_core::provider::{DefaultTransportFactory, TransportFactory, TransportSettings};
use mailcast_core::tracking::LinkTracker;
use mailcast_storage::repository::Repositories;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub repos: Repositories,
    pub factory: Arc<dyn TransportFactory>,
    pub manager: Arc<CampaignManager>,
    pub pipeline: Arc<SendPipeline>,
    pub sender: DirectSender,
}

impl AppState {
    /// Wire the services with real provider transports
    pub fn new(config: Config, repos: Repositories) -> Self {
        let factory: Arc<dyn TransportFactory> = Arc::new(DefaultTransportFactory::new(
            TransportSettings::from_config(&config),
            repos.providers.clone(),
        ));
        Self::with_factory(config, repos, factory)
    }

    pub fn with_factory(config: Config, repos: Repositories, factory: Arc<dyn TransportFactory>) -> Self {
        let tracker = LinkTracker::new(config.server.public_url.clone());
        let pipeline = Arc::new(SendPipeline::new(
            repos.clone(),
            factory.clone(),
            tracker.clone(),
            PipelineSettings::from_config(&config.sending),
        ));
        let sender = DirectSender::new(
            repos.clone(),
            factory.clone(),
            tracker,
            config.sending.default_from.clone(),
        );

        Self {
            manager: Arc::new(CampaignManager::new(repos.clone())),
            pipeline,
            sender,
            factory,
            repos,
            config,
        }
    }

    pub fn provider_test_timeout(&self) -> Duration {
        Duration::from_secs(self.config.sending.provider_test_timeout_secs)
    }
}
