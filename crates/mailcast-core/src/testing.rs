//! Test doubles shared by the core test modules

use crate::provider::{OutgoingMessage, SendReceipt, Transport, TransportFactory};
use async_trait::async_trait;
use chrono::Utc;
use mailcast_common::{Error, Result};
use mailcast_storage::file::LocalStorage;
use mailcast_storage::models::{CreateProvider, ProviderConfig, ProviderKind, ProviderSecret};
use mailcast_storage::repository::Repositories;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn repos() -> (TempDir, Repositories) {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::from_path(dir.path()).unwrap();
    (dir, Repositories::from_storage(Arc::new(storage)))
}

pub fn api_provider_input(name: &str) -> CreateProvider {
    CreateProvider {
        name: name.to_string(),
        from_address: Some("news@example.com".into()),
        secret: ProviderSecret::TransactionalApi {
            api_key: "re_test".into(),
            base_url: None,
            domain: None,
        },
    }
}

/// Create a provider and mark it as having passed a connection test
pub async fn active_provider(repos: &Repositories) -> ProviderConfig {
    let created = repos
        .providers
        .create(api_provider_input("Primary"))
        .await
        .unwrap();
    repos
        .providers
        .mark_tested(created.id, true, Utc::now())
        .await
        .unwrap()
}

#[derive(Debug, Clone, Copy)]
enum ConnectionMode {
    Ok,
    Fail,
    Hang,
}

/// Transport that records messages and fails for chosen recipients
pub struct MockTransport {
    failing: HashSet<String>,
    connection: ConnectionMode,
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt> {
        if self.failing.contains(&message.to) {
            return Err(Error::Provider(format!("Mailbox unavailable: {}", message.to)));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(SendReceipt {
            message_id: format!("mock-{}", sent.len()),
            provider: ProviderKind::TransactionalApi,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        match self.connection {
            ConnectionMode::Ok => Ok(()),
            ConnectionMode::Fail => Err(Error::Provider("Invalid API key".to_string())),
            ConnectionMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Factory handing out one shared [`MockTransport`]
pub struct MockFactory {
    pub transport: Arc<MockTransport>,
}

impl MockFactory {
    fn with(failing: &[&str], connection: ConnectionMode) -> Self {
        Self {
            transport: Arc::new(MockTransport {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                connection,
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn succeeding() -> Self {
        Self::with(&[], ConnectionMode::Ok)
    }

    pub fn failing_for(recipients: &[&str]) -> Self {
        Self::with(recipients, ConnectionMode::Ok)
    }

    pub fn failing_test() -> Self {
        Self::with(&[], ConnectionMode::Fail)
    }

    pub fn hanging_test() -> Self {
        Self::with(&[], ConnectionMode::Hang)
    }
}

impl TransportFactory for MockFactory {
    fn build(&self, _config: &ProviderConfig) -> Result<Arc<dyn Transport>> {
        Ok(self.transport.clone())
    }
}
