//! Provider selection and connectivity checks

use super::TransportFactory;
use chrono::{DateTime, Utc};
use mailcast_common::types::{EmailAddress, ProviderId};
use mailcast_common::{Error, Result};
use mailcast_storage::models::{ProviderConfig, ProviderSecret};
use mailcast_storage::repository::ProviderRepository;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a provider connection test
#[derive(Debug, Clone, Serialize)]
pub struct ProviderTestResult {
    pub success: bool,
    pub message: String,
    pub tested_at: DateTime<Utc>,
    /// Updated config, secrets masked
    pub provider: ProviderConfig,
}

/// The named provider, or the default one; it must have passed a connection test
pub async fn resolve_active_provider(
    providers: &dyn ProviderRepository,
    provider_id: Option<ProviderId>,
) -> Result<ProviderConfig> {
    let provider = match provider_id {
        Some(id) => providers
            .get(id)
            .await?
            .ok_or_else(|| Error::Configuration(format!("Provider {} not found", id)))?,
        None => providers
            .get_default()
            .await?
            .ok_or_else(|| Error::Configuration("No default provider configured".to_string()))?,
    };

    if !provider.is_active {
        return Err(Error::Configuration(format!(
            "Provider '{}' is not active; run a connection test first",
            provider.name
        )));
    }
    Ok(provider)
}

/// Sender address: explicit override, then the provider's, then the mailbox
/// the provider authenticates as, then the configured fallback
pub fn sender_address(explicit: Option<&str>, provider: &ProviderConfig, fallback: &str) -> String {
    let mailbox = match &provider.secret {
        ProviderSecret::OauthMail { email, .. } => Some(email.as_str()),
        ProviderSecret::Smtp { username, .. } => username
            .as_deref()
            .filter(|u| EmailAddress::parse(u).is_some()),
        ProviderSecret::TransactionalApi { .. } => None,
    };

    explicit
        .into_iter()
        .chain(provider.from_address.as_deref())
        .chain(mailbox)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Run a bounded connectivity test and record the result; a timeout counts as failure
pub async fn test_provider(
    providers: &dyn ProviderRepository,
    factory: &dyn TransportFactory,
    provider_id: ProviderId,
    limit: Duration,
) -> Result<ProviderTestResult> {
    let provider = providers
        .get(provider_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Provider {} not found", provider_id)))?;

    let outcome = match factory.build(&provider) {
        Ok(transport) => match tokio::time::timeout(limit, transport.test_connection()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Provider(format!(
                "Connection test timed out after {}s",
                limit.as_secs()
            ))),
        },
        Err(e) => Err(e),
    };

    let tested_at = Utc::now();
    let success = outcome.is_ok();
    let message = match &outcome {
        Ok(()) => "Connection successful".to_string(),
        Err(e) => e.to_string(),
    };

    if success {
        info!(provider_id = %provider_id, kind = %provider.kind(), "Provider connection test passed");
    } else {
        warn!(provider_id = %provider_id, kind = %provider.kind(), error = %message, "Provider connection test failed");
    }

    let provider = providers.mark_tested(provider_id, success, tested_at).await?;
    Ok(ProviderTestResult {
        success,
        message,
        tested_at,
        provider: provider.masked(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockFactory};
    use mailcast_storage::models::CreateProvider;

    #[tokio::test]
    async fn test_resolve_requires_active_default() {
        let (_dir, repos) = testing::repos();
        assert!(matches!(
            resolve_active_provider(repos.providers.as_ref(), None).await,
            Err(Error::Configuration(_))
        ));

        let created = repos
            .providers
            .create(testing::api_provider_input("Primary"))
            .await
            .unwrap();
        // Created configs start inactive
        assert!(matches!(
            resolve_active_provider(repos.providers.as_ref(), None).await,
            Err(Error::Configuration(_))
        ));

        repos.providers.mark_tested(created.id, true, Utc::now()).await.unwrap();
        let resolved = resolve_active_provider(repos.providers.as_ref(), None).await.unwrap();
        assert_eq!(resolved.id, created.id);
    }

    #[tokio::test]
    async fn test_connection_test_flips_active() {
        let (_dir, repos) = testing::repos();
        let created = repos
            .providers
            .create(testing::api_provider_input("Primary"))
            .await
            .unwrap();

        let ok = test_provider(
            repos.providers.as_ref(),
            &MockFactory::succeeding(),
            created.id,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(ok.success);
        assert!(ok.provider.is_active);
        assert!(ok.provider.last_tested_at.is_some());

        let failed = test_provider(
            repos.providers.as_ref(),
            &MockFactory::failing_test(),
            created.id,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(!failed.success);
        assert!(!failed.provider.is_active);
    }

    #[tokio::test]
    async fn test_connection_test_timeout_is_failure() {
        let (_dir, repos) = testing::repos();
        let created = repos
            .providers
            .create(testing::api_provider_input("Slow"))
            .await
            .unwrap();
        repos.providers.mark_tested(created.id, true, Utc::now()).await.unwrap();

        let result = test_provider(
            repos.providers.as_ref(),
            &MockFactory::hanging_test(),
            created.id,
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("timed out"));
        assert!(!result.provider.is_active);
    }

    #[test]
    fn test_sender_address_precedence() {
        let now = Utc::now();
        let mut provider = ProviderConfig {
            id: uuid::Uuid::new_v4(),
            name: "gmail".into(),
            is_default: true,
            is_active: true,
            from_address: None,
            secret: ProviderSecret::OauthMail {
                email: "me@gmail.com".into(),
                access_token: "t".into(),
                refresh_token: None,
                expires_at: None,
            },
            last_tested_at: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(sender_address(None, &provider, "noreply@local"), "me@gmail.com");
        provider.from_address = Some("news@example.com".into());
        assert_eq!(sender_address(None, &provider, "noreply@local"), "news@example.com");
        assert_eq!(sender_address(Some("ceo@example.com"), &provider, "noreply@local"), "ceo@example.com");

        let input: CreateProvider = testing::api_provider_input("api");
        provider.secret = input.secret;
        provider.from_address = None;
        assert_eq!(sender_address(Some("  "), &provider, "noreply@local"), "noreply@local");
    }
}
