//! Persisted models

use chrono::{DateTime, Utc};
use mailcast_common::types::{
    CampaignId, ContactListId, EventId, ProviderId, SegmentId, TemplateId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::file::Keyed;

/// Text substituted for secrets in API responses
pub const HIDDEN_SECRET: &str = "***HIDDEN***";

/// A contact attribute: plain text, or a list joined with spaces when read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn as_text(&self) -> String {
        match self {
            AttributeValue::Text(s) => s.clone(),
            AttributeValue::List(items) => items.join(" "),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

/// Contact model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Contact {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Text value of a field; `email` resolves to the contact address
    pub fn attribute(&self, field: &str) -> Option<String> {
        if field == "email" {
            return Some(self.email.clone());
        }
        self.attributes.get(field).map(AttributeValue::as_text)
    }
}

/// Contact list model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactList {
    pub id: ContactListId,
    pub name: String,
    pub contacts: Vec<Contact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for ContactList {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Template model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
    #[serde(default)]
    pub variables: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            name: self.name.clone(),
            subject: self.subject.clone(),
            html_body: self.html_body.clone(),
            text_body: self.text_body.clone(),
            variables: self.variables.clone(),
        }
    }
}

impl Keyed for Template {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Template content frozen into a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    #[serde(default)]
    pub name: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Create template input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub text_body: String,
}

/// Provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Smtp,
    OauthMail,
    TransactionalApi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Smtp => write!(f, "smtp"),
            ProviderKind::OauthMail => write!(f, "oauth_mail"),
            ProviderKind::TransactionalApi => write!(f, "transactional_api"),
        }
    }
}

/// Kind-specific provider settings, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSecret {
    Smtp {
        host: String,
        port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        /// Skip TLS entirely, for local relays
        #[serde(default)]
        allow_plaintext: bool,
    },
    OauthMail {
        email: String,
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    TransactionalApi {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        domain: Option<String>,
    },
}

impl ProviderSecret {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderSecret::Smtp { .. } => ProviderKind::Smtp,
            ProviderSecret::OauthMail { .. } => ProviderKind::OauthMail,
            ProviderSecret::TransactionalApi { .. } => ProviderKind::TransactionalApi,
        }
    }

    /// Copy with every credential replaced by a placeholder
    pub fn masked(&self) -> Self {
        let hide = |v: &Option<String>| v.as_ref().map(|_| HIDDEN_SECRET.to_string());
        match self {
            ProviderSecret::Smtp {
                host,
                port,
                username,
                password,
                allow_plaintext,
            } => ProviderSecret::Smtp {
                host: host.clone(),
                port: *port,
                username: username.clone(),
                password: hide(password),
                allow_plaintext: *allow_plaintext,
            },
            ProviderSecret::OauthMail {
                email,
                refresh_token,
                expires_at,
                ..
            } => ProviderSecret::OauthMail {
                email: email.clone(),
                access_token: HIDDEN_SECRET.to_string(),
                refresh_token: hide(refresh_token),
                expires_at: *expires_at,
            },
            ProviderSecret::TransactionalApi {
                base_url, domain, ..
            } => ProviderSecret::TransactionalApi {
                api_key: HIDDEN_SECRET.to_string(),
                base_url: base_url.clone(),
                domain: domain.clone(),
            },
        }
    }
}

/// Provider configuration model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub name: String,
    pub is_default: bool,
    pub is_active: bool,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(flatten)]
    pub secret: ProviderSecret,
    #[serde(default)]
    pub last_tested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        self.secret.kind()
    }

    /// Copy safe to hand out through the API
    pub fn masked(&self) -> Self {
        Self {
            secret: self.secret.masked(),
            ..self.clone()
        }
    }
}

impl Keyed for ProviderConfig {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Create provider input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProvider {
    pub name: String,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(flatten)]
    pub secret: ProviderSecret,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Stopped,
}

impl CampaignStatus {
    /// Whether the status machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Scheduled, Sending)
                | (Sending, Paused)
                | (Sending, Completed)
                | (Paused, Sending)
                | (Scheduled, Stopped)
                | (Sending, Stopped)
                | (Paused, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Stopped)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "stopped" => Ok(CampaignStatus::Stopped),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSettings {
    /// Pause between two sends of a batch
    #[serde(default)]
    pub interval_seconds: u64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default = "default_tracking_enabled")]
    pub tracking_enabled: bool,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 0,
            daily_limit: default_daily_limit(),
            start_time: None,
            tracking_enabled: default_tracking_enabled(),
            from_address: None,
            from_name: None,
        }
    }
}

fn default_daily_limit() -> u32 {
    1000
}

fn default_tracking_enabled() -> bool {
    true
}

/// Campaign counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub failed: u64,
}

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Sent,
    Failed,
}

/// One recipient's delivery slot in a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub contact_email: String,
    pub status: QueueStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueueItem {
    pub fn pending(contact_email: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            contact_email: contact_email.into(),
            status: QueueStatus::Pending,
            scheduled_at,
            sent_at: None,
            message_id: None,
            error: None,
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub template: TemplateSnapshot,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    pub recipients: Vec<Contact>,
    #[serde(default)]
    pub settings: CampaignSettings,
    pub status: CampaignStatus,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Look up a recipient in the campaign snapshot
    pub fn contact(&self, email: &str) -> Option<&Contact> {
        self.recipients.iter().find(|c| c.email == email)
    }

    pub fn pending_count(&self) -> usize {
        self.queue
            .iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .count()
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.recipients.is_empty() {
            0.0
        } else {
            ((self.counters.sent + self.counters.failed) as f64 / self.recipients.len() as f64)
                * 100.0
        }
    }
}

impl Keyed for Campaign {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    /// Inline template, used when no `template_id` is given
    #[serde(default)]
    pub template: Option<TemplateSnapshot>,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Recipients taken from a stored list, optionally narrowed by a segment
    #[serde(default)]
    pub contact_list_id: Option<ContactListId>,
    #[serde(default)]
    pub segment_id: Option<SegmentId>,
    #[serde(default)]
    pub recipients: Vec<Contact>,
    #[serde(default)]
    pub settings: CampaignSettings,
}

/// Tracking event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Bounced,
    Open,
    Click,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Sent => write!(f, "sent"),
            EventKind::Bounced => write!(f, "bounced"),
            EventKind::Open => write!(f, "open"),
            EventKind::Click => write!(f, "click"),
        }
    }
}

/// Tracking event model (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: EventId,
    pub campaign_id: CampaignId,
    pub contact_email: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TrackingEvent {
    pub fn new(
        campaign_id: CampaignId,
        contact_email: impl Into<String>,
        kind: EventKind,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            campaign_id,
            contact_email: contact_email.into(),
            kind,
            occurred_at: Utc::now(),
            metadata,
        }
    }

    /// Clicked URL, for click events
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(|v| v.as_str())
    }
}

/// How rules in a set combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// Segment rule operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
}

/// A single segment condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub operator: RuleOperator,
    #[serde(default)]
    pub value: String,
}

/// Segment rule set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Segment model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub list_id: ContactListId,
    pub rule_set: RuleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyed for Segment {
    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Create segment input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub list_id: ContactListId,
    pub rule_set: RuleSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_transitions() {
        use CampaignStatus::*;
        assert!(Draft.can_transition_to(Scheduled));
        assert!(Draft.can_transition_to(Sending));
        assert!(Sending.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Sending));
        assert!(Paused.can_transition_to(Stopped));

        assert!(!Draft.can_transition_to(Paused));
        assert!(!Draft.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Sending));
        assert!(!Completed.can_transition_to(Sending));
        assert!(!Scheduled.can_transition_to(Paused));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("stopped".parse::<CampaignStatus>(), Ok(CampaignStatus::Stopped));
        assert_eq!(CampaignStatus::Paused.to_string(), "paused");
        assert!("cancelled".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_contact_attribute() {
        let contact = Contact::new("a@x.com")
            .with_attribute("company", "Acme")
            .with_attribute(
                "tags",
                AttributeValue::List(vec!["vip".into(), "beta".into()]),
            );

        assert_eq!(contact.attribute("email").as_deref(), Some("a@x.com"));
        assert_eq!(contact.attribute("company").as_deref(), Some("Acme"));
        assert_eq!(contact.attribute("tags").as_deref(), Some("vip beta"));
        assert_eq!(contact.attribute("missing"), None);
    }

    #[test]
    fn test_provider_json_shape_and_masking() {
        let json = serde_json::json!({
            "id": uuid::Uuid::new_v4(),
            "name": "Relay",
            "is_default": true,
            "is_active": false,
            "kind": "smtp",
            "host": "smtp.example.com",
            "port": 587,
            "username": "user",
            "password": "hunter2",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });

        let provider: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Smtp);

        let masked = serde_json::to_value(provider.masked()).unwrap();
        assert_eq!(masked["password"], HIDDEN_SECRET);
        assert_eq!(masked["host"], "smtp.example.com");
        assert_eq!(masked["kind"], "smtp");
    }

    #[test]
    fn test_campaign_settings_defaults() {
        let settings: CampaignSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, CampaignSettings::default());
        assert!(settings.tracking_enabled);
        assert_eq!(settings.interval_seconds, 0);
    }
}
