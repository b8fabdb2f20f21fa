//! Analytics - Per-campaign engagement metrics and the dashboard overview

use mailcast_common::types::CampaignId;
use mailcast_storage::models::{Campaign, CampaignStatus, EventKind, TrackingEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// `part / total` as a percentage in `[0, 100]`, rounded to one decimal; 0 when `total` is 0
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = (part as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
    (pct * 10.0).round() / 10.0
}

/// Clicks on one URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStats {
    pub url: String,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignAnalytics {
    pub campaign_id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    pub recipients: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    pub unique_opens: u64,
    pub total_opens: u64,
    pub unique_clicks: u64,
    pub total_clicks: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub bounce_rate: f64,
    pub progress: f64,
    pub top_links: Vec<LinkStats>,
}

/// Maximum number of links reported in `top_links`
pub const TOP_LINKS: usize = 10;

/// Aggregate a campaign's counters and tracking events.
///
/// Sent and failed come from the counters; opens and clicks from the events.
pub fn campaign_analytics(campaign: &Campaign, events: &[TrackingEvent]) -> CampaignAnalytics {
    let events: Vec<&TrackingEvent> = events
        .iter()
        .filter(|e| e.campaign_id == campaign.id)
        .collect();

    let opens: Vec<&&TrackingEvent> = events.iter().filter(|e| e.kind == EventKind::Open).collect();
    let clicks: Vec<&&TrackingEvent> = events.iter().filter(|e| e.kind == EventKind::Click).collect();

    let unique_opens = opens
        .iter()
        .map(|e| e.contact_email.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;
    let unique_clicks = clicks
        .iter()
        .map(|e| e.contact_email.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    // Insertion order breaks ties between equally clicked links
    let mut links: Vec<LinkStats> = Vec::new();
    for url in clicks.iter().filter_map(|e| e.url()) {
        match links.iter_mut().find(|l| l.url == url) {
            Some(link) => link.clicks += 1,
            None => links.push(LinkStats {
                url: url.to_string(),
                clicks: 1,
            }),
        }
    }
    links.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    links.truncate(TOP_LINKS);

    let recipients = campaign.recipients.len() as u64;
    let counters = &campaign.counters;

    CampaignAnalytics {
        campaign_id: campaign.id,
        name: campaign.name.clone(),
        status: campaign.status,
        recipients,
        sent: counters.sent,
        failed: counters.failed,
        pending: campaign.pending_count() as u64,
        unique_opens,
        total_opens: opens.len() as u64,
        unique_clicks,
        total_clicks: clicks.len() as u64,
        open_rate: rate(unique_opens, recipients),
        click_rate: rate(unique_clicks, recipients),
        bounce_rate: rate(counters.failed, counters.sent + counters.failed),
        progress: (campaign.progress_percentage() * 10.0).round() / 10.0,
        top_links: links,
    }
}

/// Totals across every campaign
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub total_campaigns: u64,
    pub active_campaigns: u64,
    pub campaigns_by_status: BTreeMap<String, u64>,
    pub total_recipients: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_opened: u64,
    pub total_clicked: u64,
    /// Mean of per-campaign `opened / sent` over campaigns that sent anything
    pub average_open_rate: f64,
    pub average_click_rate: f64,
    pub engagement_rate: f64,
}

pub fn dashboard_overview(campaigns: &[Campaign]) -> DashboardOverview {
    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    for campaign in campaigns {
        *by_status.entry(campaign.status.to_string()).or_default() += 1;
    }

    let total_sent: u64 = campaigns.iter().map(|c| c.counters.sent).sum();
    let total_opened: u64 = campaigns.iter().map(|c| c.counters.opened).sum();
    let total_clicked: u64 = campaigns.iter().map(|c| c.counters.clicked).sum();

    let with_sends: Vec<&Campaign> = campaigns.iter().filter(|c| c.counters.sent > 0).collect();
    let average = |f: fn(&Campaign) -> u64| -> f64 {
        if with_sends.is_empty() {
            return 0.0;
        }
        let sum: f64 = with_sends.iter().map(|c| rate(f(c), c.counters.sent)).sum();
        (sum / with_sends.len() as f64 * 10.0).round() / 10.0
    };

    DashboardOverview {
        total_campaigns: campaigns.len() as u64,
        active_campaigns: campaigns
            .iter()
            .filter(|c| matches!(c.status, CampaignStatus::Sending | CampaignStatus::Scheduled))
            .count() as u64,
        campaigns_by_status: by_status,
        total_recipients: campaigns.iter().map(|c| c.recipients.len() as u64).sum(),
        total_sent,
        total_failed: campaigns.iter().map(|c| c.counters.failed).sum(),
        total_opened,
        total_clicked,
        average_open_rate: average(|c| c.counters.opened),
        average_click_rate: average(|c| c.counters.clicked),
        engagement_rate: rate(total_opened + total_clicked, total_sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mailcast_storage::models::{CampaignSettings, Contact, Counters, TemplateSnapshot};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn campaign(recipients: usize, counters: Counters) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            name: "c".into(),
            template: TemplateSnapshot {
                name: "t".into(),
                subject: "s".into(),
                html_body: String::new(),
                text_body: String::new(),
                variables: Vec::new(),
            },
            template_id: None,
            provider_id: None,
            recipients: (0..recipients)
                .map(|i| Contact::new(format!("user{}@x.com", i)))
                .collect(),
            settings: CampaignSettings::default(),
            status: CampaignStatus::Completed,
            counters,
            queue: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    fn event(campaign_id: CampaignId, email: &str, kind: EventKind, url: Option<&str>) -> TrackingEvent {
        let metadata = match url {
            Some(url) => serde_json::json!({ "url": url }),
            None => serde_json::json!({}),
        };
        TrackingEvent::new(campaign_id, email, kind, metadata)
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(25, 100), 25.0);
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(150, 100), 100.0);
    }

    #[test]
    fn test_zero_recipients() {
        let c = campaign(0, Counters::default());
        let analytics = campaign_analytics(&c, &[]);
        assert_eq!(analytics.open_rate, 0.0);
        assert_eq!(analytics.click_rate, 0.0);
        assert!(analytics.top_links.is_empty());
    }

    #[test]
    fn test_unique_opens_rate() {
        let c = campaign(100, Counters { sent: 100, ..Counters::default() });
        let mut events: Vec<TrackingEvent> = (0..25)
            .map(|i| event(c.id, &format!("user{}@x.com", i), EventKind::Open, None))
            .collect();
        // Repeat opens count toward totals only
        events.push(event(c.id, "user0@x.com", EventKind::Open, None));
        // Other campaigns are ignored
        events.push(event(Uuid::new_v4(), "user99@x.com", EventKind::Open, None));

        let analytics = campaign_analytics(&c, &events);
        assert_eq!(analytics.unique_opens, 25);
        assert_eq!(analytics.total_opens, 26);
        assert_eq!(analytics.open_rate, 25.0);
    }

    #[test]
    fn test_top_links_ties_by_first_occurrence() {
        let c = campaign(10, Counters::default());
        let events = vec![
            event(c.id, "user1@x.com", EventKind::Click, Some("https://b.example.com")),
            event(c.id, "user2@x.com", EventKind::Click, Some("https://a.example.com")),
            event(c.id, "user3@x.com", EventKind::Click, Some("https://c.example.com")),
            event(c.id, "user4@x.com", EventKind::Click, Some("https://c.example.com")),
        ];

        let analytics = campaign_analytics(&c, &events);
        let urls: Vec<&str> = analytics.top_links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://c.example.com", "https://b.example.com", "https://a.example.com"]
        );
        assert_eq!(analytics.unique_clicks, 4);
        assert_eq!(analytics.click_rate, 40.0);
    }

    #[test]
    fn test_dashboard_overview() {
        let mut sending = campaign(10, Counters { sent: 10, opened: 5, clicked: 1, ..Counters::default() });
        sending.status = CampaignStatus::Sending;
        let done = campaign(4, Counters { sent: 4, opened: 1, failed: 0, ..Counters::default() });
        let mut draft = campaign(3, Counters::default());
        draft.status = CampaignStatus::Draft;

        let overview = dashboard_overview(&[sending, done, draft]);
        assert_eq!(overview.total_campaigns, 3);
        assert_eq!(overview.active_campaigns, 1);
        assert_eq!(overview.total_recipients, 17);
        assert_eq!(overview.total_sent, 14);
        // (50 + 25) / 2, draft excluded
        assert_eq!(overview.average_open_rate, 37.5);
        assert_eq!(overview.engagement_rate, rate(7, 14));
        assert_eq!(overview.campaigns_by_status.get("draft"), Some(&1));
    }
}
