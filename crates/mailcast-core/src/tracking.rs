//! Open/click tracking: identifier codec, link rewriting and the pixel

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use mailcast_common::types::CampaignId;
use mailcast_common::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Path of the open-tracking pixel
pub const PIXEL_PATH: &str = "/api/tracking";

/// Path of the click redirector
pub const REDIRECT_PATH: &str = "/api/link-redirect";

/// 1x1 transparent GIF served for every pixel request
pub const TRACKING_PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<a\s+([^>]*?)href=["']([^"']+)["']([^>]*?)>"#).expect("valid link pattern")
    })
}

/// Base64 encode for use inside identifiers and query strings
pub fn encode_b64(data: &str) -> String {
    URL_SAFE_NO_PAD.encode(data.as_bytes())
}

/// Decode base64 text in either the standard or URL-safe alphabet, padded or not.
///
/// A space is read as `+`, since form decoding of a query string turns an
/// unescaped `+` into a space.
pub fn decode_b64(input: &str) -> Result<String> {
    let mapped: String = input
        .chars()
        .map(|c| match c {
            '+' | ' ' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    let normalized = mapped
        .trim_matches(|c| matches!(c, '\r' | '\n' | '\t'))
        .trim_end_matches('=');

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| Error::Decode(format!("Invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(format!("Invalid UTF-8: {}", e)))
}

/// Decoded open-tracking identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenToken {
    pub campaign_id: CampaignId,
    pub email: String,
}

impl OpenToken {
    /// `<campaign_id>.<b64(email)>.<ts>`
    pub fn encode(&self) -> String {
        format!(
            "{}.{}.{}",
            self.campaign_id,
            encode_b64(&self.email),
            Utc::now().timestamp_millis()
        )
    }

    pub fn decode(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let campaign_id = parse_campaign_id(parts.next())?;
        let email = parse_email(parts.next())?;
        Ok(Self { campaign_id, email })
    }
}

/// Decoded click-tracking identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickToken {
    pub campaign_id: CampaignId,
    pub email: String,
    pub link_index: usize,
}

impl ClickToken {
    /// `<campaign_id>.<b64(email)>.<link_index>.<ts>`
    pub fn encode(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.campaign_id,
            encode_b64(&self.email),
            self.link_index,
            Utc::now().timestamp_millis()
        )
    }

    pub fn decode(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let campaign_id = parse_campaign_id(parts.next())?;
        let email = parse_email(parts.next())?;
        let link_index = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| Error::Decode(format!("Invalid link index: {}", s)))
            })
            .transpose()?
            .unwrap_or(0);
        Ok(Self {
            campaign_id,
            email,
            link_index,
        })
    }
}

fn parse_campaign_id(part: Option<&str>) -> Result<CampaignId> {
    let part = part
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Decode("Missing campaign id".to_string()))?;
    Uuid::parse_str(part).map_err(|_| Error::Decode(format!("Invalid campaign id: {}", part)))
}

fn parse_email(part: Option<&str>) -> Result<String> {
    let part = part
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Decode("Missing recipient".to_string()))?;
    let email = decode_b64(part)?;
    if email.is_empty() {
        return Err(Error::Decode("Empty recipient".to_string()));
    }
    Ok(email)
}

fn is_http_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Decode the `url` parameter of a click redirect; only http(s) targets are accepted
pub fn decode_redirect_url(encoded: &str) -> Result<String> {
    let url = decode_b64(encoded)?;
    if is_http_url(&url) {
        Ok(url)
    } else {
        Err(Error::Decode(format!("Refusing redirect target: {}", url)))
    }
}

/// Builds tracking URLs under the service's public base URL
#[derive(Debug, Clone)]
pub struct LinkTracker {
    base_url: String,
}

impl LinkTracker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn pixel_url(&self, campaign_id: CampaignId, email: &str) -> String {
        let token = OpenToken {
            campaign_id,
            email: email.to_string(),
        };
        format!("{}{}?id={}", self.base_url, PIXEL_PATH, token.encode())
    }

    pub fn click_url(&self, campaign_id: CampaignId, email: &str, link_index: usize, url: &str) -> String {
        let token = ClickToken {
            campaign_id,
            email: email.to_string(),
            link_index,
        };
        format!(
            "{}{}?id={}&url={}",
            self.base_url,
            REDIRECT_PATH,
            token.encode(),
            encode_b64(url)
        )
    }

    pub fn pixel_tag(&self, campaign_id: CampaignId, email: &str) -> String {
        format!(
            r#"<img src="{}" width="1" height="1" style="display:none;" alt="" />"#,
            self.pixel_url(campaign_id, email)
        )
    }

    /// Point every external `http(s)` link at the click redirector.
    ///
    /// Links that already go through the redirector are left alone.
    pub fn rewrite_links(&self, html: &str, campaign_id: CampaignId, email: &str) -> String {
        let mut index = 0usize;
        link_regex()
            .replace_all(html, |caps: &regex::Captures<'_>| {
                let url = &caps[2];
                if !is_http_url(url) || url.contains(REDIRECT_PATH) {
                    return caps[0].to_string();
                }
                let tracked = self.click_url(campaign_id, email, index, url);
                index += 1;
                format!("<a {}href=\"{}\"{}>", &caps[1], tracked, &caps[3])
            })
            .into_owned()
    }

    /// Rewrite links and append the open pixel
    pub fn instrument(&self, html: &str, campaign_id: CampaignId, email: &str) -> String {
        let mut out = self.rewrite_links(html, campaign_id, email);
        out.push_str(&self.pixel_tag(campaign_id, email));
        out
    }
}
