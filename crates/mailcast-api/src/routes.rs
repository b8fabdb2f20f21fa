//! API routes

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers::{
    analytics, campaigns, contacts, health, oauth, providers, segments, send, templates,
    tracking,
};
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    // Contact list routes
    let contact_list_routes = Router::new()
        .route("/", get(contacts::list_contact_lists))
        .route("/import", post(contacts::import_contact_list))
        .route(
            "/:list_id",
            get(contacts::get_contact_list).delete(contacts::delete_contact_list),
        );

    // Segment routes
    let segment_routes = Router::new()
        .route("/", get(segments::list_segments).post(segments::create_segment))
        .route("/preview", post(segments::preview_segment))
        .route(
            "/:segment_id",
            get(segments::get_segment).delete(segments::delete_segment),
        )
        .route("/:segment_id/contacts", get(segments::segment_contacts));

    // Template routes
    let template_routes = Router::new()
        .route("/", get(templates::list_templates).post(templates::create_template))
        .route(
            "/:template_id",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        );

    // Provider routes
    let provider_routes = Router::new()
        .route("/", get(providers::list_providers).post(providers::create_provider))
        .route(
            "/:provider_id",
            get(providers::get_provider)
                .put(providers::update_provider)
                .delete(providers::delete_provider),
        )
        .route("/:provider_id/test", post(providers::test_provider_connection))
        .route("/:provider_id/default", post(providers::set_default_provider));

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns).post(campaigns::create_campaign))
        .route(
            "/:campaign_id",
            get(campaigns::get_campaign).delete(campaigns::delete_campaign),
        )
        .route("/:campaign_id/schedule", post(campaigns::schedule_campaign))
        .route("/:campaign_id/start", post(campaigns::start_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/stop", post(campaigns::stop_campaign))
        .route("/:campaign_id/process", post(campaigns::process_campaign))
        .route("/:campaign_id/analytics", get(campaigns::campaign_stats))
        .route("/:campaign_id/events", get(campaigns::campaign_events));

    // Mailbox connect flow for OAuth mail providers
    let oauth_routes = Router::new()
        .route("/authorize", get(oauth::authorize))
        .route("/callback", get(oauth::callback).post(oauth::submit_code));

    let api_v1 = Router::new()
        .nest("/contact-lists", contact_list_routes)
        .nest("/segments", segment_routes)
        .nest("/templates", template_routes)
        .nest("/providers", provider_routes)
        .nest("/oauth", oauth_routes)
        .nest("/campaigns", campaign_routes)
        .route("/send", post(send::send_email))
        .route("/analytics/overview", get(analytics::overview));

    // Public tracking endpoints, embedded in sent mail
    let tracking_routes = Router::new()
        .route("/tracking", get(tracking::tracking_pixel))
        .route("/link-redirect", get(tracking::link_redirect));

    let cors = cors_layer(&state.config.api.cors_origins);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .nest("/api", tracking_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use mailcast_common::Config;
    use mailcast_core::provider::{OutgoingMessage, SendReceipt, Transport};
    use mailcast_core::tracking::{encode_b64, LinkTracker};
    use mailcast_core::TransportFactory;
    use mailcast_storage::models::{CreateProvider, ProviderConfig, ProviderSecret};
    use mailcast_storage::repository::Repositories;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    /// Transport that accepts everything except listed recipients
    #[derive(Default)]
    struct StubTransport {
        reject: Vec<String>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, message: &OutgoingMessage) -> mailcast_common::Result<SendReceipt> {
            if self.reject.contains(&message.to) {
                return Err(mailcast_common::Error::Provider("Mailbox unavailable".to_string()));
            }
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(message.clone());
            Ok(SendReceipt {
                message_id: format!("<{}@stub>", Uuid::new_v4()),
                provider: mailcast_storage::models::ProviderKind::TransactionalApi,
            })
        }

        async fn test_connection(&self) -> mailcast_common::Result<()> {
            Ok(())
        }
    }

    struct StubFactory(Arc<StubTransport>);

    impl TransportFactory for StubFactory {
        fn build(&self, _config: &ProviderConfig) -> mailcast_common::Result<Arc<dyn Transport>> {
            Ok(self.0.clone())
        }
    }

    fn test_app(reject: &[&str]) -> (TempDir, Arc<AppState>, Arc<StubTransport>) {
        test_app_with(reject, |_| {})
    }

    fn test_app_with(
        reject: &[&str],
        configure: impl FnOnce(&mut Config),
    ) -> (TempDir, Arc<AppState>, Arc<StubTransport>) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        let repos = Repositories::open(&config.storage).unwrap();
        config.server.public_url = "https://mail.example.com".to_string();
        config.sending.batch_size = 50;
        configure(&mut config);

        let transport = Arc::new(StubTransport {
            reject: reject.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        });
        let factory: Arc<dyn TransportFactory> = Arc::new(StubFactory(transport.clone()));
        let state = Arc::new(AppState::with_factory(config, repos, factory));
        (dir, state, transport)
    }

    async fn call(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn call_json(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, _, bytes) = call(state, request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn active_provider(state: &Arc<AppState>) -> Uuid {
        let provider = state
            .repos
            .providers
            .create(CreateProvider {
                name: "Resend".to_string(),
                from_address: Some("news@example.com".to_string()),
                secret: ProviderSecret::TransactionalApi {
                    api_key: "re_test".to_string(),
                    base_url: None,
                    domain: None,
                },
            })
            .await
            .unwrap();
        let (status, body) =
            call_json(state, "POST", &format!("/api/v1/providers/{}/test", provider.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        provider.id
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state, _) = test_app(&[]);
        let (status, body) = call_json(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = call_json(&state, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pixel_always_returns_gif() {
        let (_dir, state, _) = test_app(&[]);
        let campaign_id = Uuid::new_v4();
        let good = LinkTracker::new("https://mail.example.com").pixel_url(campaign_id, "a@x.com");
        let good_path = good.trim_start_matches("https://mail.example.com").to_string();

        for uri in [good_path.as_str(), "/api/tracking?id=garbage", "/api/tracking"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let (status, headers, body) = call(&state, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_TYPE], "image/gif");
            assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
            assert_eq!(body.len(), 43);
        }

        let events = state.repos.events.list_by_campaign(campaign_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].contact_email, "a@x.com");
    }

    #[tokio::test]
    async fn test_link_redirect_is_302_to_exact_url() {
        let (_dir, state, _) = test_app(&[]);
        let campaign_id = Uuid::new_v4();
        let tracked = LinkTracker::new("https://mail.example.com").click_url(
            campaign_id,
            "a@x.com",
            0,
            "https://example.com/x",
        );
        let path = tracked.trim_start_matches("https://mail.example.com").to_string();

        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let (status, headers, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://example.com/x");

        let events = state.repos.events.list_by_campaign(campaign_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].url(), Some("https://example.com/x"));
    }

    #[tokio::test]
    async fn test_link_redirect_rejects_bad_url() {
        let (_dir, state, _) = test_app(&[]);

        let (status, body) = call_json(&state, "GET", "/api/link-redirect?url=not-base64!", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let uri = format!("/api/link-redirect?url={}", encode_b64("javascript:alert(1)"));
        let (status, _) = call_json(&state, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call_json(&state, "GET", "/api/link-redirect", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pixel_tolerates_duplicate_and_malformed_params() {
        let (_dir, state, _) = test_app(&[]);

        for uri in [
            "/api/tracking?id=a&id=b",
            "/api/tracking?id=%ZZ&&=x&id",
            "/api/tracking?%FF%FE=1",
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let (status, headers, body) = call(&state, request).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(headers[header::CONTENT_TYPE], "image/gif");
            assert_eq!(body.len(), 43);
        }
    }

    #[tokio::test]
    async fn test_link_redirect_uses_first_values() {
        let (_dir, state, _) = test_app(&[]);
        let campaign_id = Uuid::new_v4();
        let token = LinkTracker::new("https://mail.example.com")
            .click_url(campaign_id, "a@x.com", 2, "https://example.com/x")
            .split_once("?id=")
            .and_then(|(_, rest)| rest.split_once("&url="))
            .map(|(id, _)| id.to_string())
            .unwrap();
        let target = encode_b64("https://example.com/x");
        let other = encode_b64("https://example.com/other");

        let uri = format!(
            "/api/link-redirect?id={}&id=junk&url={}&url={}",
            token, target, other
        );
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, headers, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://example.com/x");

        let events = state.repos.events.list_by_campaign(campaign_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata["link_index"], json!(2));

        // An undecodable id never blocks the click-through
        let uri = format!("/api/link-redirect?id=a&id=b&url={}", target);
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, headers, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://example.com/x");
    }

    #[tokio::test]
    async fn test_link_redirect_accepts_form_decoded_standard_base64() {
        let (_dir, state, _) = test_app(&[]);
        // Standard base64 of this URL ends in `+`, which arrives as a space
        let uri = "/api/link-redirect?url=aHR0cHM6Ly9leGFtcGxlLmNvbS94P2E9MT5+";
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, headers, _) = call(&state, request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://example.com/x?a=1>~");
    }

    #[tokio::test]
    async fn test_import_contact_list() {
        let (_dir, state, _) = test_app(&[]);
        let csv = "Email,First Name,Company\na@x.com,Ann,Acme\nnot-an-email,Bob,Beta\nb@y.com,Cid,Beta\n";
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/contact-lists/import?name=Leads")
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let (status, _, bytes) = call(&state, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["imported"], json!(2));
        assert_eq!(body["list"]["name"], "Leads");
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);

        let (status, lists) = call_json(&state, "GET", "/api/v1/contact-lists", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(lists[0]["contact_count"], json!(2));
    }

    #[tokio::test]
    async fn test_segment_preview_selects_company() {
        let (_dir, state, _) = test_app(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/contact-lists/import")
            .body(Body::from("email,company\na@x.com,Acme\nb@y.com,Beta\n"))
            .unwrap();
        let (_, _, bytes) = call(&state, request).await;
        let list_id = serde_json::from_slice::<Value>(&bytes).unwrap()["list"]["id"].clone();

        let (status, body) = call_json(
            &state,
            "POST",
            "/api/v1/segments/preview",
            Some(json!({
                "list_id": list_id,
                "rule_set": {
                    "combinator": "and",
                    "rules": [{"field": "company", "operator": "equals", "value": "Acme"}]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["contacts"][0]["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_campaign_flow_start_and_process() {
        let (_dir, state, transport) = test_app(&["b@y.com"]);
        let provider_id = active_provider(&state).await;

        let (status, campaign) = call_json(
            &state,
            "POST",
            "/api/v1/campaigns",
            Some(json!({
                "name": "Launch",
                "provider_id": provider_id,
                "template": {
                    "name": "inline",
                    "subject": "Hi {{name}}",
                    "html_body": "<p>Hello {{name}}</p><a href=\"https://example.com/x\">x</a>"
                },
                "recipients": [
                    {"email": "a@x.com", "attributes": {"name": "Ann"}},
                    {"email": "b@y.com", "attributes": {"name": "Bob"}}
                ],
                "settings": {"interval_seconds": 0}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", campaign);
        assert_eq!(campaign["status"], "draft");
        let id = campaign["id"].as_str().unwrap().to_string();

        let (status, started) =
            call_json(&state, "POST", &format!("/api/v1/campaigns/{}/start", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["status"], "sending");

        let (status, report) =
            call_json(&state, "POST", &format!("/api/v1/campaigns/{}/process", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["sent"], json!(1));
        assert_eq!(report["failed"], json!(1));
        assert_eq!(report["status"], "completed");

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi Ann");
        assert!(sent[0].html_body.contains("/api/link-redirect?id="));
        assert!(sent[0].html_body.contains("/api/tracking?id="));

        let (status, stats) =
            call_json(&state, "GET", &format!("/api/v1/campaigns/{}/analytics", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["sent"], json!(1));
        assert_eq!(stats["failed"], json!(1));

        let (_, events) =
            call_json(&state, "GET", &format!("/api/v1/campaigns/{}/events", id), None).await;
        assert_eq!(events.as_array().unwrap().len(), 2);

        let (_, overview) = call_json(&state, "GET", "/api/v1/analytics/overview", None).await;
        assert_eq!(overview["total_campaigns"], json!(1));
        assert_eq!(overview["total_sent"], json!(1));
    }

    #[tokio::test]
    async fn test_process_without_sending_is_validation_error() {
        let (_dir, state, _) = test_app(&[]);
        let provider_id = active_provider(&state).await;
        let (_, campaign) = call_json(
            &state,
            "POST",
            "/api/v1/campaigns",
            Some(json!({
                "name": "Draft",
                "provider_id": provider_id,
                "template": {"name": "t", "subject": "s", "html_body": "<p>b</p>"},
                "recipients": [{"email": "a@x.com"}]
            })),
        )
        .await;

        let uri = format!("/api/v1/campaigns/{}/process", campaign["id"].as_str().unwrap());
        let (status, body) = call_json(&state, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_404() {
        let (_dir, state, _) = test_app(&[]);
        let (status, body) =
            call_json(&state, "GET", &format!("/api/v1/campaigns/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_providers_are_masked() {
        let (_dir, state, _) = test_app(&[]);
        let (status, created) = call_json(
            &state,
            "POST",
            "/api/v1/providers",
            Some(json!({
                "name": "Resend",
                "kind": "transactional_api",
                "api_key": "re_secret_value"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["api_key"], "***HIDDEN***");
        assert_eq!(created["is_active"], json!(false));

        let (_, listed) = call_json(&state, "GET", "/api/v1/providers", None).await;
        assert_eq!(listed[0]["api_key"], "***HIDDEN***");

        let stored = state.repos.providers.list().await.unwrap();
        assert_eq!(
            stored[0].secret,
            ProviderSecret::TransactionalApi {
                api_key: "re_secret_value".to_string(),
                base_url: None,
                domain: None,
            }
        );
    }

    #[tokio::test]
    async fn test_direct_send() {
        let (_dir, state, transport) = test_app(&[]);
        active_provider(&state).await;

        let (status, body) = call_json(
            &state,
            "POST",
            "/api/v1/send",
            Some(json!({
                "to": "a@x.com",
                "subject": "Hello",
                "html_body": "<p>Hi</p>"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["to"], "a@x.com");
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    fn oauth_app(server: &MockServer) -> (TempDir, Arc<AppState>, Arc<StubTransport>) {
        let base = server.uri();
        test_app_with(&[], move |config| {
            config.oauth.client_id = Some("client".into());
            config.oauth.client_secret = Some("shh".into());
            config.oauth.redirect_uri = Some("https://mail.example.com/api/v1/oauth/callback".into());
            config.oauth.token_url = format!("{}/token", base);
            config.oauth.userinfo_url = format!("{}/userinfo", base);
            config.oauth.gmail_api_base = base;
        })
    }

    async fn mount_google(server: &MockServer) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/token"))
            .and(matchers::body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.access",
                "refresh_token": "1//refresh",
                "expires_in": 3599
            })))
            .mount(server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "email": "me@gmail.com", "name": "Me" })),
            )
            .mount(server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/gmail/v1/users/me/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "emailAddress": "me@gmail.com" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_oauth_authorize_returns_consent_url() {
        let server = MockServer::start().await;
        let (_dir, state, _) = oauth_app(&server);

        let (status, body) = call_json(&state, "GET", "/api/v1/oauth/authorize?state=abc", None).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["auth_url"].as_str().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=abc"));
    }

    #[tokio::test]
    async fn test_oauth_authorize_without_client_is_400() {
        let (_dir, state, _) = test_app(&[]);
        let (status, body) = call_json(&state, "GET", "/api/v1/oauth/authorize", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "configuration_error");
    }

    #[tokio::test]
    async fn test_oauth_callback_connects_then_updates_mailbox() {
        let server = MockServer::start().await;
        mount_google(&server).await;
        let (_dir, state, _) = oauth_app(&server);

        let (status, body) = call_json(&state, "GET", "/api/v1/oauth/callback?code=good-code&state=abc", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "connected");
        assert_eq!(body["email"], "me@gmail.com");
        assert_eq!(body["provider"]["kind"], "oauth_mail");
        assert_eq!(body["provider"]["access_token"], "***HIDDEN***");
        assert_eq!(body["provider"]["is_default"], json!(true));
        assert_eq!(body["provider"]["is_active"], json!(true));

        // Same mailbox through the manual code submission
        let (status, body) = call_json(
            &state,
            "POST",
            "/api/v1/oauth/callback",
            Some(json!({ "code": "good-code" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");

        let stored = state.repos.providers.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        match &stored[0].secret {
            ProviderSecret::OauthMail {
                access_token,
                refresh_token,
                ..
            } => {
                assert_eq!(access_token, "ya29.access");
                assert_eq!(refresh_token.as_deref(), Some("1//refresh"));
            }
            other => panic!("unexpected secret {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oauth_callback_errors() {
        let server = MockServer::start().await;
        mount_google(&server).await;
        let (_dir, state, _) = oauth_app(&server);

        let (status, body) =
            call_json(&state, "GET", "/api/v1/oauth/callback?error=access_denied", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("access_denied"));

        let (status, _) = call_json(&state, "GET", "/api/v1/oauth/callback", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call_json(&state, "GET", "/api/v1/oauth/callback?code=stale-code", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "provider_error");

        assert!(state.repos.providers.list().await.unwrap().is_empty());
    }
}
