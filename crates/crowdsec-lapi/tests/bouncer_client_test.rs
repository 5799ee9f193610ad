#![allow(clippy::unwrap_used)]
// Integration tests for `BouncerClient` using wiremock.

use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crowdsec_lapi::payload::{MetricItem, MetricsMeta, MetricsProperties, OsInfo};
use crowdsec_lapi::{
    AppSecHeaders, BouncerClient, ConfigErrorKind, ConnectionSettings, DecisionFilter, Error,
    StreamFilter,
};

const API_KEY: &str = "bouncer-key";

// ── Helpers ─────────────────────────────────────────────────────────

fn settings(server: &MockServer) -> ConnectionSettings {
    let mut settings = ConnectionSettings::with_api_key(server.uri(), API_KEY);
    settings.appsec_url = Some(server.uri());
    settings
}

async fn setup() -> (MockServer, BouncerClient) {
    let server = MockServer::start().await;
    let client = BouncerClient::new(&settings(&server)).unwrap();
    (server, client)
}

fn appsec_headers() -> HeaderMap {
    AppSecHeaders::new()
        .ip("1.2.3.4")
        .uri("/login")
        .host("example.com")
        .verb("GET")
        .user_agent("curl/8.0")
        .http_version("11")
        .build()
        .unwrap()
}

// ── Decisions ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_filtered_decisions_send_api_key_and_user_agent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/decisions"))
        .and(header("x-api-key", API_KEY))
        .and(header(
            "user-agent",
            format!("csrustlapi/v{}", env!("CARGO_PKG_VERSION")).as_str(),
        ))
        .and(query_param("ip", "172.26.0.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "duration": "3h59m56.205431304s",
            "id": 1,
            "origin": "cscli",
            "scenario": "manual 'ban' from ''",
            "scope": "Ip",
            "type": "ban",
            "value": "172.26.0.2"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let decisions = client
        .get_filtered_decisions(&DecisionFilter {
            ip: Some("172.26.0.2".into()),
            ..DecisionFilter::default()
        })
        .await
        .unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].kind, "ban");
    assert_eq!(decisions[0].value, "172.26.0.2");
    assert_eq!(decisions[0].id, Some(1));
}

#[tokio::test]
async fn test_filtered_decisions_null_is_empty() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/decisions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let decisions = client
        .get_filtered_decisions(&DecisionFilter::default())
        .await
        .unwrap();
    assert!(decisions.is_empty());
}

#[tokio::test]
async fn test_stream_decisions_startup_with_filter() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/decisions/stream"))
        .and(query_param("startup", "true"))
        .and(query_param("scopes", "Ip,Range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new": [{
                "duration": "4h",
                "id": 7,
                "origin": "crowdsec",
                "scenario": "crowdsecurity/ssh-bf",
                "scope": "Ip",
                "type": "ban",
                "value": "5.6.7.8"
            }],
            "deleted": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client
        .get_stream_decisions(
            true,
            &StreamFilter {
                scopes: vec!["Ip".into(), "Range".into()],
                ..StreamFilter::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(stream.new.len(), 1);
    assert_eq!(stream.new[0].scenario, "crowdsecurity/ssh-bf");
    assert!(stream.deleted.is_empty());
}

#[tokio::test]
async fn test_stream_decisions_without_startup() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/decisions/stream"))
        .and(query_param("startup", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "new": [], "deleted": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client
        .get_stream_decisions(false, &StreamFilter::default())
        .await
        .unwrap();
    assert!(stream.new.is_empty());
}

#[tokio::test]
async fn test_forbidden_decisions_is_client_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/decisions"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "access forbidden" })),
        )
        .mount(&server)
        .await;

    let err = client
        .get_filtered_decisions(&DecisionFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(
        err.to_string()
            .starts_with("Unexpected response status code: 403")
    );
}

// ── AppSec ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_appsec_get_adds_key_and_forwards_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-crowdsec-appsec-api-key", API_KEY))
        .and(header("x-crowdsec-appsec-ip", "1.2.3.4"))
        .and(header("x-crowdsec-appsec-uri", "/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "action": "allow", "http_status": 200 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let decision = client
        .get_app_sec_decision(appsec_headers(), "")
        .await
        .unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.http_status, 200);
}

#[tokio::test]
async fn test_appsec_post_with_body_decodes_blocking_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string("user=admin&password=x"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "action": "ban", "http_status": 403 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let decision = client
        .get_app_sec_decision(appsec_headers(), "user=admin&password=x")
        .await
        .unwrap();
    assert!(!decision.is_allowed());
    assert_eq!(decision.action, "ban");
    assert_eq!(decision.http_status, 403);
}

#[tokio::test]
async fn test_appsec_keeps_caller_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-crowdsec-appsec-api-key", "caller-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "action": "allow", "http_status": 200 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = appsec_headers();
    headers.insert(
        "x-crowdsec-appsec-api-key",
        HeaderValue::from_static("caller-key"),
    );
    client.get_app_sec_decision(headers, "").await.unwrap();
}

#[tokio::test]
async fn test_appsec_unauthorized_and_server_errors_fail() {
    for status in [401, 500] {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "message": "nope" })))
            .mount(&server)
            .await;

        let err = client
            .get_app_sec_decision(appsec_headers(), "")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test]
async fn test_appsec_times_out_quickly() {
    let server = MockServer::start().await;
    let mut settings = settings(&server);
    settings.appsec_timeout_ms = Some(100);
    let client = BouncerClient::new(&settings).unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "action": "allow", "http_status": 200 }))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client
        .get_app_sec_decision(appsec_headers(), "")
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got: {err:?}");
}

// ── Usage metrics ───────────────────────────────────────────────────

fn properties() -> MetricsProperties {
    MetricsProperties {
        name: "nginx-bouncer".into(),
        version: "v1.2.3".into(),
        utc_startup_timestamp: 1_700_000_000,
        last_pull: Some(0),
        os: Some(OsInfo {
            name: "Linux".into(),
            version: "6.1".into(),
        }),
        ..MetricsProperties::default()
    }
}

#[tokio::test]
async fn test_build_usage_metrics_applies_defaults() {
    let (_server, client) = setup().await;

    let metrics = client
        .build_usage_metrics(
            properties(),
            MetricsMeta {
                window_size_seconds: 900,
                utc_now_timestamp: None,
            },
            vec![MetricItem::new("dropped", 3.0, "request").with_label("origin", "cscli")],
        )
        .unwrap();

    let value = serde_json::to_value(&metrics).unwrap();
    let component = &value["remediation_components"][0];
    assert_eq!(component["type"], json!("crowdsec-rust-bouncer"));
    assert!(component.get("last_pull").is_none());
    assert_eq!(component["os"], json!({ "name": "Linux", "version": "6.1" }));
    assert!(component["metrics"][0]["meta"]["utc_now_timestamp"].as_i64().unwrap() > 1_700_000_000);
    assert_eq!(component["metrics"][0]["items"][0]["labels"]["origin"], json!("cscli"));
}

#[tokio::test]
async fn test_build_usage_metrics_keeps_non_zero_last_pull() {
    let (_server, client) = setup().await;

    let mut props = properties();
    props.last_pull = Some(1_700_000_500);
    let metrics = client
        .build_usage_metrics(props, MetricsMeta::default(), vec![])
        .unwrap();

    assert_eq!(metrics.properties().last_pull, Some(1_700_000_500));
}

#[tokio::test]
async fn test_build_usage_metrics_wraps_validation_errors() {
    let (_server, client) = setup().await;

    let mut props = properties();
    props.name = String::new();
    let err = client
        .build_usage_metrics(props, MetricsMeta::default(), vec![])
        .unwrap_err();

    assert!(matches!(err, Error::Client { .. }));
    assert_eq!(
        err.to_string(),
        "Something went wrong while creating metrics: Invalid metrics \"name\": cannot contain an empty value"
    );
}

#[tokio::test]
async fn test_push_usage_metrics() {
    let (server, client) = setup().await;

    let metrics = client
        .build_usage_metrics(
            properties(),
            MetricsMeta {
                window_size_seconds: 60,
                utc_now_timestamp: Some(1_700_000_060),
            },
            vec![MetricItem::new("processed", 42.0, "request")],
        )
        .unwrap();
    let expected = serde_json::to_value(&metrics).unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/usage-metrics"))
        .and(header("x-api-key", API_KEY))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client.push_usage_metrics(&metrics).await.unwrap();
    assert!(answer.is_null());
}

// ── Construction ────────────────────────────────────────────────────

#[test]
fn test_missing_api_key_fails_at_construction() {
    let settings = ConnectionSettings::default();
    let Err(Error::Configuration(err)) = BouncerClient::new(&settings) else {
        panic!("expected configuration error");
    };
    assert_eq!(err.kind(), ConfigErrorKind::MissingField);
    assert_eq!(err.message(), "Api key is required as auth type is api_key");
}

#[test]
fn test_tls_without_key_fails_at_construction() {
    let mut settings = ConnectionSettings::with_tls("https://lapi:8080", "/c.pem", "/k.pem");
    settings.tls_key_path = None;
    let Err(Error::Configuration(err)) = BouncerClient::new(&settings) else {
        panic!("expected configuration error");
    };
    assert_eq!(
        err.message(),
        "Bouncer certificate and key paths are required for tls authentication."
    );
}
