// Bouncer client: decisions, AppSec and usage metrics.
//
// Authentication is static (API key header or client certificate), so there
// is no token store on this side.

use chrono::Utc;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use sysinfo::System;
use tracing::debug;

use crate::client::{BaseClient, decode, ensure_success, redact_headers, truncate_for_log};
use crate::config::{ClientRole, ConnectionConfig, ConnectionSettings};
use crate::constants;
use crate::error::Error;
use crate::models::{AppSecDecision, DecisionFilter, DecisionRecord, DecisionStream, StreamFilter};
use crate::payload::{MetricItem, MetricsMeta, MetricsProperties, OsInfo, UsageMetrics};
use crate::transport::{HttpRequest, ReqwestHandler, RequestHandler, Service};

#[derive(Serialize)]
struct StreamParams<'a> {
    startup: bool,
    #[serde(flatten)]
    filter: &'a StreamFilter,
}

/// Client for the bouncer (remediation component) side of LAPI.
#[derive(Debug)]
pub struct BouncerClient<H = ReqwestHandler> {
    base: BaseClient<H>,
}

impl BouncerClient<ReqwestHandler> {
    pub fn new(settings: &ConnectionSettings) -> Result<Self, Error> {
        let config = settings.validate(ClientRole::Bouncer)?;
        let handler = ReqwestHandler::from_config(&config)?;
        Ok(Self {
            base: BaseClient::new(config, handler)?,
        })
    }
}

impl<H: RequestHandler> BouncerClient<H> {
    pub fn with_handler(settings: &ConnectionSettings, handler: H) -> Result<Self, Error> {
        let config = settings.validate(ClientRole::Bouncer)?;
        Ok(Self {
            base: BaseClient::new(config, handler)?,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.base.config()
    }

    // ── Decisions ────────────────────────────────────────────────────

    /// Active decisions matching `filter`. LAPI's `null` reads as empty.
    pub async fn get_filtered_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, Error> {
        let decisions: Option<Vec<DecisionRecord>> = self
            .base
            .request(
                Method::GET,
                &self.config().endpoints().decisions,
                Some(filter),
                None,
            )
            .await?;
        Ok(decisions.unwrap_or_default())
    }

    /// Decision changes since the previous stream call, or every active
    /// decision when `startup` is set.
    pub async fn get_stream_decisions(
        &self,
        startup: bool,
        filter: &StreamFilter,
    ) -> Result<DecisionStream, Error> {
        let stream: Option<DecisionStream> = self
            .base
            .request(
                Method::GET,
                &self.config().endpoints().decisions_stream,
                Some(&StreamParams { startup, filter }),
                None,
            )
            .await?;
        Ok(stream.unwrap_or_default())
    }

    // ── AppSec ───────────────────────────────────────────────────────

    /// Forward one HTTP request to the AppSec component for inspection.
    ///
    /// POST when `raw_body` is non-empty, GET otherwise. The AppSec key is
    /// taken from the configured API key unless `headers` already has one.
    /// Blocking verdicts come back with non-2xx statuses and still decode;
    /// 401 and 5xx are errors.
    pub async fn get_app_sec_decision(
        &self,
        mut headers: HeaderMap,
        raw_body: &str,
    ) -> Result<AppSecDecision, Error> {
        let method = if raw_body.is_empty() {
            Method::GET
        } else {
            Method::POST
        };

        if !headers.contains_key(constants::HEADER_APPSEC_API_KEY) {
            if let Some(key) = self.config().api_key() {
                let mut value = HeaderValue::from_str(key.expose_secret())
                    .map_err(|e| Error::client(format!("Invalid AppSec API key: {e}")))?;
                value.set_sensitive(true);
                headers.insert(constants::HEADER_APPSEC_API_KEY, value);
            }
        }
        if !headers.contains_key(USER_AGENT) {
            if let Some(ua) = self.base.default_headers().get(USER_AGENT) {
                headers.insert(USER_AGENT, ua.clone());
            }
        }

        let url = self.config().appsec_url().clone();
        debug!(
            %method,
            %url,
            headers = ?redact_headers(&headers),
            body = %truncate_for_log(raw_body),
            "AppSec request"
        );

        let resp = self
            .base
            .dispatch(HttpRequest {
                service: Service::AppSec,
                method,
                url,
                headers,
                body: (!raw_body.is_empty()).then(|| raw_body.to_owned()),
                timeout: Some(self.config().appsec_timeout()),
            })
            .await?;

        if resp.status == 401 || resp.status >= 500 {
            ensure_success(&resp)?;
        }
        decode(&resp)
    }

    // ── Usage metrics ────────────────────────────────────────────────

    /// Assemble a usage-metrics report.
    ///
    /// Fills in what the caller left out: `type` defaults to
    /// `crowdsec-rust-bouncer`, a zero `last_pull` is dropped, the OS is
    /// detected, and `utc_now_timestamp` is now.
    pub fn build_usage_metrics(
        &self,
        mut properties: MetricsProperties,
        mut meta: MetricsMeta,
        items: Vec<MetricItem>,
    ) -> Result<UsageMetrics, Error> {
        if properties.kind.is_none() {
            properties.kind = Some(constants::METRICS_TYPE.to_owned());
        }
        if properties.last_pull == Some(0) {
            properties.last_pull = None;
        }
        let os = properties.os.take().or_else(detect_os);
        properties.os = os.filter(|os| !os.name.is_empty() && !os.version.is_empty());
        if meta.utc_now_timestamp.is_none() {
            meta.utc_now_timestamp = Some(Utc::now().timestamp());
        }

        UsageMetrics::new(properties, meta, items).map_err(|e| Error::Client {
            message: format!("Something went wrong while creating metrics: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    pub async fn push_usage_metrics(&self, metrics: &UsageMetrics) -> Result<Value, Error> {
        self.base
            .request(
                Method::POST,
                &self.config().endpoints().usage_metrics,
                Some(metrics),
                None,
            )
            .await
    }
}

fn detect_os() -> Option<OsInfo> {
    Some(OsInfo {
        name: System::name()?,
        version: System::os_version().or_else(System::kernel_version)?,
    })
}

// ── AppSec headers ───────────────────────────────────────────────────

/// Builds the `X-Crowdsec-Appsec-*` header set describing the request
/// under inspection.
#[derive(Debug, Clone, Default)]
pub struct AppSecHeaders {
    headers: HeaderMap,
    invalid: Vec<&'static str>,
}

impl AppSecHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: reqwest::header::HeaderName, field: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => self.invalid.push(field),
        }
        self
    }

    /// Client IP of the inspected request.
    pub fn ip(self, ip: &str) -> Self {
        self.set(constants::HEADER_APPSEC_IP, "ip", ip)
    }

    pub fn uri(self, uri: &str) -> Self {
        self.set(constants::HEADER_APPSEC_URI, "uri", uri)
    }

    pub fn host(self, host: &str) -> Self {
        self.set(constants::HEADER_APPSEC_HOST, "host", host)
    }

    pub fn verb(self, verb: &str) -> Self {
        self.set(constants::HEADER_APPSEC_VERB, "verb", verb)
    }

    pub fn user_agent(self, user_agent: &str) -> Self {
        self.set(constants::HEADER_APPSEC_USER_AGENT, "user_agent", user_agent)
    }

    /// e.g. `11` for HTTP/1.1, `20` for HTTP/2.
    pub fn http_version(self, version: &str) -> Self {
        self.set(constants::HEADER_APPSEC_HTTP_VERSION, "http_version", version)
    }

    /// Finish. Values that are not valid header text are reported here.
    pub fn build(self) -> Result<HeaderMap, Error> {
        match self.invalid.first() {
            Some(field) => Err(Error::client(format!(
                "Invalid AppSec header value for {field}"
            ))),
            None => Ok(self.headers),
        }
    }
}
