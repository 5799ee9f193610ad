// Library-wide constants: defaults, header names, endpoint paths.

use reqwest::header::HeaderName;

/// Default request timeout against LAPI, in seconds.
pub const API_TIMEOUT_SECS: u64 = 120;
/// Default connect timeout against LAPI, in seconds.
pub const API_CONNECT_TIMEOUT_SECS: u64 = 300;
/// Default AppSec request timeout, in milliseconds.
pub const APPSEC_TIMEOUT_MS: u64 = 400;
/// Default AppSec connect timeout, in milliseconds.
pub const APPSEC_CONNECT_TIMEOUT_MS: u64 = 150;

pub const DEFAULT_LAPI_URL: &str = "http://localhost:8080";
pub const DEFAULT_APPSEC_URL: &str = "http://localhost:7422";

/// User-Agent prefix: `<prefix>[_<suffix>]/<version>`.
pub const USER_AGENT_PREFIX: &str = "csrustlapi";
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// `type` reported in usage metrics when the caller gives none.
pub const METRICS_TYPE: &str = "crowdsec-rust-bouncer";

// ── Headers ──────────────────────────────────────────────────────────

pub const HEADER_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
pub const HEADER_APPSEC_API_KEY: HeaderName = HeaderName::from_static("x-crowdsec-appsec-api-key");
pub const HEADER_APPSEC_IP: HeaderName = HeaderName::from_static("x-crowdsec-appsec-ip");
pub const HEADER_APPSEC_URI: HeaderName = HeaderName::from_static("x-crowdsec-appsec-uri");
pub const HEADER_APPSEC_HOST: HeaderName = HeaderName::from_static("x-crowdsec-appsec-host");
pub const HEADER_APPSEC_VERB: HeaderName = HeaderName::from_static("x-crowdsec-appsec-verb");
pub const HEADER_APPSEC_USER_AGENT: HeaderName =
    HeaderName::from_static("x-crowdsec-appsec-user-agent");
pub const HEADER_APPSEC_HTTP_VERSION: HeaderName =
    HeaderName::from_static("x-crowdsec-appsec-http-version");

// ── Endpoints ────────────────────────────────────────────────────────

pub const ALERTS_ENDPOINT: &str = "/v1/alerts";
pub const DECISIONS_FILTER_ENDPOINT: &str = "/v1/decisions";
pub const DECISIONS_STREAM_ENDPOINT: &str = "/v1/decisions/stream";
pub const WATCHER_LOGIN_ENDPOINT: &str = "/v1/watchers/login";
pub const METRICS_ENDPOINT: &str = "/v1/usage-metrics";
