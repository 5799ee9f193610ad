// ── Connection configuration ──
//
// `ConnectionSettings` is the raw, loosely-typed input (every field optional,
// unknown keys ignored). `validate()` applies defaults and the cross-field
// rules and produces an immutable `ConnectionConfig` that clients hold for
// their whole lifetime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants;
use crate::error::{ConfigErrorKind, ConfigViolation, ConfigurationError};

const USER_AGENT_SUFFIX_MAX_LEN: usize = 16;

// ── Auth type ────────────────────────────────────────────────────────

/// How the client proves its identity to LAPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Static API key (bouncer) or machine_id/password login (watcher).
    #[default]
    ApiKey,
    /// Mutual TLS; the transport presents the client certificate.
    Tls,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Tls => "tls",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "tls" => Ok(Self::Tls),
            other => Err(format!(
                "Invalid auth_type \"{other}\". Allowed values are api_key, tls"
            )),
        }
    }
}

/// Which client the settings are validated for. Watchers log in with
/// machine credentials, bouncers send a static key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Bouncer,
    Watcher,
}

// ── Endpoints ────────────────────────────────────────────────────────

/// LAPI endpoint paths, relative to `api_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub alerts: String,
    pub decisions: String,
    pub decisions_stream: String,
    pub watcher_login: String,
    pub usage_metrics: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            alerts: constants::ALERTS_ENDPOINT.into(),
            decisions: constants::DECISIONS_FILTER_ENDPOINT.into(),
            decisions_stream: constants::DECISIONS_STREAM_ENDPOINT.into(),
            watcher_login: constants::WATCHER_LOGIN_ENDPOINT.into(),
            usage_metrics: constants::METRICS_ENDPOINT.into(),
        }
    }
}

impl Endpoints {
    fn iter(&self) -> [(&'static str, &str); 5] {
        [
            ("endpoints.alerts", &self.alerts),
            ("endpoints.decisions", &self.decisions),
            ("endpoints.decisions_stream", &self.decisions_stream),
            ("endpoints.watcher_login", &self.watcher_login),
            ("endpoints.usage_metrics", &self.usage_metrics),
        ]
    }
}

// ── Raw settings ─────────────────────────────────────────────────────

/// Unvalidated connection settings, as read from a config file, the
/// environment, or built in code.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub api_url: Option<String>,
    pub auth_type: Option<String>,
    pub api_key: Option<String>,
    pub machine_id: Option<String>,
    pub password: Option<String>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub tls_ca_cert_path: Option<PathBuf>,
    pub tls_verify_peer: Option<bool>,
    /// Seconds.
    pub api_timeout: Option<u64>,
    /// Seconds. `0` leaves the connect phase bounded only by `api_timeout`.
    pub api_connect_timeout: Option<u64>,
    pub appsec_url: Option<String>,
    pub appsec_timeout_ms: Option<u64>,
    pub appsec_connect_timeout_ms: Option<u64>,
    pub user_agent_suffix: Option<String>,
    pub user_agent_version: Option<String>,
    pub endpoints: Endpoints,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("ConnectionSettings")
            .field("api_url", &self.api_url)
            .field("auth_type", &self.auth_type)
            .field("api_key", &redact(&self.api_key))
            .field("machine_id", &self.machine_id)
            .field("password", &redact(&self.password))
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("tls_ca_cert_path", &self.tls_ca_cert_path)
            .field("tls_verify_peer", &self.tls_verify_peer)
            .field("api_timeout", &self.api_timeout)
            .field("api_connect_timeout", &self.api_connect_timeout)
            .field("appsec_url", &self.appsec_url)
            .field("appsec_timeout_ms", &self.appsec_timeout_ms)
            .field("appsec_connect_timeout_ms", &self.appsec_connect_timeout_ms)
            .field("user_agent_suffix", &self.user_agent_suffix)
            .field("user_agent_version", &self.user_agent_version)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl ConnectionSettings {
    /// Bouncer settings authenticated by API key.
    pub fn with_api_key(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Watcher settings authenticated by machine credentials.
    pub fn with_machine_credentials(
        api_url: impl Into<String>,
        machine_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            api_url: Some(api_url.into()),
            machine_id: Some(machine_id.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Settings authenticated by client certificate.
    pub fn with_tls(
        api_url: impl Into<String>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_url: Some(api_url.into()),
            auth_type: Some(AuthType::Tls.as_str().into()),
            tls_cert_path: Some(cert_path.into()),
            tls_key_path: Some(key_path.into()),
            ..Self::default()
        }
    }

    /// Validate and normalize into a [`ConnectionConfig`].
    ///
    /// Every rule is checked; the returned error lists all violations and
    /// renders the first one.
    pub fn validate(&self, role: ClientRole) -> Result<ConnectionConfig, ConfigurationError> {
        let mut violations = Vec::new();
        let mut invalid = |field: &'static str, message: String| {
            violations.push(ConfigViolation {
                kind: ConfigErrorKind::InvalidValue,
                field,
                message,
            });
        };

        let user_agent_suffix = non_empty(self.user_agent_suffix.as_deref());
        if let Some(suffix) = user_agent_suffix {
            if suffix.len() > USER_AGENT_SUFFIX_MAX_LEN
                || !suffix.chars().all(|c| c.is_ascii_alphanumeric())
            {
                invalid(
                    "user_agent_suffix",
                    "Invalid user agent suffix. Length must be <= 16. Allowed chars are A-Za-z0-9"
                        .into(),
                );
            }
        }

        let api_url = parse_http_url(
            "api_url",
            self.api_url.as_deref(),
            constants::DEFAULT_LAPI_URL,
        )
        .map_err(|m| invalid("api_url", m))
        .ok();
        let appsec_url = parse_http_url(
            "appsec_url",
            self.appsec_url.as_deref(),
            constants::DEFAULT_APPSEC_URL,
        )
        .map_err(|m| invalid("appsec_url", m))
        .ok();

        let auth_type = match non_empty(self.auth_type.as_deref()) {
            None => Some(AuthType::default()),
            Some(raw) => raw.parse().map_err(|m| invalid("auth_type", m)).ok(),
        };

        let api_timeout = self.api_timeout.unwrap_or(constants::API_TIMEOUT_SECS);
        if api_timeout < 1 {
            invalid(
                "api_timeout",
                format!("Invalid api_timeout {api_timeout}. Should be greater than or equal to 1"),
            );
        }
        let appsec_timeout_ms = self
            .appsec_timeout_ms
            .unwrap_or(constants::APPSEC_TIMEOUT_MS);
        let appsec_connect_timeout_ms = self
            .appsec_connect_timeout_ms
            .unwrap_or(constants::APPSEC_CONNECT_TIMEOUT_MS);
        for (field, ms) in [
            ("appsec_timeout_ms", appsec_timeout_ms),
            ("appsec_connect_timeout_ms", appsec_connect_timeout_ms),
        ] {
            if ms < 1 {
                invalid(
                    field,
                    format!("Invalid {field} {ms}. Should be greater than or equal to 1"),
                );
            }
        }

        for (field, path) in self.endpoints.iter() {
            if !path.starts_with('/') {
                invalid(field, format!("Invalid {field} \"{path}\". Must start with '/'"));
            }
        }

        let tls_verify_peer = self.tls_verify_peer.unwrap_or(false);
        if let Some(auth_type) = auth_type {
            self.check_auth_rules(auth_type, role, tls_verify_peer, &mut violations);
        }

        let (Some(api_url), Some(appsec_url), Some(auth_type), true) =
            (api_url, appsec_url, auth_type, violations.is_empty())
        else {
            return Err(ConfigurationError::new(violations));
        };

        Ok(ConnectionConfig {
            role,
            api_url,
            auth_type,
            api_key: non_empty(self.api_key.as_deref()).map(|s| SecretString::from(s.to_owned())),
            machine_id: non_empty(self.machine_id.as_deref()).map(String::from),
            password: non_empty(self.password.as_deref()).map(|s| SecretString::from(s.to_owned())),
            tls_cert_path: non_empty_path(self.tls_cert_path.as_deref()),
            tls_key_path: non_empty_path(self.tls_key_path.as_deref()),
            tls_ca_cert_path: non_empty_path(self.tls_ca_cert_path.as_deref()),
            tls_verify_peer,
            api_timeout: Duration::from_secs(api_timeout),
            api_connect_timeout: match self
                .api_connect_timeout
                .unwrap_or(constants::API_CONNECT_TIMEOUT_SECS)
            {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            appsec_url,
            appsec_timeout: Duration::from_millis(appsec_timeout_ms),
            appsec_connect_timeout: Duration::from_millis(appsec_connect_timeout_ms),
            user_agent_suffix: user_agent_suffix.map(String::from),
            user_agent_version: non_empty(self.user_agent_version.as_deref())
                .unwrap_or(constants::VERSION)
                .to_owned(),
            endpoints: self.endpoints.clone(),
        })
    }

    fn check_auth_rules(
        &self,
        auth_type: AuthType,
        role: ClientRole,
        tls_verify_peer: bool,
        violations: &mut Vec<ConfigViolation>,
    ) {
        match (auth_type, role) {
            (AuthType::ApiKey, ClientRole::Bouncer) => {
                if non_empty(self.api_key.as_deref()).is_none() {
                    violations.push(ConfigViolation {
                        kind: ConfigErrorKind::MissingField,
                        field: "api_key",
                        message: "Api key is required as auth type is api_key".into(),
                    });
                }
            }
            (AuthType::ApiKey, ClientRole::Watcher) => {
                if non_empty(self.machine_id.as_deref()).is_none()
                    || non_empty(self.password.as_deref()).is_none()
                {
                    violations.push(ConfigViolation {
                        kind: ConfigErrorKind::MissingField,
                        field: "machine_id",
                        message: "machine_id and password are required when auth_type is api_key"
                            .into(),
                    });
                }
            }
            (AuthType::Tls, _) => {
                if non_empty_path(self.tls_cert_path.as_deref()).is_none()
                    || non_empty_path(self.tls_key_path.as_deref()).is_none()
                {
                    violations.push(ConfigViolation {
                        kind: ConfigErrorKind::MissingField,
                        field: "tls_cert_path",
                        message:
                            "Bouncer certificate and key paths are required for tls authentication."
                                .into(),
                    });
                }
                if tls_verify_peer && non_empty_path(self.tls_ca_cert_path.as_deref()).is_none() {
                    violations.push(ConfigViolation {
                        kind: ConfigErrorKind::CrossFieldConstraint,
                        field: "tls_ca_cert_path",
                        message: "CA path is required for tls authentication with verify_peer."
                            .into(),
                    });
                }
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_path(value: Option<&Path>) -> Option<PathBuf> {
    value
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn parse_http_url(field: &str, raw: Option<&str>, default: &str) -> Result<Url, String> {
    let raw = non_empty(raw).unwrap_or(default);
    let url = Url::parse(raw).map_err(|e| format!("Invalid {field} \"{raw}\": {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(format!(
            "Invalid {field} \"{raw}\": unsupported scheme {scheme}"
        )),
    }
}

// ── Validated config ─────────────────────────────────────────────────

/// Validated, immutable connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    role: ClientRole,
    api_url: Url,
    auth_type: AuthType,
    api_key: Option<SecretString>,
    machine_id: Option<String>,
    password: Option<SecretString>,
    tls_cert_path: Option<PathBuf>,
    tls_key_path: Option<PathBuf>,
    tls_ca_cert_path: Option<PathBuf>,
    tls_verify_peer: bool,
    api_timeout: Duration,
    api_connect_timeout: Option<Duration>,
    appsec_url: Url,
    appsec_timeout: Duration,
    appsec_connect_timeout: Duration,
    user_agent_suffix: Option<String>,
    user_agent_version: String,
    endpoints: Endpoints,
}

impl ConnectionConfig {
    pub fn role(&self) -> ClientRole {
        self.role
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn tls_cert_path(&self) -> Option<&Path> {
        self.tls_cert_path.as_deref()
    }

    pub fn tls_key_path(&self) -> Option<&Path> {
        self.tls_key_path.as_deref()
    }

    pub fn tls_ca_cert_path(&self) -> Option<&Path> {
        self.tls_ca_cert_path.as_deref()
    }

    pub fn tls_verify_peer(&self) -> bool {
        self.tls_verify_peer
    }

    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    pub fn api_connect_timeout(&self) -> Option<Duration> {
        self.api_connect_timeout
    }

    pub fn appsec_url(&self) -> &Url {
        &self.appsec_url
    }

    pub fn appsec_timeout(&self) -> Duration {
        self.appsec_timeout
    }

    pub fn appsec_connect_timeout(&self) -> Duration {
        self.appsec_connect_timeout
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// `csrustlapi[_<suffix>]/<version>`.
    pub fn user_agent(&self) -> String {
        let suffix = self
            .user_agent_suffix
            .as_deref()
            .map(|s| format!("_{s}"))
            .unwrap_or_default();
        format!(
            "{}{suffix}/{}",
            constants::USER_AGENT_PREFIX,
            self.user_agent_version
        )
    }

    /// Full URL for an endpoint path, keeping any path prefix of `api_url`.
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url, url::ParseError> {
        let base = self.api_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{endpoint}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn first_message(settings: &ConnectionSettings, role: ClientRole) -> String {
        settings
            .validate(role)
            .expect_err("settings should be rejected")
            .message()
            .to_owned()
    }

    #[test]
    fn defaults_are_applied() {
        let config = ConnectionSettings {
            api_key: Some("key".into()),
            ..ConnectionSettings::default()
        }
        .validate(ClientRole::Bouncer)
        .unwrap();

        assert_eq!(config.api_url().as_str(), "http://localhost:8080/");
        assert_eq!(config.appsec_url().as_str(), "http://localhost:7422/");
        assert_eq!(config.auth_type(), AuthType::ApiKey);
        assert_eq!(config.api_timeout(), Duration::from_secs(120));
        assert_eq!(config.api_connect_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.appsec_timeout(), Duration::from_millis(400));
        assert_eq!(config.appsec_connect_timeout(), Duration::from_millis(150));
        assert!(!config.tls_verify_peer());
        assert_eq!(config.endpoints(), &Endpoints::default());
        assert_eq!(config.api_key().unwrap().expose_secret(), "key");
    }

    #[test]
    fn bouncer_api_key_is_required() {
        let settings = ConnectionSettings::default();
        let err = settings.validate(ClientRole::Bouncer).unwrap_err();

        assert_eq!(err.kind(), ConfigErrorKind::MissingField);
        assert_eq!(err.message(), "Api key is required as auth type is api_key");
    }

    #[test]
    fn watcher_requires_machine_id_and_password() {
        let missing_id = ConnectionSettings {
            api_key: Some("key".into()),
            password: Some("pw".into()),
            ..ConnectionSettings::default()
        };
        let missing_password = ConnectionSettings {
            api_key: Some("key".into()),
            machine_id: Some("machine".into()),
            ..ConnectionSettings::default()
        };

        for settings in [missing_id, missing_password] {
            assert_eq!(
                first_message(&settings, ClientRole::Watcher),
                "machine_id and password are required when auth_type is api_key"
            );
        }
    }

    #[test]
    fn watcher_with_tls_needs_no_machine_credentials() {
        let settings = ConnectionSettings::with_tls("https://lapi:8080", "/c.pem", "/k.pem");
        let config = settings.validate(ClientRole::Watcher).unwrap();

        assert_eq!(config.auth_type(), AuthType::Tls);
        assert!(config.machine_id().is_none());
    }

    #[test]
    fn tls_requires_cert_and_key() {
        let mut settings = ConnectionSettings::with_tls("https://lapi:8080", "/c.pem", "/k.pem");
        settings.tls_key_path = None;
        assert_eq!(
            first_message(&settings, ClientRole::Bouncer),
            "Bouncer certificate and key paths are required for tls authentication."
        );

        let mut settings = ConnectionSettings::with_tls("https://lapi:8080", "", "/k.pem");
        settings.tls_verify_peer = Some(false);
        assert_eq!(
            first_message(&settings, ClientRole::Watcher),
            "Bouncer certificate and key paths are required for tls authentication."
        );
    }

    #[test]
    fn tls_verify_peer_requires_ca() {
        let mut settings = ConnectionSettings::with_tls("https://lapi:8080", "/c.pem", "/k.pem");
        settings.tls_verify_peer = Some(true);

        let err = settings.validate(ClientRole::Bouncer).unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::CrossFieldConstraint);
        assert_eq!(
            err.message(),
            "CA path is required for tls authentication with verify_peer."
        );

        settings.tls_ca_cert_path = Some("/ca.pem".into());
        assert!(settings.validate(ClientRole::Bouncer).is_ok());
    }

    #[test]
    fn user_agent_suffix_is_checked() {
        let mut settings = ConnectionSettings::with_api_key("http://lapi:8080", "key");
        settings.user_agent_suffix = Some("has space".into());
        assert_eq!(
            first_message(&settings, ClientRole::Bouncer),
            "Invalid user agent suffix. Length must be <= 16. Allowed chars are A-Za-z0-9"
        );

        settings.user_agent_suffix = Some("a".repeat(17));
        assert!(settings.validate(ClientRole::Bouncer).is_err());

        settings.user_agent_suffix = Some("MyBouncer2".into());
        settings.user_agent_version = Some("v9.9.9".into());
        let config = settings.validate(ClientRole::Bouncer).unwrap();
        assert_eq!(config.user_agent(), "csrustlapi_MyBouncer2/v9.9.9");
    }

    #[test]
    fn user_agent_without_suffix_uses_crate_version() {
        let config = ConnectionSettings::with_api_key("http://lapi:8080", "key")
            .validate(ClientRole::Bouncer)
            .unwrap();
        assert_eq!(
            config.user_agent(),
            format!("csrustlapi/v{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn unknown_auth_type_is_rejected() {
        let mut settings = ConnectionSettings::with_api_key("http://lapi:8080", "key");
        settings.auth_type = Some("oauth".into());
        let err = settings.validate(ClientRole::Bouncer).unwrap_err();

        assert_eq!(err.kind(), ConfigErrorKind::InvalidValue);
        assert!(err.message().contains("oauth"));
    }

    #[test]
    fn bad_urls_and_timeouts_are_rejected() {
        let mut settings = ConnectionSettings::with_api_key("not a url", "key");
        settings.api_timeout = Some(0);
        settings.appsec_url = Some("ftp://appsec".into());

        let err = settings.validate(ClientRole::Bouncer).unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field).collect();
        assert_eq!(fields, ["api_url", "appsec_url", "api_timeout"]);
        assert!(err.message().starts_with("Invalid api_url \"not a url\""));
    }

    #[test]
    fn appsec_timeouts_are_read_and_checked() {
        let settings: ConnectionSettings = serde_json::from_value(serde_json::json!({
            "api_key": "key",
            "appsec_timeout_ms": 800,
            "appsec_connect_timeout_ms": 75
        }))
        .unwrap();
        let config = settings.validate(ClientRole::Bouncer).unwrap();
        assert_eq!(config.appsec_timeout(), Duration::from_millis(800));
        assert_eq!(config.appsec_connect_timeout(), Duration::from_millis(75));

        let mut settings = ConnectionSettings::with_api_key("http://lapi:8080", "key");
        settings.appsec_connect_timeout_ms = Some(0);
        let err = settings.validate(ClientRole::Bouncer).unwrap_err();
        assert_eq!(err.violations()[0].field, "appsec_connect_timeout_ms");
        assert_eq!(
            err.message(),
            "Invalid appsec_connect_timeout_ms 0. Should be greater than or equal to 1"
        );
    }

    #[test]
    fn endpoint_url_keeps_base_path() {
        let config = ConnectionSettings::with_api_key("https://example.com/lapi/", "key")
            .validate(ClientRole::Bouncer)
            .unwrap();

        let url = config.endpoint_url("/v1/decisions").unwrap();
        assert_eq!(url.as_str(), "https://example.com/lapi/v1/decisions");
    }

    #[test]
    fn unknown_keys_are_ignored_when_deserializing() {
        let settings: ConnectionSettings = serde_json::from_value(serde_json::json!({
            "api_url": "http://lapi:8080",
            "api_key": "key",
            "something_else": true,
            "endpoints": { "alerts": "/v2/alerts" }
        }))
        .unwrap();

        let config = settings.validate(ClientRole::Bouncer).unwrap();
        assert_eq!(config.endpoints().alerts, "/v2/alerts");
        assert_eq!(config.endpoints().decisions, "/v1/decisions");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = ConnectionSettings::with_machine_credentials("http://lapi", "m", "hunter2");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
