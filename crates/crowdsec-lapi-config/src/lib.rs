//! Shared configuration for CrowdSec LAPI tooling.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `crowdsec_lapi::ConnectionSettings`. The CLI layers
//! its flag overrides on top of what this crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crowdsec_lapi::ConnectionSettings;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_NAME: &str = "cslapi";
const ENV_PREFIX: &str = "CSLAPI_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found in config")]
    ProfileNotFound { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named LAPI profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, falling back to `default_profile`.
    ///
    /// A missing `default` profile is not an error: flags and environment
    /// variables may carry everything, so an empty profile stands in.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile.clone())),
            None if name == "default" => Ok((name, Profile::default())),
            None => Err(ConfigError::ProfileNotFound { profile: name }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    crowdsec_lapi::constants::API_TIMEOUT_SECS
}

/// A named LAPI profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    /// LAPI base URL (e.g. "http://localhost:8080").
    pub api_url: Option<String>,

    /// "api_key" or "tls".
    pub auth_type: Option<String>,

    /// Bouncer API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    pub machine_id: Option<String>,

    /// Watcher password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the watcher password.
    pub password_env: Option<String>,

    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub tls_ca_cert_path: Option<PathBuf>,
    pub tls_verify_peer: Option<bool>,

    pub appsec_url: Option<String>,
    pub appsec_timeout_ms: Option<u64>,
    pub appsec_connect_timeout_ms: Option<u64>,

    /// Override the request timeout, in seconds.
    pub timeout: Option<u64>,

    /// LAPI connect timeout, in seconds. `0` disables it.
    pub connect_timeout: Option<u64>,

    pub user_agent_suffix: Option<String>,

    /// Scenarios announced on watcher login.
    pub scenarios: Vec<String>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn home_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push(APP_NAME);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Where the watcher token for `profile` is cached between runs.
pub fn token_cache_path(profile: &str) -> PathBuf {
    let dir = project_dirs().map_or_else(
        || home_fallback(".cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    );
    dir.join(format!("{profile}-token.json"))
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment overrides use `__` as the nesting separator, e.g.
/// `CSLAPI_PROFILES__LOCAL__API_URL` or `CSLAPI_DEFAULTS__OUTPUT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    keyring_suffix: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var named by the profile
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(APP_NAME, &format!("{profile_name}/{keyring_suffix}")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

/// Bouncer API key: `api_key_env` → keyring `<profile>/api-key` → plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.api_key_env.as_deref(),
        profile_name,
        "api-key",
        profile.api_key.as_deref(),
    )
}

/// Watcher password: `password_env` → keyring `<profile>/password` → plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.password_env.as_deref(),
        profile_name,
        "password",
        profile.password.as_deref(),
    )
}

/// Store a secret for `profile_name` in the system keyring.
pub fn store_secret(profile_name: &str, kind: &str, secret: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(APP_NAME, &format!("{profile_name}/{kind}")).map_err(|e| {
        ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        }
    })?;
    entry
        .set_password(secret)
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

/// Build `ConnectionSettings` from a profile, secrets resolved.
///
/// Nothing is validated here; `ConnectionSettings::validate` does that for
/// the role the settings end up serving.
pub fn profile_to_settings(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> ConnectionSettings {
    ConnectionSettings {
        api_url: profile.api_url.clone(),
        auth_type: profile.auth_type.clone(),
        api_key: resolve_api_key(profile, profile_name).map(|s| s.expose_secret().to_owned()),
        machine_id: profile.machine_id.clone(),
        password: resolve_password(profile, profile_name).map(|s| s.expose_secret().to_owned()),
        tls_cert_path: profile.tls_cert_path.clone(),
        tls_key_path: profile.tls_key_path.clone(),
        tls_ca_cert_path: profile.tls_ca_cert_path.clone(),
        tls_verify_peer: profile.tls_verify_peer,
        api_timeout: Some(profile.timeout.unwrap_or(defaults.timeout)),
        api_connect_timeout: profile.connect_timeout,
        appsec_url: profile.appsec_url.clone(),
        appsec_timeout_ms: profile.appsec_timeout_ms,
        appsec_connect_timeout_ms: profile.appsec_connect_timeout_ms,
        user_agent_suffix: profile.user_agent_suffix.clone(),
        ..ConnectionSettings::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"
timeout = 30

[profiles.home]
api_url = "http://10.0.0.2:8080"
api_key = "plain-key"
scenarios = ["crowdsecurity/ssh-bf"]

[profiles.edge]
api_url = "https://lapi.example.com"
auth_type = "tls"
tls_cert_path = "/etc/crowdsec/bouncer.pem"
tls_key_path = "/etc/crowdsec/bouncer-key.pem"
tls_verify_peer = false
timeout = 5
connect_timeout = 3
appsec_url = "http://10.0.0.3:7422"
appsec_timeout_ms = 250
appsec_connect_timeout_ms = 80
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.output, "table");
        assert_eq!(cfg.defaults.timeout, 120);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();

        assert_eq!(cfg.defaults.output, "json");
        let (name, home) = cfg.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(home.api_url.as_deref(), Some("http://10.0.0.2:8080"));
        assert_eq!(home.scenarios, vec!["crowdsecurity/ssh-bf".to_owned()]);

        let (_, edge) = cfg.profile(Some("edge")).unwrap();
        assert_eq!(edge.auth_type.as_deref(), Some("tls"));
        assert_eq!(edge.tls_verify_peer, Some(false));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let cfg = Config::default();
        let err = cfg.profile(Some("prod")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { ref profile } if profile == "prod"));
    }

    #[test]
    fn absent_default_profile_is_empty() {
        let (name, profile) = Config::default().profile(None).unwrap();
        assert_eq!(name, "default");
        assert!(profile.api_url.is_none());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                api_url: Some("http://127.0.0.1:8080".into()),
                machine_id: Some("watcher-1".into()),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, profile) = loaded.profile(None).unwrap();
        assert_eq!(profile.machine_id.as_deref(), Some("watcher-1"));
    }

    #[test]
    fn api_key_env_wins_over_plaintext() {
        // PATH is set in any test environment.
        let expected = std::env::var("PATH").unwrap();
        let profile = Profile {
            api_key: Some("plain".into()),
            api_key_env: Some("PATH".into()),
            ..Profile::default()
        };
        let key = resolve_api_key(&profile, "cslapi-test-env-wins").unwrap();
        assert_eq!(key.expose_secret(), expected);
    }

    #[test]
    fn plaintext_is_the_last_resort() {
        let profile = Profile {
            password: Some("hunter2".into()),
            ..Profile::default()
        };
        let pw = resolve_password(&profile, "cslapi-test-no-such-keyring-entry").unwrap();
        assert_eq!(pw.expose_secret(), "hunter2");
        assert!(resolve_api_key(&profile, "cslapi-test-no-such-keyring-entry").is_none());
    }

    #[test]
    fn profile_translates_to_settings() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();
        let (name, edge) = cfg.profile(Some("edge")).unwrap();

        let settings = profile_to_settings(&edge, &name, &cfg.defaults);
        assert_eq!(settings.api_url.as_deref(), Some("https://lapi.example.com"));
        assert_eq!(settings.auth_type.as_deref(), Some("tls"));
        assert_eq!(settings.api_timeout, Some(5));
        assert_eq!(settings.tls_verify_peer, Some(false));
        assert_eq!(settings.api_connect_timeout, Some(3));
        assert_eq!(settings.appsec_timeout_ms, Some(250));
        assert_eq!(settings.appsec_connect_timeout_ms, Some(80));

        let config = settings
            .validate(crowdsec_lapi::ClientRole::Bouncer)
            .unwrap();
        assert_eq!(config.auth_type(), crowdsec_lapi::AuthType::Tls);
        assert_eq!(config.api_connect_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.appsec_connect_timeout(), Duration::from_millis(80));
    }

    #[test]
    fn defaults_timeout_applies_when_profile_has_none() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();
        let (name, home) = cfg.profile(None).unwrap();
        let settings = profile_to_settings(&home, &name, &cfg.defaults);
        assert_eq!(settings.api_timeout, Some(30));
        assert_eq!(settings.api_key.as_deref(), Some("plain-key"));
    }
}
