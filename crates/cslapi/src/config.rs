//! CLI configuration: thin wrapper around `crowdsec_lapi_config`.
//!
//! Adds the resolution step that layers `GlobalOpts` overrides
//! (--api-url, --api-key, ...) on top of the active profile.

use crowdsec_lapi::ConnectionSettings;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use crowdsec_lapi_config::{
    Config, Profile, config_path, load_config, profile_to_settings, save_config,
    token_cache_path,
};

/// Everything a command needs to build a client.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub settings: ConnectionSettings,
    pub scenarios: Vec<String>,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Load the config and merge the active profile with flag overrides.
///
/// Flags (and their `CSLAPI_*` variables) win over profile values.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config()?;
    resolve_with(global, &cfg)
}

pub fn resolve_with(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let (profile_name, profile) = cfg.profile(global.profile.as_deref())?;
    let mut settings = profile_to_settings(&profile, &profile_name, &cfg.defaults);

    override_with(&mut settings.api_url, global.api_url.as_ref());
    override_with(&mut settings.api_key, global.api_key.as_ref());
    override_with(&mut settings.machine_id, global.machine_id.as_ref());
    override_with(&mut settings.password, global.password.as_ref());
    override_with(&mut settings.appsec_url, global.appsec_url.as_ref());
    if global.timeout.is_some() {
        settings.api_timeout = global.timeout;
    }
    if settings.user_agent_suffix.is_none() {
        settings.user_agent_suffix = Some("cli".into());
    }

    tracing::debug!(profile = %profile_name, settings = ?settings, "resolved connection settings");

    Ok(Resolved {
        profile_name,
        settings,
        scenarios: profile.scenarios,
    })
}

fn override_with(slot: &mut Option<String>, flag: Option<&String>) {
    if let Some(value) = flag {
        *slot = Some(value.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["cslapi"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["config", "path"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with_profile() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                api_url: Some("http://10.0.0.2:8080".into()),
                api_key: Some("from-profile".into()),
                timeout: Some(15),
                scenarios: vec!["crowdsecurity/http-probing".into()],
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile_values() {
        let g = global(&["--api-url", "http://127.0.0.1:9090", "--timeout", "3"]);
        let resolved = resolve_with(&g, &config_with_profile()).unwrap();

        assert_eq!(resolved.profile_name, "default");
        assert_eq!(resolved.settings.api_url.as_deref(), Some("http://127.0.0.1:9090"));
        assert_eq!(resolved.settings.api_key.as_deref(), Some("from-profile"));
        assert_eq!(resolved.settings.api_timeout, Some(3));
        assert_eq!(resolved.scenarios, vec!["crowdsecurity/http-probing".to_owned()]);
    }

    #[test]
    fn profile_values_stand_without_flags() {
        let resolved = resolve_with(&global(&[]), &config_with_profile()).unwrap();
        assert_eq!(resolved.settings.api_url.as_deref(), Some("http://10.0.0.2:8080"));
        assert_eq!(resolved.settings.api_timeout, Some(15));
        assert_eq!(resolved.settings.user_agent_suffix.as_deref(), Some("cli"));
    }

    #[test]
    fn unknown_profile_is_reported() {
        let err = resolve_with(&global(&["--profile", "prod"]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
