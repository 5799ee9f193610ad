//! Config subcommand handlers.

use std::fmt::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, SecretKind};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Format config for display, masking secrets.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let strings = [
            ("api_url", &p.api_url),
            ("auth_type", &p.auth_type),
            ("api_key_env", &p.api_key_env),
            ("machine_id", &p.machine_id),
            ("password_env", &p.password_env),
            ("appsec_url", &p.appsec_url),
            ("user_agent_suffix", &p.user_agent_suffix),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = \"{value}\"");
            }
        }
        if p.api_key.is_some() {
            let _ = writeln!(out, "api_key = \"****\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        let paths = [
            ("tls_cert_path", &p.tls_cert_path),
            ("tls_key_path", &p.tls_key_path),
            ("tls_ca_cert_path", &p.tls_ca_cert_path),
        ];
        for (key, value) in paths {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = \"{}\"", value.display());
            }
        }
        if let Some(verify) = p.tls_verify_peer {
            let _ = writeln!(out, "tls_verify_peer = {verify}");
        }
        let numbers = [
            ("timeout", p.timeout),
            ("connect_timeout", p.connect_timeout),
            ("appsec_timeout_ms", p.appsec_timeout_ms),
            ("appsec_connect_timeout_ms", p.appsec_connect_timeout_ms),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        if !p.scenarios.is_empty() {
            let _ = writeln!(out, "scenarios = {:?}", p.scenarios);
        }
    }

    out
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            output::print_output(format_config_redacted(&cfg).trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let active = config::active_profile_name(global, &cfg);
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort();
            let out = names
                .iter()
                .map(|name| {
                    let marker = if *name == active { "*" } else { " " };
                    format!("{marker} {name}")
                })
                .collect::<Vec<_>>()
                .join("\n");
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(crowdsec_lapi_config::ConfigError::ProfileNotFound { profile: name }.into());
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetSecret { kind } => {
            let cfg = config::load_config()?;
            let profile = config::active_profile_name(global, &cfg);
            let (label, key) = match kind {
                SecretKind::ApiKey => ("API key", "api-key"),
                SecretKind::Password => ("Password", "password"),
            };
            let secret = dialoguer::Password::new()
                .with_prompt(format!("{label} for profile '{profile}'"))
                .interact()
                .map_err(prompt_err)?;
            crowdsec_lapi_config::store_secret(&profile, key, &secret)?;
            if !global.quiet {
                eprintln!("{label} stored in system keyring for profile '{profile}'");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crowdsec_lapi_config::Profile;

    use super::*;

    #[test]
    fn secrets_are_masked() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                api_url: Some("http://127.0.0.1:8080".into()),
                api_key: Some("s3cr3t".into()),
                password: Some("hunter2".into()),
                appsec_connect_timeout_ms: Some(80),
                ..Profile::default()
            },
        );
        let shown = format_config_redacted(&cfg);
        assert!(shown.contains("[profiles.home]"));
        assert!(shown.contains("api_url = \"http://127.0.0.1:8080\""));
        assert!(shown.contains("api_key = \"****\""));
        assert!(shown.contains("appsec_connect_timeout_ms = 80"));
        assert!(!shown.contains("s3cr3t"));
        assert!(!shown.contains("hunter2"));
    }
}
