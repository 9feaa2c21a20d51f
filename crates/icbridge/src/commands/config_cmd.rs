//! Config subcommand handlers.

use std::fmt::Write as _;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the password.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "host = \"{}\"", p.host);
        if let Some(port) = p.port {
            let _ = writeln!(out, "port = {port}");
        }
        if let Some(ref u) = p.username {
            let _ = writeln!(out, "username = \"{u}\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if let Some(units) = p.units {
            let _ = writeln!(out, "units = \"{units}\"");
        }
        if let Some(min) = p.min_temperature {
            let _ = writeln!(out, "min_temperature = {min}");
        }
        if let Some(max) = p.max_temperature {
            let _ = writeln!(out, "max_temperature = {max}");
        }
        if let Some(ms) = p.connect_timeout_ms {
            let _ = writeln!(out, "connect_timeout_ms = {ms}");
        }
        if let Some(secs) = p.reconnect_delay_secs {
            let _ = writeln!(out, "reconnect_delay_secs = {secs}");
        }
    }

    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(
                &global.output,
                &RedactedConfig(&cfg),
                |c| format_config_redacted(c.0),
                |_| config::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            name,
            plaintext,
            default,
        } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = name.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            init_profile(&mut cfg, &profile_name, global, plaintext, default)?;

            let path = config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Profile '{profile_name}' written to {}", path.display());
            }
            Ok(())
        }
    }
}

/// Apply the connection flags to `profile_name`, creating it if needed.
fn init_profile(
    cfg: &mut Config,
    profile_name: &str,
    global: &GlobalOpts,
    plaintext: bool,
    make_default: bool,
) -> Result<(), CliError> {
    let existing_host = cfg.profiles.get(profile_name).map(|p| p.host.clone());
    let host = global
        .host
        .clone()
        .or(existing_host)
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| CliError::Validation {
            field: "host".into(),
            reason: "pass --host to set the controller address".into(),
        })?;

    let profile = cfg.profiles.entry(profile_name.to_owned()).or_default();
    profile.host = host;
    if global.port.is_some() {
        profile.port = global.port;
    }
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if global.units.is_some() {
        profile.units = global.units;
    }

    if let Some(ref password) = global.password {
        if plaintext {
            profile.password = Some(password.clone());
        } else {
            config::store_password(profile_name, password)?;
            profile.password = None;
            if !global.quiet {
                eprintln!("✓ Password stored in system keyring");
            }
        }
    }

    if make_default || cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.to_owned());
    }
    Ok(())
}

/// Serialized view of the config with the password masked.
struct RedactedConfig<'a>(&'a Config);

impl serde::Serialize for RedactedConfig<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut profiles = std::collections::BTreeMap::new();
        for (name, p) in &self.0.profiles {
            profiles.insert(
                name.as_str(),
                config::Profile {
                    host: p.host.clone(),
                    port: p.port,
                    username: p.username.clone(),
                    password: p.password.as_ref().map(|_| "****".to_owned()),
                    password_env: p.password_env.clone(),
                    units: p.units,
                    min_temperature: p.min_temperature,
                    max_temperature: p.max_temperature,
                    connect_timeout_ms: p.connect_timeout_ms,
                    reconnect_delay_secs: p.reconnect_delay_secs,
                },
            );
        }

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("default_profile", &self.0.default_profile)?;
        map.serialize_entry("defaults", &self.0.defaults)?;
        map.serialize_entry("profiles", &profiles)?;
        map.end()
    }
}
