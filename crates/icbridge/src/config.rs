//! CLI configuration: a thin layer over `icbridge_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--host, --port, --username, --password, --units).

use std::time::Duration;

use icbridge_core::{BridgeConfig, Credentials};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use icbridge_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
    store_password,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Time to wait for the first discovery.
pub fn discovery_timeout(global: &GlobalOpts) -> Duration {
    Duration::from_secs(global.timeout)
}

/// Build a `BridgeConfig` from the config file, the active profile and
/// CLI overrides. Flags win over profile values.
pub fn build_bridge_config(global: &GlobalOpts, cfg: &Config) -> Result<BridgeConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut bridge = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile_from_flags(profile, &profile_name, global)?,
        None => {
            if global.profile.is_some() {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available_profiles(cfg),
                });
            }
            let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let mut bridge = BridgeConfig::new(host);
            bridge.credentials = flag_credentials(global, &profile_name)?;
            bridge
        }
    };

    if let Some(port) = global.port {
        bridge.port = port;
    }
    if let Some(units) = global.units {
        bridge.temperature_units = units;
    }
    Ok(bridge)
}

fn profile_from_flags(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<BridgeConfig, CliError> {
    // Flags replace the stored host and login before resolution so that
    // a stored password is only looked up when it will be used.
    let merged = Profile {
        host: global.host.clone().unwrap_or_else(|| profile.host.clone()),
        username: global.username.clone().or_else(|| profile.username.clone()),
        password: global.password.clone().or_else(|| profile.password.clone()),
        password_env: profile.password_env.clone(),
        port: profile.port,
        units: profile.units,
        min_temperature: profile.min_temperature,
        max_temperature: profile.max_temperature,
        connect_timeout_ms: profile.connect_timeout_ms,
        reconnect_delay_secs: profile.reconnect_delay_secs,
    };
    Ok(icbridge_config::profile_to_bridge_config(&merged, profile_name)?)
}

fn flag_credentials(global: &GlobalOpts, profile_name: &str) -> Result<Option<Credentials>, CliError> {
    match (&global.username, &global.password) {
        (None, _) => Ok(None),
        (Some(username), Some(password)) => Ok(Some(Credentials::new(username, password))),
        (Some(_), None) => Err(CliError::NoCredentials {
            profile: profile_name.into(),
        }),
    }
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}
