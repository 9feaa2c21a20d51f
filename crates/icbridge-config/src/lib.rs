//! Shared configuration for icbridge tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `icbridge_core::BridgeConfig`. The CLI layers its
//! flag overrides on top of what this crate resolves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use icbridge_core::{BridgeConfig, Credentials, TemperatureUnits};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service name; entries are stored as `<profile>/password`.
pub const KEYRING_SERVICE: &str = "icbridge";

/// Password fallback when a profile names no variable of its own.
pub const PASSWORD_ENV: &str = "ICBRIDGE_PASSWORD";

const ENV_PREFIX: &str = "ICBRIDGE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds to wait for the first discovery to complete.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named controller profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Controller hostname or IP address.
    pub host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Login name; leave unset for controllers without a login prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Temperature unit the controller is set to (`F` or `C`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<TemperatureUnits>,

    /// Thermostat bounds, in controller units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "icbridge", "icbridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("icbridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// `ICBRIDGE_` variables override file values; nested keys use `__`,
/// e.g. `ICBRIDGE_DEFAULTS__OUTPUT=json`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
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

/// Resolve login credentials for a profile.
///
/// `Ok(None)` when the profile has no username: the controller is
/// expected to accept connections without a login. Otherwise the
/// password comes from the profile's env var (or `ICBRIDGE_PASSWORD`),
/// then the system keyring, then plaintext in the file.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };

    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Ok(pw) = std::env::var(env_name) {
        return Ok(Some(credentials(username, SecretString::from(pw))));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Some(credentials(username, SecretString::from(pw))));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(Some(credentials(username, SecretString::from(pw.clone()))));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

fn credentials(username: String, password: SecretString) -> Credentials {
    Credentials { username, password }
}

// ── Profile → BridgeConfig ──────────────────────────────────────────

/// Build a `BridgeConfig` from a profile, without CLI overrides.
pub fn profile_to_bridge_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<BridgeConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no controller host"),
        });
    }

    let mut config = BridgeConfig::new(host);
    config.credentials = resolve_credentials(profile, profile_name)?;

    if let Some(port) = profile.port {
        config.port = port;
    }
    if let Some(units) = profile.units {
        config.temperature_units = units;
    }
    if let Some(min) = profile.min_temperature {
        config.minimum_temperature = min;
    }
    if let Some(max) = profile.max_temperature {
        config.maximum_temperature = max;
    }
    if let Some(ms) = profile.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.reconnect_delay_secs {
        config.reconnect_delay = Duration::from_secs(secs);
    }

    if config.minimum_temperature >= config.maximum_temperature {
        return Err(ConfigError::Validation {
            field: "min_temperature".into(),
            reason: format!(
                "{} is not below max_temperature {}",
                config.minimum_temperature, config.maximum_temperature
            ),
        });
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"

[profiles.home]
host = "192.168.1.40"
units = "C"
min_temperature = 5.0
max_temperature = 40.0
reconnect_delay_secs = 10

[profiles.cabin]
host = "cabin.local"
port = 7000
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn loads_profiles_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write_sample(&dir)).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("home"));
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");
        assert_eq!(config.defaults.timeout, 30);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles["cabin"].port, Some(7000));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn profile_lookup_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write_sample(&dir)).unwrap();

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(profile.host, "192.168.1.40");

        let (name, _) = config.profile(Some("cabin")).unwrap();
        assert_eq!(name, "cabin");

        let err = config.profile(Some("garage")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { name } if name == "garage"));
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                host: "pool.local".into(),
                units: Some(TemperatureUnits::Fahrenheit),
                ..Profile::default()
            },
        );
        save_config_to(&config, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("host = \"pool.local\""));
        assert!(!text.contains("password"));

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.profiles["default"].host, "pool.local");
        assert_eq!(
            reloaded.profiles["default"].units,
            Some(TemperatureUnits::Fahrenheit)
        );
    }

    #[test]
    fn profile_maps_onto_bridge_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&write_sample(&dir)).unwrap();
        let (name, profile) = config.profile(None).unwrap();

        let bridge = profile_to_bridge_config(profile, name).unwrap();
        assert_eq!(bridge.host, "192.168.1.40");
        assert_eq!(bridge.port, 6681);
        assert_eq!(bridge.temperature_units, TemperatureUnits::Celsius);
        assert!((bridge.minimum_temperature - 5.0).abs() < f64::EPSILON);
        assert_eq!(bridge.reconnect_delay, Duration::from_secs(10));
        assert!(bridge.credentials.is_none());
    }

    #[test]
    fn plaintext_password_is_last_resort() {
        let profile = Profile {
            host: "pool.local".into(),
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            password_env: Some("ICBRIDGE_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        };

        let creds = resolve_credentials(&profile, "icbridge-test-profile")
            .unwrap()
            .unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose_secret(), "hunter2");
    }

    #[test]
    fn username_without_password_is_an_error() {
        let profile = Profile {
            host: "pool.local".into(),
            username: Some("admin".into()),
            password_env: Some("ICBRIDGE_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        };
        let err = resolve_credentials(&profile, "icbridge-test-profile").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn rejects_empty_host_and_inverted_range() {
        let err = profile_to_bridge_config(&Profile::default(), "x").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "host"));

        let profile = Profile {
            host: "pool.local".into(),
            min_temperature: Some(90.0),
            max_temperature: Some(80.0),
            ..Profile::default()
        };
        let err = profile_to_bridge_config(&profile, "x").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "min_temperature"));
    }
}
