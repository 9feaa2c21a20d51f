// ── Runtime bridge configuration ──
//
// Describes how to reach one controller and how to present its values.
// Built by icbridge-config (or by hand); the engine never reads files.

use std::time::Duration;

use icbridge_api::session::DEFAULT_PORT;
use icbridge_api::{Credentials, SessionConfig};

use crate::units::{self, TemperatureUnits};

/// Connection and presentation settings for a [`Controller`](crate::Controller).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// `None` when the controller does not prompt for a login.
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub login_timeout: Duration,
    /// Fixed delay between a dropped connection and the next attempt.
    pub reconnect_delay: Duration,
    pub max_buffer_size: usize,
    /// Unit the controller is configured for.
    pub temperature_units: TemperatureUnits,
    /// Thermostat bounds in controller units.
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
}

impl BridgeConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Transport-level settings for the session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            credentials: self.credentials.clone(),
            connect_timeout: self.connect_timeout,
            login_timeout: self.login_timeout,
            reconnect_delay: self.reconnect_delay,
            max_buffer_size: self.max_buffer_size,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Thermostat bounds converted to Celsius, as `(min, max)`.
    pub fn thermostat_range_c(&self) -> (f64, f64) {
        (
            units::controller_to_celsius(self.minimum_temperature, self.temperature_units),
            units::controller_to_celsius(self.maximum_temperature, self.temperature_units),
        )
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            credentials: None,
            connect_timeout: session.connect_timeout,
            login_timeout: session.login_timeout,
            reconnect_delay: session.reconnect_delay,
            max_buffer_size: session.max_buffer_size,
            temperature_units: TemperatureUnits::Fahrenheit,
            minimum_temperature: 40.0,
            maximum_temperature: 104.0,
        }
    }
}
