// ── Domain conversions ──
//
// Pure numeric helpers. The rounding rules in `speed_from_percentage`
// match what the controller accepts: flow in whole GPM, RPM in steps of 50.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::{SpeedRange, SpeedType};

/// RPM granularity accepted by the controller.
pub const RPM_STEP: f64 = 50.0;

/// Thermostat step in degrees Celsius.
pub const THERMOSTAT_STEP: f64 = 0.5;

/// Display range for a current temperature, in degrees Celsius.
pub const CURRENT_TEMP_MIN_C: f64 = -100.0;
pub const CURRENT_TEMP_MAX_C: f64 = 100.0;

/// Unit the controller reports and accepts temperatures in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum TemperatureUnits {
    #[serde(rename = "C")]
    #[strum(serialize = "C")]
    Celsius,
    #[default]
    #[serde(rename = "F")]
    #[strum(serialize = "F")]
    Fahrenheit,
}

pub fn to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

pub fn to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) / 1.8
}

/// Convert a controller-unit temperature to Celsius.
pub fn controller_to_celsius(value: f64, units: TemperatureUnits) -> f64 {
    match units {
        TemperatureUnits::Celsius => value,
        TemperatureUnits::Fahrenheit => to_celsius(value),
    }
}

/// Convert a Celsius setpoint to what the controller expects. Fahrenheit
/// setpoints are whole degrees.
pub fn celsius_to_controller(celsius: f64, units: TemperatureUnits) -> f64 {
    match units {
        TemperatureUnits::Celsius => celsius,
        TemperatureUnits::Fahrenheit => to_fahrenheit(celsius).round(),
    }
}

/// Map a 0-100 power level onto a pump's speed range.
pub fn speed_from_percentage(percentage: f64, speed_type: SpeedType, range: SpeedRange) -> f64 {
    let raw = range.min + percentage / 100.0 * (range.max - range.min);
    match speed_type {
        SpeedType::Gpm => raw.round(),
        SpeedType::Rpm => (raw / RPM_STEP).round() * RPM_STEP,
    }
}

/// Inverse of [`speed_from_percentage`], rounded to a whole percent.
pub fn percentage_from_speed(speed: f64, range: SpeedRange) -> f64 {
    let span = range.max - range.min;
    if span.abs() < f64::EPSILON {
        return 0.0;
    }
    ((speed - range.min) / span * 100.0).round()
}
