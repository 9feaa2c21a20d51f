// ── Pump domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::object_id::ObjectId;
use crate::units;

/// Pump subtypes with adjustable speed. Fixed-speed pumps are not modeled.
pub const VARIABLE_SPEED_SUBTYPES: &[&str] = &["SPEED", "VSF"];

/// Unit a pump circuit's speed is expressed in (`SELECT`).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SpeedType {
    #[default]
    #[strum(serialize = "RPM")]
    Rpm,
    /// Flow rate in gallons per minute.
    #[strum(serialize = "GPM")]
    Gpm,
}

/// Minimum/maximum speed for one speed type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

/// A pump's RPM and flow bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpBounds {
    pub rpm: SpeedRange,
    pub flow: SpeedRange,
}

impl PumpBounds {
    pub fn range(&self, speed_type: SpeedType) -> SpeedRange {
        match speed_type {
            SpeedType::Rpm => self.rpm,
            SpeedType::Gpm => self.flow,
        }
    }
}

/// Variable-speed pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pump {
    pub id: ObjectId,
    pub name: String,
    pub subtype: String,
    pub bounds: PumpBounds,
    pub circuits: Vec<PumpCircuit>,
}

/// One programmed speed of a pump.
///
/// Addressed by its own identifier on the wire, but represents the
/// circuit named by `circuit_id`; updates to `id` are routed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpCircuit {
    pub id: ObjectId,
    pub pump_id: ObjectId,
    pub circuit_id: ObjectId,
    pub speed: Option<f64>,
    pub speed_type: Option<SpeedType>,
    pub bounds: PumpBounds,
}

impl PumpCircuit {
    pub fn effective_speed_type(&self) -> SpeedType {
        self.speed_type.unwrap_or_default()
    }

    pub fn range(&self) -> SpeedRange {
        self.bounds.range(self.effective_speed_type())
    }

    /// Current speed as a 0-100 power level; `0` when no speed is known.
    pub fn power_level(&self) -> f64 {
        match self.speed {
            Some(speed) if speed.abs() > f64::EPSILON => units::percentage_from_speed(speed, self.range()),
            _ => 0.0,
        }
    }

    /// Physical speed to request for a 0-100 power level.
    pub fn speed_for(&self, percentage: f64) -> f64 {
        units::speed_from_percentage(percentage, self.effective_speed_type(), self.range())
    }
}
