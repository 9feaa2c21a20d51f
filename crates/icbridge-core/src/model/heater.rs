// ── Heaters ──
//
// A heater's on/off state is never stored. It is derived from the body it
// serves: the heater is heating when it is that body's current heat source.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::circuit::Circuit;
use super::object_id::ObjectId;
use crate::units::{self, TemperatureUnits};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heater {
    pub id: ObjectId,
    pub name: String,
    pub subtype: Option<String>,
    /// Bodies this heater can serve (`BODY`, space-separated on the wire).
    pub body_ids: Vec<ObjectId>,
}

/// A heater paired with one body it serves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaterView {
    pub heater: Arc<Heater>,
    pub body: Arc<Circuit>,
}

impl HeaterView {
    /// Binding key, `"<heaterId>.<bodyId>"`.
    pub fn key(&self) -> String {
        binding_key(&self.heater.id, &self.body.id)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.body.name, self.heater.name)
    }

    pub fn is_heating(&self) -> bool {
        self.body
            .body()
            .and_then(|b| b.heater_id())
            .is_some_and(|id| *id == self.heater.id)
    }

    /// Current water temperature in Celsius.
    pub fn current_temperature_c(&self, units: TemperatureUnits) -> Option<f64> {
        self.body
            .body()
            .and_then(|b| b.temperature)
            .map(|t| units::controller_to_celsius(t, units))
            .map(|t| t.clamp(units::CURRENT_TEMP_MIN_C, units::CURRENT_TEMP_MAX_C))
    }

    /// Heating setpoint (`LOTMP`) in Celsius.
    pub fn target_temperature_c(&self, units: TemperatureUnits) -> Option<f64> {
        self.body
            .body()
            .and_then(|b| b.low_temperature)
            .map(|t| units::controller_to_celsius(t, units))
    }
}

pub fn binding_key(heater: &ObjectId, body: &ObjectId) -> String {
    format!("{heater}.{body}")
}
