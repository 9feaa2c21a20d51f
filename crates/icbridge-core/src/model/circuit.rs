// ── Circuit domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::object_id::ObjectId;
use super::pump::PumpCircuit;

/// Object type tag (`OBJTYP`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ObjectType {
    #[strum(serialize = "PANEL")]
    Panel,
    #[strum(serialize = "MODULE")]
    Module,
    #[strum(serialize = "CIRCUIT")]
    Circuit,
    #[strum(serialize = "BODY")]
    Body,
    #[strum(serialize = "HEATER")]
    Heater,
    #[strum(serialize = "PUMP")]
    Pump,
    #[strum(serialize = "PMPCIRC")]
    PumpCircuit,
    #[strum(serialize = "CIRCGRP")]
    CircuitGroup,
    #[strum(serialize = "SENSE")]
    Sensor,
}

/// On/off state reported under `STATUS`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum CircuitStatus {
    #[strum(serialize = "ON")]
    On,
    #[strum(serialize = "OFF")]
    Off,
}

impl CircuitStatus {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for CircuitStatus {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// Body heat mode (`MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum HeatMode {
    Off,
    On,
}

impl HeatMode {
    /// Wire code: `1` is off, `2` is on.
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 1,
            Self::On => 2,
        }
    }

    /// Parse a `MODE` value. Codes `0` and `1` are off; any higher code
    /// selects a heating mode. Non-numeric input yields `None`.
    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u32>().ok()? {
            0 | 1 => Some(Self::Off),
            _ => Some(Self::On),
        }
    }
}

/// Which heater, if any, currently sources heat for a body (`HTSRC`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HeatSource {
    None,
    Heater(ObjectId),
}

impl HeatSource {
    pub fn from_raw(raw: &str) -> Self {
        let id = ObjectId::from(raw.trim());
        if id.is_no_heater() { Self::None } else { Self::Heater(id) }
    }

    pub fn heater_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Heater(id) => Some(id),
            Self::None => None,
        }
    }
}

/// Body-of-water state. Temperatures are in the controller's configured unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub temperature: Option<f64>,
    pub high_temperature: Option<f64>,
    pub low_temperature: Option<f64>,
    pub heat_source: Option<HeatSource>,
    pub heat_mode: Option<HeatMode>,
}

impl BodyState {
    pub fn heater_id(&self) -> Option<&ObjectId> {
        self.heat_source.as_ref().and_then(HeatSource::heater_id)
    }
}

/// What kind of circuit this is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CircuitKind {
    /// Plain on/off feature.
    Switch,
    /// IntelliBrite color light (`SUBTYP` = `INTELLI`).
    Light,
    /// Pool or spa.
    Body(BodyState),
}

/// Subtype marking an IntelliBrite light.
pub const INTELLIBRITE_SUBTYPE: &str = "INTELLI";

/// An addressable circuit: feature, light, or body of water.
///
/// Pump speed control hangs off the circuit a pump program drives, so a
/// circuit may carry the [`PumpCircuit`] that owns its speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    pub id: ObjectId,
    pub name: String,
    pub object_type: ObjectType,
    /// Upper-cased `SUBTYP`, e.g. `GENERIC`, `INTELLI`, `POOL`, `SPA`.
    pub subtype: Option<String>,
    pub status: Option<CircuitStatus>,
    pub kind: CircuitKind,
    pub pump: Option<PumpCircuit>,
    pub panel_id: ObjectId,
    pub module_id: Option<ObjectId>,
}

impl Circuit {
    pub fn is_on(&self) -> bool {
        self.status.is_some_and(CircuitStatus::is_on)
    }

    pub fn is_body(&self) -> bool {
        matches!(self.kind, CircuitKind::Body(_))
    }

    pub fn is_light(&self) -> bool {
        matches!(self.kind, CircuitKind::Light)
    }

    pub fn body(&self) -> Option<&BodyState> {
        match &self.kind {
            CircuitKind::Body(body) => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut BodyState> {
        match &mut self.kind {
            CircuitKind::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Pump power level (0-100) derived from the pump circuit's current
    /// speed, or `0` when the circuit has no pump or no known speed.
    pub fn power_level(&self) -> f64 {
        self.pump.as_ref().map_or(0.0, PumpCircuit::power_level)
    }

    /// Serial-style location string: `panel.module.circuit`.
    pub fn location(&self) -> String {
        match &self.module_id {
            Some(module) => format!("{}.{}.{}", self.panel_id, module, self.id),
            None => format!("{}.{}", self.panel_id, self.id),
        }
    }
}
