// ── Parameter mapping tables ──
//
// One fixed table per entity kind maps protocol keys onto typed fields.
// Only keys present with a non-empty value are applied; everything else
// on the entity is left as it was. Values that fail to parse are skipped.

use std::borrow::Cow;

use icbridge_api::ParamBag;
use serde_json::Value;

use crate::model::{BodyState, Circuit, CircuitStatus, HeatMode, HeatSource, PumpCircuit, SpeedType};

pub const STATUS_KEY: &str = "STATUS";
pub const ACT_KEY: &str = "ACT";
pub const LAST_TEMP_KEY: &str = "LSTTMP";
pub const HIGH_TEMP_KEY: &str = "HITMP";
pub const LOW_TEMP_KEY: &str = "LOTMP";
pub const HEAT_SOURCE_KEY: &str = "HTSRC";
pub const HEATER_KEY: &str = "HEATER";
pub const MODE_KEY: &str = "MODE";
pub const SPEED_KEY: &str = "SPEED";
pub const SELECT_KEY: &str = "SELECT";

/// Keys requested when subscribing to each entity kind.
pub const BODY_SUBSCRIPTION: &[&str] = &[
    STATUS_KEY,
    LAST_TEMP_KEY,
    HEAT_SOURCE_KEY,
    HEATER_KEY,
    MODE_KEY,
    LOW_TEMP_KEY,
    HIGH_TEMP_KEY,
];
pub const FEATURE_SUBSCRIPTION: &[&str] = &[STATUS_KEY, ACT_KEY];
pub const PUMP_CIRCUIT_SUBSCRIPTION: &[&str] = &[STATUS_KEY, SPEED_KEY, SELECT_KEY];

/// One protocol key → entity field binding.
pub(crate) struct FieldMapping<T: 'static> {
    pub key: &'static str,
    pub field: &'static str,
    apply: fn(&mut T, &str) -> bool,
}

pub(crate) static CIRCUIT_FIELDS: &[FieldMapping<Circuit>] = &[FieldMapping {
    key: STATUS_KEY,
    field: "status",
    apply: |c, v| set_parsed(&mut c.status, v.to_ascii_uppercase().parse::<CircuitStatus>().ok()),
}];

pub(crate) static BODY_FIELDS: &[FieldMapping<BodyState>] = &[
    FieldMapping {
        key: LAST_TEMP_KEY,
        field: "temperature",
        apply: |b, v| set_parsed(&mut b.temperature, parse_number(v)),
    },
    FieldMapping {
        key: HIGH_TEMP_KEY,
        field: "high_temperature",
        apply: |b, v| set_parsed(&mut b.high_temperature, parse_number(v)),
    },
    FieldMapping {
        key: LOW_TEMP_KEY,
        field: "low_temperature",
        apply: |b, v| set_parsed(&mut b.low_temperature, parse_number(v)),
    },
    FieldMapping {
        key: HEAT_SOURCE_KEY,
        field: "heat_source",
        apply: |b, v| set_parsed(&mut b.heat_source, Some(HeatSource::from_raw(v))),
    },
    FieldMapping {
        key: MODE_KEY,
        field: "heat_mode",
        apply: |b, v| set_parsed(&mut b.heat_mode, HeatMode::from_code(v)),
    },
];

pub(crate) static PUMP_FIELDS: &[FieldMapping<PumpCircuit>] = &[
    FieldMapping {
        key: SELECT_KEY,
        field: "speed_type",
        apply: |p, v| set_parsed(&mut p.speed_type, v.parse::<SpeedType>().ok()),
    },
    FieldMapping {
        key: SPEED_KEY,
        field: "speed",
        apply: |p, v| set_parsed(&mut p.speed, parse_number(v)),
    },
];

/// Apply every entry of `table` whose key is present in `params`.
/// Returns the names of the fields that were written.
pub(crate) fn apply<T>(table: &[FieldMapping<T>], target: &mut T, params: &ParamBag) -> Vec<&'static str> {
    let mut applied = Vec::new();
    for mapping in table {
        let Some(raw) = params.get(mapping.key).and_then(value_text) else {
            continue;
        };
        if (mapping.apply)(target, &raw) {
            applied.push(mapping.field);
        } else {
            tracing::debug!(key = mapping.key, value = %raw, "ignoring unparseable parameter");
        }
    }
    applied
}

/// Textual form of a parameter value; `None` for empty or null values.
pub(crate) fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn set_parsed<V>(slot: &mut Option<V>, parsed: Option<V>) -> bool {
    match parsed {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}
