// ── Topology transformer ──
//
// Turns the merged hardware-definition tree into typed panels. The tree is
// a list of `{objnam, params}` nodes; containers nest their children under
// `OBJLIST` (panels, pumps) or `CIRCUITS` (modules). Nodes are selected by
// their `OBJTYP` tag.
//
// A node whose required numeric field does not parse is dropped on its own
// with a warning; the rest of the topology is still produced.

use std::borrow::Cow;

use icbridge_api::ParamBag;
use icbridge_api::codec::{OBJ_ID_KEY, PARAMS_KEY};
use serde_json::Value;
use thiserror::Error;

use crate::model::{
    BodyState, Circuit, CircuitKind, Heater, INTELLIBRITE_SUBTYPE, Module, ObjectId, ObjectType,
    Panel, Pump, PumpBounds, PumpCircuit, SpeedRange, SpeedType, VARIABLE_SPEED_SUBTYPES,
};
use crate::store::mapping::{self, BODY_FIELDS, SELECT_KEY, SPEED_KEY, STATUS_KEY};

const OBJ_TYPE_KEY: &str = "OBJTYP";
const OBJ_NAME_KEY: &str = "SNAME";
const OBJ_SUBTYPE_KEY: &str = "SUBTYP";
const OBJ_LIST_KEY: &str = "OBJLIST";
const CIRCUITS_KEY: &str = "CIRCUITS";
const FEATURE_KEY: &str = "FEATR";
const BODY_KEY: &str = "BODY";
const CIRCUIT_KEY: &str = "CIRCUIT";
const MIN_RPM_KEY: &str = "MIN";
const MAX_RPM_KEY: &str = "MAX";
const MIN_FLOW_KEY: &str = "MINF";
const MAX_FLOW_KEY: &str = "MAXF";

const FEATURE_ENABLED: &str = "ON";
const LEGACY_SUBTYPE: &str = "LEGACY";

/// A node that could not be turned into an entity.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("{object_id}: required field {field} is not numeric ({value:?})")]
    RequiredField {
        object_id: String,
        field: &'static str,
        value: Option<String>,
    },
}

/// Build the panel hierarchy from a merged discovery tree.
pub fn transform(tree: &Value) -> Vec<Panel> {
    nodes(Some(tree))
        .filter(|node| node.object_type() == Some(ObjectType::Panel))
        .map(|node| transform_panel(&node))
        .collect()
}

// ── Node access ──────────────────────────────────────────────────────

/// One `{objnam, params}` element of the tree.
struct Node<'a> {
    id: &'a str,
    params: &'a ParamBag,
}

impl<'a> Node<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let id = value.get(OBJ_ID_KEY)?.as_str()?;
        let params = value.get(PARAMS_KEY)?.as_object()?;
        Some(Self { id, params })
    }

    fn object_id(&self) -> ObjectId {
        ObjectId::from(self.id)
    }

    fn str(&self, key: &str) -> Option<&'a str> {
        self.params.get(key).and_then(Value::as_str)
    }

    fn object_type(&self) -> Option<ObjectType> {
        self.str(OBJ_TYPE_KEY)?.trim().parse().ok()
    }

    fn name(&self) -> String {
        self.str(OBJ_NAME_KEY).unwrap_or(self.id).to_owned()
    }

    fn subtype(&self) -> Option<String> {
        self.str(OBJ_SUBTYPE_KEY).map(str::to_ascii_uppercase)
    }

    fn children(&self, key: &str) -> impl Iterator<Item = Node<'a>> + use<'a> {
        nodes(self.params.get(key))
    }

    fn number(&self, key: &'static str) -> Result<f64, TransformError> {
        let raw = self.params.get(key).and_then(mapping::value_text);
        raw.as_deref()
            .and_then(mapping::parse_number)
            .ok_or_else(|| TransformError::RequiredField {
                object_id: self.id.to_owned(),
                field: key,
                value: raw.map(Cow::into_owned),
            })
    }

    /// Like [`number`](Self::number), but an absent key yields `0`.
    fn optional_number(&self, key: &'static str) -> Result<f64, TransformError> {
        if self.params.get(key).and_then(mapping::value_text).is_none() {
            return Ok(0.0);
        }
        self.number(key)
    }
}

fn nodes(list: Option<&Value>) -> impl Iterator<Item = Node<'_>> {
    list.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Node::from_value)
}

// ── Panels & modules ─────────────────────────────────────────────────

fn transform_panel(node: &Node<'_>) -> Panel {
    let panel_id = node.object_id();
    let modules = node
        .children(OBJ_LIST_KEY)
        .filter(|n| n.object_type() == Some(ObjectType::Module))
        .map(|n| transform_module(&n, &panel_id))
        .collect();
    let features = transform_features(node.children(OBJ_LIST_KEY), &panel_id, None);
    let pumps = node
        .children(OBJ_LIST_KEY)
        .filter(|n| n.object_type() == Some(ObjectType::Pump))
        .filter(is_variable_speed)
        .filter_map(|n| match transform_pump(&n) {
            Ok(pump) => Some(pump),
            Err(error) => {
                tracing::warn!(%error, "skipping pump");
                None
            }
        })
        .collect();

    Panel {
        id: panel_id,
        modules,
        features,
        pumps,
    }
}

fn transform_module(node: &Node<'_>, panel_id: &ObjectId) -> Module {
    let module_id = node.object_id();
    let bodies = node
        .children(CIRCUITS_KEY)
        .filter(|n| n.object_type() == Some(ObjectType::Body))
        .map(|n| transform_body(&n, panel_id, &module_id))
        .collect();
    let heaters = node
        .children(CIRCUITS_KEY)
        .filter(|n| n.object_type() == Some(ObjectType::Heater))
        .map(|n| transform_heater(&n))
        .collect();
    let features = transform_features(node.children(CIRCUITS_KEY), panel_id, Some(&module_id));

    Module {
        subtype: node.subtype(),
        id: module_id,
        bodies,
        features,
        heaters,
    }
}

// ── Circuits ─────────────────────────────────────────────────────────

/// Enabled, non-legacy feature circuits among `candidates`.
fn transform_features<'a>(
    candidates: impl Iterator<Item = Node<'a>>,
    panel_id: &ObjectId,
    module_id: Option<&ObjectId>,
) -> Vec<Circuit> {
    candidates
        .filter(|n| n.object_type() == Some(ObjectType::Circuit))
        .filter(|n| n.str(FEATURE_KEY) == Some(FEATURE_ENABLED))
        .filter(|n| n.subtype().as_deref() != Some(LEGACY_SUBTYPE))
        .map(|n| {
            let subtype = n.subtype();
            let kind = if subtype.as_deref() == Some(INTELLIBRITE_SUBTYPE) {
                CircuitKind::Light
            } else {
                CircuitKind::Switch
            };
            base_circuit(&n, ObjectType::Circuit, kind, panel_id, module_id)
        })
        .collect()
}

fn transform_body(node: &Node<'_>, panel_id: &ObjectId, module_id: &ObjectId) -> Circuit {
    let mut state = BodyState::default();
    mapping::apply(BODY_FIELDS, &mut state, node.params);
    base_circuit(
        node,
        ObjectType::Body,
        CircuitKind::Body(state),
        panel_id,
        Some(module_id),
    )
}

fn base_circuit(
    node: &Node<'_>,
    object_type: ObjectType,
    kind: CircuitKind,
    panel_id: &ObjectId,
    module_id: Option<&ObjectId>,
) -> Circuit {
    Circuit {
        id: node.object_id(),
        name: node.name(),
        object_type,
        subtype: node.subtype(),
        status: node
            .str(STATUS_KEY)
            .and_then(|s| s.to_ascii_uppercase().parse().ok()),
        kind,
        pump: None,
        panel_id: panel_id.clone(),
        module_id: module_id.cloned(),
    }
}

fn transform_heater(node: &Node<'_>) -> Heater {
    Heater {
        id: node.object_id(),
        name: node.name(),
        subtype: node.subtype(),
        body_ids: node
            .str(BODY_KEY)
            .map(|s| s.split_whitespace().map(ObjectId::from).collect())
            .unwrap_or_default(),
    }
}

// ── Pumps ────────────────────────────────────────────────────────────

fn is_variable_speed(node: &Node<'_>) -> bool {
    node.subtype()
        .is_some_and(|s| VARIABLE_SPEED_SUBTYPES.contains(&s.as_str()))
}

/// A pump's `OBJLIST` holds one `PMPCIRC` entry per circuit it serves,
/// often several. Every entry naming a `CIRCUIT` becomes a
/// [`PumpCircuit`]; untyped entries are read the same way.
fn transform_pump(node: &Node<'_>) -> Result<Pump, TransformError> {
    let bounds = PumpBounds {
        rpm: SpeedRange {
            min: node.number(MIN_RPM_KEY)?,
            max: node.number(MAX_RPM_KEY)?,
        },
        flow: SpeedRange {
            min: node.optional_number(MIN_FLOW_KEY)?,
            max: node.optional_number(MAX_FLOW_KEY)?,
        },
    };
    let pump_id = node.object_id();

    let circuits = node
        .children(OBJ_LIST_KEY)
        .filter(|n| matches!(n.object_type(), None | Some(ObjectType::PumpCircuit)))
        .filter_map(|n| {
            let Some(circuit_id) = n.str(CIRCUIT_KEY) else {
                tracing::debug!(pump = %pump_id, entry = n.id, "pump entry has no circuit");
                return None;
            };
            Some(PumpCircuit {
                id: n.object_id(),
                pump_id: pump_id.clone(),
                circuit_id: ObjectId::from(circuit_id),
                speed: n
                    .params
                    .get(SPEED_KEY)
                    .and_then(mapping::value_text)
                    .and_then(|v| mapping::parse_number(&v)),
                speed_type: n.str(SELECT_KEY).and_then(|s| s.parse::<SpeedType>().ok()),
                bounds,
            })
        })
        .collect();

    Ok(Pump {
        id: pump_id,
        name: node.name(),
        subtype: node.subtype().unwrap_or_default(),
        bounds,
        circuits,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{CircuitStatus, HeatSource};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn module(circuits: Value) -> Value {
        json!([{
            "objnam": "PNL01",
            "params": {
                "OBJTYP": "PANEL",
                "OBJLIST": [{
                    "objnam": "M0101",
                    "params": { "OBJTYP": "MODULE", "SUBTYP": "i5p", "CIRCUITS": circuits }
                }]
            }
        }])
    }

    #[test]
    fn body_fields_are_read_from_discovery() {
        let tree = module(json!([{
            "objnam": "B1101",
            "params": {
                "OBJTYP": "BODY", "SUBTYP": "pool", "SNAME": "Pool", "STATUS": "ON",
                "LSTTMP": "82", "LOTMP": "80", "HITMP": "104", "HTSRC": "00000", "MODE": "1"
            }
        }]));
        let panels = transform(&tree);
        let body = &panels[0].modules[0].bodies[0];

        assert_eq!(body.subtype.as_deref(), Some("POOL"));
        assert_eq!(body.status, Some(CircuitStatus::On));
        assert_eq!(body.module_id, Some(ObjectId::from("M0101")));
        let state = body.body().unwrap();
        assert_eq!(state.temperature, Some(82.0));
        assert_eq!(state.low_temperature, Some(80.0));
        assert_eq!(state.high_temperature, Some(104.0));
        assert_eq!(state.heat_source, Some(HeatSource::None));
    }

    #[test]
    fn features_filter_on_flag_and_legacy_subtype() {
        let tree = module(json!([
            { "objnam": "C0001", "params": { "OBJTYP": "CIRCUIT", "FEATR": "ON", "SUBTYP": "GENERIC" } },
            { "objnam": "C0002", "params": { "OBJTYP": "CIRCUIT", "FEATR": "OFF", "SUBTYP": "GENERIC" } },
            { "objnam": "C0003", "params": { "OBJTYP": "CIRCUIT", "FEATR": "ON", "SUBTYP": "legacy" } },
            { "objnam": "C0004", "params": { "OBJTYP": "CIRCUIT", "FEATR": "ON", "SUBTYP": "INTELLI" } }
        ]));
        let panels = transform(&tree);
        let features = &panels[0].modules[0].features;
        let ids: Vec<&str> = features.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C0001", "C0004"]);
        assert_eq!(features[0].kind, CircuitKind::Switch);
        assert_eq!(features[1].kind, CircuitKind::Light);
    }

    #[test]
    fn heater_body_list_is_split() {
        let tree = module(json!([
            { "objnam": "H0001", "params": { "OBJTYP": "HEATER", "SNAME": "Gas", "BODY": "B1101 B1202" } }
        ]));
        let heater = &transform(&tree)[0].modules[0].heaters[0];
        assert_eq!(heater.body_ids, vec![ObjectId::from("B1101"), ObjectId::from("B1202")]);
    }

    fn pump(subtype: &str, min: &str) -> Value {
        json!([{
            "objnam": "PNL01",
            "params": {
                "OBJTYP": "PANEL",
                "OBJLIST": [{
                    "objnam": "PMP01",
                    "params": {
                        "OBJTYP": "PUMP", "SUBTYP": subtype, "SNAME": "Main Pump",
                        "MIN": min, "MAX": "3450", "MINF": "20", "MAXF": "140",
                        "OBJLIST": [{
                            "objnam": "p0101",
                            "params": { "OBJTYP": "PMPCIRC", "CIRCUIT": "B1101", "SPEED": "2500", "SELECT": "RPM" }
                        }]
                    }
                }]
            }
        }])
    }

    #[test]
    fn variable_speed_pump_and_circuits() {
        let panels = transform(&pump("speed", "450"));
        let pump = &panels[0].pumps[0];
        assert_eq!(pump.bounds.rpm, SpeedRange { min: 450.0, max: 3450.0 });
        assert_eq!(pump.bounds.flow, SpeedRange { min: 20.0, max: 140.0 });
        let pc = &pump.circuits[0];
        assert_eq!(pc.id, "p0101");
        assert_eq!(pc.circuit_id, "B1101");
        assert_eq!(pc.speed, Some(2500.0));
        assert_eq!(pc.speed_type, Some(SpeedType::Rpm));
    }

    #[test]
    fn every_pump_circuit_entry_is_read() {
        let mut tree = pump("VSF", "450");
        tree[0]["params"]["OBJLIST"][0]["params"]["OBJLIST"]
            .as_array_mut()
            .unwrap()
            .extend([
                json!({ "objnam": "p0102", "params": { "OBJTYP": "PMPCIRC", "CIRCUIT": "C0003", "SPEED": "60", "SELECT": "GPM" } }),
                json!({ "objnam": "p0103", "params": { "OBJTYP": "PMPCIRC", "SPEED": "1500" } }),
                json!({ "objnam": "p0104", "params": { "CIRCUIT": "C0004", "SPEED": "3000" } }),
            ]);

        let pump = &transform(&tree)[0].pumps[0];
        let circuits: Vec<_> = pump
            .circuits
            .iter()
            .map(|pc| (pc.id.as_str(), pc.circuit_id.as_str(), pc.speed))
            .collect();
        assert_eq!(
            circuits,
            vec![
                ("p0101", "B1101", Some(2500.0)),
                ("p0102", "C0003", Some(60.0)),
                ("p0104", "C0004", Some(3000.0)),
            ]
        );
        assert!(pump.circuits.iter().all(|pc| pc.pump_id == "PMP01"));
    }

    #[test]
    fn fixed_speed_pumps_are_excluded() {
        assert!(transform(&pump("SINGLE", "450"))[0].pumps.is_empty());
    }

    #[test]
    fn pump_with_bad_bounds_is_skipped() {
        let panels = transform(&pump("VSF", "fast"));
        assert_eq!(panels.len(), 1);
        assert!(panels[0].pumps.is_empty());
    }

    #[test]
    fn required_field_error_names_the_field() {
        let raw = json!({ "objnam": "PMP01", "params": { "MIN": "x" } });
        let node = Node::from_value(&raw).unwrap();
        assert_eq!(
            node.number(MIN_RPM_KEY),
            Err(TransformError::RequiredField {
                object_id: "PMP01".into(),
                field: "MIN",
                value: Some("x".into()),
            })
        );
    }

    #[test]
    fn non_panel_roots_are_ignored() {
        let tree = json!([{ "objnam": "X", "params": { "OBJTYP": "SENSE" } }, { "bogus": true }]);
        assert!(transform(&tree).is_empty());
    }
}
