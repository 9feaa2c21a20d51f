// ── Entity registry & update router ──
//
// Owns every live entity. The topology is replaced wholesale after each
// discovery; between discoveries change notifications patch individual
// fields in place. Consumers get `Arc` read views and notification events,
// never mutable handles.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use icbridge_api::ParamBag;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::collection::EntityCollection;
use super::mapping::{self, BODY_FIELDS, CIRCUIT_FIELDS, PUMP_FIELDS};
use crate::model::{Circuit, HeaterView, ObjectId, Panel, Pump};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Notifications ────────────────────────────────────────────────────

/// Read view of one exposed entity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    Circuit(Arc<Circuit>),
    Heater(Arc<HeaterView>),
}

impl Entity {
    /// Binding key: the circuit id, or `"<heater>.<body>"` for heaters.
    pub fn key(&self) -> String {
        match self {
            Self::Circuit(c) => c.id.to_string(),
            Self::Heater(h) => h.key(),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Circuit(c) => c.name.clone(),
            Self::Heater(h) => h.display_name(),
        }
    }
}

/// What the registry tells the accessory layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EntityEvent {
    /// Produced once per entity after each discovery. `restored` is set
    /// when a binding for the key survived from an earlier discovery.
    Created { entity: Entity, restored: bool },
    Changed {
        entity: Entity,
        fields: Vec<&'static str>,
    },
}

/// Accessory binding metadata, kept across topology rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub key: String,
    pub display_name: String,
    /// Opaque data owned by the accessory layer.
    pub context: Map<String, Value>,
}

/// Result of routing one change entry.
#[derive(Debug, Clone)]
pub enum ChangeOutcome {
    Updated {
        circuit: Arc<Circuit>,
        fields: Vec<&'static str>,
    },
    /// Id not in the registry; nothing was touched.
    Unknown,
}

/// Counts from the last topology replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopologySummary {
    pub panels: usize,
    pub circuits: usize,
    pub heaters: usize,
    pub pumps: usize,
    pub pump_circuits: usize,
}

// ── EntityRegistry ───────────────────────────────────────────────────

pub struct EntityRegistry {
    circuits: EntityCollection<Circuit>,
    heaters: EntityCollection<HeaterView>,
    pumps: EntityCollection<Pump>,
    /// Pump-circuit id → id of the circuit it drives.
    pump_index: DashMap<ObjectId, ObjectId>,
    bindings: DashMap<String, Binding>,
    topology: ArcSwap<Vec<Panel>>,
    stale: AtomicBool,
    events: broadcast::Sender<Arc<EntityEvent>>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            circuits: EntityCollection::new(),
            heaters: EntityCollection::new(),
            pumps: EntityCollection::new(),
            pump_index: DashMap::new(),
            bindings: DashMap::new(),
            topology: ArcSwap::from_pointee(Vec::new()),
            stale: AtomicBool::new(true),
            events,
        }
    }

    // ── Topology replacement ─────────────────────────────────────────

    /// Replace everything with a freshly transformed topology. Bindings
    /// are kept by key; see [`announce`](Self::announce).
    pub fn replace_topology(&self, panels: Vec<Panel>) -> TopologySummary {
        let mut circuits: HashMap<ObjectId, Circuit> = panels
            .iter()
            .flat_map(Panel::circuits)
            .map(|c| (c.id.clone(), c.clone()))
            .collect();

        let mut pump_index = Vec::new();
        let pumps: Vec<Pump> = panels.iter().flat_map(|p| p.pumps.iter().cloned()).collect();
        for pc in pumps.iter().flat_map(|p| p.circuits.iter()) {
            match circuits.get_mut(&pc.circuit_id) {
                Some(circuit) => {
                    if let Some(previous) = circuit.pump.replace(pc.clone()) {
                        tracing::debug!(
                            circuit = %circuit.id,
                            previous = %previous.id,
                            current = %pc.id,
                            "circuit driven by more than one pump circuit, keeping the last"
                        );
                    }
                    pump_index.push((pc.id.clone(), pc.circuit_id.clone()));
                }
                None => tracing::debug!(
                    pump_circuit = %pc.id,
                    circuit = %pc.circuit_id,
                    "pump circuit references an undiscovered circuit"
                ),
            }
        }

        self.circuits
            .replace_all(circuits.into_iter().map(|(id, c)| (id.to_string(), c)));
        self.pumps
            .replace_all(pumps.into_iter().map(|p| (p.id.to_string(), p)));
        self.pump_index.clear();
        for (pc, owner) in pump_index {
            self.pump_index.insert(pc, owner);
        }

        let mut views = Vec::new();
        for heater in panels.iter().flat_map(Panel::heaters) {
            let heater = Arc::new(heater.clone());
            for body_id in &heater.body_ids {
                match self.circuits.get(body_id.as_str()).filter(|c| c.is_body()) {
                    Some(body) => views.push(HeaterView {
                        heater: Arc::clone(&heater),
                        body,
                    }),
                    None => tracing::warn!(
                        heater = %heater.id,
                        body = %body_id,
                        "heater serves an unknown body, not exposing it"
                    ),
                }
            }
        }
        self.heaters
            .replace_all(views.into_iter().map(|v| (v.key(), v)));

        let summary = TopologySummary {
            panels: panels.len(),
            circuits: self.circuits.len(),
            heaters: self.heaters.len(),
            pumps: self.pumps.len(),
            pump_circuits: self.pump_index.len(),
        };
        self.topology.store(Arc::new(panels));
        self.stale.store(false, Ordering::SeqCst);

        tracing::info!(
            panels = summary.panels,
            circuits = summary.circuits,
            heaters = summary.heaters,
            pumps = summary.pumps,
            "topology replaced"
        );
        summary
    }

    /// Emit `Created` for every current entity, recording bindings as it
    /// goes. Called once per discovery, after subscriptions are issued.
    pub fn announce(&self) {
        let created = self
            .circuits
            .snapshot()
            .iter()
            .map(|c| Entity::Circuit(Arc::clone(c)))
            .chain(self.heaters.snapshot().iter().map(|h| Entity::Heater(Arc::clone(h))))
            .collect::<Vec<_>>();
        for entity in created {
            let restored = self.bind(&entity);
            self.emit(EntityEvent::Created { entity, restored });
        }
    }

    /// Record (or refresh) the binding for `entity`. Returns `true` if it
    /// already existed.
    fn bind(&self, entity: &Entity) -> bool {
        let key = entity.key();
        let display_name = entity.display_name();
        match self.bindings.get_mut(&key) {
            Some(mut binding) => {
                binding.display_name = display_name;
                true
            }
            None => {
                self.bindings.insert(
                    key.clone(),
                    Binding {
                        key,
                        display_name,
                        context: Map::new(),
                    },
                );
                false
            }
        }
    }

    // ── Update routing ───────────────────────────────────────────────

    /// Route one change entry to its entity and apply the fields present.
    pub fn apply_change(&self, object_id: &str, params: &ParamBag) -> ChangeOutcome {
        let owner = self.pump_index.get(object_id).map(|r| r.value().clone());

        let updated = match owner {
            Some(owner) => self.circuits.modify(owner.as_str(), |circuit| {
                let mut fields = circuit
                    .pump
                    .as_mut()
                    .map(|pc| mapping::apply(PUMP_FIELDS, pc, params))
                    .unwrap_or_default();
                let body_fields = circuit
                    .body_mut()
                    .map(|body| mapping::apply(BODY_FIELDS, body, params))
                    .unwrap_or_default();
                let body_changed = !body_fields.is_empty();
                fields.extend(body_fields);
                (fields, body_changed)
            }),
            None => self.circuits.modify(object_id, |circuit| {
                let mut fields = mapping::apply(CIRCUIT_FIELDS, circuit, params);
                let body_fields = circuit
                    .body_mut()
                    .map(|body| mapping::apply(BODY_FIELDS, body, params))
                    .unwrap_or_default();
                let body_changed = !body_fields.is_empty();
                fields.extend(body_fields);
                (fields, body_changed)
            }),
        };

        let Some((circuit, (fields, body_changed))) = updated else {
            tracing::debug!(object_id, "change for unknown object, dropping");
            return ChangeOutcome::Unknown;
        };

        tracing::debug!(object_id, circuit = %circuit.id, ?fields, "applied change");
        if !fields.is_empty() {
            self.emit(EntityEvent::Changed {
                entity: Entity::Circuit(Arc::clone(&circuit)),
                fields: fields.clone(),
            });
        }
        if body_changed || fields.contains(&"status") {
            self.cascade_to_heaters(&circuit, &fields);
        }

        ChangeOutcome::Updated { circuit, fields }
    }

    /// Re-point every heater view of `body` at its new state so that
    /// `is_heating` is recomputed by readers.
    fn cascade_to_heaters(&self, body: &Arc<Circuit>, fields: &[&'static str]) {
        let keys: Vec<String> = self
            .heaters
            .snapshot()
            .iter()
            .filter(|v| v.body.id == body.id)
            .map(|v| v.key())
            .collect();

        for key in keys {
            if let Some((view, ())) = self.heaters.modify(&key, |v| v.body = Arc::clone(body)) {
                self.emit(EntityEvent::Changed {
                    entity: Entity::Heater(view),
                    fields: fields.to_vec(),
                });
            }
        }
    }

    fn emit(&self, event: EntityEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(Arc::new(event));
    }

    // ── Staleness ────────────────────────────────────────────────────

    /// Flag the registry as out of date (after a disconnect).
    pub fn mark_stale(&self) {
        if !self.stale.swap(true, Ordering::SeqCst) {
            tracing::debug!("registry marked stale");
        }
    }

    /// `true` until the first discovery completes, and again after any
    /// disconnect until the next one does.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn events(&self) -> broadcast::Receiver<Arc<EntityEvent>> {
        self.events.subscribe()
    }

    pub fn circuit(&self, id: &str) -> Option<Arc<Circuit>> {
        self.circuits.get(id)
    }

    pub fn heater_view(&self, key: &str) -> Option<Arc<HeaterView>> {
        self.heaters.get(key)
    }

    pub fn pump(&self, id: &str) -> Option<Arc<Pump>> {
        self.pumps.get(id)
    }

    /// Circuit a pump-circuit id routes to.
    pub fn pump_owner(&self, pump_circuit_id: &str) -> Option<ObjectId> {
        self.pump_index.get(pump_circuit_id).map(|r| r.value().clone())
    }

    pub fn circuits_snapshot(&self) -> Arc<Vec<Arc<Circuit>>> {
        self.circuits.snapshot()
    }

    pub fn heaters_snapshot(&self) -> Arc<Vec<Arc<HeaterView>>> {
        self.heaters.snapshot()
    }

    pub fn pumps_snapshot(&self) -> Arc<Vec<Arc<Pump>>> {
        self.pumps.snapshot()
    }

    /// Panels as produced by the last discovery, before pump attachment.
    pub fn topology(&self) -> Arc<Vec<Panel>> {
        self.topology.load_full()
    }

    // ── Bindings ─────────────────────────────────────────────────────

    pub fn binding(&self, key: &str) -> Option<Binding> {
        self.bindings.get(key).map(|r| r.value().clone())
    }

    /// Store accessory-layer context on a binding. Returns `false` for an
    /// unknown key.
    pub fn set_binding_context(&self, key: &str, context: Map<String, Value>) -> bool {
        match self.bindings.get_mut(key) {
            Some(mut binding) => {
                binding.context = context;
                true
            }
            None => false,
        }
    }

    pub fn bindings(&self) -> Vec<Binding> {
        let mut all: Vec<Binding> = self.bindings.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{
        BodyState, CircuitKind, CircuitStatus, HeatSource, Heater, Module, ObjectType, PumpBounds,
        PumpCircuit, SpeedRange, SpeedType,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn bag(value: Value) -> ParamBag {
        match value {
            Value::Object(map) => map,
            _ => ParamBag::new(),
        }
    }

    fn circuit(id: &str, kind: CircuitKind) -> Circuit {
        Circuit {
            id: id.into(),
            name: format!("Circuit {id}"),
            object_type: if matches!(kind, CircuitKind::Body(_)) {
                ObjectType::Body
            } else {
                ObjectType::Circuit
            },
            subtype: None,
            status: Some(CircuitStatus::Off),
            kind,
            pump: None,
            panel_id: "PNL01".into(),
            module_id: Some("M0101".into()),
        }
    }

    fn sample() -> Vec<Panel> {
        let body = circuit(
            "B1101",
            CircuitKind::Body(BodyState {
                temperature: Some(80.0),
                low_temperature: Some(78.0),
                high_temperature: Some(104.0),
                heat_source: Some(HeatSource::None),
                heat_mode: None,
            }),
        );
        let bounds = PumpBounds {
            rpm: SpeedRange { min: 450.0, max: 3450.0 },
            flow: SpeedRange { min: 20.0, max: 140.0 },
        };
        vec![Panel {
            id: "PNL01".into(),
            modules: vec![Module {
                id: "M0101".into(),
                subtype: None,
                bodies: vec![body],
                features: vec![circuit("C0001", CircuitKind::Switch)],
                heaters: vec![Heater {
                    id: "H0001".into(),
                    name: "Gas".into(),
                    subtype: None,
                    body_ids: vec!["B1101".into(), "B9999".into()],
                }],
            }],
            features: Vec::new(),
            pumps: vec![Pump {
                id: "PMP01".into(),
                name: "Main".into(),
                subtype: "SPEED".into(),
                bounds,
                circuits: vec![PumpCircuit {
                    id: "p0101".into(),
                    pump_id: "PMP01".into(),
                    circuit_id: "B1101".into(),
                    speed: Some(1500.0),
                    speed_type: Some(SpeedType::Rpm),
                    bounds,
                }],
            }],
        }]
    }

    #[test]
    fn topology_builds_indexes_and_views() {
        let registry = EntityRegistry::new();
        assert!(registry.is_stale());
        let summary = registry.replace_topology(sample());

        assert_eq!(
            summary,
            TopologySummary {
                panels: 1,
                circuits: 2,
                heaters: 1,
                pumps: 1,
                pump_circuits: 1,
            }
        );
        assert!(!registry.is_stale());
        assert_eq!(registry.pump_owner("p0101"), Some(ObjectId::from("B1101")));
        assert!(registry.circuit("B1101").unwrap().pump.is_some());
        // Unknown body B9999 is not exposed.
        assert!(registry.heater_view("H0001.B1101").is_some());
        assert!(registry.heater_view("H0001.B9999").is_none());
    }

    #[test]
    fn status_change_leaves_temperatures_alone() {
        let registry = EntityRegistry::new();
        registry.replace_topology(sample());

        let outcome = registry.apply_change("B1101", &bag(json!({ "STATUS": "ON" })));
        let ChangeOutcome::Updated { circuit, fields } = outcome else {
            panic!("expected update");
        };
        assert_eq!(fields, vec!["status"]);
        assert!(circuit.is_on());
        let body = circuit.body().unwrap();
        assert_eq!(body.temperature, Some(80.0));
        assert_eq!(body.low_temperature, Some(78.0));
        assert_eq!(body.high_temperature, Some(104.0));
    }

    #[test]
    fn pump_circuit_change_updates_owner() {
        let registry = EntityRegistry::new();
        registry.replace_topology(sample());
        let before = registry.circuits_snapshot().len();

        let outcome = registry.apply_change("p0101", &bag(json!({ "SPEED": "2000", "STATUS": "ON" })));
        let ChangeOutcome::Updated { circuit, fields } = outcome else {
            panic!("expected update");
        };
        assert_eq!(circuit.id, "B1101");
        assert_eq!(fields, vec!["speed"]);
        assert_eq!(circuit.pump.as_ref().unwrap().speed, Some(2000.0));
        // Pump-circuit status does not touch the body's own status.
        assert_eq!(circuit.status, Some(CircuitStatus::Off));
        assert_eq!(registry.circuits_snapshot().len(), before);
        assert!(registry.circuit("p0101").is_none());
    }

    #[test]
    fn unknown_object_is_dropped() {
        let registry = EntityRegistry::new();
        registry.replace_topology(sample());
        let before = registry.circuits_snapshot();

        let outcome = registry.apply_change("X9999", &bag(json!({ "STATUS": "ON" })));
        assert!(matches!(outcome, ChangeOutcome::Unknown));
        assert!(Arc::ptr_eq(&before, &registry.circuits_snapshot()));
    }

    #[test]
    fn body_heat_source_cascades_to_heater_view() {
        let registry = EntityRegistry::new();
        registry.replace_topology(sample());
        let mut events = registry.events();
        assert!(!registry.heater_view("H0001.B1101").unwrap().is_heating());

        registry.apply_change("B1101", &bag(json!({ "HTSRC": "H0001" })));

        assert!(registry.heater_view("H0001.B1101").unwrap().is_heating());
        let first = events.try_recv().unwrap();
        assert!(matches!(&*first, EntityEvent::Changed { entity: Entity::Circuit(_), .. }));
        let second = events.try_recv().unwrap();
        match &*second {
            EntityEvent::Changed { entity: Entity::Heater(view), fields } => {
                assert!(view.is_heating());
                assert_eq!(fields, &vec!["heat_source"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn bindings_survive_rebuilds() {
        let registry = EntityRegistry::new();
        let mut events = registry.events();
        registry.replace_topology(sample());
        registry.announce();

        let first = events.try_recv().unwrap();
        assert!(matches!(&*first, EntityEvent::Created { restored: false, .. }));

        let mut context = Map::new();
        context.insert("accessory".into(), json!("uuid-1"));
        assert!(registry.set_binding_context("B1101", context.clone()));

        registry.mark_stale();
        while events.try_recv().is_ok() {}
        registry.replace_topology(sample());
        registry.announce();

        let again = events.try_recv().unwrap();
        assert!(matches!(&*again, EntityEvent::Created { restored: true, .. }));
        assert_eq!(registry.binding("B1101").unwrap().context, context);
        assert_eq!(registry.bindings().len(), 3);
    }
}
