// ── Topology containers ──

use serde::{Deserialize, Serialize};

use super::circuit::Circuit;
use super::heater::Heater;
use super::object_id::ObjectId;
use super::pump::Pump;

/// Top-level controller unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub id: ObjectId,
    pub modules: Vec<Module>,
    /// Features attached directly to the panel rather than a module.
    pub features: Vec<Circuit>,
    pub pumps: Vec<Pump>,
}

/// Expansion module inside a panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: ObjectId,
    pub subtype: Option<String>,
    pub bodies: Vec<Circuit>,
    pub features: Vec<Circuit>,
    pub heaters: Vec<Heater>,
}

impl Panel {
    /// Every circuit in the panel: module bodies and features, then
    /// panel-level features.
    pub fn circuits(&self) -> impl Iterator<Item = &Circuit> {
        self.modules
            .iter()
            .flat_map(|m| m.bodies.iter().chain(m.features.iter()))
            .chain(self.features.iter())
    }

    pub fn heaters(&self) -> impl Iterator<Item = &Heater> {
        self.modules.iter().flat_map(|m| m.heaters.iter())
    }
}
