// icbridge-core: discovery, entity registry and update routing between
// icbridge-api and consumers (CLI, accessory layers).

pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod merge;
pub mod model;
pub mod store;
pub mod units;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::BridgeConfig;
pub use controller::{ConnectionState, Controller};
pub use error::CoreError;
pub use store::{Binding, ChangeOutcome, Entity, EntityEvent, EntityRegistry, TopologySummary};
pub use units::TemperatureUnits;

pub use model::{
    BodyState, Circuit, CircuitKind, CircuitStatus, Color, HeatMode, HeatSource, Heater,
    HeaterView, Module, ObjectId, ObjectType, Panel, Pump, PumpCircuit, SpeedType,
};

// Credentials live in the wire crate; re-exported so consumers need only core.
pub use icbridge_api::Credentials;
