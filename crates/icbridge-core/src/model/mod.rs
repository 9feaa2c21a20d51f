// ── Domain model ──
//
// Typed view of the controller's object tree. Raw parameter bags are
// decoded into these types at the topology boundary (`convert`) and by the
// registry's mapping tables; nothing downstream touches protocol codes.

pub mod circuit;
pub mod color;
pub mod heater;
pub mod object_id;
pub mod pump;
pub mod topology;

pub use circuit::{
    BodyState, Circuit, CircuitKind, CircuitStatus, HeatMode, HeatSource, INTELLIBRITE_SUBTYPE,
    ObjectType,
};
pub use color::Color;
pub use heater::{Heater, HeaterView};
pub use object_id::{NO_HEATER_ID, ObjectId};
pub use pump::{PumpBounds, Pump, PumpCircuit, SpeedRange, SpeedType, VARIABLE_SPEED_SUBTYPES};
pub use topology::{Module, Panel};
