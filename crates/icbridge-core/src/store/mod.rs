// ── Entity store ──
//
// Live entity state plus the fixed tables that map protocol keys onto it.

mod collection;
pub(crate) mod mapping;
mod registry;

pub use mapping::{BODY_SUBSCRIPTION, FEATURE_SUBSCRIPTION, PUMP_CIRCUIT_SUBSCRIPTION};
pub use registry::{Binding, ChangeOutcome, Entity, EntityEvent, EntityRegistry, TopologySummary};
