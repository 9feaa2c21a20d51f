//! Shared helpers for command handlers.

use icbridge_core::{Controller, CoreError, ObjectId};

/// Resolve a circuit given by id (`C0003`) or display name (`Pool Light`).
/// Ids match exactly; names match case-insensitively.
pub fn resolve_circuit(controller: &Controller, identifier: &str) -> Result<ObjectId, CoreError> {
    let snap = controller.circuits_snapshot();
    snap.iter()
        .find(|c| c.id == identifier)
        .or_else(|| snap.iter().find(|c| c.name.eq_ignore_ascii_case(identifier)))
        .map(|c| c.id.clone())
        .ok_or_else(|| CoreError::UnknownObject {
            id: identifier.into(),
        })
}

/// Resolve a heater by id or name. Several views may share one heater;
/// any of them carries its id.
pub fn resolve_heater(controller: &Controller, identifier: &str) -> Result<ObjectId, CoreError> {
    let snap = controller.heaters_snapshot();
    snap.iter()
        .map(|v| &v.heater)
        .find(|h| h.id == identifier || h.name.eq_ignore_ascii_case(identifier))
        .map(|h| h.id.clone())
        .ok_or_else(|| CoreError::UnknownObject {
            id: identifier.into(),
        })
}
