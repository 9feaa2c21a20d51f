// ── Discovery merge ──
//
// Each hardware-definition query returns one slice of the object tree.
// `merge` folds a slice into the accumulated tree: objects merge key by
// key, lists merge element-wise by `objnam`, scalars overwrite. Merging
// the same slice twice leaves the tree unchanged.

use icbridge_api::codec::OBJ_ID_KEY;
use serde_json::{Map, Value};

/// Deep-merge `addition` into `target`.
pub fn merge(target: &mut Value, addition: Value) {
    match (target, addition) {
        (Value::Object(target), Value::Object(addition)) => merge_objects(target, addition),
        (Value::Array(target), Value::Array(addition)) => merge_lists(target, addition),
        (target, addition) => *target = addition,
    }
}

fn merge_objects(target: &mut Map<String, Value>, addition: Map<String, Value>) {
    for (key, value) in addition {
        let nested = is_container(&value) && target.get(&key).is_some_and(is_container);
        match target.get_mut(&key) {
            Some(existing) if nested => merge(existing, value),
            _ => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_lists(target: &mut Vec<Value>, addition: Vec<Value>) {
    for item in addition {
        match list_slot(target, &item) {
            Slot::Merge(index) => {
                if let Some(slot) = target.get_mut(index) {
                    merge(slot, item);
                }
            }
            Slot::Present => {}
            Slot::Append => target.push(item),
        }
    }
}

enum Slot {
    Merge(usize),
    Present,
    Append,
}

/// Where `item` lands in `target`. Objects pair up by `objnam`, and an
/// object without one pairs with the first target object that also lacks
/// one. Other values are kept once.
fn list_slot(target: &[Value], item: &Value) -> Slot {
    if !item.is_object() {
        return if target.contains(item) {
            Slot::Present
        } else {
            Slot::Append
        };
    }
    let id = object_id(item);
    target
        .iter()
        .position(|t| t.is_object() && object_id(t) == id)
        .map_or(Slot::Append, Slot::Merge)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn object_id(value: &Value) -> Option<&str> {
    value.get(OBJ_ID_KEY).and_then(Value::as_str)
}
