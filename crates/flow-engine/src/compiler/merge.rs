//! Recursive merge of JSON property trees

use serde_json::{Map, Value};

/// Merge `overrides` into `target` key by key
///
/// Nested objects on both sides are merged recursively. Anything else in
/// `overrides` (scalars, arrays, or an object replacing a non-object)
/// replaces the target value.
pub fn deep_merge(target: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
