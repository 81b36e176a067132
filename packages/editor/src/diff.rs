//! # Diff/Merge Engine
//!
//! Type-agnostic merging of document patches.
//!
//! - [`merge_partial`] deep-merges an additive patch onto the document.
//! - [`merge_delete`] accumulates a tombstone patch into the tombstone
//!   document, then removes every tombstoned path from the document.
//!
//! Both report `changed` by comparing canonical serializations, where keys are
//! sorted, empty objects count as absent and integral floats compare equal to
//! integers (`10.0` and `10`). A merge that changes nothing is
//! not an error, it is simply not recorded.

use serde_json::{Map, Number, Value};

use crate::document::EaC;

/// Result of merging a patch
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub updated: EaC,
    pub tombstones: EaC,
    pub changed: bool,
}

/// Sort object keys recursively, drop empty objects and normalize numbers.
///
/// Returns `None` when the value itself is an empty object.
pub fn canonicalize(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => canonicalize_map(map).map(Value::Object),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| canonicalize(item).unwrap_or_else(|| Value::Object(Map::new())))
                .collect(),
        )),
        Value::Number(number) => Some(Value::Number(normalize_number(number))),
        other => Some(other.clone()),
    }
}

/// Largest magnitude at which every integral `f64` is exact
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn normalize_number(number: &Number) -> Number {
    match number.as_f64() {
        Some(value)
            if number.is_f64() && value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER =>
        {
            Number::from(value as i64)
        }
        _ => number.clone(),
    }
}

fn canonicalize_map(map: &Map<String, Value>) -> Option<Map<String, Value>> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut out = Map::new();
    for key in keys {
        if let Some(value) = map.get(key).and_then(canonicalize) {
            out.insert(key.clone(), value);
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Canonical JSON text for a document
pub fn canonical_string(eac: &EaC) -> String {
    let canonical = canonicalize_map(eac).unwrap_or_default();
    Value::Object(canonical).to_string()
}

/// Canonical JSON text for any value
pub fn canonical_value_string(value: &Value) -> String {
    canonicalize(value)
        .unwrap_or_else(|| Value::Object(Map::new()))
        .to_string()
}

pub fn canonically_equal(a: &EaC, b: &EaC) -> bool {
    canonical_string(a) == canonical_string(b)
}

/// Deep-merge `patch` onto `target`.
///
/// Nested objects merge recursively; scalars, arrays and nulls replace.
pub fn deep_merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
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

/// Merge a tombstone patch into accumulated tombstones.
///
/// A `null` already present wins over any nested patch below it, so
/// tombstones only ever grow. Non-object values are normalized to `null`.
pub fn merge_tombstones(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Null), _) => {}
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_tombstones(existing, incoming);
            }
            (_, Value::Object(incoming)) => {
                let mut nested = Map::new();
                merge_tombstones(&mut nested, incoming);
                target.insert(key.clone(), Value::Object(nested));
            }
            _ => {
                target.insert(key.clone(), Value::Null);
            }
        }
    }
}

/// Remove every tombstoned path from `doc`.
///
/// Objects emptied by the removal are removed as well.
pub fn apply_tombstones(doc: &mut Map<String, Value>, tombstones: &Map<String, Value>) {
    for (key, tombstone) in tombstones {
        match tombstone {
            Value::Object(nested) => {
                let emptied = match doc.get_mut(key) {
                    Some(Value::Object(child)) => {
                        apply_tombstones(child, nested);
                        child.is_empty()
                    }
                    _ => false,
                };
                if emptied {
                    doc.remove(key);
                }
            }
            _ => {
                doc.remove(key);
            }
        }
    }
}

/// Drop tombstone leaves that `partial` explicitly re-introduces.
///
/// Without this, a re-created entry would be deleted again by the next,
/// unrelated [`merge_delete`].
pub fn prune_tombstones(tombstones: &mut Map<String, Value>, partial: &Map<String, Value>) {
    for (key, value) in partial {
        let remove = match (tombstones.get_mut(key), value) {
            (Some(Value::Null), incoming) => {
                !incoming.is_null() && canonicalize(incoming).is_some()
            }
            (Some(Value::Object(nested)), Value::Object(incoming)) => {
                prune_tombstones(nested, incoming);
                nested.is_empty()
            }
            _ => false,
        };
        if remove {
            tombstones.remove(key);
        }
    }
}

/// True when `path` or one of its ancestors is tombstoned
pub fn is_tombstoned<S: AsRef<str>>(tombstones: &EaC, path: &[S]) -> bool {
    let mut current = tombstones;
    for key in path {
        match current.get(key.as_ref()) {
            Some(Value::Null) => return true,
            Some(Value::Object(nested)) => current = nested,
            _ => return false,
        }
    }
    false
}

/// Deep-merge an additive patch onto the document
pub fn merge_partial(current: &EaC, tombstones: &EaC, partial: &EaC) -> MergeOutcome {
    let mut updated = current.clone();
    deep_merge(&mut updated, partial);

    let mut pruned = tombstones.clone();
    prune_tombstones(&mut pruned, partial);

    let changed = !canonically_equal(current, &updated) || !canonically_equal(tombstones, &pruned);

    MergeOutcome {
        updated,
        tombstones: pruned,
        changed,
    }
}

/// Accumulate a tombstone patch and remove the tombstoned paths from the document
pub fn merge_delete(current: &EaC, tombstones: &EaC, partial: &EaC) -> MergeOutcome {
    let mut accumulated = tombstones.clone();
    merge_tombstones(&mut accumulated, partial);

    let mut updated = current.clone();
    apply_tombstones(&mut updated, &accumulated);

    let changed = !canonically_equal(current, &updated);

    MergeOutcome {
        updated,
        tombstones: accumulated,
        changed,
    }
}
