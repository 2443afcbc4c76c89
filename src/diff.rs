// src/diff.rs

//! Diff computation between property snapshots
//!
//! This module computes the difference between two property bags as the
//! key sets added, removed, and changed. Values compare by canonical
//! JSON (sorted keys, normalized numbers) so `30` and `30.0` are equal
//! and object key order never produces a spurious change.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Old and new value of a changed key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    pub old: Value,
    pub new: Value,
}

/// Difference between two property bags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyDiff {
    /// Keys present only in the new bag, with their new values
    pub added: Map<String, Value>,
    /// Keys present only in the old bag, with their old values
    pub removed: Map<String, Value>,
    /// Keys present in both with different canonical values
    pub changed: BTreeMap<String, PropertyChange>,
}

impl PropertyDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Render a value as canonical JSON: object keys sorted, integral floats
/// printed as integers
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
            format!("{}", f as i64)
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Compute `{added, removed, changed}` between two property bags
pub fn diff_properties(old: &Value, new: &Value) -> PropertyDiff {
    let old_map = as_object(old);
    let new_map = as_object(new);
    let mut diff = PropertyDiff::default();

    for (key, new_value) in &new_map {
        match old_map.get(key) {
            None => {
                diff.added.insert(key.clone(), new_value.clone());
            }
            Some(old_value) => {
                if canonical_json(old_value) != canonical_json(new_value) {
                    diff.changed.insert(
                        key.clone(),
                        PropertyChange {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
            }
        }
    }

    for (key, old_value) in &old_map {
        if !new_map.contains_key(key) {
            diff.removed.insert(key.clone(), old_value.clone());
        }
    }

    diff
}

/// Diff for the first version of a chain: every key counts as added
pub fn initial_diff(properties: &Value) -> PropertyDiff {
    PropertyDiff {
        added: as_object(properties),
        ..PropertyDiff::default()
    }
}
