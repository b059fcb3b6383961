//! JSON helpers shared by the action protocol
//!
//! Component state only ever crosses the wire as JSON, so cloning, merging and
//! pretty-printing all go through serde_json rather than the concrete types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deep copy through a JSON round trip
///
/// Fields excluded from serialization come back as their defaults, which is
/// exactly what a component rebuilt from the wire looks like.
pub fn clone_via_json<T: Serialize + DeserializeOwned>(src: &T) -> serde_json::Result<T> {
    serde_json::from_value(serde_json::to_value(src)?)
}

/// Merge `patch` into `base` the way unmarshalling onto an existing value works
///
/// Objects merge key by key (recursively), everything else is replaced.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Indented JSON for embedding into generated client scripts
///
/// # Panics
/// If `value` cannot be serialized. Every value passed here is component
/// state or a request payload built by the caller, so a failure is a
/// programming error.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => panic!("failed to serialize value for client script: {e}"),
    }
}

/// Short stable hex digest, used for cookie names
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}
