//! Task options: an opaque settings map passed through to the node
//!
//! The pipeline does not interpret option keys; it only validates that the
//! input is a JSON object and translates it to the node's wire form at
//! submit time. Invalid input falls back to the documented default,
//! `{"auto-boundary": true}`, with a warning — a bad preset should not
//! abort a field run.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

use crate::error::Result;

/// Opaque task settings, validated at load and passed through unmodified
#[derive(Clone, Debug, PartialEq)]
pub struct TaskOptions(Map<String, Value>);

impl Default for TaskOptions {
    fn default() -> Self {
        let mut map = Map::new();
        map.insert("auto-boundary".to_string(), Value::Bool(true));
        Self(map)
    }
}

impl TaskOptions {
    /// Load options from a preset filename or an inline JSON string.
    ///
    /// `None` yields the defaults. A value naming a readable file is parsed
    /// as a JSON preset; anything else is parsed as inline JSON. In both
    /// cases the payload must be a JSON object; unreadable or malformed
    /// input falls back to the defaults with a warning.
    pub fn load(spec: Option<&str>) -> Self {
        let Some(spec) = spec else {
            return Self::default();
        };

        let source = Path::new(spec);
        let raw = if source.is_file() {
            match std::fs::read_to_string(source) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(preset = spec, error = %e, "cannot read preset file, using default options");
                    return Self::default();
                }
            }
        } else {
            spec.to_string()
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Self(map),
            Ok(_) => {
                warn!("task settings are not a JSON object, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "invalid task settings, using defaults");
                Self::default()
            }
        }
    }

    /// Number of option entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the option map is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a single option value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serialize to the node's wire form: a JSON list of
    /// `{"name": key, "value": value}` objects.
    pub fn to_wire(&self) -> Result<String> {
        let list: Vec<Value> = self
            .0
            .iter()
            .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
            .collect();
        Ok(serde_json::to_string(&list)?)
    }
}
