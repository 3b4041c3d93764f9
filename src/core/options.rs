//! Per-invocation options object.
//!
//! A flat JSON object built fresh for every dispatched command. Keys come from
//! bound positional arguments, declared option flags (camelCase of the long
//! flag name) and the two reserved globals `rootDir` and `debug`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const ROOT_DIR_KEY: &str = "rootDir";
pub const DEBUG_KEY: &str = "debug";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Insert only when `key` is not already present.
    pub fn set_default(&mut self, key: impl Into<String>, value: Value) {
        self.0.entry(key.into()).or_insert(value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// `true` for a JSON `true` or the string `"true"`; everything else is `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Values under `key` as a list of strings. Scalars become a one-element list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().map(value_to_arg).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![value_to_arg(other)],
        }
    }

    pub fn root_dir(&self) -> Option<PathBuf> {
        self.get_str(ROOT_DIR_KEY).map(PathBuf::from)
    }

    pub fn debug(&self) -> bool {
        self.get_bool(DEBUG_KEY)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Render a JSON value the way it would appear on a command line.
pub fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// camelCase key for a long flag name: `root-dir` → `rootDir`.
pub fn option_key(long: &str) -> String {
    let mut key = String::with_capacity(long.len());
    let mut upper_next = false;
    for ch in long.trim_start_matches('-').chars() {
        if ch == '-' {
            upper_next = !key.is_empty();
            continue;
        }
        if upper_next {
            key.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            key.push(ch);
        }
    }
    key
}
