//! Parsers for package.json manifests
//!
//! Two views of the same text are produced: the structural
//! [`ProjectManifest`] (via `serde_json::Value`) and the positioned [`DependencyEntry`]
//! list recovered by [`npm::scan_dependencies`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A runtime dependency located in the manifest text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Package name (decoded key)
    pub name: String,
    /// Line number in the file (0-indexed)
    pub line: u32,
    /// Column where the package name starts (UTF-16 units)
    pub name_start: u32,
    /// Column where the package name ends (UTF-16 units, exclusive)
    pub name_end: u32,
}

/// The subset of package.json consulted during analysis.
///
/// Fields are read leniently from any JSON document: a field of an
/// unexpected type is treated as missing. Duplicate keys keep the last
/// value.
#[derive(Debug, Clone, Default)]
pub struct ProjectManifest {
    pub name: Option<String>,
    /// Declaration entry point
    pub types: Option<Value>,
    /// Legacy spelling of `types`
    pub typings: Option<Value>,
    pub dependencies: Option<Map<String, Value>>,
    pub dev_dependencies: Option<Map<String, Value>>,
}

impl ProjectManifest {
    /// Parse manifest text. Returns `None` only when the text is not JSON.
    pub fn parse(content: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(content) {
            Ok(value) => Some(Self::from_value(value)),
            Err(e) => {
                tracing::debug!("Manifest is not parseable: {}", e);
                None
            }
        }
    }

    /// Read the consulted fields out of a parsed JSON document
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            return Self::default();
        };
        let mut object = |key: &str| match root.remove(key) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };
        let dependencies = object("dependencies");
        let dev_dependencies = object("devDependencies");

        Self {
            name: root.get("name").and_then(Value::as_str).map(str::to_string),
            types: root.remove("types"),
            typings: root.remove("typings"),
            dependencies,
            dev_dependencies,
        }
    }

    /// Whether `dependencies` declares `name`
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains_key(name))
    }

    /// Whether `devDependencies` declares `name`
    pub fn has_dev_dependency(&self, name: &str) -> bool {
        self.dev_dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains_key(name))
    }

    /// The declaration entry declared by this manifest, if any
    pub fn declaration_entry(&self) -> Option<&str> {
        [&self.types, &self.typings]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|entry| !entry.trim().is_empty())
    }
}

pub mod npm;
