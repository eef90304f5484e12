//! Personality (system prompt) lookup.
//!
//! Loaded once at startup from the `system_prompts` table of the shared data
//! document; read-only afterwards. A missing or corrupt table degrades to
//! "no personalities available", which callers surface per request rather
//! than crashing at startup.

use std::{collections::BTreeMap, path::Path};

use serde_json::{Map, Value};

#[derive(Clone, Debug, Default)]
pub struct PersonalityTable {
    prompts: BTreeMap<String, String>,
    default_name: Option<String>,
}

impl PersonalityTable {
    /// Load from the shared JSON document, resolving the default name.
    ///
    /// If the preferred default is absent but the table is non-empty, the
    /// first entry becomes the default (with a warning), matching how the
    /// bot has always behaved.
    pub fn load(path: &Path, preferred_default: &str) -> Self {
        let prompts = match read_prompts(path) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    path = %path.display(),
                    "could not load personality table, personalities unavailable"
                );
                return Self::default();
            }
        };

        let default_name = if prompts.contains_key(preferred_default) {
            Some(preferred_default.to_string())
        } else {
            let first = prompts.keys().next().cloned();
            if let Some(name) = &first {
                tracing::warn!(
                    preferred = preferred_default,
                    using = %name,
                    "default personality not found, using first entry"
                );
            }
            first
        };

        tracing::info!(count = prompts.len(), "loaded personalities");
        Self {
            prompts,
            default_name,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Resolve a requested personality to `(display name, instruction)`.
    ///
    /// An unknown requested name keeps its display name but carries no
    /// instruction; `None` falls back to the default. Returns `None` only
    /// when no personalities are configured at all.
    pub fn resolve(&self, requested: Option<&str>) -> Option<(String, Option<String>)> {
        if self.prompts.is_empty() {
            return None;
        }

        let name = requested
            .map(str::to_string)
            .or_else(|| self.default_name.clone())?;
        let instruction = self.prompts.get(&name).cloned();
        Some((name, instruction))
    }

    /// Snapshot of the table for seeding a fresh data file.
    pub fn as_json(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.prompts {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        Value::Object(map)
    }
}

fn read_prompts(path: &Path) -> Option<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let doc: Value = serde_json::from_str(&raw).ok()?;
    let table = doc.get("system_prompts")?.as_object()?;

    let mut prompts = BTreeMap::new();
    for (name, instruction) in table {
        if let Some(s) = instruction.as_str() {
            prompts.insert(name.clone(), s.to_string());
        }
    }
    Some(prompts)
}
