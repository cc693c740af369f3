//! Sync configuration types.
//!
//! The file is a single `secrets` mapping from spec name to an untyped
//! parameter bag. Each backend decodes its own fields out of the bag, so
//! nothing beyond the `type` discriminator is interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

/// Untyped, string-keyed parameters of one spec.
pub type Params = serde_json::Map<String, Value>;

/// Key holding the backend discriminator inside a parameter bag.
pub const TYPE_KEY: &str = "type";

/// Root configuration structure (`.op-sync.yml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Specs keyed by name. Iteration order is lexicographic.
    #[serde(default)]
    pub secrets: BTreeMap<String, Params>,
}

/// A borrowed view of one named spec.
#[derive(Debug, Clone, Copy)]
pub struct Spec<'a> {
    /// Unique spec name.
    pub name: &'a str,
    /// Backend discriminator.
    pub backend: &'a str,
    /// The full parameter bag, `type` included.
    pub params: &'a Params,
}

impl SyncConfig {
    /// Returns the spec named `name`, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec exists but has no string `type`.
    pub fn spec(&self, name: &str) -> Result<Option<Spec<'_>>> {
        let Some((name, params)) = self.secrets.get_key_value(name) else {
            return Ok(None);
        };
        let backend = match params.get(TYPE_KEY) {
            Some(Value::String(t)) => t.as_str(),
            Some(_) => {
                let message = "parameter \"type\" must be a string";
                return Err(ConfigError::invalid_spec(name, message).into());
            }
            None => {
                let message = "parameter \"type\" is required";
                return Err(ConfigError::invalid_spec(name, message).into());
            }
        };
        Ok(Some(Spec {
            name,
            backend,
            params,
        }))
    }

    /// Returns every spec name in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }

    /// Returns the names of specs whose `type` equals `backend`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if any spec lacks a string `type`.
    pub fn names_of_type(&self, backend: &str) -> Result<Vec<&str>> {
        let mut names = Vec::new();
        for name in self.names() {
            if let Some(spec) = self.spec(name)? {
                if spec.backend == backend {
                    names.push(spec.name);
                }
            }
        }
        Ok(names)
    }
}
