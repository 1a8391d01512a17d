use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of the named boolean flags exposed by the external settings
/// store. Absent keys read as `false`. The store publishes snapshots over a
/// `tokio::sync::watch` channel; this crate only ever reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(HashMap<String, bool>);

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set(name, value);
        self
    }
}

impl FromIterator<(String, bool)> for Flags {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
