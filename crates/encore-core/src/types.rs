use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the remote object being subscribed to (an artist, in the
/// shipping client).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One page of songs for an entity, as served by the remote authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongPage {
    pub entity: EntityId,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub downloaded: bool,
}
