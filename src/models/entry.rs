//! Represents one visible item of the virtual folder tree, plus the raw
//! listing data the store returns before projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an entry is a virtual folder (a common prefix) or a stored object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    // Declared first so the derived `Ord` sorts folders ahead of files.
    Folder,
    File,
}

/// A projected, UI-facing child of the current path.
///
/// `id` is the full key (files) or full prefix (folders) and is unique within
/// the bucket. `name` is the part of `id` below the queried prefix.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Full object key, or full prefix ending with the delimiter for folders.
    pub id: String,

    /// Display name relative to the queried prefix. Never empty.
    pub name: String,

    /// Serialized as `type` to match the JSON API.
    #[serde(rename = "type")]
    pub kind: EntryKind,

    /// Object size in bytes; only present for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Store-reported modification time for files, listing time for folders.
    pub last_modified: DateTime<Utc>,
}

impl Entry {
    pub fn folder(id: impl Into<String>, name: impl Into<String>, listed_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::Folder,
            size: None,
            last_modified: listed_at,
        }
    }

    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
            last_modified,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// A stored object as reported by a listing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Raw prefix/delimiter listing data for one prefix, before projection.
#[derive(Clone, Debug, Default)]
pub struct RawListing {
    /// The prefix the listing was requested for.
    pub prefix: String,
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ListedObject>,
    /// When the listing was taken; folders inherit this as `last_modified`.
    pub listed_at: DateTime<Utc>,
}
