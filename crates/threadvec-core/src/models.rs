//! Core data models used throughout threadvec.
//!
//! Items flow in from external fetchers, are aggregated into [`Group`]s by
//! the thread grouper, and leave as persisted [`Document`]s.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source name used when an item carries no source information at all.
pub const DEFAULT_SOURCE: &str = "default";

/// A raw record produced by an external fetcher (mail, calendar, drive...).
///
/// Immutable from this crate's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Source-qualified tags such as `gmail:inbox` or `calendar:work`.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Item {
    /// Returns a non-empty string metadata value, trimmed.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Explicit thread linkage, if the fetcher provided one.
    ///
    /// Numeric ids (some mail APIs emit them) are accepted as their decimal text.
    pub fn thread_id(&self) -> Option<String> {
        match self.metadata.get("thread_id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => self.meta_str("thread_id").map(str::to_string),
        }
    }

    /// Resolve the logical source this item belongs to.
    ///
    /// Order: `metadata.source`, then the prefix of the first qualified tag
    /// (`gmail:inbox` → `gmail`), then [`DEFAULT_SOURCE`].
    pub fn source_name(&self) -> String {
        if let Some(s) = self.meta_str("source") {
            return s.to_string();
        }
        self.tags
            .iter()
            .find_map(|t| {
                t.split_once(':')
                    .map(|(prefix, _)| prefix.trim())
                    .filter(|p| !p.is_empty())
            })
            .unwrap_or(DEFAULT_SOURCE)
            .to_string()
    }

    /// Resolve the source type, falling back to inference from the source name.
    pub fn source_type(&self) -> SourceType {
        match self.meta_str("source_type") {
            Some(t) => SourceType::parse(t),
            None => SourceType::parse(&self.source_name()),
        }
    }

    /// All addresses found in the given metadata field.
    ///
    /// Accepts either a comma-separated string or an array of strings.
    pub fn addresses(&self, field: &str) -> Vec<String> {
        match self.metadata.get(field) {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Kind of record a source produces. Drives content synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Email,
    Calendar,
    Document,
    Other(String),
}

impl SourceType {
    /// Map a source type or source name onto a known kind.
    ///
    /// Only the leading segment before `-`, `_` or `.` is considered, so
    /// `gmail-work` and `drive.shared` resolve like `gmail` and `drive`.
    pub fn parse(name: &str) -> Self {
        let lowered = name.trim().to_lowercase();
        let head = lowered
            .split(|c| c == '-' || c == '_' || c == '.')
            .next()
            .unwrap_or_default();
        match head {
            "email" | "gmail" | "imap" | "mail" => SourceType::Email,
            "calendar" | "gcal" | "event" => SourceType::Calendar,
            "document" | "drive" | "docs" | "files" | "notes" => SourceType::Document,
            _ => SourceType::Other(lowered),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Email => "email",
            SourceType::Calendar => "calendar",
            SourceType::Document => "document",
            SourceType::Other(name) => name,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SourceType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SourceType::parse(&s))
    }
}

/// A transient aggregate of items sharing one thread key.
///
/// Created per indexing run and discarded once its [`Document`] is written.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: String,
    /// Members, ascending by creation time once the grouper has finished.
    pub items: Vec<Item>,
    pub subject: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub participants: BTreeSet<String>,
    pub source_name: String,
    pub source_type: SourceType,
}

impl Group {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The persisted, searchable record for one group.
///
/// `(thread_id, source_name)` is unique across the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Internal id assigned by the store; `0` until first written.
    pub id: i64,
    pub source_id: String,
    pub thread_id: String,
    pub title: String,
    pub content: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub message_count: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

impl Document {
    /// Build an unsaved document from a group and its synthesized output.
    pub fn from_group(group: &Group, content: String, metadata: Value) -> Self {
        Self {
            id: 0,
            source_id: group
                .items
                .first()
                .map(|i| i.id.clone())
                .unwrap_or_else(|| group.key.clone()),
            thread_id: group.key.clone(),
            title: group.subject.clone(),
            content,
            source_type: group.source_type.clone(),
            source_name: group.source_name.clone(),
            message_count: group.items.len() as i64,
            metadata,
            created_at: group.start_time,
            updated_at: group.end_time,
            indexed_at: Utc::now(),
        }
    }
}
