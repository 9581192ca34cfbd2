//! Shared types for the command sync pipeline and its persisted store.

use serde::{Deserialize, Serialize};

// =====================================================
// Tags
// =====================================================

/// Ordered set of tags: insertion order is kept, duplicates are dropped.
///
/// Serialized as a plain JSON array of strings. Comma-joined strings only
/// appear at the export boundary (`join` / `split`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    /// Insert a tag at the end. Returns false if it was already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn extend<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Tags of `self` that are not in `other`, in `self`'s order.
    pub fn difference(&self, other: &TagSet) -> Vec<String> {
        self.tags
            .iter()
            .filter(|t| !other.contains(t))
            .cloned()
            .collect()
    }

    /// Set equality, ignoring order.
    pub fn same_tags(&self, other: &TagSet) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.contains(t))
    }

    pub fn join(&self, sep: &str) -> String {
        self.tags.join(sep)
    }

    /// Parse a comma-joined tag string; blank segments are skipped.
    pub fn split(joined: &str) -> Self {
        joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.tags
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        set.extend(iter);
        set
    }
}

impl std::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.join(","))
    }
}

// =====================================================
// Domain Types
// =====================================================

/// One (content, tags) pair extracted from a markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub content: String,
    pub tags: TagSet,
}

impl ParsedItem {
    pub fn new(content: impl Into<String>, tags: TagSet) -> Self {
        Self {
            content: content.into(),
            tags,
        }
    }
}

/// A persisted command keyed by its exact text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub tags: TagSet,
    /// ISO-8601 timestamp of first sighting
    pub created_at: String,
    /// ISO-8601 timestamp of the last successful export, if any
    #[serde(default)]
    pub last_exported: Option<String>,
}

impl CommandRecord {
    pub fn new(command: impl Into<String>, tags: TagSet, created_at: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            tags,
            created_at: created_at.into(),
            last_exported: None,
        }
    }
}

// =====================================================
// Sync Results
// =====================================================

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub exported: usize,
    pub export_failures: usize,
    pub elapsed_ms: u64,
    /// Exports were only logged and the store was left as it was.
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncSummary {
    pub fn has_changes(&self) -> bool {
        self.new > 0 || self.updated > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_set_keeps_insertion_order_without_duplicates() {
        let mut tags = TagSet::new();
        assert!(tags.insert("cmd"));
        assert!(tags.insert("files"));
        assert!(!tags.insert("cmd"));
        assert_eq!(tags.join(","), "cmd,files");
    }

    #[test]
    fn test_tag_set_difference_and_equality() {
        let stored: TagSet = ["cmd"].into_iter().collect();
        let fresh: TagSet = ["files", "cmd"].into_iter().collect();
        assert_eq!(fresh.difference(&stored), vec!["files".to_string()]);
        assert!(fresh.difference(&fresh).is_empty());

        let reordered: TagSet = ["cmd", "files"].into_iter().collect();
        assert!(fresh.same_tags(&reordered));
        assert!(!fresh.same_tags(&stored));
    }

    #[test]
    fn test_tag_set_split_skips_blank_segments() {
        let tags = TagSet::split("cmd, files,,cmd");
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["cmd", "files"]);
    }

    #[test]
    fn test_record_serializes_tags_as_array() {
        let record = CommandRecord::new(
            "ls -la",
            TagSet::split("cmd,files"),
            "2024-01-01T00:00:00",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tags"], serde_json::json!(["cmd", "files"]));
        assert!(json["last_exported"].is_null());
    }

    #[test]
    fn test_record_deserializes_without_last_exported() {
        let json = r#"{"command":"pwd","tags":["cmd","cmd"],"created_at":"2024-01-01T00:00:00"}"#;
        let record: CommandRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.tags.len(), 1);
        assert!(record.last_exported.is_none());
    }
}
