//! The entry type handed to watcher handlers.
//!
//! `FeedEntry` is a single item from a feed, normalised so the watcher only
//! has to care about one thing: [`published`](FeedEntry::published). All
//! other fields are carried through to the handler untouched.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// A single feed entry.
///
/// ## Ordering
///
/// `FeedEntry` implements [`Ord`] **chronologically**: older entries sort
/// before newer ones, and entries without a date sort first. The watcher
/// drops undated entries before sorting, so that last rule only matters to
/// other callers.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct FeedEntry {
    /// Identifier supplied by the feed (`<guid>`, falling back to `<link>`).
    ///
    /// Informational only: new entries are detected by timestamp, not id.
    pub id: String,

    pub title: Option<String>,

    pub link: Option<String>,

    pub description: Option<String>,

    pub author: Option<String>,

    pub categories: Vec<String>,

    /// Publication time normalised to UTC.
    ///
    /// `None` when the feed gave no date or one we could not parse; such
    /// entries are never delivered.
    pub published: Option<DateTime<Utc>>,

    /// Everything else the source exposed (extension elements, comments URL,
    /// source title, ...), keyed by element name.
    pub fields: BTreeMap<String, String>,
}

impl FeedEntry {
    /// Shorthand for an entry that only has an id and a publication time.
    pub fn new(id: impl Into<String>, published: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            published,
            ..Self::default()
        }
    }

    /// Look up a pass-through field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl Ord for FeedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // `None < Some(_)`, so undated entries come first.
        self.published
            .cmp(&other.published)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for FeedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sorts_oldest_first() {
        let old = FeedEntry::new("1", Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let mid = FeedEntry::new("2", Some(Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()));
        let new = FeedEntry::new("3", Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));

        let mut entries = vec![new, old, mid];
        entries.sort();

        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn undated_entries_sort_first() {
        let dated = FeedEntry::new("1", Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let undated = FeedEntry::new("2", None);

        let mut entries = vec![dated, undated];
        entries.sort();

        assert_eq!(entries[0].id, "2");
        assert_eq!(entries[1].id, "1");
    }

    #[test]
    fn field_lookup() {
        let mut entry = FeedEntry::new("a", None);
        entry.fields.insert("comments".into(), "https://example.com/c".into());
        assert_eq!(entry.field("comments"), Some("https://example.com/c"));
        assert_eq!(entry.field("missing"), None);
    }
}
