//! Merge freshly parsed items into the command store.
//!
//! Tags only ever accumulate: a command that reappears with tags the store
//! has not seen gets the union, and tags that disappeared from the document
//! are kept. Nothing is ever removed from the store here.

use crate::store::CommandStore;
use command_sync_types::{CommandRecord, ParsedItem};
use std::collections::HashSet;

/// What a reconciliation pass changed.
///
/// Records carry their complete tag set as of the end of the pass. A command
/// appears at most once across both lists.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub new_records: Vec<CommandRecord>,
    pub updated_records: Vec<CommandRecord>,
    /// Items that required no change
    pub unchanged: usize,
}

impl ReconcileOutcome {
    pub fn has_changes(&self) -> bool {
        !self.new_records.is_empty() || !self.updated_records.is_empty()
    }
}

/// Reconcile `items` in order against `store`, stamping new records with
/// `now`. Later duplicates within `items` see the effect of earlier ones.
pub fn reconcile(items: &[ParsedItem], store: &mut CommandStore, now: &str) -> ReconcileOutcome {
    let mut new_keys: Vec<&str> = Vec::new();
    let mut updated_keys: Vec<&str> = Vec::new();
    let mut touched: HashSet<&str> = HashSet::new();
    let mut unchanged = 0usize;

    for item in items {
        match store.get_mut(&item.content) {
            None => {
                store.insert(CommandRecord::new(
                    item.content.clone(),
                    item.tags.clone(),
                    now,
                ));
                log::info!(
                    "[SYNC] New command: {} | tags: {}",
                    item.content,
                    item.tags
                );
                touched.insert(&item.content);
                new_keys.push(&item.content);
            }
            Some(existing) => {
                let missing = item.tags.difference(&existing.tags);
                if missing.is_empty() {
                    unchanged += 1;
                    continue;
                }
                log::info!(
                    "[SYNC] New tags for command: {} | added: {}",
                    item.content,
                    missing.join(",")
                );
                existing.tags.extend(missing);
                if touched.insert(&item.content) {
                    updated_keys.push(&item.content);
                }
            }
        }
    }

    let snapshot = |keys: Vec<&str>| -> Vec<CommandRecord> {
        keys.into_iter()
            .filter_map(|k| store.get(k).cloned())
            .collect()
    };

    ReconcileOutcome {
        new_records: snapshot(new_keys),
        updated_records: snapshot(updated_keys),
        unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_sync_types::TagSet;

    const NOW: &str = "2024-06-01T08:00:00";

    fn item(content: &str, tags: &str) -> ParsedItem {
        ParsedItem::new(content, TagSet::split(tags))
    }

    fn stored(command: &str, tags: &str) -> CommandRecord {
        CommandRecord::new(command, TagSet::split(tags), "2024-01-01T00:00:00")
    }

    #[test]
    fn test_new_command_is_created() {
        let mut store = CommandStore::new();
        let outcome = reconcile(&[item("ls -la", "cmd")], &mut store, NOW);

        assert_eq!(outcome.new_records.len(), 1);
        assert!(outcome.updated_records.is_empty());
        let record = store.get("ls -la").unwrap();
        assert_eq!(record.created_at, NOW);
        assert!(record.last_exported.is_none());
    }

    #[test]
    fn test_missing_tags_are_unioned_then_stable() {
        let mut store = CommandStore::from_records(vec![stored("ls -la", "cmd")]);
        let items = [item("ls -la", "cmd,files")];

        let first = reconcile(&items, &mut store, NOW);
        assert!(first.new_records.is_empty());
        assert_eq!(first.updated_records.len(), 1);
        let tags = &first.updated_records[0].tags;
        assert!(tags.same_tags(&TagSet::split("cmd,files")));

        let second = reconcile(&items, &mut store, NOW);
        assert!(!second.has_changes());
        assert_eq!(second.unchanged, 1);
    }

    #[test]
    fn test_tags_never_shrink() {
        let mut store = CommandStore::from_records(vec![stored("make", "build,old")]);
        let outcome = reconcile(&[item("make", "build")], &mut store, NOW);

        assert!(!outcome.has_changes());
        assert!(store.get("make").unwrap().tags.contains("old"));

        reconcile(&[item("make", "new")], &mut store, NOW);
        assert_eq!(store.get("make").unwrap().tags.join(","), "build,old,new");
    }

    #[test]
    fn test_created_at_is_not_touched_by_updates() {
        let mut store = CommandStore::from_records(vec![stored("df", "disk")]);
        reconcile(&[item("df", "disk,space")], &mut store, NOW);
        assert_eq!(store.get("df").unwrap().created_at, "2024-01-01T00:00:00");
    }

    #[test]
    fn test_duplicates_within_batch_accumulate() {
        let mut store = CommandStore::new();
        let items = [
            item("git log", "git"),
            item("git log", "history"),
            item("git log", "git"),
        ];
        let outcome = reconcile(&items, &mut store, NOW);

        assert_eq!(outcome.new_records.len(), 1);
        assert!(outcome.updated_records.is_empty());
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(outcome.new_records[0].tags.join(","), "git,history");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_existing_command_updated_twice_is_reported_once() {
        let mut store = CommandStore::from_records(vec![stored("top", "sys")]);
        let items = [item("top", "proc"), item("top", "monitor")];
        let outcome = reconcile(&items, &mut store, NOW);

        assert_eq!(outcome.updated_records.len(), 1);
        assert_eq!(
            outcome.updated_records[0].tags.join(","),
            "sys,proc,monitor"
        );
    }

    #[test]
    fn test_tag_order_does_not_matter() {
        let mut store = CommandStore::from_records(vec![stored("ps", "a,b")]);
        let outcome = reconcile(&[item("ps", "b,a")], &mut store, NOW);
        assert!(!outcome.has_changes());
        assert_eq!(outcome.unchanged, 1);
    }
}
