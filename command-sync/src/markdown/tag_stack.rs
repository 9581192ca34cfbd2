//! Heading-derived tag context.

use command_sync_types::TagSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeadingEntry {
    level: usize,
    tag_text: String,
}

/// Active ancestor headings, innermost first.
///
/// Adjacent entries always satisfy `outer.level < inner.level`, so the stack
/// holds exactly the chain of headings enclosing the current line.
#[derive(Debug, Clone, Default)]
pub struct TagStack {
    entries: Vec<HeadingEntry>,
}

impl TagStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a heading: drop siblings and deeper headings, then push.
    pub fn push(&mut self, level: usize, tag_text: impl Into<String>) {
        // stored outermost-first so popping is a truncate from the back
        while self.entries.last().is_some_and(|e| e.level >= level) {
            self.entries.pop();
        }
        self.entries.push(HeadingEntry {
            level,
            tag_text: tag_text.into(),
        });
    }

    /// Heading tags only, innermost first.
    pub fn heading_tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(|e| e.tag_text.as_str())
    }

    /// Base tag followed by the heading tags, innermost first.
    pub fn current_tags(&self, base_tag: &str) -> TagSet {
        let mut tags = TagSet::new();
        tags.insert(base_tag);
        tags.extend(self.heading_tags());
        tags
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
