//! Line-oriented extraction of tagged commands from markdown.
//!
//! Recognized constructs, checked in this order for every line:
//! - code fences (```` ``` ````) toggle code-block capture
//! - lines inside a code block are captured verbatim
//! - `[[path]]` inclusion markers splice in another document
//! - `> tag` lines tag the pending content or code block
//! - `#` headings push onto the [`TagStack`]
//! - `content #tag` inline tags emit immediately
//! - blank lines flush pending content
//! - anything else becomes pending content

use super::references::{
    find_references, has_reference, load_reference, ReferenceError, VisitedFiles,
};
use super::tag_stack::TagStack;
use command_sync_types::{ParsedItem, TagSet};
use std::path::{Path, PathBuf};

const FENCE: &str = "```";
const INLINE_TAG_MARKER: &str = " #";

#[derive(Debug)]
enum State {
    Normal,
    /// `indent` is the opening fence's indentation, removed from body lines.
    InCodeBlock { body: Vec<String>, indent: usize },
}

/// Parser state for one document. Nested documents get their own parser
/// that shares the caller's visited set.
pub struct MarkdownParser<'v> {
    base_tag: String,
    base_dir: Option<PathBuf>,
    visited: &'v mut VisitedFiles,
    state: State,
    stack: TagStack,
    current_tags: TagSet,
    current_content: Option<String>,
    pending_code_block: Option<String>,
    items: Vec<ParsedItem>,
    skipped: Vec<ReferenceError>,
}

impl<'v> MarkdownParser<'v> {
    pub fn new(base_tag: &str, base_dir: Option<&Path>, visited: &'v mut VisitedFiles) -> Self {
        let stack = TagStack::new();
        let current_tags = stack.current_tags(base_tag);
        Self {
            base_tag: base_tag.to_string(),
            base_dir: base_dir.map(Path::to_path_buf),
            visited,
            state: State::Normal,
            stack,
            current_tags,
            current_content: None,
            pending_code_block: None,
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Consume the text and return the extracted items in document order.
    pub fn parse(self, text: &str) -> Vec<ParsedItem> {
        self.parse_with_skips(text).0
    }

    /// Like [`parse`](Self::parse), also returning every inclusion that was
    /// skipped anywhere in the tree. Each skip has been logged once.
    pub fn parse_with_skips(mut self, text: &str) -> (Vec<ParsedItem>, Vec<ReferenceError>) {
        for line in text.lines() {
            self.feed_line(line);
        }
        self.finish()
    }

    fn feed_line(&mut self, line: &str) {
        let trimmed = line.trim();

        if trimmed.starts_with(FENCE) {
            let indent = line.chars().take_while(|c| c.is_whitespace()).count();
            self.toggle_fence(indent);
            return;
        }

        if let State::InCodeBlock { body, indent } = &mut self.state {
            body.push(strip_indent(line, *indent).to_string());
            return;
        }

        if has_reference(line) {
            self.include(line);
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            self.tag_line(rest.trim());
        } else if trimmed.starts_with('#') {
            self.heading(trimmed);
        } else if let Some((content, tag)) = line.split_once(INLINE_TAG_MARKER) {
            self.inline_tag(content.trim(), tag.trim());
        } else if trimmed.is_empty() {
            self.flush_content();
        } else {
            self.flush_content();
            self.current_content = Some(trimmed.to_string());
        }
    }

    fn toggle_fence(&mut self, indent: usize) {
        match std::mem::replace(&mut self.state, State::Normal) {
            State::Normal => {
                self.flush_content();
                // an untagged block still waiting would otherwise be overwritten
                self.flush_code_block();
                self.state = State::InCodeBlock {
                    body: Vec::new(),
                    indent,
                };
            }
            State::InCodeBlock { body, .. } => {
                if body.iter().any(|l| !l.trim().is_empty()) {
                    self.pending_code_block = Some(body.join("\n"));
                }
            }
        }
    }

    /// Splice in included documents. Pending content and code blocks stay
    /// pending, so a tag line after the marker still reaches them.
    fn include(&mut self, line: &str) {
        for target in find_references(line) {
            let file = match load_reference(self.base_dir.as_deref(), target, self.visited) {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("[PARSER] Skipping inclusion, {}", e);
                    self.skipped.push(e);
                    continue;
                }
            };

            let nested = MarkdownParser {
                base_tag: self.base_tag.clone(),
                base_dir: file.path.parent().map(Path::to_path_buf),
                visited: &mut *self.visited,
                state: State::Normal,
                stack: self.stack.clone(),
                current_tags: self.current_tags.clone(),
                current_content: None,
                pending_code_block: None,
                items: Vec::new(),
                skipped: Vec::new(),
            };
            let (items, skipped) = nested.parse_with_skips(&file.text);
            log::debug!(
                "[PARSER] {} items from {}",
                items.len(),
                file.path.display()
            );
            self.items.extend(items);
            self.skipped.extend(skipped);
        }
    }

    fn tag_line(&mut self, explicit: &str) {
        let mut combined = TagSet::new();
        combined.insert(if explicit.is_empty() {
            self.base_tag.as_str()
        } else {
            explicit
        });
        combined.extend(self.stack.heading_tags());

        if let Some(block) = self.pending_code_block.take() {
            self.emit(block, combined.clone());
        } else if let Some(content) = self.current_content.take() {
            self.emit(content, combined.clone());
        }

        self.current_tags = combined;
    }

    fn heading(&mut self, trimmed: &str) {
        self.flush_code_block();
        self.flush_content();

        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let text = trimmed.trim_start_matches('#').trim();
        if !text.is_empty() {
            self.stack.push(level, text);
        }
        self.current_tags = self.stack.current_tags(&self.base_tag);
    }

    fn inline_tag(&mut self, content: &str, tag: &str) {
        if content.is_empty() {
            return;
        }
        let mut tags = TagSet::new();
        if !tag.is_empty() {
            tags.insert(tag);
        }
        tags.extend(self.stack.heading_tags());
        self.emit(content.to_string(), tags);
    }

    fn flush_content(&mut self) {
        if let Some(content) = self.current_content.take() {
            let tags = self.current_tags.clone();
            self.emit(content, tags);
        }
    }

    fn flush_code_block(&mut self) {
        if let Some(block) = self.pending_code_block.take() {
            let tags = self.current_tags.clone();
            self.emit(block, tags);
        }
    }

    fn emit(&mut self, content: String, mut tags: TagSet) {
        if content.trim().is_empty() {
            return;
        }
        if tags.is_empty() {
            tags.insert(self.base_tag.as_str());
        }
        self.items.push(ParsedItem::new(content, tags));
    }

    fn finish(mut self) -> (Vec<ParsedItem>, Vec<ReferenceError>) {
        self.flush_code_block();
        self.flush_content();

        if let State::InCodeBlock { body, .. } = std::mem::replace(&mut self.state, State::Normal) {
            if body.iter().any(|l| !l.trim().is_empty()) {
                log::warn!(
                    "[PARSER] Unterminated code block at end of document ({} lines)",
                    body.len()
                );
                let tags = self.current_tags.clone();
                self.emit(body.join("\n"), tags);
            }
        }

        (self.items, self.skipped)
    }
}

/// Remove up to `indent` leading whitespace characters.
fn strip_indent(line: &str, indent: usize) -> &str {
    let cut = line
        .char_indices()
        .take(indent)
        .take_while(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    &line[cut..]
}

/// Parse text that is not backed by a file. Inclusions resolve against
/// `base_dir`, or the working directory when `None`.
pub fn parse_text(text: &str, base_dir: Option<&Path>, base_tag: &str) -> Vec<ParsedItem> {
    let mut visited = VisitedFiles::new();
    MarkdownParser::new(base_tag, base_dir, &mut visited).parse(text)
}

/// Read and parse a document, expanding its inclusions recursively.
///
/// Only a failure to read `path` itself is an error; inclusion problems are
/// logged and skipped.
pub fn parse_document(path: &Path, base_tag: &str) -> std::io::Result<Vec<ParsedItem>> {
    let text = std::fs::read_to_string(path)?;
    let mut visited = VisitedFiles::new();
    visited.insert(path);
    let items = MarkdownParser::new(base_tag, path.parent(), &mut visited).parse(&text);
    log::debug!(
        "[PARSER] Parsed {} items from {} ({} files)",
        items.len(),
        path.display(),
        visited.len()
    );
    Ok(items)
}
