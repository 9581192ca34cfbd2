//! Markdown command extraction
//!
//! Turns a hand-written markdown document (plus every file it includes via
//! `[[path]]`) into a flat list of tagged commands.

pub mod parser;
pub mod references;
pub mod tag_stack;

pub use parser::{parse_document, parse_text, MarkdownParser};
pub use references::{collect_reachable_files, ReferenceError, VisitedFiles};
pub use tag_stack::TagStack;
