//! File-name blocklists: loading, compilation and evaluation.

mod loader;
mod patterns;
mod provider;

pub use loader::load_lines;
pub use patterns::{FilenameEvaluator, LiteralPattern, PatternSet};
pub use provider::{Blocklist, BlocklistProvider};
