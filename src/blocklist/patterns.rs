use crate::config::BlocklistType;
use glob::{MatchOptions, Pattern};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

const REGEX_PREFIX: &str = "regex:";
const COMPILE_THREADS: usize = 5;

/// A non-regex blocklist line.
#[derive(Debug, Clone)]
pub enum LiteralPattern {
    /// Case-insensitive substring of the file path
    Substring(String),
    /// Shell glob (`*`, `?`, `[...]`) matched against the file name
    Glob(Pattern),
}

impl LiteralPattern {
    fn parse(line: &str) -> Self {
        if line.contains(['*', '?', '[']) {
            if let Ok(pattern) = Pattern::new(line) {
                return Self::Glob(pattern);
            }
            tracing::debug!("Invalid glob '{line}', treating it as a literal");
        }
        Self::Substring(line.to_lowercase())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Substring(needle) => path.to_lowercase().contains(needle.as_str()),
            Self::Glob(pattern) => {
                let options = MatchOptions {
                    case_sensitive: false,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                };
                let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
                pattern.matches_with(file_name, options) || pattern.matches_with(path, options)
            }
        }
    }
}

/// Compiled blocklist: literal patterns plus regular expressions.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    pub patterns: Vec<LiteralPattern>,
    pub regexes: Vec<Regex>,
}

impl PatternSet {
    /// Compiles blocklist lines. `regex:` lines become regular expressions,
    /// compiled on a small worker pool; invalid ones are logged and dropped.
    pub fn compile(lines: &[String]) -> Self {
        let mut patterns = Vec::new();
        let mut regex_sources = Vec::new();

        for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            match line.strip_prefix(REGEX_PREFIX) {
                Some(source) => regex_sources.push(source.trim().to_string()),
                None => patterns.push(LiteralPattern::parse(line)),
            }
        }

        let compile = |sources: &[String]| -> Vec<Regex> {
            sources
                .par_iter()
                .filter_map(|source| {
                    match RegexBuilder::new(source).case_insensitive(true).build() {
                        Ok(regex) => Some(regex),
                        Err(e) => {
                            tracing::warn!("Skipping invalid blocklist regex '{source}': {e}");
                            None
                        }
                    }
                })
                .collect()
        };

        let regexes = match ThreadPoolBuilder::new()
            .num_threads(COMPILE_THREADS)
            .build()
        {
            Ok(pool) => pool.install(|| compile(&regex_sources)),
            Err(e) => {
                tracing::debug!("Regex worker pool unavailable ({e}), compiling inline");
                compile(&regex_sources)
            }
        };

        tracing::debug!(
            "Compiled blocklist: {} literal patterns, {} regexes",
            patterns.len(),
            regexes.len()
        );

        Self { patterns, regexes }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.regexes.is_empty()
    }
}

pub struct FilenameEvaluator;

impl FilenameEvaluator {
    /// Returns `true` when the file should be kept.
    ///
    /// Blacklist: nothing matched. Whitelist: something matched.
    pub fn is_valid(
        name: &str,
        list_type: BlocklistType,
        patterns: &[LiteralPattern],
        regexes: &[Regex],
    ) -> bool {
        let matched = patterns.iter().any(|p| p.matches(name)) || regexes.iter().any(|r| r.is_match(name));

        match list_type {
            BlocklistType::Blacklist => !matched,
            BlocklistType::Whitelist => matched,
        }
    }
}
