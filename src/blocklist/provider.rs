use super::loader::load_lines;
use super::patterns::PatternSet;
use crate::config::{BlocklistSettings, BlocklistType};
use crate::context::InstanceType;
use crate::error::Result;
use crate::http::HttpClient;
use dashmap::DashMap;
use std::sync::Arc;

/// Compiled blocklist for one media-manager type.
#[derive(Debug)]
pub struct Blocklist {
    pub list_type: BlocklistType,
    pub source: String,
    pub patterns: PatternSet,
}

/// Per-type blocklist cache. Entries live until [`BlocklistProvider::reload`]
/// or until the configured source or list type changes.
#[derive(Default)]
pub struct BlocklistProvider {
    cache: DashMap<InstanceType, Arc<Blocklist>>,
}

impl BlocklistProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled blocklist for `instance_type`, loading it on first use.
    ///
    /// `Ok(None)` when blocking is not configured for the type.
    pub fn get(
        &self,
        instance_type: InstanceType,
        settings: &BlocklistSettings,
        http: &HttpClient,
    ) -> Result<Option<Arc<Blocklist>>> {
        let Some(source) = settings.path.as_deref().filter(|_| settings.is_active()) else {
            return Ok(None);
        };

        let cached = self.cache.get(&instance_type).map(|entry| Arc::clone(entry.value()));
        if let Some(cached) = cached
            && cached.source == source
            && cached.list_type == settings.list_type
        {
            return Ok(Some(cached));
        }

        let lines = load_lines(source, http)?;
        let blocklist = Arc::new(Blocklist {
            list_type: settings.list_type,
            source: source.to_string(),
            patterns: PatternSet::compile(&lines),
        });

        tracing::info!(
            "Loaded {} blocklist for {instance_type} from {source} ({} patterns, {} regexes)",
            match settings.list_type {
                BlocklistType::Blacklist => "blacklist",
                BlocklistType::Whitelist => "whitelist",
            },
            blocklist.patterns.patterns.len(),
            blocklist.patterns.regexes.len()
        );

        self.cache.insert(instance_type, Arc::clone(&blocklist));
        Ok(Some(blocklist))
    }

    /// Drops every cached blocklist; the next lookup reloads from source.
    pub fn reload(&self) {
        if !self.cache.is_empty() {
            tracing::info!("Invalidating {} cached blocklists", self.cache.len());
        }
        self.cache.clear();
    }
}
