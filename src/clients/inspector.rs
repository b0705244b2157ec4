use super::{
    DeleteReason, DownloadCheckResult, DownloadClientDriver, TorrentSnapshot, TorrentState,
    tracker_host,
};
use crate::blocklist::{Blocklist, FilenameEvaluator};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::{Executor, SetFilesUnwanted};
use crate::strikes::{StrikeTracker, StrikeType};

/// Globally ignored downloads: hashes, categories, tags or tracker domains.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    entries: Vec<String>,
}

impl IgnoreList {
    pub fn new(entries: &[String]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|entry| entry.trim().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
        }
    }

    pub fn contains_id(&self, download_id: &str) -> bool {
        let id = download_id.to_lowercase();
        self.entries.iter().any(|entry| *entry == id)
    }

    pub fn matches(&self, snapshot: &TorrentSnapshot) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        if self.contains_id(&snapshot.hash) {
            return true;
        }

        let label_match = snapshot
            .category
            .iter()
            .chain(snapshot.tags.iter())
            .any(|label| self.contains_id(label));
        if label_match {
            return true;
        }

        snapshot
            .trackers
            .iter()
            .filter_map(|url| tracker_host(url))
            .any(|host| {
                self.entries
                    .iter()
                    .any(|entry| host == *entry || host.ends_with(&format!(".{entry}")))
            })
    }
}

/// Result of evaluating a torrent's files against a blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockOutcome {
    /// Every file is unwanted; the whole item should go
    pub remove_whole: bool,
    pub reason: DeleteReason,
    /// Files marked unwanted by this call
    pub newly_blocked: usize,
}

/// Health pipeline shared by every driver. Drivers only fetch and mutate;
/// every decision is made here on the normalized [`TorrentSnapshot`].
pub struct DownloadInspector<'a> {
    strikes: &'a StrikeTracker,
    executor: &'a Executor,
}

impl<'a> DownloadInspector<'a> {
    pub const fn new(strikes: &'a StrikeTracker, executor: &'a Executor) -> Self {
        Self { strikes, executor }
    }

    /// Classifies one download. Short-circuits on the first positive check.
    pub fn classify(
        &self,
        ctx: &ExecutionContext<'_>,
        driver: &dyn DownloadClientDriver,
        hash: &str,
        ignored: &IgnoreList,
        blocklist: Option<&Blocklist>,
    ) -> Result<DownloadCheckResult> {
        let Some(snapshot) = driver.torrent(hash)? else {
            tracing::debug!("{hash} not found in {}", driver.name());
            return Ok(DownloadCheckResult::not_found());
        };
        let is_private = snapshot.is_private;

        if ignored.matches(&snapshot) {
            tracing::info!("Skipping ignored download: {}", snapshot.name);
            return Ok(DownloadCheckResult::ignored(is_private));
        }

        if let Some(files) = &snapshot.files
            && !files.is_empty()
            && files.iter().all(|file| !file.wanted)
        {
            let reason = if snapshot.downloaded == 0 {
                DeleteReason::AllFilesSkippedByClient
            } else {
                DeleteReason::AllFilesSkipped
            };
            tracing::info!("All files are skipped for {} ({reason})", snapshot.name);
            return Ok(DownloadCheckResult::remove(is_private, reason));
        }

        let blocker = &ctx.config.content_blocker;
        if let Some(blocklist) = blocklist
            && blocker.is_active_for(ctx.instance_type)
            && !(is_private && blocker.ignore_private)
        {
            let outcome = self.block_unwanted_files(driver, &snapshot, blocklist)?;
            if outcome.remove_whole {
                return Ok(DownloadCheckResult::remove(is_private, outcome.reason));
            }
        }

        if let Some(reason) = self.check_slow(ctx, &snapshot) {
            return Ok(DownloadCheckResult::remove(is_private, reason));
        }

        if let Some(reason) = self.check_stalled(ctx, &snapshot) {
            return Ok(DownloadCheckResult::remove(is_private, reason));
        }

        Ok(DownloadCheckResult::keep(is_private))
    }

    /// Marks blocked files unwanted in place. When every file ends up unwanted
    /// nothing is mutated and the whole item is reported for removal instead.
    pub fn block_unwanted_files(
        &self,
        driver: &dyn DownloadClientDriver,
        snapshot: &TorrentSnapshot,
        blocklist: &Blocklist,
    ) -> Result<BlockOutcome> {
        let Some(files) = snapshot.files.as_deref().filter(|files| !files.is_empty()) else {
            tracing::debug!("No file list for {}, skipping content check", snapshot.name);
            return Ok(BlockOutcome::default());
        };

        let mut unwanted = 0;
        let mut newly_blocked = Vec::new();
        for file in files {
            if !file.wanted {
                unwanted += 1;
                continue;
            }
            if !FilenameEvaluator::is_valid(
                &file.name,
                blocklist.list_type,
                &blocklist.patterns.patterns,
                &blocklist.patterns.regexes,
            ) {
                tracing::info!("Unwanted file found: {}", file.name);
                unwanted += 1;
                newly_blocked.push(file.index);
            }
        }

        if unwanted == files.len() {
            tracing::info!("All files are blocked for {}", snapshot.name);
            return Ok(BlockOutcome {
                remove_whole: true,
                reason: DeleteReason::AllFilesBlocked,
                newly_blocked: 0,
            });
        }

        if !newly_blocked.is_empty() {
            self.executor.run(&SetFilesUnwanted {
                driver,
                hash: &snapshot.hash,
                file_indexes: &newly_blocked,
            })?;
            tracing::info!(
                "Marked {} of {} files as unwanted for {}",
                newly_blocked.len(),
                files.len(),
                snapshot.name
            );
        }

        Ok(BlockOutcome {
            remove_whole: false,
            reason: DeleteReason::None,
            newly_blocked: newly_blocked.len(),
        })
    }

    fn check_slow(&self, ctx: &ExecutionContext<'_>, snapshot: &TorrentSnapshot) -> Option<DeleteReason> {
        let slow = &ctx.config.queue_cleaner.slow;
        if slow.max_strikes == 0
            || snapshot.state != TorrentState::Downloading
            || snapshot.download_speed == 0
        {
            return None;
        }
        if snapshot.is_private && slow.ignore_private {
            tracing::debug!("Skipping slow check for private item: {}", snapshot.name);
            return None;
        }
        if let Some(cap) = slow.ignore_above_size_bytes()
            && snapshot.size > cap
        {
            tracing::debug!("Skipping slow check for large item: {}", snapshot.name);
            return None;
        }

        let min_speed = slow.min_speed_bytes();
        if min_speed > 0 {
            if snapshot.download_speed < min_speed {
                return self
                    .strike(ctx, snapshot, slow.max_strikes, StrikeType::SlowSpeed)
                    .then_some(DeleteReason::SlowSpeed);
            }
            if slow.reset_strikes_on_progress {
                self.strikes.reset_strikes(&snapshot.hash, StrikeType::SlowSpeed);
            }
        }

        let max_time = slow.max_time_secs();
        if max_time > 0 {
            let eta = snapshot
                .eta
                .unwrap_or_else(|| snapshot.remaining() / snapshot.download_speed);
            if eta > max_time {
                return self
                    .strike(ctx, snapshot, slow.max_strikes, StrikeType::SlowTime)
                    .then_some(DeleteReason::SlowTime);
            }
            if slow.reset_strikes_on_progress {
                self.strikes.reset_strikes(&snapshot.hash, StrikeType::SlowTime);
            }
        }

        None
    }

    fn check_stalled(&self, ctx: &ExecutionContext<'_>, snapshot: &TorrentSnapshot) -> Option<DeleteReason> {
        let stalled = &ctx.config.queue_cleaner.stalled;
        let (strike_type, max_strikes, reason) = match snapshot.state {
            TorrentState::Stalled => (StrikeType::Stalled, stalled.max_strikes, DeleteReason::Stalled),
            TorrentState::FetchingMetadata => (
                StrikeType::DownloadingMetadata,
                stalled.downloading_metadata_max_strikes,
                DeleteReason::DownloadingMetadata,
            ),
            _ => return None,
        };

        if max_strikes == 0 {
            return None;
        }
        if snapshot.is_private && stalled.ignore_private {
            tracing::debug!("Skipping {strike_type} check for private item: {}", snapshot.name);
            return None;
        }

        if stalled.reset_strikes_on_progress {
            self.strikes
                .observe_progress(&snapshot.hash, strike_type, snapshot.downloaded);
        }

        self.strike(ctx, snapshot, max_strikes, strike_type)
            .then_some(reason)
    }

    fn strike(
        &self,
        ctx: &ExecutionContext<'_>,
        snapshot: &TorrentSnapshot,
        max_strikes: u32,
        strike_type: StrikeType,
    ) -> bool {
        self.strikes
            .strike_and_check_limit(ctx, &snapshot.hash, &snapshot.name, max_strikes, strike_type)
    }
}
