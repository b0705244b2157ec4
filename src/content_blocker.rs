use crate::arr::{ArrClient, ArrQueueIterator};
use crate::blocklist::Blocklist;
use crate::clients::{DeleteReason, DownloadClientDriver, DownloadInspector, IgnoreList, TorrentSnapshot};
use crate::config::ArrInstance;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::events::EventSink;
use crate::markers::RemovalMarkers;
use crate::queue_cleaner::{DownloadGroup, collect_groups, publish_removal};
use crate::removal::RemovalQueue;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentBlockerStats {
    pub groups_inspected: usize,
    pub files_blocked: usize,
    pub requests_published: usize,
}

/// Marks blocklisted files unwanted in torrent downloads and removes items
/// left with nothing to download.
pub struct ContentBlocker<'a> {
    pub inspector: DownloadInspector<'a>,
    pub markers: &'a RemovalMarkers,
    pub events: &'a dyn EventSink,
    pub drivers: &'a [Arc<dyn DownloadClientDriver>],
    pub iterator: ArrQueueIterator,
}

impl ContentBlocker<'_> {
    pub fn run(
        &self,
        ctx: &ExecutionContext<'_>,
        client: &dyn ArrClient,
        instance: &ArrInstance,
        queue: &RemovalQueue,
        blocklist: &Blocklist,
    ) -> Result<ContentBlockerStats> {
        let mut stats = ContentBlockerStats::default();
        if !ctx.config.content_blocker.is_active_for(ctx.instance_type) {
            return Ok(stats);
        }

        let ignored = IgnoreList::new(&ctx.config.general.ignored_downloads);
        for group in collect_groups(&self.iterator, client, instance)? {
            if !group.first().is_torrent() {
                continue;
            }
            stats.groups_inspected += 1;
            self.process_group(ctx, client, instance, &group, queue, &ignored, blocklist, &mut stats)?;
        }

        tracing::info!(
            "{} {}: blocked {} files, {} downloads queued for removal",
            ctx.instance_type,
            instance.name,
            stats.files_blocked,
            stats.requests_published
        );
        Ok(stats)
    }

    /// First driver that knows the hash, with its snapshot.
    fn locate(&self, hash: &str) -> Option<(&dyn DownloadClientDriver, TorrentSnapshot)> {
        for driver in self.drivers {
            match driver.torrent(hash) {
                Ok(Some(snapshot)) => return Some((driver.as_ref(), snapshot)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to check {hash} in {}: {e}", driver.name()),
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn process_group(
        &self,
        ctx: &ExecutionContext<'_>,
        client: &dyn ArrClient,
        instance: &ArrInstance,
        group: &DownloadGroup,
        queue: &RemovalQueue,
        ignored: &IgnoreList,
        blocklist: &Blocklist,
        stats: &mut ContentBlockerStats,
    ) -> Result<()> {
        let record = group.first();
        if group.records().iter().any(|r| !client.is_record_valid(r))
            || self.markers.is_marked(&group.download_id, &instance.url)
            || ctx.config.general.is_ignored_download(&group.download_id)
        {
            tracing::debug!("Skipping {} for content blocking", record.title);
            return Ok(());
        }

        let Some((driver, snapshot)) = self.locate(&group.download_id) else {
            tracing::debug!("{} not found in any download client", record.title);
            return Ok(());
        };
        if ignored.matches(&snapshot) {
            tracing::info!("Skipping ignored download: {}", snapshot.name);
            return Ok(());
        }
        if snapshot.is_private && ctx.config.content_blocker.ignore_private {
            tracing::debug!("Skipping private download: {}", snapshot.name);
            return Ok(());
        }

        let outcome = match self.inspector.block_unwanted_files(driver, &snapshot, blocklist) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Failed to block files of {} in {}: {e}", snapshot.name, driver.name());
                return Ok(());
            }
        };
        stats.files_blocked += outcome.newly_blocked;

        if outcome.remove_whole {
            let ctx = ctx.with_record(record);
            if publish_removal(
                &ctx,
                client,
                instance,
                group,
                snapshot.is_private,
                DeleteReason::AllFilesBlocked,
                queue,
                self.events,
            )? {
                stats.requests_published += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::PatternSet;
    use crate::clients::TorrentState;
    use crate::config::{BlocklistSettings, BlocklistType, GeneralConfig, SweepConfig};
    use crate::context::InstanceType;
    use crate::events::{EventType, MemoryEventSink};
    use crate::executor::Executor;
    use crate::removal::RemovalHandler;
    use crate::strikes::StrikeTracker;
    use crate::testing::{FakeArrClient, FakeDriver, instance, record, torrent_with_files};
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn blocklist(lines: &[&str]) -> Blocklist {
        let lines: Vec<String> = lines.iter().map(|line| (*line).to_string()).collect();
        Blocklist {
            list_type: BlocklistType::Blacklist,
            source: "test".to_string(),
            patterns: PatternSet::compile(&lines),
        }
    }

    fn config() -> SweepConfig {
        let mut config = SweepConfig::default();
        config.content_blocker.enabled = true;
        config.content_blocker.radarr = BlocklistSettings {
            enabled: true,
            list_type: BlocklistType::Blacklist,
            path: Some("/etc/arrsweep/blocklist.txt".to_string()),
        };
        config
    }

    fn run(
        config: &SweepConfig,
        client: &Arc<FakeArrClient>,
        driver: &Arc<FakeDriver>,
        blocklist: &Blocklist,
    ) -> (ContentBlockerStats, Arc<MemoryEventSink>) {
        let events = Arc::new(MemoryEventSink::new());
        let strikes = StrikeTracker::new(Duration::from_secs(60), Arc::clone(&events) as Arc<dyn EventSink>);
        let markers = Arc::new(RemovalMarkers::new(Duration::from_secs(60)));
        let executor = Executor::new(config.general.dry_run);

        let mut clients: HashMap<InstanceType, Arc<dyn ArrClient>> = HashMap::new();
        clients.insert(InstanceType::Radarr, Arc::clone(client) as Arc<dyn ArrClient>);
        let handler = RemovalHandler::new(
            clients,
            Arc::clone(&markers),
            Arc::clone(&events) as Arc<dyn EventSink>,
            executor,
            &GeneralConfig {
                search_delay_secs: 0,
                ..GeneralConfig::default()
            },
        );
        let queue = RemovalQueue::start(handler).unwrap();
        let drivers: Vec<Arc<dyn DownloadClientDriver>> = vec![Arc::clone(driver) as Arc<dyn DownloadClientDriver>];

        let blocker = ContentBlocker {
            inspector: DownloadInspector::new(&strikes, &executor),
            markers: &markers,
            events: events.as_ref(),
            drivers: &drivers,
            iterator: ArrQueueIterator::default(),
        };
        let ctx = ExecutionContext::new(InstanceType::Radarr, config, Uuid::new_v4());
        let stats = blocker
            .run(&ctx, client.as_ref(), &instance("radarr"), &queue, blocklist)
            .unwrap();
        queue.finish();
        (stats, events)
    }

    #[test]
    fn test_one_of_three_files_blocked() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "abc", "torrent")]));
        let driver = Arc::new(FakeDriver::new(
            "qbit",
            vec![torrent_with_files(
                "abc",
                TorrentState::Downloading,
                &[("Movie.mkv", true), ("Movie.sample.mkv", true), ("Movie.nfo", true)],
            )],
        ));

        let (stats, _) = run(&config(), &client, &driver, &blocklist(&["*sample*"]));

        assert_eq!(stats.files_blocked, 1);
        assert_eq!(stats.requests_published, 0);
        assert_eq!(driver.unwanted_calls(), vec![("abc".to_string(), vec![1])]);
        assert!(client.deletions().is_empty());
    }

    #[test]
    fn test_all_files_blocked_removes_item() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "abc", "torrent")]));
        let driver = Arc::new(FakeDriver::new(
            "qbit",
            vec![torrent_with_files(
                "abc",
                TorrentState::Downloading,
                &[("setup.exe", true), ("readme.exe", true), ("crack.exe", true)],
            )],
        ));

        let (stats, events) = run(&config(), &client, &driver, &blocklist(&["*.exe"]));

        assert_eq!(stats.requests_published, 1);
        assert!(driver.unwanted_calls().is_empty());
        assert_eq!(
            client.deletions(),
            vec![(vec![1], true, DeleteReason::AllFilesBlocked)]
        );
        assert_eq!(events.count(EventType::MarkedForDeletion), 1);
    }

    #[test]
    fn test_private_ignored_when_configured() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "abc", "torrent")]));
        let mut snapshot = torrent_with_files("abc", TorrentState::Downloading, &[("setup.exe", true)]);
        snapshot.is_private = true;
        let driver = Arc::new(FakeDriver::new("qbit", vec![snapshot]));

        let mut config = config();
        config.content_blocker.ignore_private = true;
        let (stats, _) = run(&config, &client, &driver, &blocklist(&["*.exe"]));

        assert_eq!(stats.requests_published, 0);
        assert!(client.deletions().is_empty());
    }

    #[test]
    fn test_private_item_kept_in_client() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "abc", "torrent")]));
        let mut snapshot = torrent_with_files("abc", TorrentState::Downloading, &[("setup.exe", true)]);
        snapshot.is_private = true;
        let driver = Arc::new(FakeDriver::new("qbit", vec![snapshot]));

        run(&config(), &client, &driver, &blocklist(&["*.exe"]));
        assert_eq!(
            client.deletions(),
            vec![(vec![1], false, DeleteReason::AllFilesBlocked)]
        );
    }

    #[test]
    fn test_inactive_type_does_nothing() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "abc", "torrent")]));
        let driver = Arc::new(FakeDriver::new(
            "qbit",
            vec![torrent_with_files("abc", TorrentState::Downloading, &[("setup.exe", true)])],
        ));

        let mut config = config();
        config.content_blocker.radarr.enabled = false;
        let (stats, _) = run(&config, &client, &driver, &blocklist(&["*.exe"]));

        assert_eq!(stats, ContentBlockerStats::default());
        assert!(client.pages_requested().is_empty());
    }

    #[test]
    fn test_usenet_items_skipped() {
        let client = Arc::new(FakeArrClient::new(InstanceType::Radarr, vec![record(1, "nzb1", "usenet")]));
        let driver = Arc::new(FakeDriver::new("qbit", vec![]));

        let (stats, _) = run(&config(), &client, &driver, &blocklist(&["*.exe"]));
        assert_eq!(stats.groups_inspected, 0);
    }
}
