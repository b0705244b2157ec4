use crate::arr::{ArrClient, ArrQueueIterator};
use crate::clients::{DownloadClientDriver, IgnoreList, TorrentSnapshot};
use crate::config::{CleanReason, SweepConfig};
use crate::context::InstanceType;
use crate::error::Result;
use crate::events::{EventRecord, EventSink, EventType, Severity};
use crate::executor::{ChangeCategory, DeleteTorrent, Executor};
use crate::hardlinks::HardlinkIndex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadCleanerStats {
    pub cleaned: usize,
    pub categories_changed: usize,
}

/// Seeding cleanup (ratio / seed time) and the unlinked pass.
pub struct DownloadCleaner<'a> {
    pub events: &'a dyn EventSink,
    pub executor: Executor,
    pub drivers: &'a [Arc<dyn DownloadClientDriver>],
    pub iterator: ArrQueueIterator,
}

impl DownloadCleaner<'_> {
    /// Download ids still queued in any enabled arr instance. One failing
    /// instance fails the whole prepass: without a complete picture nothing
    /// may be deleted.
    pub fn collect_in_flight(
        &self,
        config: &SweepConfig,
        clients: &HashMap<InstanceType, Arc<dyn ArrClient>>,
    ) -> Result<HashSet<String>> {
        let mut in_flight = HashSet::new();
        for instance_type in InstanceType::ALL {
            let Some(client) = clients.get(&instance_type) else {
                continue;
            };
            for instance in config.arr(instance_type).enabled_instances() {
                self.iterator.iterate(client.as_ref(), instance, |page| {
                    in_flight.extend(
                        page.iter()
                            .filter(|record| record.has_download_id())
                            .map(|record| record.download_id.to_lowercase()),
                    );
                    Ok(())
                })?;
            }
        }
        tracing::debug!("{} downloads still queued in arr instances", in_flight.len());
        Ok(in_flight)
    }

    pub fn run(
        &self,
        config: &SweepConfig,
        correlation_id: Uuid,
        in_flight: &HashSet<String>,
    ) -> Result<DownloadCleanerStats> {
        let settings = &config.download_cleaner;
        let ignored = IgnoreList::new(&config.general.ignored_downloads);
        let mut stats = DownloadCleanerStats::default();

        let links = if settings.unlinked.enabled {
            match HardlinkIndex::build(settings.unlinked.ignored_root_dir.as_deref()) {
                Ok(index) => Some(index),
                Err(e) => {
                    tracing::warn!("Skipping unlinked downloads: {e}");
                    None
                }
            }
        } else {
            None
        };

        for driver in self.drivers {
            let torrents = match driver.seeding_torrents() {
                Ok(torrents) => torrents,
                Err(e) => {
                    tracing::warn!("Failed to list seeding torrents in {}: {e}", driver.name());
                    continue;
                }
            };

            for snapshot in &torrents {
                if in_flight.contains(&snapshot.hash.to_lowercase()) {
                    tracing::debug!("Still queued in an arr, skipping: {}", snapshot.name);
                    continue;
                }
                if ignored.matches(snapshot) {
                    tracing::debug!("Skipping ignored download: {}", snapshot.name);
                    continue;
                }

                if self.clean_seeding(config, driver.as_ref(), snapshot, correlation_id) {
                    stats.cleaned += 1;
                    continue;
                }

                if let Some(index) = &links
                    && self.move_unlinked(config, driver.as_ref(), snapshot, index, correlation_id)
                {
                    stats.categories_changed += 1;
                }
            }
        }

        tracing::info!(
            "Download cleaner: {} removed, {} moved to '{}'",
            stats.cleaned,
            stats.categories_changed,
            settings.unlinked.target_category
        );
        Ok(stats)
    }

    fn clean_seeding(
        &self,
        config: &SweepConfig,
        driver: &dyn DownloadClientDriver,
        snapshot: &TorrentSnapshot,
        correlation_id: Uuid,
    ) -> bool {
        let Some(category) = snapshot
            .category
            .as_deref()
            .and_then(|name| config.download_cleaner.category(name))
        else {
            return false;
        };
        if snapshot.is_private && !config.download_cleaner.delete_private {
            tracing::debug!("Keeping private download: {}", snapshot.name);
            return false;
        }

        let seeding_time = snapshot.seeding_time.unwrap_or_default();
        let Some(reason) = category.should_clean(snapshot.ratio, seeding_time) else {
            return false;
        };

        let command = DeleteTorrent {
            driver,
            hash: &snapshot.hash,
            name: &snapshot.name,
        };
        if let Err(e) = self.executor.run(&command) {
            tracing::warn!("Failed to clean {}: {e}", snapshot.name);
            return false;
        }

        let why = match reason {
            CleanReason::MaxRatioReached => format!("ratio {:.2} reached", snapshot.ratio),
            CleanReason::MaxSeedTimeReached => {
                format!("seeded for {:.1}h", seeding_time.as_secs_f64() / 3600.0)
            }
        };
        self.events.publish(
            EventRecord::new(
                EventType::DownloadCleaned,
                Severity::Important,
                format!("Cleaned {} from {} ({why})", snapshot.name, driver.name()),
                correlation_id,
            )
            .with_download_id(&snapshot.hash),
        );
        true
    }

    fn move_unlinked(
        &self,
        config: &SweepConfig,
        driver: &dyn DownloadClientDriver,
        snapshot: &TorrentSnapshot,
        index: &HardlinkIndex,
        correlation_id: Uuid,
    ) -> bool {
        let unlinked = &config.download_cleaner.unlinked;
        let target = unlinked.target_category.as_str();

        let in_scope = snapshot
            .category
            .as_deref()
            .is_some_and(|category| unlinked.categories.iter().any(|c| c == category));
        let already_moved = if unlinked.use_tag {
            snapshot.tags.iter().any(|tag| tag == target)
        } else {
            snapshot.category.as_deref() == Some(target)
        };
        if !in_scope || already_moved {
            return false;
        }

        let Some(content_path) = &snapshot.content_path else {
            tracing::debug!("No content path for {}", snapshot.name);
            return false;
        };
        match index.is_unlinked(content_path) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::warn!("Failed to count hard links of {}: {e}", content_path.display());
                return false;
            }
        }

        let command = ChangeCategory {
            driver,
            hash: &snapshot.hash,
            name: &snapshot.name,
            category: target,
            use_tag: unlinked.use_tag,
        };
        if let Err(e) = self.executor.run(&command) {
            tracing::warn!("Failed to move {} to '{target}': {e}", snapshot.name);
            return false;
        }

        self.events.publish(
            EventRecord::new(
                EventType::CategoryChanged,
                Severity::Information,
                format!("Moved unlinked download {} to '{target}'", snapshot.name),
                correlation_id,
            )
            .with_download_id(&snapshot.hash),
        );
        true
    }
}
