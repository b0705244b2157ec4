//! One reconciliation cycle across every configured arr instance and
//! download client.

use crate::arr::{ArrClient, ArrQueueIterator};
use crate::blocklist::{Blocklist, BlocklistProvider};
use crate::clients::{DownloadClientDriver, DownloadInspector};
use crate::config::{GeneralConfig, SweepConfig};
use crate::content_blocker::ContentBlocker;
use crate::context::{ExecutionContext, InstanceType};
use crate::download_cleaner::DownloadCleaner;
use crate::error::Result;
use crate::events::EventSink;
use crate::executor::Executor;
use crate::factory::ClientFactory;
use crate::http::{HttpClient, HttpSettings};
use crate::markers::RemovalMarkers;
use crate::queue_cleaner::QueueCleaner;
use crate::removal::{RemovalHandler, RemovalQueue};
use crate::strikes::StrikeTracker;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub correlation_id: Uuid,
    pub drivers_connected: usize,
    pub groups_inspected: usize,
    pub requests_published: usize,
    pub files_blocked: usize,
    pub removals: usize,
    pub removal_failures: usize,
    pub downloads_cleaned: usize,
    pub categories_changed: usize,
}

/// Job orchestrator. Owns the state that survives between cycles: strikes,
/// removal markers and compiled blocklists.
pub struct Sweeper {
    strikes: StrikeTracker,
    markers: Arc<RemovalMarkers>,
    blocklists: BlocklistProvider,
    events: Arc<dyn EventSink>,
    factory: Arc<dyn ClientFactory>,
}

impl Sweeper {
    pub fn new(general: &GeneralConfig, events: Arc<dyn EventSink>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            strikes: StrikeTracker::new(general.strike_ttl(), Arc::clone(&events)),
            markers: Arc::new(RemovalMarkers::new(general.strike_ttl())),
            blocklists: BlocklistProvider::new(),
            events,
            factory,
        }
    }

    pub const fn strikes(&self) -> &StrikeTracker {
        &self.strikes
    }

    pub fn reload_blocklists(&self) {
        self.blocklists.reload();
    }

    pub fn run_cycle(&self, config: Arc<SweepConfig>) -> Result<CycleReport> {
        let correlation_id = Uuid::new_v4();
        let mut report = CycleReport {
            correlation_id,
            ..CycleReport::default()
        };
        tracing::info!("Starting cycle {correlation_id}");
        if config.general.dry_run {
            tracing::info!("[DRY-RUN] Dry-run mode: no changes will be made");
        }

        // The queue cleaner already runs the content check inside its
        // classification; the standalone pass covers the blocker-only setup.
        let run_queue_cleaner = config.queue_cleaner.enabled;
        let run_content_blocker = config.content_blocker.enabled && !run_queue_cleaner;

        let http = Arc::new(HttpClient::new(&HttpSettings::from(&config.general))?);
        // Loaded before any client is touched so a bad source changes nothing.
        let blocklists = if run_queue_cleaner || run_content_blocker {
            self.load_blocklists(&config, &http)?
        } else {
            HashMap::new()
        };

        let executor = Executor::new(config.general.dry_run);
        let drivers = self.connect_drivers(&config, &http);
        report.drivers_connected = drivers.len();

        let clients: HashMap<InstanceType, Arc<dyn ArrClient>> = InstanceType::ALL
            .into_iter()
            .map(|kind| (kind, self.factory.arr_client(kind, &http)))
            .collect();

        if run_queue_cleaner || run_content_blocker {
            let handler = RemovalHandler::new(
                clients.clone(),
                Arc::clone(&self.markers),
                Arc::clone(&self.events),
                executor,
                &config.general,
            );
            let queue = RemovalQueue::start(handler)?;

            for (kind, client) in InstanceType::ALL.iter().filter_map(|k| clients.get(k).map(|c| (*k, c))) {
                let blocklist = blocklists.get(&kind).cloned();
                let ctx = ExecutionContext::new(kind, &config, correlation_id);

                for instance in config.arr(kind).enabled_instances() {
                    if run_queue_cleaner {
                        let cleaner = QueueCleaner {
                            inspector: DownloadInspector::new(&self.strikes, &executor),
                            strikes: &self.strikes,
                            markers: &self.markers,
                            events: self.events.as_ref(),
                            drivers: &drivers,
                            iterator: ArrQueueIterator::default(),
                        };
                        match cleaner.run(&ctx, client.as_ref(), instance, &queue, blocklist.as_deref()) {
                            Ok(stats) => {
                                report.groups_inspected += stats.groups_inspected;
                                report.requests_published += stats.requests_published;
                            }
                            Err(e) => tracing::error!("Queue cleaner failed for {kind} {}: {e}", instance.name),
                        }
                    } else if let Some(blocklist) = &blocklist {
                        let blocker = ContentBlocker {
                            inspector: DownloadInspector::new(&self.strikes, &executor),
                            markers: &self.markers,
                            events: self.events.as_ref(),
                            drivers: &drivers,
                            iterator: ArrQueueIterator::default(),
                        };
                        match blocker.run(&ctx, client.as_ref(), instance, &queue, blocklist) {
                            Ok(stats) => {
                                report.groups_inspected += stats.groups_inspected;
                                report.files_blocked += stats.files_blocked;
                                report.requests_published += stats.requests_published;
                            }
                            Err(e) => tracing::error!("Content blocker failed for {kind} {}: {e}", instance.name),
                        }
                    }
                }
            }

            let removal = queue.finish();
            report.removals = removal.removed;
            report.removal_failures = removal.failed;
        }

        if config.download_cleaner.enabled {
            let cleaner = DownloadCleaner {
                events: self.events.as_ref(),
                executor,
                drivers: &drivers,
                iterator: ArrQueueIterator::default(),
            };
            match cleaner.collect_in_flight(&config, &clients) {
                Ok(in_flight) => match cleaner.run(&config, correlation_id, &in_flight) {
                    Ok(stats) => {
                        report.downloads_cleaned = stats.cleaned;
                        report.categories_changed = stats.categories_changed;
                    }
                    Err(e) => tracing::error!("Download cleaner failed: {e}"),
                },
                Err(e) => tracing::error!("Download cleaner aborted, arr queues unavailable: {e}"),
            }
        }

        tracing::info!(
            "Cycle {correlation_id} finished: {} downloads inspected, {} removed ({} failed), \
             {} files blocked, {} cleaned, {} recategorized",
            report.groups_inspected,
            report.removals,
            report.removal_failures,
            report.files_blocked,
            report.downloads_cleaned,
            report.categories_changed
        );
        Ok(report)
    }

    /// Builds and logs in every enabled client. A client that fails is left
    /// out of this cycle; the others still run.
    fn connect_drivers(&self, config: &SweepConfig, http: &Arc<HttpClient>) -> Vec<Arc<dyn DownloadClientDriver>> {
        let mut drivers = Vec::new();
        for client_config in config.enabled_clients() {
            let driver = match self.factory.download_client(client_config, http) {
                Ok(driver) => driver,
                Err(e) => {
                    tracing::error!("Failed to create download client {}: {e}", client_config.name);
                    continue;
                }
            };
            if let Err(e) = driver.login() {
                tracing::error!("Failed to log in to {} ({}): {e}", client_config.name, client_config.client_type);
                continue;
            }
            drivers.push(driver);
        }
        if drivers.is_empty() && config.enabled_clients().next().is_some() {
            tracing::warn!("No download client is reachable, torrent checks are skipped this cycle");
        }
        drivers
    }

    /// Fetches and compiles the blocklist of every type the content blocker
    /// is active for. A source that cannot be read fails the whole cycle.
    fn load_blocklists(
        &self,
        config: &SweepConfig,
        http: &HttpClient,
    ) -> Result<HashMap<InstanceType, Arc<Blocklist>>> {
        let mut loaded = HashMap::new();
        for kind in InstanceType::ALL {
            if !config.content_blocker.is_active_for(kind) {
                continue;
            }
            if let Some(blocklist) = self.blocklists.get(kind, config.content_blocker.blocklist(kind), http)? {
                loaded.insert(kind, blocklist);
            }
        }
        Ok(loaded)
    }
}
