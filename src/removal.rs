//! Removal hand-off: cleaners publish [`RemovalRequest`]s into a channel and a
//! single worker thread deletes them from the arr, emits events and triggers
//! the replacement search.

use crate::arr::{ArrClient, QueueRecord, SearchItem};
use crate::clients::DeleteReason;
use crate::config::{ArrInstance, GeneralConfig, SweepConfig};
use crate::context::InstanceType;
use crate::error::{AppError, Result};
use crate::events::{EventRecord, EventSink, EventType, Severity};
use crate::executor::{DeleteQueueItems, Executor, TriggerSearch};
use crate::markers::RemovalMarkers;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, SendError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// One download group to remove from an arr queue. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub instance_type: InstanceType,
    pub instance: ArrInstance,
    /// First record of the group; drives titles and the idempotency marker
    pub record: QueueRecord,
    pub record_ids: Vec<i64>,
    pub search_item: Option<SearchItem>,
    pub remove_from_client: bool,
    pub delete_reason: DeleteReason,
    pub correlation_id: Uuid,
}

impl RemovalRequest {
    pub fn download_id(&self) -> &str {
        &self.record.download_id
    }
}

/// Whether the client-side data goes too. Private items keep their data
/// unless the `delete_private` flag of the check that fired is set.
pub fn remove_from_client(config: &SweepConfig, is_private: bool, reason: DeleteReason) -> bool {
    if !is_private {
        return true;
    }

    let queue = &config.queue_cleaner;
    match reason {
        DeleteReason::Stalled | DeleteReason::DownloadingMetadata => queue.stalled.delete_private,
        DeleteReason::SlowSpeed | DeleteReason::SlowTime => queue.slow.delete_private,
        DeleteReason::AllFilesSkipped
        | DeleteReason::AllFilesSkippedByClient
        | DeleteReason::AllFilesBlocked => config.content_blocker.delete_private,
        DeleteReason::ImportFailed => queue.failed_import.delete_private,
        DeleteReason::None => true,
    }
}

/// Totals reported by the removal worker once the queue is drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    pub removed: usize,
    pub failed: usize,
}

/// Clears the idempotency marker however the handler exits.
struct MarkerGuard<'a> {
    markers: &'a RemovalMarkers,
    download_id: &'a str,
    instance_url: &'a str,
}

impl Drop for MarkerGuard<'_> {
    fn drop(&mut self) {
        self.markers.clear(self.download_id, self.instance_url);
    }
}

/// Executes removal requests against the arr that queued the item.
pub struct RemovalHandler {
    clients: HashMap<InstanceType, Arc<dyn ArrClient>>,
    markers: Arc<RemovalMarkers>,
    events: Arc<dyn EventSink>,
    executor: Executor,
    search_enabled: bool,
    search_delay: Duration,
}

impl RemovalHandler {
    pub fn new(
        clients: HashMap<InstanceType, Arc<dyn ArrClient>>,
        markers: Arc<RemovalMarkers>,
        events: Arc<dyn EventSink>,
        executor: Executor,
        general: &GeneralConfig,
    ) -> Self {
        Self {
            clients,
            markers,
            events,
            executor,
            search_enabled: general.search_enabled,
            search_delay: general.search_delay(),
        }
    }

    pub fn handle(&self, request: &RemovalRequest) -> Result<()> {
        let _guard = MarkerGuard {
            markers: &self.markers,
            download_id: request.download_id(),
            instance_url: &request.instance.url,
        };

        let client = self.clients.get(&request.instance_type).ok_or_else(|| {
            AppError::Config(format!("No {} client for removal", request.instance_type))
        })?;

        self.executor.run(&DeleteQueueItems {
            client: client.as_ref(),
            instance: &request.instance,
            record_ids: &request.record_ids,
            title: &request.record.title,
            remove_from_client: request.remove_from_client,
            reason: request.delete_reason,
        })?;

        self.events.publish(
            EventRecord::new(
                EventType::QueueItemDeleted,
                Severity::Important,
                format!(
                    "Removed {} from {} {} ({})",
                    request.record.title,
                    request.instance_type,
                    request.instance.name,
                    request.delete_reason
                ),
                request.correlation_id,
            )
            .with_download_id(request.download_id()),
        );

        if !self.search_enabled {
            return Ok(());
        }
        let Some(item) = &request.search_item else {
            tracing::debug!("Nothing to search for {}", request.record.title);
            return Ok(());
        };

        self.executor.run(&TriggerSearch {
            client: client.as_ref(),
            instance: &request.instance,
            item,
        })?;

        if !self.executor.is_dry_run() && !self.search_delay.is_zero() {
            tracing::debug!("Waiting {:?} before the next search", self.search_delay);
            thread::sleep(self.search_delay);
        }
        Ok(())
    }
}

/// In-process channel with one consumer thread running a [`RemovalHandler`].
pub struct RemovalQueue {
    sender: Option<Sender<RemovalRequest>>,
    worker: Option<JoinHandle<RemovalStats>>,
    markers: Arc<RemovalMarkers>,
}

impl RemovalQueue {
    pub fn start(handler: RemovalHandler) -> Result<Self> {
        let markers = Arc::clone(&handler.markers);
        let (sender, receiver) = mpsc::channel::<RemovalRequest>();

        let worker = thread::Builder::new()
            .name("removal".to_string())
            .spawn(move || {
                let mut stats = RemovalStats::default();
                for request in receiver {
                    match handler.handle(&request) {
                        Ok(()) => stats.removed += 1,
                        Err(e) => {
                            stats.failed += 1;
                            tracing::error!(
                                "Failed to remove {} from {} {}: {e}",
                                request.record.title,
                                request.instance_type,
                                request.instance.name
                            );
                        }
                    }
                }
                stats
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            markers,
        })
    }

    /// Marks the item and hands the request to the worker.
    ///
    /// Returns `false` without publishing when a removal for the same
    /// download on the same instance is already pending.
    pub fn publish(&self, request: RemovalRequest) -> Result<bool> {
        if !self
            .markers
            .try_mark(request.download_id(), &request.instance.url)
        {
            tracing::debug!("Removal already pending for {}", request.record.title);
            return Ok(false);
        }

        let sender = self.sender.as_ref().ok_or(AppError::QueueClosed)?;
        if let Err(SendError(request)) = sender.send(request) {
            self.markers
                .clear(request.download_id(), &request.instance.url);
            return Err(AppError::QueueClosed);
        }
        Ok(true)
    }

    /// Closes the channel and waits for every pending request.
    pub fn finish(mut self) -> RemovalStats {
        self.close()
    }

    fn close(&mut self) -> RemovalStats {
        drop(self.sender.take());
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                tracing::error!("Removal worker panicked");
                RemovalStats::default()
            }
            None => RemovalStats::default(),
        }
    }
}

impl Drop for RemovalQueue {
    fn drop(&mut self) {
        self.close();
    }
}
