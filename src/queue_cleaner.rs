//! Per-download health classification of arr queues.

use crate::arr::{ArrClient, ArrQueueIterator, QueueRecord};
use crate::blocklist::Blocklist;
use crate::clients::{DeleteReason, DownloadCheckResult, DownloadClientDriver, DownloadInspector, IgnoreList};
use crate::config::ArrInstance;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::events::{EventRecord, EventSink, EventType, Severity};
use crate::markers::RemovalMarkers;
use crate::removal::{self, RemovalQueue, RemovalRequest};
use crate::strikes::StrikeTracker;
use std::collections::HashMap;
use std::sync::Arc;

/// Queue records sharing one download id, in first-appearance order.
///
/// Only built by [`collect_groups`], which never yields an empty group.
#[derive(Debug, Clone)]
pub struct DownloadGroup {
    pub download_id: String,
    records: Vec<QueueRecord>,
}

impl DownloadGroup {
    fn new(download_id: String, first: QueueRecord) -> Self {
        Self {
            download_id,
            records: vec![first],
        }
    }

    /// The record that drives every decision for the group.
    pub fn first(&self) -> &QueueRecord {
        &self.records[0]
    }

    pub fn records(&self) -> &[QueueRecord] {
        &self.records
    }

    pub fn record_ids(&self) -> Vec<i64> {
        self.records.iter().map(|record| record.id).collect()
    }
}

/// Reads the whole queue through the iterator and groups it by download id.
/// Records without a download id cannot be matched to a client and are dropped.
pub fn collect_groups(
    iterator: &ArrQueueIterator,
    client: &dyn ArrClient,
    instance: &ArrInstance,
) -> Result<Vec<DownloadGroup>> {
    let mut groups: Vec<DownloadGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    iterator.iterate(client, instance, |page| {
        for record in page {
            if !record.has_download_id() {
                tracing::debug!("Skipping queue record without download id: {}", record.title);
                continue;
            }
            let key = record.download_id.to_lowercase();
            match index.get(&key) {
                Some(&position) => groups[position].records.push(record.clone()),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(DownloadGroup::new(key, record.clone()));
                }
            }
        }
        Ok(())
    })?;

    Ok(groups)
}

/// Asks each driver in configured order; the first one that knows the hash wins.
pub fn find_in_clients(
    inspector: &DownloadInspector<'_>,
    ctx: &ExecutionContext<'_>,
    drivers: &[Arc<dyn DownloadClientDriver>],
    hash: &str,
    ignored: &IgnoreList,
    blocklist: Option<&Blocklist>,
) -> DownloadCheckResult {
    for driver in drivers {
        match inspector.classify(ctx, driver.as_ref(), hash, ignored, blocklist) {
            Ok(result) if result.found => return result,
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to check {hash} in {}: {e}", driver.name()),
        }
    }
    DownloadCheckResult::not_found()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCleanerStats {
    pub groups_inspected: usize,
    pub requests_published: usize,
}

pub struct QueueCleaner<'a> {
    pub inspector: DownloadInspector<'a>,
    pub strikes: &'a StrikeTracker,
    pub markers: &'a RemovalMarkers,
    pub events: &'a dyn EventSink,
    pub drivers: &'a [Arc<dyn DownloadClientDriver>],
    pub iterator: ArrQueueIterator,
}

impl QueueCleaner<'_> {
    /// Inspects every download group of one arr instance and publishes
    /// removal requests for the unhealthy ones.
    pub fn run(
        &self,
        ctx: &ExecutionContext<'_>,
        client: &dyn ArrClient,
        instance: &ArrInstance,
        queue: &RemovalQueue,
        blocklist: Option<&Blocklist>,
    ) -> Result<QueueCleanerStats> {
        let ignored = IgnoreList::new(&ctx.config.general.ignored_downloads);
        let groups = collect_groups(&self.iterator, client, instance)?;
        let mut stats = QueueCleanerStats::default();

        for group in &groups {
            stats.groups_inspected += 1;
            if self.process_group(ctx, client, instance, group, queue, &ignored, blocklist)? {
                stats.requests_published += 1;
            }
        }

        tracing::info!(
            "{} {}: inspected {} downloads, {} queued for removal",
            ctx.instance_type,
            instance.name,
            stats.groups_inspected,
            stats.requests_published
        );
        Ok(stats)
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
        blocklist: Option<&Blocklist>,
    ) -> Result<bool> {
        let record = group.first();

        if let Some(invalid) = group.records().iter().find(|r| !client.is_record_valid(r)) {
            tracing::debug!("Skipping invalid queue record: {}", invalid.title);
            return Ok(false);
        }
        if self.markers.is_marked(&group.download_id, &instance.url) {
            tracing::debug!("Already marked for removal: {}", record.title);
            return Ok(false);
        }
        if ctx.config.general.is_ignored_download(&group.download_id) {
            tracing::info!("Skipping ignored download: {}", record.title);
            return Ok(false);
        }

        let ctx = ctx.with_record(record);
        let result = if record.is_torrent() {
            find_in_clients(&self.inspector, &ctx, self.drivers, &group.download_id, ignored, blocklist)
        } else {
            DownloadCheckResult::not_found()
        };
        if result.ignored {
            return Ok(false);
        }

        let failed_import = client.should_remove_from_queue(&ctx, record, result.is_private, self.strikes);
        if !result.should_remove && !failed_import {
            return Ok(false);
        }

        let reason = if result.should_remove {
            result.delete_reason
        } else {
            DeleteReason::ImportFailed
        };
        publish_removal(&ctx, client, instance, group, result.is_private, reason, queue, self.events)
    }
}

/// Builds the removal request for a whole group, publishes it and records
/// the marked-for-deletion event. `Ok(false)` when a removal is already pending.
#[allow(clippy::too_many_arguments)]
pub fn publish_removal(
    ctx: &ExecutionContext<'_>,
    client: &dyn ArrClient,
    instance: &ArrInstance,
    group: &DownloadGroup,
    is_private: bool,
    reason: DeleteReason,
    queue: &RemovalQueue,
    events: &dyn EventSink,
) -> Result<bool> {
    let record = group.first();
    let remove_from_client = removal::remove_from_client(ctx.config, is_private, reason);
    let request = RemovalRequest {
        instance_type: ctx.instance_type,
        instance: instance.clone(),
        record: record.clone(),
        record_ids: group.record_ids(),
        search_item: client.search_item(group.records()),
        remove_from_client,
        delete_reason: reason,
        correlation_id: ctx.correlation_id,
    };

    if !queue.publish(request)? {
        return Ok(false);
    }

    events.publish(
        EventRecord::new(
            EventType::MarkedForDeletion,
            Severity::Warning,
            format!(
                "Marked {} for removal ({reason}, remove from client: {remove_from_client})",
                record.title
            ),
            ctx.correlation_id,
        )
        .with_download_id(&group.download_id),
    );
    Ok(true)
}
