use super::{ArrApi, ArrClient, QueuePage, QueueRecord, SearchItem, collect_ids};
use crate::clients::DeleteReason;
use crate::config::ArrInstance;
use crate::context::InstanceType;
use crate::error::Result;
use crate::http::HttpClient;
use std::sync::Arc;

const QUEUE_INCLUDES: &[&str] = &["includeUnknownArtistItems", "includeArtist", "includeAlbum"];

pub struct LidarrClient {
    api: ArrApi,
}

impl LidarrClient {
    pub const fn new(http: Arc<HttpClient>) -> Self {
        Self {
            api: ArrApi::new(http, InstanceType::Lidarr),
        }
    }
}

pub(super) fn is_valid(record: &QueueRecord) -> bool {
    if record.artist_id.is_none() || record.album_id.is_none() {
        tracing::debug!("Skipping record without artist or album id: {}", record.title);
        return false;
    }
    true
}

pub(super) fn search_item(records: &[QueueRecord]) -> Option<SearchItem> {
    let ids = collect_ids(records, |record| record.album_id);
    (!ids.is_empty()).then_some(SearchItem::Albums(ids))
}

impl ArrClient for LidarrClient {
    fn instance_type(&self) -> InstanceType {
        InstanceType::Lidarr
    }

    fn queue_page(&self, instance: &ArrInstance, page: u32, page_size: u32) -> Result<QueuePage> {
        self.api.queue_page(instance, page, page_size, QUEUE_INCLUDES)
    }

    fn delete_queue_items(
        &self,
        instance: &ArrInstance,
        record_ids: &[i64],
        remove_from_client: bool,
        reason: DeleteReason,
    ) -> Result<()> {
        self.api
            .delete_queue_items(instance, record_ids, remove_from_client, reason)
    }

    fn search(&self, instance: &ArrInstance, item: &SearchItem) -> Result<()> {
        self.api.command(instance, &item.command())
    }

    fn is_record_valid(&self, record: &QueueRecord) -> bool {
        is_valid(record)
    }

    fn search_item(&self, records: &[QueueRecord]) -> Option<SearchItem> {
        search_item(records)
    }
}
