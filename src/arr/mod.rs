//! Media-manager (arr) clients: queue access, deletion and re-search.

mod api;
mod failed_import;
mod iterator;
mod lidarr;
mod radarr;
mod readarr;
mod sonarr;

pub use api::ArrApi;
pub use failed_import::{is_failed_import, should_remove_for_failed_import};
pub use iterator::{ArrQueueIterator, DEFAULT_PAGE_SIZE};
pub use lidarr::LidarrClient;
pub use radarr::RadarrClient;
pub use readarr::ReadarrClient;
pub use sonarr::SonarrClient;

use crate::clients::DeleteReason;
use crate::config::ArrInstance;
use crate::context::{ExecutionContext, InstanceType};
use crate::error::Result;
use crate::strikes::StrikeTracker;
use serde::Deserialize;

/// One entry of an arr download queue.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueRecord {
    pub id: i64,
    /// Torrent info hash or usenet id, upper case as the arr reports it
    pub download_id: String,
    pub title: String,
    pub protocol: String,
    pub series_id: Option<i64>,
    pub episode_id: Option<i64>,
    pub season_number: Option<i64>,
    pub movie_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub author_id: Option<i64>,
    pub book_id: Option<i64>,
    pub status: String,
    pub tracked_download_status: String,
    pub tracked_download_state: String,
    pub status_messages: Vec<StatusMessage>,
    pub size: f64,
    pub sizeleft: f64,
}

impl QueueRecord {
    pub fn is_torrent(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("torrent")
    }

    pub fn has_download_id(&self) -> bool {
        !self.download_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatusMessage {
    pub title: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueuePage {
    pub page: u32,
    pub page_size: u32,
    pub total_records: u32,
    pub records: Vec<QueueRecord>,
}

/// What to search for after a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchItem {
    Episodes(Vec<i64>),
    Movies(Vec<i64>),
    Albums(Vec<i64>),
    Books(Vec<i64>),
}

impl SearchItem {
    /// Body of the `POST /command` request.
    pub fn command(&self) -> serde_json::Value {
        match self {
            Self::Episodes(ids) => serde_json::json!({ "name": "EpisodeSearch", "episodeIds": ids }),
            Self::Movies(ids) => serde_json::json!({ "name": "MoviesSearch", "movieIds": ids }),
            Self::Albums(ids) => serde_json::json!({ "name": "AlbumSearch", "albumIds": ids }),
            Self::Books(ids) => serde_json::json!({ "name": "BookSearch", "bookIds": ids }),
        }
    }

    pub fn ids(&self) -> &[i64] {
        match self {
            Self::Episodes(ids) | Self::Movies(ids) | Self::Albums(ids) | Self::Books(ids) => ids,
        }
    }
}

/// A media-manager REST API. One implementation per arr flavour.
pub trait ArrClient: Send + Sync {
    fn instance_type(&self) -> InstanceType;

    fn queue_page(&self, instance: &ArrInstance, page: u32, page_size: u32) -> Result<QueuePage>;

    /// Deletes queue records, always blocklisting the release in the arr.
    fn delete_queue_items(
        &self,
        instance: &ArrInstance,
        record_ids: &[i64],
        remove_from_client: bool,
        reason: DeleteReason,
    ) -> Result<()>;

    fn search(&self, instance: &ArrInstance, item: &SearchItem) -> Result<()>;

    /// Whether the record carries the ids this arr needs to act on it.
    fn is_record_valid(&self, record: &QueueRecord) -> bool;

    /// Search covering every record of a download group.
    fn search_item(&self, records: &[QueueRecord]) -> Option<SearchItem>;

    /// Failed-import decision for the first record of a group.
    fn should_remove_from_queue(
        &self,
        ctx: &ExecutionContext<'_>,
        record: &QueueRecord,
        is_private: bool,
        strikes: &StrikeTracker,
    ) -> bool {
        should_remove_for_failed_import(ctx, record, is_private, strikes)
    }
}

/// Record validation rules per arr flavour.
pub fn record_is_valid(instance_type: InstanceType, record: &QueueRecord) -> bool {
    match instance_type {
        InstanceType::Sonarr => sonarr::is_valid(record),
        InstanceType::Radarr => radarr::is_valid(record),
        InstanceType::Lidarr => lidarr::is_valid(record),
        InstanceType::Readarr => readarr::is_valid(record),
    }
}

/// Search item construction per arr flavour.
pub fn search_item_for(instance_type: InstanceType, records: &[QueueRecord]) -> Option<SearchItem> {
    match instance_type {
        InstanceType::Sonarr => sonarr::search_item(records),
        InstanceType::Radarr => radarr::search_item(records),
        InstanceType::Lidarr => lidarr::search_item(records),
        InstanceType::Readarr => readarr::search_item(records),
    }
}

/// Distinct ids in first-seen order.
fn collect_ids(records: &[QueueRecord], id: impl Fn(&QueueRecord) -> Option<i64>) -> Vec<i64> {
    let mut ids = Vec::new();
    for value in records.iter().filter_map(id) {
        if !ids.contains(&value) {
            ids.push(value);
        }
    }
    ids
}
