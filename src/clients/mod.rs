//! Torrent-client drivers and the protocol-independent decision pipeline.

mod deluge;
mod inspector;
mod qbittorrent;
mod transmission;

pub use deluge::DelugeDriver;
pub use inspector::{BlockOutcome, DownloadInspector, IgnoreList};
pub use qbittorrent::QbittorrentDriver;
pub use transmission::TransmissionDriver;

use crate::config::ClientType;
use crate::error::Result;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why a download is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeleteReason {
    #[default]
    None,
    Stalled,
    ImportFailed,
    DownloadingMetadata,
    SlowSpeed,
    SlowTime,
    AllFilesSkipped,
    AllFilesSkippedByClient,
    AllFilesBlocked,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Stalled => "stalled",
            Self::ImportFailed => "failed import",
            Self::DownloadingMetadata => "stuck downloading metadata",
            Self::SlowSpeed => "slow speed",
            Self::SlowTime => "slow estimated time",
            Self::AllFilesSkipped => "all files skipped",
            Self::AllFilesSkippedByClient => "all files skipped by client",
            Self::AllFilesBlocked => "all files blocked",
        };
        f.write_str(name)
    }
}

/// Outcome of classifying one download against one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadCheckResult {
    pub found: bool,
    pub ignored: bool,
    pub is_private: bool,
    pub should_remove: bool,
    pub delete_reason: DeleteReason,
}

impl DownloadCheckResult {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn keep(is_private: bool) -> Self {
        Self {
            found: true,
            is_private,
            ..Self::default()
        }
    }

    pub fn ignored(is_private: bool) -> Self {
        Self {
            found: true,
            ignored: true,
            is_private,
            ..Self::default()
        }
    }

    pub fn remove(is_private: bool, reason: DeleteReason) -> Self {
        Self {
            found: true,
            is_private,
            should_remove: true,
            delete_reason: reason,
            ..Self::default()
        }
    }
}

/// Normalized torrent state across protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    Downloading,
    Stalled,
    FetchingMetadata,
    Seeding,
    Paused,
    Queued,
    Checking,
    Other,
}

/// One file inside a torrent. `wanted` folds the protocol's priority/skip flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub wanted: bool,
}

/// Protocol-independent view of a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentSnapshot {
    pub hash: String,
    pub name: String,
    pub state: TorrentState,
    pub size: u64,
    pub downloaded: u64,
    /// Bytes per second
    pub download_speed: u64,
    /// Seconds until completion, `None` when the client has no estimate
    pub eta: Option<u64>,
    pub is_private: bool,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Announce URLs
    pub trackers: Vec<String>,
    /// `None` when only summary fields were fetched
    pub files: Option<Vec<TorrentFile>>,
    pub ratio: f64,
    pub seeding_time: Option<Duration>,
    pub content_path: Option<PathBuf>,
}

impl TorrentSnapshot {
    /// Blank snapshot for `hash`; drivers and tests fill in what they know.
    pub fn new(hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            name: name.into(),
            state: TorrentState::Other,
            size: 0,
            downloaded: 0,
            download_speed: 0,
            eta: None,
            is_private: false,
            category: None,
            tags: Vec::new(),
            trackers: Vec::new(),
            files: None,
            ratio: 0.0,
            seeding_time: None,
            content_path: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.downloaded)
    }
}

/// One torrent client connection.
///
/// Hashes are passed as the arr reports them; drivers normalize case.
pub trait DownloadClientDriver: Send + Sync {
    fn name(&self) -> &str;

    fn client_type(&self) -> ClientType;

    fn login(&self) -> Result<()>;

    /// Full snapshot, including files. `Ok(None)` when the client does not know the hash.
    fn torrent(&self, hash: &str) -> Result<Option<TorrentSnapshot>>;

    /// Marks files (by index) as not to be downloaded.
    fn set_files_unwanted(&self, hash: &str, file_indexes: &[usize]) -> Result<()>;

    /// Removes the torrent together with its data.
    fn delete(&self, hash: &str) -> Result<()>;

    /// Completed torrents with ratio and seeding time.
    fn seeding_torrents(&self) -> Result<Vec<TorrentSnapshot>>;

    /// Moves a torrent to another category (or label), or tags it when `use_tag`.
    fn change_category(&self, hash: &str, category: &str, use_tag: bool) -> Result<()>;
}

/// Host part of an announce URL, lower case, without port.
pub fn tracker_host(url: &str) -> Option<String> {
    lazy_regex::regex_captures!(r"^(?i)[a-z][a-z0-9+.\-]*://(?:[^@/]*@)?([^:/?#]+)", url)
        .map(|(_, host)| host.to_lowercase())
}
