use super::{DownloadClientDriver, TorrentFile, TorrentSnapshot, TorrentState};
use crate::config::{ClientConfig, ClientType};
use crate::error::{AppError, Result};
use crate::http::{HttpClient, check_status};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const DEFAULT_RPC_BASE: &str = "transmission";

const SUMMARY_FIELDS: &[&str] = &[
    "hashString",
    "name",
    "status",
    "totalSize",
    "sizeWhenDone",
    "downloadedEver",
    "rateDownload",
    "eta",
    "isPrivate",
    "labels",
    "trackers",
    "uploadRatio",
    "secondsSeeding",
    "downloadDir",
    "percentDone",
    "metadataPercentComplete",
];

const FILE_FIELDS: &[&str] = &["files", "fileStats"];

const STATUS_STOPPED: i64 = 0;
const STATUS_CHECK_WAIT: i64 = 1;
const STATUS_CHECK: i64 = 2;
const STATUS_DOWNLOAD_WAIT: i64 = 3;
const STATUS_DOWNLOAD: i64 = 4;
const STATUS_SEED_WAIT: i64 = 5;
const STATUS_SEED: i64 = 6;

/// Transmission RPC driver. Requests carry basic auth and the CSRF session
/// id, which is renegotiated whenever the daemon answers 409.
pub struct TransmissionDriver {
    name: String,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    http: Arc<HttpClient>,
    session_id: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: String,
    arguments: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentList {
    torrents: Vec<TorrentInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TorrentInfo {
    hash_string: String,
    name: String,
    status: i64,
    total_size: u64,
    size_when_done: u64,
    downloaded_ever: u64,
    rate_download: u64,
    eta: i64,
    is_private: bool,
    labels: Vec<String>,
    trackers: Vec<TrackerEntry>,
    upload_ratio: f64,
    seconds_seeding: i64,
    download_dir: String,
    percent_done: f64,
    metadata_percent_complete: f64,
    files: Vec<FileEntry>,
    file_stats: Vec<FileStat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackerEntry {
    announce: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileEntry {
    name: String,
    length: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FileStat {
    wanted: bool,
}

impl Default for FileStat {
    fn default() -> Self {
        Self { wanted: true }
    }
}

impl TorrentInfo {
    fn state(&self) -> TorrentState {
        match self.status {
            STATUS_DOWNLOAD if self.metadata_percent_complete < 1.0 => TorrentState::FetchingMetadata,
            STATUS_DOWNLOAD if self.eta <= 0 => TorrentState::Stalled,
            STATUS_DOWNLOAD => TorrentState::Downloading,
            STATUS_SEED_WAIT | STATUS_SEED => TorrentState::Seeding,
            STATUS_STOPPED => TorrentState::Paused,
            STATUS_DOWNLOAD_WAIT => TorrentState::Queued,
            STATUS_CHECK_WAIT | STATUS_CHECK => TorrentState::Checking,
            _ => TorrentState::Other,
        }
    }

    fn is_complete(&self) -> bool {
        self.percent_done >= 1.0
    }

    /// Last component of the download directory, which arr clients treat
    /// as the category.
    fn category(&self) -> Option<String> {
        Path::new(&self.download_dir)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
    }

    fn into_snapshot(self) -> TorrentSnapshot {
        let state = self.state();
        let category = self.category();
        let size = if self.size_when_done > 0 {
            self.size_when_done
        } else {
            self.total_size
        };

        let mut snapshot = TorrentSnapshot::new(self.hash_string.to_lowercase(), self.name.clone());
        snapshot.state = state;
        snapshot.size = size;
        snapshot.downloaded = self.downloaded_ever.min(size);
        snapshot.download_speed = self.rate_download;
        snapshot.eta = u64::try_from(self.eta).ok().filter(|eta| *eta > 0);
        snapshot.is_private = self.is_private;
        snapshot.category = category;
        snapshot.tags = self.labels;
        snapshot.trackers = self.trackers.into_iter().map(|t| t.announce).collect();
        snapshot.ratio = self.upload_ratio.max(0.0);
        snapshot.seeding_time = Some(Duration::from_secs(
            u64::try_from(self.seconds_seeding).unwrap_or(0),
        ));
        if !self.download_dir.is_empty() {
            snapshot.content_path = Some(PathBuf::from(&self.download_dir).join(&self.name));
        }
        if !self.files.is_empty() {
            let stats = self.file_stats;
            snapshot.files = Some(
                self.files
                    .into_iter()
                    .enumerate()
                    .map(|(index, file)| TorrentFile {
                        index,
                        name: file.name,
                        size: file.length,
                        wanted: stats.get(index).is_none_or(|stat| stat.wanted),
                    })
                    .collect(),
            );
        }
        snapshot
    }
}

impl TransmissionDriver {
    pub fn new(config: &ClientConfig, http: Arc<HttpClient>) -> Self {
        let base = if config.url_base.is_some() {
            config.base_url()
        } else {
            format!("{}/{DEFAULT_RPC_BASE}", config.host.trim_end_matches('/'))
        };
        Self {
            name: config.name.clone(),
            endpoint: format!("{base}/rpc"),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
            session_id: Mutex::new(None),
        }
    }

    fn current_session(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls `method`, renegotiating the session id once on 409.
    fn rpc<T: DeserializeOwned + Default>(&self, method: &str, arguments: Value) -> Result<T> {
        let body = json!({ "method": method, "arguments": arguments });
        let what = format!("transmission {method}");

        for _ in 0..2 {
            let session = self.current_session();
            let response = self.http.send_raw(&what, |client| {
                let mut request = client.post(&self.endpoint).json(&body);
                if let Some(user) = &self.username {
                    request = request.basic_auth(user, self.password.as_deref());
                }
                if let Some(id) = &session {
                    request = request.header(SESSION_HEADER, id);
                }
                request
            })?;

            if response.status() == StatusCode::CONFLICT {
                let id = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                tracing::debug!("{} issued a new session id", self.name);
                *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = id;
                continue;
            }

            let envelope: RpcResponse<T> = check_status(response)?.json()?;
            if envelope.result != "success" {
                return Err(AppError::Protocol {
                    client: self.name.clone(),
                    message: format!("{method}: {}", envelope.result),
                });
            }
            return Ok(envelope.arguments.unwrap_or_default());
        }

        Err(AppError::Protocol {
            client: self.name.clone(),
            message: "session id negotiation failed".to_string(),
        })
    }

    fn get(&self, hash: Option<&str>, fields: &[&str]) -> Result<Vec<TorrentInfo>> {
        let mut arguments = json!({ "fields": fields });
        if let Some(hash) = hash {
            arguments["ids"] = json!([hash]);
        }
        let list: TorrentList = self.rpc("torrent-get", arguments)?;
        Ok(list.torrents)
    }

    fn find(&self, hash: &str, fields: &[&str]) -> Result<TorrentInfo> {
        self.get(Some(hash), fields)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(hash.to_string()))
    }
}

impl DownloadClientDriver for TransmissionDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn client_type(&self) -> ClientType {
        ClientType::Transmission
    }

    fn login(&self) -> Result<()> {
        self.rpc::<Value>("session-get", json!({ "fields": ["version"] }))?;
        tracing::debug!("Connected to Transmission {}", self.name);
        Ok(())
    }

    fn torrent(&self, hash: &str) -> Result<Option<TorrentSnapshot>> {
        let hash = hash.to_lowercase();
        let fields: Vec<&str> = SUMMARY_FIELDS.iter().chain(FILE_FIELDS).copied().collect();
        Ok(self
            .get(Some(&hash), &fields)?
            .into_iter()
            .next()
            .map(TorrentInfo::into_snapshot))
    }

    fn set_files_unwanted(&self, hash: &str, file_indexes: &[usize]) -> Result<()> {
        self.rpc::<Value>(
            "torrent-set",
            json!({ "ids": [hash.to_lowercase()], "files-unwanted": file_indexes }),
        )?;
        Ok(())
    }

    fn delete(&self, hash: &str) -> Result<()> {
        self.rpc::<Value>(
            "torrent-remove",
            json!({ "ids": [hash.to_lowercase()], "delete-local-data": true }),
        )?;
        Ok(())
    }

    fn seeding_torrents(&self) -> Result<Vec<TorrentSnapshot>> {
        Ok(self
            .get(None, SUMMARY_FIELDS)?
            .into_iter()
            .filter(TorrentInfo::is_complete)
            .map(TorrentInfo::into_snapshot)
            .collect())
    }

    fn change_category(&self, hash: &str, category: &str, use_tag: bool) -> Result<()> {
        let hash = hash.to_lowercase();
        let info = self.find(&hash, &["labels", "downloadDir"])?;

        if use_tag {
            let mut labels = info.labels;
            if !labels.iter().any(|label| label.eq_ignore_ascii_case(category)) {
                labels.push(category.to_string());
            }
            self.rpc::<Value>("torrent-set", json!({ "ids": [hash], "labels": labels }))?;
            return Ok(());
        }

        // Categories are sibling directories of the current download dir
        let current = PathBuf::from(&info.download_dir);
        let location = current
            .parent()
            .map_or_else(|| PathBuf::from(category), |parent| parent.join(category));
        self.rpc::<Value>(
            "torrent-set-location",
            json!({ "ids": [hash], "location": location, "move": true }),
        )?;
        Ok(())
    }
}
