use super::{DownloadClientDriver, TorrentFile, TorrentSnapshot, TorrentState};
use crate::config::{ClientConfig, ClientType};
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Deluge rejects calls without a session with this error code.
const NOT_AUTHENTICATED: i64 = 1;

const STATUS_KEYS: &[&str] = &[
    "hash",
    "name",
    "state",
    "total_size",
    "total_done",
    "download_payload_rate",
    "eta",
    "private",
    "label",
    "trackers",
    "ratio",
    "seeding_time",
    "save_path",
    "is_finished",
];

const FILE_KEYS: &[&str] = &["files", "file_priorities"];

/// Deluge per-file priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FilePriority {
    Skip = 0,
    Low = 1,
    Normal = 4,
    High = 7,
}

impl FilePriority {
    fn from_raw(value: i64) -> Self {
        match value {
            0 => Self::Skip,
            1..=3 => Self::Low,
            4..=6 => Self::Normal,
            _ => Self::High,
        }
    }
}

/// Deluge Web UI JSON-RPC driver (`/json`), authenticated with the
/// `_session_id` cookie and bound to the first configured daemon.
pub struct DelugeDriver {
    name: String,
    endpoint: String,
    password: String,
    http: Arc<HttpClient>,
    session: Mutex<Option<String>>,
    logged_in: AtomicBool,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentStatus {
    hash: String,
    name: String,
    state: String,
    total_size: i64,
    total_done: i64,
    download_payload_rate: f64,
    eta: f64,
    private: bool,
    label: String,
    trackers: Vec<TrackerEntry>,
    ratio: f64,
    seeding_time: i64,
    save_path: String,
    is_finished: bool,
    files: Vec<FileEntry>,
    file_priorities: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrackerEntry {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileEntry {
    index: usize,
    path: String,
    size: u64,
}

impl TorrentStatus {
    fn state(&self) -> TorrentState {
        match self.state.as_str() {
            "Downloading" if self.total_size == 0 && self.files.is_empty() => {
                TorrentState::FetchingMetadata
            }
            "Downloading" if self.eta <= 0.0 => TorrentState::Stalled,
            "Downloading" => TorrentState::Downloading,
            "Seeding" => TorrentState::Seeding,
            "Paused" => TorrentState::Paused,
            "Queued" => TorrentState::Queued,
            "Checking" | "Allocating" | "Moving" => TorrentState::Checking,
            _ => TorrentState::Other,
        }
    }

    fn into_snapshot(self, hash: &str, with_files: bool) -> TorrentSnapshot {
        let hash = if self.hash.is_empty() {
            hash.to_lowercase()
        } else {
            self.hash.to_lowercase()
        };
        let state = self.state();
        let mut snapshot = TorrentSnapshot::new(hash, self.name.clone());
        snapshot.state = state;
        snapshot.size = u64::try_from(self.total_size).unwrap_or(0);
        snapshot.downloaded = u64::try_from(self.total_done).unwrap_or(0);
        snapshot.download_speed = self.download_payload_rate.max(0.0) as u64;
        snapshot.eta = (self.eta > 0.0).then_some(self.eta as u64);
        snapshot.is_private = self.private;
        snapshot.category = Some(self.label).filter(|label| !label.is_empty());
        snapshot.trackers = self.trackers.into_iter().map(|t| t.url).collect();
        snapshot.ratio = self.ratio;
        snapshot.seeding_time = Some(Duration::from_secs(
            u64::try_from(self.seeding_time).unwrap_or(0),
        ));
        if !self.save_path.is_empty() {
            snapshot.content_path = Some(PathBuf::from(&self.save_path).join(&self.name));
        }
        if with_files {
            let priorities = self.file_priorities;
            snapshot.files = Some(
                self.files
                    .into_iter()
                    .map(|file| {
                        let priority = priorities
                            .get(file.index)
                            .copied()
                            .unwrap_or(FilePriority::Normal as i64);
                        TorrentFile {
                            index: file.index,
                            name: file.path,
                            size: file.size,
                            wanted: FilePriority::from_raw(priority) != FilePriority::Skip,
                        }
                    })
                    .collect(),
            );
        }
        snapshot
    }
}

/// Extracts the `_session_id` value from `Set-Cookie` headers.
fn session_cookie(response: &reqwest::blocking::Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| lazy_regex::regex_captures!(r"(?:^|;\s*)_session_id=([^;]+)", value))
        .map(|(_, id)| id.to_string())
}

impl DelugeDriver {
    pub fn new(config: &ClientConfig, http: Arc<HttpClient>) -> Self {
        Self {
            name: config.name.clone(),
            endpoint: format!("{}/json", config.base_url()),
            password: config.password.clone().unwrap_or_default(),
            http,
            session: Mutex::new(None),
            logged_in: AtomicBool::new(false),
            request_id: AtomicU64::new(1),
        }
    }

    /// One JSON-RPC call without session recovery.
    fn rpc_once<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<Option<T>> {
        let body = json!({
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::SeqCst),
        });
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner).clone();

        let response = self.http.send(&format!("deluge {method}"), |client| {
            let request = client.post(&self.endpoint).json(&body);
            match &session {
                Some(id) => request.header(COOKIE, format!("_session_id={id}")),
                None => request,
            }
        })?;

        if let Some(id) = session_cookie(&response) {
            *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        }

        let envelope: RpcResponse<T> = response.json()?;
        match envelope.error {
            Some(error) if error.code == NOT_AUTHENTICATED => Err(AppError::Unauthorized {
                url: self.endpoint.clone(),
            }),
            Some(error) => Err(AppError::Protocol {
                client: self.name.clone(),
                message: format!("{method}: {}", error.message),
            }),
            None => Ok(envelope.result),
        }
    }

    /// JSON-RPC call that logs in first when needed and once more on an
    /// expired session.
    fn rpc<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<Option<T>> {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login()?;
        }
        match self.rpc_once(method, params) {
            Err(e) if e.is_unauthorized() => {
                tracing::debug!("{} session expired, logging in again", self.name);
                self.login()?;
                self.rpc_once(method, params)
            }
            other => other,
        }
    }

    /// Connects the Web UI to a daemon when it is not connected yet.
    fn ensure_connected(&self) -> Result<()> {
        let connected: Option<bool> = self.rpc_once("web.connected", &json!([]))?;
        if connected == Some(true) {
            return Ok(());
        }

        let hosts: Vec<Vec<Value>> = self
            .rpc_once("web.get_hosts", &json!([]))?
            .unwrap_or_default();
        let host_id = hosts
            .first()
            .and_then(|host| host.first())
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Protocol {
                client: self.name.clone(),
                message: "no daemon configured in the Web UI".to_string(),
            })?
            .to_string();

        self.rpc_once::<Value>("web.connect", &json!([host_id]))?;
        tracing::info!("Connected {} Web UI to daemon {host_id}", self.name);
        Ok(())
    }

    fn status(&self, hash: &str, keys: &[&str]) -> Result<Option<TorrentStatus>> {
        let status: Option<Value> = self.rpc("core.get_torrent_status", &json!([hash, keys]))?;
        match status {
            Some(Value::Object(map)) if !map.is_empty() => {
                Ok(Some(serde_json::from_value(Value::Object(map))?))
            }
            _ => Ok(None),
        }
    }
}

impl DownloadClientDriver for DelugeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn client_type(&self) -> ClientType {
        ClientType::Deluge
    }

    fn login(&self) -> Result<()> {
        let authenticated: Option<bool> = self.rpc_once("auth.login", &json!([self.password]))?;
        if authenticated != Some(true) {
            return Err(AppError::Unauthorized {
                url: self.endpoint.clone(),
            });
        }
        self.logged_in.store(true, Ordering::SeqCst);
        self.ensure_connected()?;
        tracing::debug!("Logged in to Deluge {}", self.name);
        Ok(())
    }

    fn torrent(&self, hash: &str) -> Result<Option<TorrentSnapshot>> {
        let hash = hash.to_lowercase();
        let keys: Vec<&str> = STATUS_KEYS.iter().chain(FILE_KEYS).copied().collect();
        Ok(self
            .status(&hash, &keys)?
            .map(|status| status.into_snapshot(&hash, true)))
    }

    fn set_files_unwanted(&self, hash: &str, file_indexes: &[usize]) -> Result<()> {
        let hash = hash.to_lowercase();
        let Some(status) = self.status(&hash, FILE_KEYS)? else {
            return Err(AppError::NotFound(hash));
        };

        let mut priorities = status.file_priorities;
        if priorities.len() < status.files.len() {
            priorities.resize(status.files.len(), FilePriority::Normal as i64);
        }
        for index in file_indexes {
            if let Some(priority) = priorities.get_mut(*index) {
                *priority = FilePriority::Skip as i64;
            }
        }

        self.rpc::<Value>(
            "core.set_torrent_options",
            &json!([[hash], { "file_priorities": priorities }]),
        )?;
        Ok(())
    }

    fn delete(&self, hash: &str) -> Result<()> {
        self.rpc::<Value>("core.remove_torrent", &json!([hash.to_lowercase(), true]))?;
        Ok(())
    }

    fn seeding_torrents(&self) -> Result<Vec<TorrentSnapshot>> {
        let all: HashMap<String, TorrentStatus> = self
            .rpc("core.get_torrents_status", &json!([{}, STATUS_KEYS]))?
            .unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|(_, status)| status.is_finished)
            .map(|(hash, status)| status.into_snapshot(&hash, false))
            .collect())
    }

    fn change_category(&self, hash: &str, category: &str, use_tag: bool) -> Result<()> {
        if use_tag {
            tracing::warn!("{} does not support tags, using label '{category}' instead", self.name);
        }

        let label = category.to_lowercase();
        match self.rpc::<Value>("label.add", &json!([label])) {
            Ok(_) => {}
            // label.add fails when the label already exists
            Err(AppError::Protocol { message, .. }) if message.contains("already exists") => {}
            Err(e) => return Err(e),
        }
        self.rpc::<Value>("label.set_torrent", &json!([hash.to_lowercase(), label]))?;
        Ok(())
    }
}
