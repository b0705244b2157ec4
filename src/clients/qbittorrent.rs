use super::{DownloadClientDriver, TorrentFile, TorrentSnapshot, TorrentState};
use crate::config::{ClientConfig, ClientType};
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// qBittorrent reports this ETA for "never".
const INFINITE_ETA: i64 = 8_640_000;

/// qBittorrent Web API v2 driver. Authenticates with the `SID` session cookie.
pub struct QbittorrentDriver {
    name: String,
    base_url: String,
    username: String,
    password: String,
    http: Arc<HttpClient>,
    sid: Mutex<Option<String>>,
    logged_in: AtomicBool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentInfo {
    hash: String,
    name: String,
    state: String,
    size: i64,
    downloaded: i64,
    dlspeed: i64,
    eta: i64,
    category: String,
    tags: String,
    ratio: f64,
    seeding_time: Option<i64>,
    content_path: Option<String>,
    private: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentProperties {
    is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    index: Option<usize>,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    priority: i64,
}

#[derive(Debug, Deserialize)]
struct TrackerEntry {
    url: String,
}

fn map_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" => TorrentState::Downloading,
        "stalledDL" => TorrentState::Stalled,
        "metaDL" | "forcedMetaDL" => TorrentState::FetchingMetadata,
        "uploading" | "stalledUP" | "forcedUP" | "queuedUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "queuedDL" | "allocating" => TorrentState::Queued,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        _ => TorrentState::Other,
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Extracts the `SID` value from `Set-Cookie` headers.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| lazy_regex::regex_captures!(r"(?:^|;\s*)SID=([^;]+)", value))
        .map(|(_, sid)| sid.to_string())
}

impl TorrentInfo {
    fn into_snapshot(self) -> TorrentSnapshot {
        let mut snapshot = TorrentSnapshot::new(self.hash.to_lowercase(), self.name);
        snapshot.state = map_state(&self.state);
        snapshot.size = non_negative(self.size);
        snapshot.downloaded = non_negative(self.downloaded);
        snapshot.download_speed = non_negative(self.dlspeed);
        snapshot.eta = (self.eta >= 0 && self.eta < INFINITE_ETA).then_some(self.eta as u64);
        snapshot.is_private = self.private.unwrap_or(false);
        snapshot.category = Some(self.category).filter(|c| !c.is_empty());
        snapshot.tags = self
            .tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string)
            .collect();
        snapshot.ratio = self.ratio;
        snapshot.seeding_time = self
            .seeding_time
            .map(|secs| Duration::from_secs(non_negative(secs)));
        snapshot.content_path = self.content_path.filter(|p| !p.is_empty()).map(PathBuf::from);
        snapshot
    }
}

impl QbittorrentDriver {
    pub fn new(config: &ClientConfig, http: Arc<HttpClient>) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url(),
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            http,
            sid: Mutex::new(None),
            logged_in: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base_url)
    }

    fn sid(&self) -> Option<String> {
        self.sid.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sends an authenticated request, logging in again once on 401/403.
    fn call<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login()?;
        }

        let with_session = |client: &Client| {
            let request = build(client);
            match self.sid() {
                Some(sid) => request.header(COOKIE, format!("SID={sid}")),
                None => request,
            }
        };

        match self.http.send(what, &with_session) {
            Err(e) if e.is_unauthorized() => {
                tracing::debug!("{} session expired, logging in again", self.name);
                self.login()?;
                self.http.send(what, &with_session)
            }
            other => other,
        }
    }

    fn info(&self, query: &[(&str, &str)]) -> Result<Vec<TorrentInfo>> {
        let url = self.url("torrents/info");
        Ok(self
            .call("qbittorrent torrents/info", |client| client.get(&url).query(query))?
            .json()?)
    }

    fn properties(&self, hash: &str) -> Result<TorrentProperties> {
        let url = self.url("torrents/properties");
        Ok(self
            .call("qbittorrent torrents/properties", |client| {
                client.get(&url).query(&[("hash", hash)])
            })?
            .json()?)
    }

    fn files(&self, hash: &str) -> Result<Vec<TorrentFile>> {
        let url = self.url("torrents/files");
        let entries: Vec<FileEntry> = self
            .call("qbittorrent torrents/files", |client| {
                client.get(&url).query(&[("hash", hash)])
            })?
            .json()?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| TorrentFile {
                index: entry.index.unwrap_or(position),
                name: entry.name,
                size: entry.size,
                wanted: entry.priority != 0,
            })
            .collect())
    }

    fn trackers(&self, hash: &str) -> Result<Vec<String>> {
        let url = self.url("torrents/trackers");
        let entries: Vec<TrackerEntry> = self
            .call("qbittorrent torrents/trackers", |client| {
                client.get(&url).query(&[("hash", hash)])
            })?
            .json()?;
        Ok(entries
            .into_iter()
            .map(|tracker| tracker.url)
            .filter(|url| url.contains("://"))
            .collect())
    }

    fn post_form(&self, what: &str, path: &str, form: &[(&str, &str)]) -> Result<()> {
        let url = self.url(path);
        self.call(what, |client| client.post(&url).form(form))?;
        Ok(())
    }
}

impl DownloadClientDriver for QbittorrentDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn client_type(&self) -> ClientType {
        ClientType::Qbittorrent
    }

    fn login(&self) -> Result<()> {
        let url = self.url("auth/login");
        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self.http.send("qbittorrent login", |client| {
            client.post(&url).header(REFERER, &self.base_url).form(&form)
        })?;

        let sid = session_cookie(&response);
        let body = response.text()?;
        if body.trim().eq_ignore_ascii_case("fails.") {
            return Err(AppError::Unauthorized { url });
        }

        *self.sid.lock().unwrap_or_else(PoisonError::into_inner) = sid;
        self.logged_in.store(true, Ordering::SeqCst);
        tracing::debug!("Logged in to qBittorrent {}", self.name);
        Ok(())
    }

    fn torrent(&self, hash: &str) -> Result<Option<TorrentSnapshot>> {
        let hash = hash.to_lowercase();
        let Some(info) = self.info(&[("hashes", hash.as_str())])?.into_iter().next() else {
            return Ok(None);
        };

        let private_flag = info.private;
        let mut snapshot = info.into_snapshot();
        if private_flag.is_none() {
            snapshot.is_private = self.properties(&hash)?.is_private.unwrap_or(false);
        }
        snapshot.files = Some(self.files(&hash)?);
        snapshot.trackers = self.trackers(&hash)?;
        Ok(Some(snapshot))
    }

    fn set_files_unwanted(&self, hash: &str, file_indexes: &[usize]) -> Result<()> {
        let hash = hash.to_lowercase();
        let ids = file_indexes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        self.post_form(
            "qbittorrent torrents/filePrio",
            "torrents/filePrio",
            &[("hash", hash.as_str()), ("id", ids.as_str()), ("priority", "0")],
        )
    }

    fn delete(&self, hash: &str) -> Result<()> {
        let hash = hash.to_lowercase();
        self.post_form(
            "qbittorrent torrents/delete",
            "torrents/delete",
            &[("hashes", hash.as_str()), ("deleteFiles", "true")],
        )
    }

    fn seeding_torrents(&self) -> Result<Vec<TorrentSnapshot>> {
        let infos = self.info(&[("filter", "completed")])?;
        let mut snapshots = Vec::with_capacity(infos.len());
        for info in infos {
            let private_flag = info.private;
            let mut snapshot = info.into_snapshot();
            if private_flag.is_none() {
                snapshot.is_private = self.properties(&snapshot.hash)?.is_private.unwrap_or(false);
            }
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn change_category(&self, hash: &str, category: &str, use_tag: bool) -> Result<()> {
        let hash = hash.to_lowercase();
        if use_tag {
            return self.post_form(
                "qbittorrent torrents/addTags",
                "torrents/addTags",
                &[("hashes", hash.as_str()), ("tags", category)],
            );
        }

        match self.post_form(
            "qbittorrent torrents/createCategory",
            "torrents/createCategory",
            &[("category", category)],
        ) {
            // 409: category already exists
            Ok(()) | Err(AppError::Status { status: 409, .. }) => {}
            Err(e) => return Err(e),
        }

        self.post_form(
            "qbittorrent torrents/setCategory",
            "torrents/setCategory",
            &[("hashes", hash.as_str()), ("category", category)],
        )
    }
}
