//! In-memory arr and torrent-client doubles for unit and cycle tests.

use crate::arr::{self, ArrClient, QueuePage, QueueRecord, SearchItem};
use crate::clients::{DeleteReason, DownloadClientDriver, TorrentFile, TorrentSnapshot, TorrentState};
use crate::config::{ArrInstance, ClientConfig, ClientType};
use crate::context::InstanceType;
use crate::error::{AppError, Result};
use crate::factory::ClientFactory;
use crate::http::HttpClient;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn instance(name: &str) -> ArrInstance {
    ArrInstance {
        name: name.to_string(),
        url: format!("http://{name}:8989"),
        api_key: "key".to_string(),
        enabled: true,
    }
}

/// Queue record valid for every arr flavour.
pub fn record(id: i64, download_id: &str, protocol: &str) -> QueueRecord {
    QueueRecord {
        id,
        download_id: download_id.to_string(),
        title: format!("Title {id}"),
        protocol: protocol.to_string(),
        series_id: Some(id),
        episode_id: Some(id),
        season_number: Some(1),
        movie_id: Some(id),
        artist_id: Some(id),
        album_id: Some(id),
        author_id: Some(id),
        book_id: Some(id),
        status: "downloading".to_string(),
        tracked_download_status: "ok".to_string(),
        tracked_download_state: "downloading".to_string(),
        ..QueueRecord::default()
    }
}

pub fn torrent(hash: &str, state: TorrentState) -> TorrentSnapshot {
    let mut snapshot = TorrentSnapshot::new(hash, format!("Torrent {hash}"));
    snapshot.state = state;
    snapshot.size = 1000;
    snapshot
}

pub fn torrent_with_files(hash: &str, state: TorrentState, files: &[(&str, bool)]) -> TorrentSnapshot {
    let mut snapshot = torrent(hash, state);
    snapshot.files = Some(
        files
            .iter()
            .enumerate()
            .map(|(index, (name, wanted))| TorrentFile {
                index,
                name: (*name).to_string(),
                size: 100,
                wanted: *wanted,
            })
            .collect(),
    );
    snapshot
}

fn injected_failure(what: &str) -> AppError {
    AppError::Status {
        status: 503,
        url: format!("fake://{what}"),
    }
}

pub struct FakeArrClient {
    instance_type: InstanceType,
    queue: Mutex<Vec<QueueRecord>>,
    pages: Mutex<Vec<u32>>,
    deletions: Mutex<Vec<(Vec<i64>, bool, DeleteReason)>>,
    searches: Mutex<Vec<SearchItem>>,
    fail_queue: AtomicBool,
}

impl FakeArrClient {
    pub fn new(instance_type: InstanceType, queue: Vec<QueueRecord>) -> Self {
        Self {
            instance_type,
            queue: Mutex::new(queue),
            pages: Mutex::new(Vec::new()),
            deletions: Mutex::new(Vec::new()),
            searches: Mutex::new(Vec::new()),
            fail_queue: AtomicBool::new(false),
        }
    }

    pub fn set_queue(&self, queue: Vec<QueueRecord>) {
        *self.queue.lock().unwrap() = queue;
    }

    pub fn fail_queue(&self) {
        self.fail_queue.store(true, Ordering::SeqCst);
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.pages.lock().unwrap().clone()
    }

    pub fn deletions(&self) -> Vec<(Vec<i64>, bool, DeleteReason)> {
        self.deletions.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<SearchItem> {
        self.searches.lock().unwrap().clone()
    }
}

impl ArrClient for FakeArrClient {
    fn instance_type(&self) -> InstanceType {
        self.instance_type
    }

    fn queue_page(&self, _instance: &ArrInstance, page: u32, page_size: u32) -> Result<QueuePage> {
        self.pages.lock().unwrap().push(page);
        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(injected_failure("queue"));
        }

        let queue = self.queue.lock().unwrap();
        let start = ((page - 1) * page_size) as usize;
        let records = queue
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(QueuePage {
            page,
            page_size,
            total_records: queue.len() as u32,
            records,
        })
    }

    fn delete_queue_items(
        &self,
        _instance: &ArrInstance,
        record_ids: &[i64],
        remove_from_client: bool,
        reason: DeleteReason,
    ) -> Result<()> {
        self.deletions
            .lock()
            .unwrap()
            .push((record_ids.to_vec(), remove_from_client, reason));
        self.queue
            .lock()
            .unwrap()
            .retain(|record| !record_ids.contains(&record.id));
        Ok(())
    }

    fn search(&self, _instance: &ArrInstance, item: &SearchItem) -> Result<()> {
        self.searches.lock().unwrap().push(item.clone());
        Ok(())
    }

    fn is_record_valid(&self, record: &QueueRecord) -> bool {
        arr::record_is_valid(self.instance_type, record)
    }

    fn search_item(&self, records: &[QueueRecord]) -> Option<SearchItem> {
        arr::search_item_for(self.instance_type, records)
    }
}

pub struct FakeDriver {
    name: String,
    torrents: Mutex<Vec<TorrentSnapshot>>,
    unwanted: Mutex<Vec<(String, Vec<usize>)>>,
    deleted: Mutex<Vec<String>>,
    categories: Mutex<Vec<(String, String, bool)>>,
    logins: AtomicUsize,
    fail_login: AtomicBool,
    fail_mutations: AtomicBool,
}

impl FakeDriver {
    pub fn new(name: &str, torrents: Vec<TorrentSnapshot>) -> Self {
        Self {
            name: name.to_string(),
            torrents: Mutex::new(torrents),
            unwanted: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            categories: Mutex::new(Vec::new()),
            logins: AtomicUsize::new(0),
            fail_login: AtomicBool::new(false),
            fail_mutations: AtomicBool::new(false),
        }
    }

    /// Replaces the stored torrent with the same hash, or adds it.
    pub fn replace(&self, snapshot: TorrentSnapshot) {
        let mut torrents = self.torrents.lock().unwrap();
        torrents.retain(|t| !t.hash.eq_ignore_ascii_case(&snapshot.hash));
        torrents.push(snapshot);
    }

    pub fn fail_login(&self) {
        self.fail_login.store(true, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn unwanted_calls(&self) -> Vec<(String, Vec<usize>)> {
        self.unwanted.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn category_changes(&self) -> Vec<(String, String, bool)> {
        self.categories.lock().unwrap().clone()
    }

    fn check_mutation(&self, what: &str) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(injected_failure(what));
        }
        Ok(())
    }
}

impl DownloadClientDriver for FakeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn client_type(&self) -> ClientType {
        ClientType::Qbittorrent
    }

    fn login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized {
                url: format!("fake://{}/login", self.name),
            });
        }
        Ok(())
    }

    fn torrent(&self, hash: &str) -> Result<Option<TorrentSnapshot>> {
        Ok(self
            .torrents
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    fn set_files_unwanted(&self, hash: &str, file_indexes: &[usize]) -> Result<()> {
        self.check_mutation("files")?;
        self.unwanted
            .lock()
            .unwrap()
            .push((hash.to_string(), file_indexes.to_vec()));

        let mut torrents = self.torrents.lock().unwrap();
        if let Some(files) = torrents
            .iter_mut()
            .find(|t| t.hash.eq_ignore_ascii_case(hash))
            .and_then(|t| t.files.as_mut())
        {
            for file in files.iter_mut().filter(|f| file_indexes.contains(&f.index)) {
                file.wanted = false;
            }
        }
        Ok(())
    }

    fn delete(&self, hash: &str) -> Result<()> {
        self.check_mutation("delete")?;
        self.deleted.lock().unwrap().push(hash.to_string());
        self.torrents
            .lock()
            .unwrap()
            .retain(|t| !t.hash.eq_ignore_ascii_case(hash));
        Ok(())
    }

    fn seeding_torrents(&self) -> Result<Vec<TorrentSnapshot>> {
        Ok(self
            .torrents
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.state == TorrentState::Seeding)
            .cloned()
            .collect())
    }

    fn change_category(&self, hash: &str, category: &str, use_tag: bool) -> Result<()> {
        self.check_mutation("category")?;
        self.categories
            .lock()
            .unwrap()
            .push((hash.to_string(), category.to_string(), use_tag));

        let mut torrents = self.torrents.lock().unwrap();
        if let Some(snapshot) = torrents.iter_mut().find(|t| t.hash.eq_ignore_ascii_case(hash)) {
            if use_tag {
                snapshot.tags.push(category.to_string());
            } else {
                snapshot.category = Some(category.to_string());
            }
        }
        Ok(())
    }
}

/// Hands out pre-built fakes instead of network clients.
#[derive(Default)]
pub struct FakeFactory {
    arr: Mutex<HashMap<InstanceType, Arc<FakeArrClient>>>,
    drivers: Mutex<HashMap<String, Arc<FakeDriver>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arr(self, client: Arc<FakeArrClient>) -> Self {
        self.arr.lock().unwrap().insert(client.instance_type, client);
        self
    }

    pub fn with_driver(self, driver: Arc<FakeDriver>) -> Self {
        self.drivers
            .lock()
            .unwrap()
            .insert(driver.name.clone(), driver);
        self
    }
}

impl ClientFactory for FakeFactory {
    fn arr_client(&self, instance_type: InstanceType, _http: &Arc<HttpClient>) -> Arc<dyn ArrClient> {
        let client = Arc::clone(
            self.arr
                .lock()
                .unwrap()
                .entry(instance_type)
                .or_insert_with(|| Arc::new(FakeArrClient::new(instance_type, Vec::new()))),
        );
        client
    }

    fn download_client(
        &self,
        config: &ClientConfig,
        _http: &Arc<HttpClient>,
    ) -> Result<Arc<dyn DownloadClientDriver>> {
        let driver = self
            .drivers
            .lock()
            .unwrap()
            .get(&config.name)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("No fake driver named {}", config.name)))?;
        Ok(driver)
    }
}
