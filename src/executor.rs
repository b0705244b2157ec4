use crate::arr::{ArrClient, SearchItem};
use crate::clients::{DeleteReason, DownloadClientDriver};
use crate::config::ArrInstance;
use crate::error::Result;

/// A mutating call against an external service.
pub trait Command {
    /// Human readable form, used for logs and dry-run output
    fn describe(&self) -> String;

    fn execute(&self) -> Result<()>;
}

/// Runs commands, or only logs them in dry-run mode.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    dry_run: bool,
}

impl Executor {
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn run(&self, command: &dyn Command) -> Result<()> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would {}", command.describe());
            return Ok(());
        }
        tracing::debug!("Executing: {}", command.describe());
        command.execute()
    }
}

pub struct SetFilesUnwanted<'a> {
    pub driver: &'a dyn DownloadClientDriver,
    pub hash: &'a str,
    pub file_indexes: &'a [usize],
}

impl Command for SetFilesUnwanted<'_> {
    fn describe(&self) -> String {
        format!(
            "mark files {:?} of {} as unwanted in {}",
            self.file_indexes,
            self.hash,
            self.driver.name()
        )
    }

    fn execute(&self) -> Result<()> {
        self.driver.set_files_unwanted(self.hash, self.file_indexes)
    }
}

pub struct DeleteTorrent<'a> {
    pub driver: &'a dyn DownloadClientDriver,
    pub hash: &'a str,
    pub name: &'a str,
}

impl Command for DeleteTorrent<'_> {
    fn describe(&self) -> String {
        format!("delete {} ({}) from {}", self.name, self.hash, self.driver.name())
    }

    fn execute(&self) -> Result<()> {
        self.driver.delete(self.hash)
    }
}

pub struct ChangeCategory<'a> {
    pub driver: &'a dyn DownloadClientDriver,
    pub hash: &'a str,
    pub name: &'a str,
    pub category: &'a str,
    pub use_tag: bool,
}

impl Command for ChangeCategory<'_> {
    fn describe(&self) -> String {
        let target = if self.use_tag { "tag" } else { "category" };
        format!(
            "set {target} '{}' on {} in {}",
            self.category,
            self.name,
            self.driver.name()
        )
    }

    fn execute(&self) -> Result<()> {
        self.driver
            .change_category(self.hash, self.category, self.use_tag)
    }
}

pub struct DeleteQueueItems<'a> {
    pub client: &'a dyn ArrClient,
    pub instance: &'a ArrInstance,
    pub record_ids: &'a [i64],
    pub title: &'a str,
    pub remove_from_client: bool,
    pub reason: DeleteReason,
}

impl Command for DeleteQueueItems<'_> {
    fn describe(&self) -> String {
        format!(
            "remove {} from {} {} queue (records {:?}, reason: {}, remove from client: {})",
            self.title,
            self.client.instance_type(),
            self.instance.name,
            self.record_ids,
            self.reason,
            self.remove_from_client
        )
    }

    fn execute(&self) -> Result<()> {
        self.client.delete_queue_items(
            self.instance,
            self.record_ids,
            self.remove_from_client,
            self.reason,
        )
    }
}

pub struct TriggerSearch<'a> {
    pub client: &'a dyn ArrClient,
    pub instance: &'a ArrInstance,
    pub item: &'a SearchItem,
}

impl Command for TriggerSearch<'_> {
    fn describe(&self) -> String {
        format!(
            "search {:?} on {} {}",
            self.item,
            self.client.instance_type(),
            self.instance.name
        )
    }

    fn execute(&self) -> Result<()> {
        self.client.search(self.instance, self.item)
    }
}
