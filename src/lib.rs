#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod arr;
pub mod blocklist;
pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod content_blocker;
pub mod context;
pub mod download_cleaner;
pub mod error;
pub mod events;
pub mod executor;
pub mod factory;
pub mod hardlinks;
pub mod http;
pub mod lock;
pub mod markers;
pub mod queue_cleaner;
pub mod removal;
pub mod strikes;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use arr::{ArrClient, ArrQueueIterator, QueuePage, QueueRecord, SearchItem};
pub use blocklist::{Blocklist, BlocklistProvider, PatternSet};
pub use cli::{Cli, Commands, LogFormat, default_config_path};
pub use clients::{
    DeleteReason, DownloadCheckResult, DownloadClientDriver, DownloadInspector, TorrentSnapshot,
    TorrentState,
};
pub use config::{ConfigError, SweepConfig, load_snapshot};
pub use context::{ExecutionContext, InstanceType};
pub use error::{AppError, Result};
pub use events::{EventRecord, EventSink, EventType, MemoryEventSink, TracingEventSink};
pub use executor::{Command, Executor};
pub use factory::{ClientFactory, HttpClientFactory};
pub use http::{HttpClient, HttpSettings, RetryPolicy};
pub use lock::InstanceLockGuard;
pub use markers::RemovalMarkers;
pub use removal::{RemovalQueue, RemovalRequest};
pub use strikes::{StrikeTracker, StrikeType};
pub use sweeper::{CycleReport, Sweeper};
