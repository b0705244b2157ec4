use crate::arr::QueueRecord;
use crate::config::SweepConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Media-manager flavour an arr instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Sonarr,
    Radarr,
    Lidarr,
    Readarr,
}

impl InstanceType {
    pub const ALL: [Self; 4] = [Self::Sonarr, Self::Radarr, Self::Lidarr, Self::Readarr];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sonarr => "sonarr",
            Self::Radarr => "radarr",
            Self::Lidarr => "lidarr",
            Self::Readarr => "readarr",
        }
    }

    /// REST API version segment used in `/api/v{n}/...`
    pub const fn api_version(self) -> u8 {
        match self {
            Self::Sonarr | Self::Radarr => 3,
            Self::Lidarr | Self::Readarr => 1,
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a nested decision needs to know about where it runs.
///
/// Passed by reference down the call chain instead of living in ambient state.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub instance_type: InstanceType,
    pub config: &'a SweepConfig,
    pub current_record: Option<&'a QueueRecord>,
    pub correlation_id: Uuid,
}

impl<'a> ExecutionContext<'a> {
    pub const fn new(instance_type: InstanceType, config: &'a SweepConfig, correlation_id: Uuid) -> Self {
        Self {
            instance_type,
            config,
            current_record: None,
            correlation_id,
        }
    }

    pub const fn with_record(mut self, record: &'a QueueRecord) -> Self {
        self.current_record = Some(record);
        self
    }

    /// Title of the record being processed, for log lines and events.
    pub fn record_title(&self) -> &str {
        self.current_record.map_or("", |record| record.title.as_str())
    }
}
