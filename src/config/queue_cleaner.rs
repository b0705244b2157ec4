use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueCleanerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub failed_import: FailedImportConfig,

    #[serde(default)]
    pub stalled: StalledConfig,

    #[serde(default)]
    pub slow: SlowConfig,
}

/// Failed-import handling, driven by the arr instance's own tracked state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailedImportConfig {
    /// Strikes before removal, 0 disables
    #[serde(default)]
    pub max_strikes: u32,

    #[serde(default)]
    pub ignore_private: bool,

    #[serde(default)]
    pub delete_private: bool,

    /// Status message fragments that exempt an item from failed-import strikes
    #[serde(default)]
    pub ignored_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StalledConfig {
    /// Strikes before removal, 0 disables
    #[serde(default)]
    pub max_strikes: u32,

    #[serde(default)]
    pub reset_strikes_on_progress: bool,

    #[serde(default)]
    pub ignore_private: bool,

    #[serde(default)]
    pub delete_private: bool,

    /// Strikes for items stuck fetching metadata, 0 disables
    #[serde(default)]
    pub downloading_metadata_max_strikes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlowConfig {
    /// Strikes before removal, 0 disables
    #[serde(default)]
    pub max_strikes: u32,

    #[serde(default)]
    pub reset_strikes_on_progress: bool,

    #[serde(default)]
    pub ignore_private: bool,

    #[serde(default)]
    pub delete_private: bool,

    /// Minimum acceptable download speed in KB/s, 0 disables
    #[serde(default)]
    pub min_speed_kbps: u64,

    /// Maximum acceptable estimated completion time in hours, 0 disables
    #[serde(default)]
    pub max_time_hours: f64,

    /// Items larger than this are never checked for speed, 0 disables the cap
    #[serde(default)]
    pub ignore_above_size_mb: u64,
}

impl SlowConfig {
    pub const fn min_speed_bytes(&self) -> u64 {
        self.min_speed_kbps * 1024
    }

    pub fn max_time_secs(&self) -> u64 {
        (self.max_time_hours * 3600.0) as u64
    }

    pub const fn ignore_above_size_bytes(&self) -> Option<u64> {
        if self.ignore_above_size_mb == 0 {
            None
        } else {
            Some(self.ignore_above_size_mb * 1024 * 1024)
        }
    }
}
