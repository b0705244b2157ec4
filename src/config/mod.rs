mod arr;
mod content_blocker;
mod download_cleaner;
mod download_client;
mod error;
mod general;
mod queue_cleaner;

pub use arr::{ArrConfig, ArrInstance};
pub use content_blocker::{BlocklistSettings, BlocklistType, ContentBlockerConfig};
pub use download_cleaner::{CleanReason, DownloadCleanerConfig, SeedingCategory, UnlinkedConfig};
pub use download_client::{ClientConfig, ClientType};
pub use error::{ConfigError, Result};
pub use general::GeneralConfig;
pub use queue_cleaner::{FailedImportConfig, QueueCleanerConfig, SlowConfig, StalledConfig};

use crate::context::InstanceType;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

const MAX_STRIKES_LIMIT: u32 = 100;

/// Serializes snapshot loads so a half-written config is never observed.
static CONFIG_LOCK: Mutex<()> = Mutex::new(());

/// Immutable configuration snapshot consumed by one cycle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub queue_cleaner: QueueCleanerConfig,

    #[serde(default)]
    pub content_blocker: ContentBlockerConfig,

    #[serde(default)]
    pub download_cleaner: DownloadCleanerConfig,

    #[serde(default)]
    pub sonarr: ArrConfig,

    #[serde(default)]
    pub radarr: ArrConfig,

    #[serde(default)]
    pub lidarr: ArrConfig,

    #[serde(default)]
    pub readarr: ArrConfig,

    #[serde(default)]
    pub download_clients: Vec<ClientConfig>,
}

impl SweepConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub const fn arr(&self, instance_type: InstanceType) -> &ArrConfig {
        match instance_type {
            InstanceType::Sonarr => &self.sonarr,
            InstanceType::Radarr => &self.radarr,
            InstanceType::Lidarr => &self.lidarr,
            InstanceType::Readarr => &self.readarr,
        }
    }

    /// Failed-import threshold for a media-manager type after overrides.
    pub fn failed_import_max_strikes(&self, instance_type: InstanceType) -> u32 {
        self.arr(instance_type)
            .failed_import_max_strikes(self.queue_cleaner.failed_import.max_strikes)
    }

    pub fn enabled_clients(&self) -> impl Iterator<Item = &ClientConfig> {
        self.download_clients.iter().filter(|client| client.enabled)
    }

    fn validate(&self) -> Result<()> {
        let queue = &self.queue_cleaner;
        for (field, value) in [
            ("queue_cleaner.failed_import.max_strikes", queue.failed_import.max_strikes),
            ("queue_cleaner.stalled.max_strikes", queue.stalled.max_strikes),
            (
                "queue_cleaner.stalled.downloading_metadata_max_strikes",
                queue.stalled.downloading_metadata_max_strikes,
            ),
            ("queue_cleaner.slow.max_strikes", queue.slow.max_strikes),
        ] {
            if value > MAX_STRIKES_LIMIT {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must be at most {MAX_STRIKES_LIMIT}, got {value}"),
                });
            }
        }

        if queue.slow.max_time_hours < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_cleaner.slow.max_time_hours".to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let mut client_names = HashSet::new();
        for client in &self.download_clients {
            if !client_names.insert(&client.name) {
                return Err(ConfigError::DuplicateClientName {
                    name: client.name.clone(),
                });
            }
            if client.host.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    section: format!("download_clients.{}", client.name),
                    field: "host".to_string(),
                });
            }
        }

        for instance_type in InstanceType::ALL {
            let arr = self.arr(instance_type);
            if arr.failed_import_max_strikes > MAX_STRIKES_LIMIT as i32 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{instance_type}.failed_import_max_strikes"),
                    reason: format!("must be at most {MAX_STRIKES_LIMIT}"),
                });
            }

            let mut names = HashSet::new();
            for instance in &arr.instances {
                if !names.insert(&instance.name) {
                    return Err(ConfigError::DuplicateInstanceName {
                        instance_type: instance_type.to_string(),
                        name: instance.name.clone(),
                    });
                }
                for (field, value) in [("url", &instance.url), ("api_key", &instance.api_key)] {
                    if value.trim().is_empty() {
                        return Err(ConfigError::MissingField {
                            section: format!("{instance_type}.{}", instance.name),
                            field: field.to_string(),
                        });
                    }
                }
            }

            let blocklist = self.content_blocker.blocklist(instance_type);
            if blocklist.enabled && !blocklist.is_active() {
                return Err(ConfigError::BlocklistPathMissing {
                    instance_type: instance_type.to_string(),
                });
            }
        }

        for category in &self.download_cleaner.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::InvalidSeedingCategory {
                    name: category.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if category.max_seed_time_hours >= 0.0
                && category.max_seed_time_hours < category.min_seed_time_hours
            {
                return Err(ConfigError::InvalidSeedingCategory {
                    name: category.name.clone(),
                    reason: "max_seed_time_hours is lower than min_seed_time_hours".to_string(),
                });
            }
        }

        let unlinked = &self.download_cleaner.unlinked;
        if unlinked.enabled {
            if unlinked.target_category.trim().is_empty() {
                return Err(ConfigError::UnlinkedMisconfigured {
                    reason: "target_category must not be empty".to_string(),
                });
            }
            if unlinked.categories.is_empty() {
                return Err(ConfigError::UnlinkedMisconfigured {
                    reason: "at least one category must be listed".to_string(),
                });
            }
            if let Some(root) = &unlinked.ignored_root_dir
                && !root.is_dir()
            {
                return Err(ConfigError::UnlinkedMisconfigured {
                    reason: format!("ignored_root_dir {} is not a directory", root.display()),
                });
            }
        }

        Ok(())
    }
}

/// Loads and validates a snapshot while holding the process-wide config lock.
pub fn load_snapshot(path: &Path) -> Result<Arc<SweepConfig>> {
    let _guard = CONFIG_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    tracing::debug!("Loading configuration snapshot from {}", path.display());
    SweepConfig::from_file(path).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
general:
  dry_run: true
  search_delay_secs: 5
  ignored_downloads: ["abcdef", "tracker.example.org"]

queue_cleaner:
  enabled: true
  failed_import:
    max_strikes: 3
  stalled:
    max_strikes: 5
    reset_strikes_on_progress: true
  slow:
    max_strikes: 3
    min_speed_kbps: 50

content_blocker:
  enabled: true
  sonarr:
    enabled: true
    path: /config/blocklist.txt

download_cleaner:
  enabled: true
  categories:
    - name: tv-sonarr
      max_ratio: 2
      min_seed_time_hours: 24
      max_seed_time_hours: 240

sonarr:
  instances:
    - name: main
      url: http://sonarr:8989
      api_key: key1
radarr:
  failed_import_max_strikes: 5
  instances:
    - name: main
      url: http://radarr:7878
      api_key: key2

download_clients:
  - name: qbit
    type: qbittorrent
    host: http://qbit:8080
    username: admin
    password: adminadmin
  - name: deluge
    type: deluge
    host: http://deluge:8112
    password: deluge
    enabled: false
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config = SweepConfig::from_yaml(FULL_CONFIG).unwrap();
        assert!(config.general.dry_run);
        assert_eq!(config.sonarr.instances.len(), 1);
        assert_eq!(config.download_clients.len(), 2);
        assert_eq!(config.enabled_clients().count(), 1);
        assert_eq!(config.failed_import_max_strikes(InstanceType::Sonarr), 3);
        assert_eq!(config.failed_import_max_strikes(InstanceType::Radarr), 5);
        assert!(config.content_blocker.is_active_for(InstanceType::Sonarr));
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = SweepConfig::from_yaml("{}").unwrap();
        assert!(!config.queue_cleaner.enabled);
        assert!(config.download_clients.is_empty());
    }

    #[test]
    fn test_from_file_valid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = SweepConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.radarr.instances[0].name, "main");
    }

    #[test]
    fn test_load_snapshot() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let snapshot = load_snapshot(temp_file.path()).unwrap();
        assert!(snapshot.queue_cleaner.enabled);
    }

    #[test]
    fn test_from_file_not_found() {
        let result = SweepConfig::from_file(Path::new("/nonexistent.yaml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"invalid: yaml: content:").unwrap();

        let result = SweepConfig::from_file(temp_file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_duplicate_client_names() {
        let yaml = r"
download_clients:
  - name: a
    type: qbittorrent
    host: http://one
  - name: a
    type: transmission
    host: http://two
";
        match SweepConfig::from_yaml(yaml).unwrap_err() {
            ConfigError::DuplicateClientName { name } => assert_eq!(name, "a"),
            other => panic!("Expected DuplicateClientName, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_duplicate_instance_names() {
        let yaml = r"
lidarr:
  instances:
    - name: music
      url: http://a
      api_key: x
    - name: music
      url: http://b
      api_key: y
";
        match SweepConfig::from_yaml(yaml).unwrap_err() {
            ConfigError::DuplicateInstanceName {
                instance_type,
                name,
            } => {
                assert_eq!(instance_type, "lidarr");
                assert_eq!(name, "music");
            }
            other => panic!("Expected DuplicateInstanceName, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_missing_api_key() {
        let yaml = r#"
readarr:
  instances:
    - name: books
      url: http://readarr
      api_key: ""
"#;
        assert!(matches!(
            SweepConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::MissingField { .. }
        ));
    }

    #[test]
    fn test_validate_blocklist_without_path() {
        let yaml = r"
content_blocker:
  enabled: true
  radarr:
    enabled: true
";
        assert!(matches!(
            SweepConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::BlocklistPathMissing { .. }
        ));
    }

    #[test]
    fn test_validate_strike_limit() {
        let yaml = r"
queue_cleaner:
  stalled:
    max_strikes: 1000
";
        assert!(matches!(
            SweepConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_validate_seed_time_order() {
        let yaml = r"
download_cleaner:
  categories:
    - name: tv
      min_seed_time_hours: 48
      max_seed_time_hours: 24
";
        assert!(matches!(
            SweepConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidSeedingCategory { .. }
        ));
    }

    #[test]
    fn test_validate_unlinked_requires_categories() {
        let yaml = r"
download_cleaner:
  unlinked:
    enabled: true
";
        assert!(matches!(
            SweepConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::UnlinkedMisconfigured { .. }
        ));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(matches!(
            SweepConfig::from_yaml("tiers: []").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
