use serde::Deserialize;
use std::time::Duration;

/// Settings shared by every job in a cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Log every mutating action instead of performing it
    #[serde(default)]
    pub dry_run: bool,

    /// Ask the arr instance for a replacement after a removal (default: true)
    #[serde(default = "default_true")]
    pub search_enabled: bool,

    /// Pause after each triggered search, in seconds (default: 30)
    #[serde(default = "default_search_delay_secs")]
    pub search_delay_secs: u64,

    /// Hashes, categories, tags or tracker domains that are never touched
    #[serde(default)]
    pub ignored_downloads: Vec<String>,

    /// Per-request timeout, in seconds (default: 100)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Retries for transient network failures (default: 3)
    #[serde(default = "default_http_max_retries")]
    pub http_max_retries: u32,

    /// Reject invalid TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub http_validate_cert: bool,

    /// Lifetime of strikes and removal markers without activity (default: 7200)
    #[serde(default = "default_strike_ttl_secs")]
    pub strike_ttl_secs: u64,
}

impl GeneralConfig {
    pub const fn search_delay(&self) -> Duration {
        Duration::from_secs(self.search_delay_secs)
    }

    pub const fn strike_ttl(&self) -> Duration {
        Duration::from_secs(self.strike_ttl_secs)
    }

    /// Whether a download id appears verbatim in the ignore list.
    pub fn is_ignored_download(&self, download_id: &str) -> bool {
        self.ignored_downloads
            .iter()
            .any(|entry| entry.trim().eq_ignore_ascii_case(download_id))
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            search_enabled: true,
            search_delay_secs: default_search_delay_secs(),
            ignored_downloads: Vec::new(),
            http_timeout_secs: default_http_timeout_secs(),
            http_max_retries: default_http_max_retries(),
            http_validate_cert: true,
            strike_ttl_secs: default_strike_ttl_secs(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_search_delay_secs() -> u64 {
    30
}

const fn default_http_timeout_secs() -> u64 {
    100
}

const fn default_http_max_retries() -> u32 {
    3
}

const fn default_strike_ttl_secs() -> u64 {
    7200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_defaults() {
        let config: GeneralConfig = serde_yaml::from_str("{}").unwrap();
        assert!(!config.dry_run);
        assert!(config.search_enabled);
        assert_eq!(config.search_delay(), Duration::from_secs(30));
        assert_eq!(config.http_timeout_secs, 100);
        assert_eq!(config.http_max_retries, 3);
        assert!(config.http_validate_cert);
        assert_eq!(config.strike_ttl(), Duration::from_secs(7200));
    }

    #[test]
    fn test_ignored_download_match_is_case_insensitive() {
        let config: GeneralConfig = serde_yaml::from_str(
            r"
ignored_downloads:
  - ABCDEF0123
  - private-tracker.org
",
        )
        .unwrap();
        assert!(config.is_ignored_download("abcdef0123"));
        assert!(!config.is_ignored_download("abcdef"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<GeneralConfig, _> = serde_yaml::from_str("dryrun: true");
        assert!(result.is_err());
    }
}
