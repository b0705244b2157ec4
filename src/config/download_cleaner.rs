use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadCleanerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Remove private torrents once they qualify
    #[serde(default)]
    pub delete_private: bool,

    #[serde(default)]
    pub categories: Vec<SeedingCategory>,

    #[serde(default)]
    pub unlinked: UnlinkedConfig,
}

impl DownloadCleanerConfig {
    pub fn category(&self, name: &str) -> Option<&SeedingCategory> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Seeding limits for one client category. Negative values disable a limit.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SeedingCategory {
    pub name: String,

    #[serde(default = "disabled")]
    pub max_ratio: f64,

    #[serde(default)]
    pub min_seed_time_hours: f64,

    #[serde(default = "disabled")]
    pub max_seed_time_hours: f64,
}

/// Why a seeding download qualified for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanReason {
    MaxRatioReached,
    MaxSeedTimeReached,
}

impl SeedingCategory {
    /// Applies the ratio and seed-time limits.
    ///
    /// Ratio counts only once `min_seed_time_hours` has passed; the seed-time
    /// cap applies on its own.
    pub fn should_clean(&self, ratio: f64, seeding_time: Duration) -> Option<CleanReason> {
        let ratio_enabled = self.max_ratio >= 0.0;
        let cap_enabled = self.max_seed_time_hours >= 0.0;
        if !ratio_enabled && !cap_enabled {
            return None;
        }

        let hours = seeding_time.as_secs_f64() / 3600.0;

        if ratio_enabled && ratio >= self.max_ratio && hours >= self.min_seed_time_hours {
            return Some(CleanReason::MaxRatioReached);
        }

        if cap_enabled && hours >= self.max_seed_time_hours {
            return Some(CleanReason::MaxSeedTimeReached);
        }

        None
    }
}

/// Re-categorizes completed downloads that lost every hardlink into the library.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlinkedConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Category (or tag) the orphaned download is moved to
    #[serde(default = "default_target_category")]
    pub target_category: String,

    /// Add a tag instead of changing the category (clients without tags fall back to a label)
    #[serde(default)]
    pub use_tag: bool,

    /// Links that live under this directory do not count as library links
    #[serde(default)]
    pub ignored_root_dir: Option<PathBuf>,

    /// Only downloads in these categories are checked
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for UnlinkedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_category: default_target_category(),
            use_tag: false,
            ignored_root_dir: None,
            categories: Vec::new(),
        }
    }
}

const fn disabled() -> f64 {
    -1.0
}

fn default_target_category() -> String {
    "arrsweep-unlinked".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(max_ratio: f64, min_hours: f64, max_hours: f64) -> SeedingCategory {
        SeedingCategory {
            name: "tv".to_string(),
            max_ratio,
            min_seed_time_hours: min_hours,
            max_seed_time_hours: max_hours,
        }
    }

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    #[test]
    fn test_both_limits_disabled_never_qualifies() {
        let c = category(-1.0, 0.0, -1.0);
        assert_eq!(c.should_clean(100.0, hours(10_000)), None);
    }

    #[test]
    fn test_ratio_requires_min_seed_time() {
        let c = category(2.0, 24.0, -1.0);
        assert_eq!(c.should_clean(2.5, hours(10)), None);
        assert_eq!(
            c.should_clean(2.5, hours(24)),
            Some(CleanReason::MaxRatioReached)
        );
        assert_eq!(c.should_clean(1.9, hours(48)), None);
    }

    #[test]
    fn test_seed_time_cap_applies_alone() {
        let c = category(5.0, 0.0, 72.0);
        assert_eq!(
            c.should_clean(0.1, hours(72)),
            Some(CleanReason::MaxSeedTimeReached)
        );
        assert_eq!(c.should_clean(0.1, hours(71)), None);
    }

    #[test]
    fn test_zero_cap_cleans_immediately() {
        let c = category(-1.0, 0.0, 0.0);
        assert_eq!(
            c.should_clean(0.0, Duration::ZERO),
            Some(CleanReason::MaxSeedTimeReached)
        );
    }

    #[test]
    fn test_parse_defaults() {
        let yaml = r"
enabled: true
categories:
  - name: tv
    max_ratio: 1.5
unlinked:
  enabled: true
  categories: [tv]
";
        let config: DownloadCleanerConfig = serde_yaml::from_str(yaml).unwrap();
        let tv = config.category("tv").unwrap();
        assert_eq!(tv.max_ratio, 1.5);
        assert_eq!(tv.min_seed_time_hours, 0.0);
        assert_eq!(tv.max_seed_time_hours, -1.0);
        assert_eq!(config.unlinked.target_category, "arrsweep-unlinked");
        assert!(config.category("movies").is_none());
    }
}
