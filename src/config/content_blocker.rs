use crate::context::InstanceType;
use serde::Deserialize;

/// How a blocklist is applied to file names.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlocklistType {
    /// A file is unwanted when any pattern matches it
    #[default]
    Blacklist,
    /// A file is unwanted unless some pattern matches it
    Whitelist,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlocklistSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, rename = "type")]
    pub list_type: BlocklistType,

    /// Local file path or http(s) URL
    #[serde(default)]
    pub path: Option<String>,
}

impl BlocklistSettings {
    /// Enabled and pointing somewhere.
    pub fn is_active(&self) -> bool {
        self.enabled && self.path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentBlockerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Skip private torrents entirely
    #[serde(default)]
    pub ignore_private: bool,

    /// Remove private torrents from the client when blocked
    #[serde(default)]
    pub delete_private: bool,

    #[serde(default)]
    pub sonarr: BlocklistSettings,

    #[serde(default)]
    pub radarr: BlocklistSettings,

    #[serde(default)]
    pub lidarr: BlocklistSettings,

    #[serde(default)]
    pub readarr: BlocklistSettings,
}

impl ContentBlockerConfig {
    pub const fn blocklist(&self, instance_type: InstanceType) -> &BlocklistSettings {
        match instance_type {
            InstanceType::Sonarr => &self.sonarr,
            InstanceType::Radarr => &self.radarr,
            InstanceType::Lidarr => &self.lidarr,
            InstanceType::Readarr => &self.readarr,
        }
    }

    /// Whether blocking applies to items of this media-manager type.
    pub fn is_active_for(&self, instance_type: InstanceType) -> bool {
        self.enabled && self.blocklist(instance_type).is_active()
    }

    pub fn has_any_source(&self) -> bool {
        InstanceType::ALL
            .iter()
            .any(|kind| self.blocklist(*kind).is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocklist_settings_parse() {
        let yaml = r"
enabled: true
delete_private: true
sonarr:
  enabled: true
  type: whitelist
  path: /config/sonarr-allow.txt
radarr:
  enabled: true
  path: https://example.com/blocklist.txt
";
        let config: ContentBlockerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.delete_private);
        assert_eq!(config.sonarr.list_type, BlocklistType::Whitelist);
        assert_eq!(config.radarr.list_type, BlocklistType::Blacklist);
        assert!(config.is_active_for(InstanceType::Sonarr));
        assert!(config.is_active_for(InstanceType::Radarr));
        assert!(!config.is_active_for(InstanceType::Lidarr));
        assert!(config.has_any_source());
    }

    #[test]
    fn test_enabled_without_path_is_inactive() {
        let settings = BlocklistSettings {
            enabled: true,
            list_type: BlocklistType::Blacklist,
            path: Some("  ".to_string()),
        };
        assert!(!settings.is_active());
    }

    #[test]
    fn test_disabled_blocker_is_inactive_for_all() {
        let yaml = r"
sonarr:
  enabled: true
  path: /config/block.txt
";
        let config: ContentBlockerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.is_active_for(InstanceType::Sonarr));
        assert!(config.has_any_source());
    }
}
