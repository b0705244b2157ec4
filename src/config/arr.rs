use serde::Deserialize;

/// One media-manager type: its instances plus per-type overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrConfig {
    /// Failed-import strikes for this type; -1 uses `queue_cleaner.failed_import.max_strikes`
    #[serde(default = "default_inherit")]
    pub failed_import_max_strikes: i32,

    #[serde(default)]
    pub instances: Vec<ArrInstance>,
}

impl ArrConfig {
    pub fn enabled_instances(&self) -> impl Iterator<Item = &ArrInstance> {
        self.instances.iter().filter(|instance| instance.enabled)
    }

    /// Effective failed-import threshold given the queue-cleaner default.
    pub fn failed_import_max_strikes(&self, fallback: u32) -> u32 {
        u32::try_from(self.failed_import_max_strikes).unwrap_or(fallback)
    }
}

impl Default for ArrConfig {
    fn default() -> Self {
        Self {
            failed_import_max_strikes: default_inherit(),
            instances: Vec::new(),
        }
    }
}

/// Connection to a single Sonarr/Radarr/Lidarr/Readarr server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArrInstance {
    pub name: String,

    /// Base URL (e.g., "<http://localhost:8989>")
    pub url: String,

    pub api_key: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ArrInstance {
    /// URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

const fn default_inherit() -> i32 {
    -1
}

const fn default_true() -> bool {
    true
}
