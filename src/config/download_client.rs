use serde::Deserialize;
use std::fmt;

/// Torrent client wire protocol.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Qbittorrent,
    Deluge,
    Transmission,
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Qbittorrent => "qbittorrent",
            Self::Deluge => "deluge",
            Self::Transmission => "transmission",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub client_type: ClientType,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scheme, host and port (e.g., "<http://localhost:8080>")
    pub host: String,

    /// Path prefix when the client sits behind a reverse proxy
    #[serde(default)]
    pub url_base: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ClientConfig {
    /// `host` joined with `url_base`, no trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        match self
            .url_base
            .as_deref()
            .map(|base| base.trim_matches('/'))
            .filter(|base| !base.is_empty())
        {
            Some(base) => format!("{host}/{base}"),
            None => host.to_string(),
        }
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_parse() {
        let yaml = r#"
name: qbit
type: qbittorrent
host: "http://localhost:8080/"
username: admin
password: secret
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client_type, ClientType::Qbittorrent);
        assert!(config.enabled);
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_base_url_with_prefix() {
        let config = ClientConfig {
            name: "tr".to_string(),
            client_type: ClientType::Transmission,
            enabled: true,
            host: "http://nas:9091".to_string(),
            url_base: Some("/transmission/".to_string()),
            username: None,
            password: None,
        };
        assert_eq!(config.base_url(), "http://nas:9091/transmission");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = r"
name: x
type: utorrent
host: http://localhost
";
        let result: Result<ClientConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }
}
