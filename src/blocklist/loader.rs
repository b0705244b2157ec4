use crate::error::{AppError, Result};
use crate::http::HttpClient;
use std::fs;

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Reads a newline-delimited blocklist from a local path or an http(s) URL.
///
/// Blank lines are dropped, surrounding whitespace trimmed.
pub fn load_lines(source: &str, http: &HttpClient) -> Result<Vec<String>> {
    let source = source.trim();
    let contents = if is_remote(source) {
        tracing::debug!("Downloading blocklist from {source}");
        http.send("blocklist download", |client| client.get(source))?
            .text()
            .map_err(|e| AppError::Blocklist(format!("Failed to read blocklist body from {source}: {e}")))?
    } else {
        tracing::debug!("Reading blocklist from {source}");
        fs::read_to_string(source)
            .map_err(|e| AppError::Blocklist(format!("Failed to read blocklist {source}: {e}")))?
    };

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpSettings;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn http() -> HttpClient {
        HttpClient::new(&HttpSettings {
            timeout: Duration::from_secs(1),
            max_retries: 0,
            validate_certificates: true,
        })
        .unwrap()
    }

    #[test]
    fn test_load_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"*.exe\r\n\n  sample  \nregex:\\.iso$\n").unwrap();

        let lines = load_lines(file.path().to_str().unwrap(), &http()).unwrap();
        assert_eq!(lines, vec!["*.exe", "sample", "regex:\\.iso$"]);
    }

    #[test]
    fn test_missing_file_is_blocklist_error() {
        let result = load_lines("/nonexistent/blocklist.txt", &http());
        assert!(matches!(result.unwrap_err(), AppError::Blocklist(_)));
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://example.com/list.txt"));
        assert!(is_remote("HTTP://example.com/list.txt"));
        assert!(!is_remote("/config/list.txt"));
    }
}
