use crate::cache::ExpiringStore;
use std::time::Duration;

/// Idempotency markers for in-flight removals, keyed by `(download id, instance url)`.
pub struct RemovalMarkers {
    store: ExpiringStore<(String, String), ()>,
}

impl RemovalMarkers {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: ExpiringStore::new(ttl),
        }
    }

    fn key(download_id: &str, instance_url: &str) -> (String, String) {
        (
            download_id.to_lowercase(),
            instance_url.trim_end_matches('/').to_lowercase(),
        )
    }

    /// Sets the marker. Returns `false` when one is already present.
    pub fn try_mark(&self, download_id: &str, instance_url: &str) -> bool {
        self.store
            .insert_if_absent(Self::key(download_id, instance_url), ())
    }

    pub fn is_marked(&self, download_id: &str, instance_url: &str) -> bool {
        self.store.contains(&Self::key(download_id, instance_url))
    }

    pub fn clear(&self, download_id: &str, instance_url: &str) {
        self.store.remove(&Self::key(download_id, instance_url));
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_once() {
        let markers = RemovalMarkers::new(Duration::from_secs(60));
        assert!(markers.try_mark("ABC", "http://sonarr:8989"));
        assert!(!markers.try_mark("abc", "http://sonarr:8989/"));
        assert!(markers.is_marked("abc", "http://SONARR:8989"));
    }

    #[test]
    fn test_same_download_on_other_instance() {
        let markers = RemovalMarkers::new(Duration::from_secs(60));
        assert!(markers.try_mark("abc", "http://sonarr:8989"));
        assert!(markers.try_mark("abc", "http://sonarr-4k:8989"));
        assert_eq!(markers.len(), 2);
    }

    #[test]
    fn test_clear_releases_marker() {
        let markers = RemovalMarkers::new(Duration::from_secs(60));
        markers.try_mark("abc", "http://sonarr:8989");
        markers.clear("abc", "http://sonarr:8989");
        assert!(!markers.is_marked("abc", "http://sonarr:8989"));
        assert!(markers.is_empty());
    }
}
