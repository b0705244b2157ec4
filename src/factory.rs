use crate::arr::{ArrClient, LidarrClient, RadarrClient, ReadarrClient, SonarrClient};
use crate::clients::{DelugeDriver, DownloadClientDriver, QbittorrentDriver, TransmissionDriver};
use crate::config::{ClientConfig, ClientType};
use crate::context::InstanceType;
use crate::error::Result;
use crate::http::HttpClient;
use std::sync::Arc;

/// Builds clients from configuration. Swapped out in tests.
pub trait ClientFactory: Send + Sync {
    fn arr_client(&self, instance_type: InstanceType, http: &Arc<HttpClient>) -> Arc<dyn ArrClient>;

    fn download_client(
        &self,
        config: &ClientConfig,
        http: &Arc<HttpClient>,
    ) -> Result<Arc<dyn DownloadClientDriver>>;
}

/// Network-backed clients.
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn arr_client(&self, instance_type: InstanceType, http: &Arc<HttpClient>) -> Arc<dyn ArrClient> {
        build_arr_client(instance_type, Arc::clone(http))
    }

    fn download_client(
        &self,
        config: &ClientConfig,
        http: &Arc<HttpClient>,
    ) -> Result<Arc<dyn DownloadClientDriver>> {
        Ok(build_download_client(config, Arc::clone(http)))
    }
}

pub fn build_arr_client(instance_type: InstanceType, http: Arc<HttpClient>) -> Arc<dyn ArrClient> {
    match instance_type {
        InstanceType::Sonarr => Arc::new(SonarrClient::new(http)),
        InstanceType::Radarr => Arc::new(RadarrClient::new(http)),
        InstanceType::Lidarr => Arc::new(LidarrClient::new(http)),
        InstanceType::Readarr => Arc::new(ReadarrClient::new(http)),
    }
}

pub fn build_download_client(config: &ClientConfig, http: Arc<HttpClient>) -> Arc<dyn DownloadClientDriver> {
    match config.client_type {
        ClientType::Qbittorrent => Arc::new(QbittorrentDriver::new(config, http)),
        ClientType::Deluge => Arc::new(DelugeDriver::new(config, http)),
        ClientType::Transmission => Arc::new(TransmissionDriver::new(config, http)),
    }
}
