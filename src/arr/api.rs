use super::QueuePage;
use crate::clients::DeleteReason;
use crate::config::ArrInstance;
use crate::context::InstanceType;
use crate::error::{AppError, Result};
use crate::http::HttpClient;
use std::sync::Arc;

const API_KEY_HEADER: &str = "X-Api-Key";

/// REST plumbing shared by every arr flavour: `/api/v{n}` routing and the
/// `X-Api-Key` header.
pub struct ArrApi {
    http: Arc<HttpClient>,
    instance_type: InstanceType,
}

impl ArrApi {
    pub const fn new(http: Arc<HttpClient>, instance_type: InstanceType) -> Self {
        Self {
            http,
            instance_type,
        }
    }

    pub fn endpoint(&self, instance: &ArrInstance, path: &str) -> String {
        format!(
            "{}/api/v{}/{}",
            instance.base_url(),
            self.instance_type.api_version(),
            path.trim_start_matches('/')
        )
    }

    /// `GET /queue` for one page, with the flavour's `include*` flags.
    pub fn queue_page(
        &self,
        instance: &ArrInstance,
        page: u32,
        page_size: u32,
        includes: &[&str],
    ) -> Result<QueuePage> {
        let url = self.endpoint(instance, "queue");
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        query.extend(includes.iter().map(|flag| (*flag, "true".to_string())));

        tracing::debug!("Fetching {} queue page {page} from {}", self.instance_type, instance.name);

        let response = self.http.send("arr queue", |client| {
            client
                .get(&url)
                .header(API_KEY_HEADER, &instance.api_key)
                .query(&query)
        })?;

        let body = response.text()?;
        let page: QueuePage = serde_json::from_str(&body).map_err(|e| {
            tracing::debug!(
                "Queue response (first 500 chars): {}",
                body.chars().take(500).collect::<String>()
            );
            AppError::External(format!(
                "Failed to parse {} queue response from {}: {e}",
                self.instance_type, instance.name
            ))
        })?;
        Ok(page)
    }

    /// `DELETE /queue/{id}` once per record of the group. A record the arr
    /// no longer knows counts as deleted.
    pub fn delete_queue_items(
        &self,
        instance: &ArrInstance,
        record_ids: &[i64],
        remove_from_client: bool,
        reason: DeleteReason,
    ) -> Result<()> {
        let query = [
            ("removeFromClient", remove_from_client.to_string()),
            ("blocklist", "true".to_string()),
            ("skipRedownload", "true".to_string()),
            ("changeCategory", "false".to_string()),
        ];

        for id in record_ids {
            let url = self.endpoint(instance, &format!("queue/{id}"));
            let result = self.http.send("arr queue delete", |client| {
                client
                    .delete(&url)
                    .header(API_KEY_HEADER, &instance.api_key)
                    .query(&query)
            });
            match result {
                Ok(_) => tracing::debug!("Deleted queue record {id} from {} {}", self.instance_type, instance.name),
                Err(AppError::NotFound(url)) => tracing::debug!("Queue record already gone: {url}"),
                Err(e) => return Err(e),
            }
        }

        if !record_ids.is_empty() {
            tracing::info!(
                "Deleted {} queue record(s) from {} {} (reason: {reason}, remove from client: {remove_from_client})",
                record_ids.len(),
                self.instance_type,
                instance.name
            );
        }
        Ok(())
    }

    /// `POST /command`.
    pub fn command(&self, instance: &ArrInstance, body: &serde_json::Value) -> Result<()> {
        let url = self.endpoint(instance, "command");
        self.http.send("arr command", |client| {
            client
                .post(&url)
                .header(API_KEY_HEADER, &instance.api_key)
                .json(body)
        })?;
        tracing::info!(
            "Triggered {} on {} {}",
            body["name"].as_str().unwrap_or("command"),
            self.instance_type,
            instance.name
        );
        Ok(())
    }
}
