use super::{ArrClient, QueueRecord};
use crate::config::ArrInstance;
use crate::error::Result;

pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Walks an arr queue page by page.
pub struct ArrQueueIterator {
    page_size: u32,
}

impl ArrQueueIterator {
    pub const fn new(page_size: u32) -> Self {
        Self { page_size }
    }

    /// Calls `on_page` with each non-empty page until
    /// `page * page_size >= total_records`. The first error stops iteration.
    pub fn iterate<F>(&self, client: &dyn ArrClient, instance: &ArrInstance, mut on_page: F) -> Result<()>
    where
        F: FnMut(&[QueueRecord]) -> Result<()>,
    {
        let mut page = 1;
        loop {
            let batch = client.queue_page(instance, page, self.page_size)?;
            tracing::debug!(
                "{} {} queue page {page}: {} records of {}",
                client.instance_type(),
                instance.name,
                batch.records.len(),
                batch.total_records
            );

            if batch.records.is_empty() {
                break;
            }
            on_page(&batch.records)?;

            if u64::from(page) * u64::from(self.page_size) >= u64::from(batch.total_records) {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    /// Every record of the queue in one vector.
    pub fn collect(&self, client: &dyn ArrClient, instance: &ArrInstance) -> Result<Vec<QueueRecord>> {
        let mut records = Vec::new();
        self.iterate(client, instance, |page| {
            records.extend_from_slice(page);
            Ok(())
        })?;
        Ok(records)
    }
}

impl Default for ArrQueueIterator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
