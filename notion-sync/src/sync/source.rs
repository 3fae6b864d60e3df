use std::time::Duration;

use async_trait::async_trait;
use notion_core::{MAX_PAGE_SIZE, NotionClient, NotionError, Page};

use super::backoff::Backoff;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every page visible to the integration, archived ones included.
    async fn list_documents(&self) -> Result<Vec<Page>, NotionError>;

    async fn retrieve(&self, id: &str) -> Result<Page, NotionError>;
}

pub struct NotionSource {
    client: NotionClient,
    backoff: Backoff,
}

impl NotionSource {
    pub fn new(client: NotionClient) -> Self {
        Self {
            client,
            backoff: Backoff::new(Duration::from_millis(250), Duration::from_secs(10), true, 4),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl DocumentSource for NotionSource {
    async fn list_documents(&self) -> Result<Vec<Page>, NotionError> {
        self.backoff
            .retry(
                || self.client.search_pages_all(MAX_PAGE_SIZE),
                NotionError::is_retryable,
            )
            .await
    }

    async fn retrieve(&self, id: &str) -> Result<Page, NotionError> {
        self.backoff
            .retry(|| self.client.retrieve_page(id), NotionError::is_retryable)
            .await
    }
}
