use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::types::{Block, BlockList, Page, PageList};

const DEFAULT_BASE_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
}

#[derive(Serialize)]
struct SearchFilter<'a> {
    property: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    filter: SearchFilter<'a>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

impl NotionClient {
    pub fn new(token: impl Into<String>) -> Result<Self, NotionError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, NotionError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn search_pages(
        &self,
        start_cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PageList, NotionError> {
        let url = self.endpoint("/v1/search")?;
        let body = SearchRequest {
            filter: SearchFilter {
                property: "object",
                value: "page",
            },
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            start_cursor,
        };
        let response = self.authorized(self.http.post(url)).json(&body).send().await?;
        Self::handle_response(response).await
    }

    pub async fn search_pages_all(&self, page_size: u32) -> Result<Vec<Page>, NotionError> {
        let mut cursor: Option<String> = None;
        let mut pages = Vec::new();
        loop {
            let batch = self.search_pages(cursor.as_deref(), page_size).await?;
            pages.extend(batch.results);
            match batch.next_cursor {
                Some(next) if batch.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(pages)
    }

    pub async fn retrieve_page(&self, page_id: &str) -> Result<Page, NotionError> {
        let url = self.endpoint(&format!("/v1/pages/{page_id}"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn list_block_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
        page_size: u32,
    ) -> Result<BlockList, NotionError> {
        let mut url = self.endpoint(&format!("/v1/blocks/{block_id}/children"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &page_size.clamp(1, MAX_PAGE_SIZE).to_string());
            if let Some(cursor) = start_cursor {
                query.append_pair("start_cursor", cursor);
            }
        }
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn list_block_children_all(
        &self,
        block_id: &str,
        page_size: u32,
    ) -> Result<Vec<Block>, NotionError> {
        let mut cursor: Option<String> = None;
        let mut blocks = Vec::new();
        loop {
            let batch = self
                .list_block_children(block_id, cursor.as_deref(), page_size)
                .await?;
            blocks.extend(batch.results);
            match batch.next_cursor {
                Some(next) if batch.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(blocks)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NotionError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NotionError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotionError::Api { status, body })
        }
    }
}

impl NotionError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            NotionError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NotionError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}
