mod client;
mod types;

pub use client::{ApiErrorClass, MAX_PAGE_SIZE, NOTION_VERSION, NotionClient, NotionError};
pub use types::{Annotations, Block, BlockList, Page, PageList, Parent, Property, RichText};

pub use reqwest::StatusCode;
