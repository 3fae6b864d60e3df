use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Page {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub parent: Parent,
    pub last_edited_time: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Parent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<bool>,
}

impl Parent {
    pub fn page(page_id: impl Into<String>) -> Self {
        Self {
            kind: "page_id".to_string(),
            page_id: Some(page_id.into()),
            ..Self::default()
        }
    }

    pub fn workspace() -> Self {
        Self {
            kind: "workspace".to_string(),
            workspace: Some(true),
            ..Self::default()
        }
    }

    /// Id of the parent page, only when the parent is itself a page.
    pub fn page_id(&self) -> Option<&str> {
        if self.kind == "page_id" {
            self.page_id.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Property {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Vec<RichText>>,
}

impl Property {
    pub fn title(text: &str) -> Self {
        Self {
            title: Some(vec![RichText::plain(text)]),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

impl RichText {
    pub fn plain(text: &str) -> Self {
        Self {
            plain_text: text.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Block {
    /// Type-specific payload, stored under a key equal to the block type.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.data.get(&self.kind)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PageList {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BlockList {
    pub results: Vec<Block>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}
