use async_trait::async_trait;
use notion_core::{Block, MAX_PAGE_SIZE, NotionClient, NotionError, RichText};
use serde_json::Value;

const MAX_NESTING: usize = 8;

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render_document(&self, id: &str) -> Result<Vec<u8>, NotionError>;
}

/// A block with its children already fetched.
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    pub block: Block,
    pub children: Vec<RenderedBlock>,
}

pub struct MarkdownRenderer {
    client: NotionClient,
}

impl MarkdownRenderer {
    pub fn new(client: NotionClient) -> Self {
        Self { client }
    }

    async fn fetch_tree(&self, root_id: &str) -> Result<Vec<RenderedBlock>, NotionError> {
        let mut top: Vec<RenderedBlock> = self
            .client
            .list_block_children_all(root_id, MAX_PAGE_SIZE)
            .await?
            .into_iter()
            .map(leaf)
            .collect();
        self.fill_children(&mut top, 1).await?;
        Ok(top)
    }

    async fn fill_children(
        &self,
        blocks: &mut [RenderedBlock],
        depth: usize,
    ) -> Result<(), NotionError> {
        let mut stack: Vec<(&mut RenderedBlock, usize)> =
            blocks.iter_mut().map(|b| (b, depth)).collect();
        while let Some((node, level)) = stack.pop() {
            // Child pages are separate documents and get their own file.
            if !node.block.has_children || level >= MAX_NESTING || node.block.kind == "child_page"
            {
                continue;
            }
            node.children = self
                .client
                .list_block_children_all(&node.block.id, MAX_PAGE_SIZE)
                .await?
                .into_iter()
                .map(leaf)
                .collect();
            stack.extend(node.children.iter_mut().map(|c| (c, level + 1)));
        }
        Ok(())
    }
}

fn leaf(block: Block) -> RenderedBlock {
    RenderedBlock {
        block,
        children: Vec::new(),
    }
}

#[async_trait]
impl DocumentRenderer for MarkdownRenderer {
    async fn render_document(&self, id: &str) -> Result<Vec<u8>, NotionError> {
        let tree = self.fetch_tree(id).await?;
        Ok(render_blocks(&tree).into_bytes())
    }
}

pub fn render_blocks(blocks: &[RenderedBlock]) -> String {
    let mut out = String::new();
    render_level(blocks, 0, &mut out);
    out
}

fn render_level(blocks: &[RenderedBlock], indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    let mut number = 0usize;
    for node in blocks {
        let block = &node.block;
        let payload = block.payload();
        let text = payload.map(rich_text).unwrap_or_default();

        number = if block.kind == "numbered_list_item" {
            number + 1
        } else {
            0
        };

        let line = match block.kind.as_str() {
            "paragraph" => text,
            "heading_1" => format!("# {text}"),
            "heading_2" => format!("## {text}"),
            "heading_3" => format!("### {text}"),
            "bulleted_list_item" => format!("- {text}"),
            "numbered_list_item" => format!("{number}. {text}"),
            "to_do" => {
                let checked = payload
                    .and_then(|p| p.get("checked"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                format!("- [{}] {text}", if checked { "x" } else { " " })
            }
            "toggle" => format!("- {text}"),
            "quote" => format!("> {text}"),
            "callout" => {
                let icon = payload
                    .and_then(|p| p.pointer("/icon/emoji"))
                    .and_then(Value::as_str)
                    .map(|emoji| format!("{emoji} "))
                    .unwrap_or_default();
                format!("> {icon}{text}")
            }
            "code" => {
                let language = payload
                    .and_then(|p| p.get("language"))
                    .and_then(Value::as_str)
                    .filter(|lang| *lang != "plain text")
                    .unwrap_or("");
                let body = payload.map(plain_rich_text).unwrap_or_default();
                let fenced = format!("```{language}\n{body}\n```");
                fenced
                    .lines()
                    .map(|l| format!("{pad}{l}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            "divider" => "---".to_string(),
            "equation" => {
                let expression = payload
                    .and_then(|p| p.get("expression"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                format!("$$ {expression} $$")
            }
            "child_page" | "child_database" => {
                let title = payload
                    .and_then(|p| p.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or("Untitled");
                format!("[{title}]")
            }
            "bookmark" | "embed" | "link_preview" => match payload.and_then(|p| p.get("url")) {
                Some(Value::String(url)) => format!("<{url}>"),
                _ => continue,
            },
            "image" | "file" | "pdf" | "video" => match payload.and_then(hosted_url) {
                Some(url) if block.kind == "image" => format!("![{text}]({url})"),
                Some(url) => format!("[{}]({url})", if text.is_empty() { &block.kind } else { &text }),
                None => continue,
            },
            _ => continue,
        };

        if block.kind == "code" {
            out.push_str(&line);
        } else {
            out.push_str(&pad);
            out.push_str(&line);
        }
        out.push('\n');

        let nested = matches!(
            block.kind.as_str(),
            "bulleted_list_item" | "numbered_list_item" | "to_do" | "toggle"
        );
        if nested {
            render_level(&node.children, indent + 1, out);
        } else {
            if !node.children.is_empty() {
                out.push('\n');
                render_level(&node.children, indent, out);
            }
            out.push('\n');
        }
    }
}

fn rich_text_items(payload: &Value) -> Vec<RichText> {
    // Caption carries media descriptions; text blocks use rich_text.
    let items = payload
        .get("rich_text")
        .or_else(|| payload.get("caption"))
        .cloned()
        .unwrap_or(Value::Null);
    serde_json::from_value(items).unwrap_or_default()
}

fn rich_text(payload: &Value) -> String {
    rich_text_items(payload).iter().map(format_fragment).collect()
}

fn plain_rich_text(payload: &Value) -> String {
    rich_text_items(payload)
        .iter()
        .map(|t| t.plain_text.as_str())
        .collect()
}

fn format_fragment(fragment: &RichText) -> String {
    let text = fragment.plain_text.as_str();
    if text.trim().is_empty() {
        return text.to_string();
    }
    let a = fragment.annotations;
    let mut out = if a.code {
        format!("`{text}`")
    } else {
        text.to_string()
    };
    if a.bold {
        out = format!("**{out}**");
    }
    if a.italic {
        out = format!("*{out}*");
    }
    if a.strikethrough {
        out = format!("~~{out}~~");
    }
    if let Some(href) = &fragment.href {
        out = format!("[{out}]({href})");
    }
    out
}

fn hosted_url(payload: &Value) -> Option<&str> {
    payload
        .pointer("/file/url")
        .or_else(|| payload.pointer("/external/url"))
        .and_then(Value::as_str)
}
