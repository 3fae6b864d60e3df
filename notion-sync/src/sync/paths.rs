use std::path::{Component, Path, PathBuf};

use notion_core::Page;
use thiserror::Error;

use super::source::DocumentSource;

pub const FILE_EXTENSION: &str = "md";
pub const MAX_ANCESTOR_DEPTH: usize = 64;

const TITLE_PROPERTIES: [&str; 2] = ["title", "Name"];

#[derive(Debug, Error)]
pub enum PathError {
    #[error("workspace path is empty")]
    Empty,
    #[error("workspace path contains unsupported component")]
    UnsupportedComponent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResolution {
    Resolved(String),
    Unresolved,
}

impl PathResolution {
    /// Folder to file under; unresolved chains fall back to the root.
    pub fn folder(&self) -> &str {
        match self {
            PathResolution::Resolved(folder) => folder,
            PathResolution::Unresolved => "",
        }
    }
}

pub fn page_title(page: &Page) -> Option<String> {
    let property = TITLE_PROPERTIES
        .iter()
        .find_map(|name| page.properties.get(*name))?;
    let fragments = property.title.as_ref()?;
    Some(fragments.iter().map(|t| t.plain_text.as_str()).collect())
}

pub fn sanitize_title(title: &str) -> String {
    title.trim().replace('/', "-")
}

pub fn display_title(page: &Page) -> String {
    page_title(page)
        .map(|title| sanitize_title(&title))
        // "." and ".." would turn into relative path components.
        .filter(|title| !matches!(title.as_str(), "" | "." | ".."))
        .unwrap_or_else(|| page.id.clone())
}

pub fn file_name(page: &Page) -> String {
    format!("{}.{FILE_EXTENSION}", display_title(page))
}

/// Blob key for a page's artifact: `<folder>/<id>/<title>.md`.
pub fn artifact_path(folder: &str, page: &Page) -> String {
    let leaf = format!("{}/{}", page.id, file_name(page));
    if folder.is_empty() {
        leaf
    } else {
        format!("{folder}/{leaf}")
    }
}

pub async fn resolve_folder<S>(page: &Page, source: &S) -> PathResolution
where
    S: DocumentSource + ?Sized,
{
    let mut segments: Vec<String> = Vec::new();
    let mut parent_id = page.parent.page_id().map(str::to_owned);
    while let Some(id) = parent_id {
        if segments.len() >= MAX_ANCESTOR_DEPTH {
            tracing::warn!(page = %page.id, "ancestor chain exceeds {MAX_ANCESTOR_DEPTH} levels");
            return PathResolution::Unresolved;
        }
        let parent = match source.retrieve(&id).await {
            Ok(parent) => parent,
            Err(err) => {
                tracing::warn!(page = %page.id, ancestor = %id, "failed to fetch ancestor: {err}");
                return PathResolution::Unresolved;
            }
        };
        segments.push(display_title(&parent));
        parent_id = parent.parent.page_id().map(str::to_owned);
    }
    segments.reverse();
    PathResolution::Resolved(segments.join("/"))
}

pub fn workspace_path_for(root: &Path, key: &str) -> Result<PathBuf, PathError> {
    if key.is_empty() {
        return Err(PathError::Empty);
    }

    // Keys are relative POSIX paths ("Parent/id/Title.md"); map them under root.
    let mut out = root.to_path_buf();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    if out == root {
        return Err(PathError::Empty);
    }
    Ok(out)
}
