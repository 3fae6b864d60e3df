use std::collections::HashSet;

use notion_core::{NotionError, Page};
use thiserror::Error;

use super::blob::{BlobError, BlobStore};
use super::manifest::{FileRecord, Manifest, ManifestError, ManifestStore, TreeEntry};
use super::paths::{artifact_path, display_title, resolve_folder};
use super::source::DocumentSource;
use crate::render::DocumentRenderer;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to list documents: {0}")]
    Listing(#[source] NotionError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Error)]
enum ItemError {
    #[error("failed to fetch page: {0}")]
    Retrieve(#[source] NotionError),
    #[error("failed to render page: {0}")]
    Render(#[source] NotionError),
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: BlobError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Written,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub listed: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
}

pub struct SyncEngine<S, R, B> {
    source: S,
    renderer: R,
    blobs: B,
    manifests: ManifestStore,
}

impl<S, R, B> SyncEngine<S, R, B>
where
    S: DocumentSource,
    R: DocumentRenderer,
    B: BlobStore,
{
    pub fn new(source: S, renderer: R, blobs: B) -> Self {
        Self {
            source,
            renderer,
            blobs,
            manifests: ManifestStore::default(),
        }
    }

    pub fn with_manifest_store(mut self, manifests: ManifestStore) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub async fn load_manifest(&self) -> Manifest {
        self.manifests.load(&self.blobs).await
    }

    pub async fn run(&self) -> Result<SyncReport, EngineError> {
        let mut manifest = self.load_manifest().await;
        let mut report = SyncReport::default();

        let listed = self.list_current().await?;
        let current: HashSet<String> = listed.iter().map(|page| page.url.clone()).collect();
        report.listed = listed.len();
        tracing::info!(pages = listed.len(), "listed remote pages");

        self.update_tree(&mut manifest, &listed).await?;
        self.prune_tree(&mut manifest, &current).await?;
        self.sync_documents(&mut manifest, &mut report).await?;
        self.delete_orphans(&mut manifest, &current, &mut report).await?;

        manifest.status.clear();
        self.save(&manifest).await?;
        tracing::info!(
            written = report.written,
            skipped = report.skipped,
            failed = report.failed,
            deleted = report.deleted,
            delete_failed = report.delete_failed,
            "sync finished"
        );
        Ok(report)
    }

    async fn list_current(&self) -> Result<Vec<Page>, EngineError> {
        let pages = self
            .source
            .list_documents()
            .await
            .map_err(EngineError::Listing)?;
        Ok(pages.into_iter().filter(|page| !page.archived).collect())
    }

    async fn update_tree(
        &self,
        manifest: &mut Manifest,
        listed: &[Page],
    ) -> Result<(), EngineError> {
        for page in listed {
            let folder = resolve_folder(page, &self.source).await;
            manifest.state.tree.insert(
                page.url.clone(),
                TreeEntry {
                    id: page.id.clone(),
                    title: display_title(page),
                    folder_path: folder.folder().to_string(),
                },
            );
        }
        self.save(manifest).await
    }

    async fn prune_tree(
        &self,
        manifest: &mut Manifest,
        current: &HashSet<String>,
    ) -> Result<(), EngineError> {
        let before = manifest.state.tree.len();
        manifest.state.tree.retain(|url, _| current.contains(url));
        let pruned = before - manifest.state.tree.len();
        if pruned > 0 {
            tracing::info!(pruned, "dropped pages no longer listed from tree");
            self.save(manifest).await?;
        }
        Ok(())
    }

    async fn sync_documents(
        &self,
        manifest: &mut Manifest,
        report: &mut SyncReport,
    ) -> Result<(), EngineError> {
        let entries: Vec<(String, String)> = manifest
            .state
            .tree
            .iter()
            .map(|(url, entry)| (url.clone(), entry.id.clone()))
            .collect();
        let total = entries.len();

        for (done, (url, id)) in entries.iter().enumerate() {
            match self.sync_document(manifest, url, id).await {
                Ok(ItemOutcome::Written) => report.written += 1,
                Ok(ItemOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(url = %url, "page sync failed: {err}");
                    report.failed += 1;
                }
            }
            manifest.status = format!("{}/{total} documents synced", done + 1);
            self.save(manifest).await?;
        }
        Ok(())
    }

    async fn sync_document(
        &self,
        manifest: &mut Manifest,
        url: &str,
        id: &str,
    ) -> Result<ItemOutcome, ItemError> {
        let page = self.source.retrieve(id).await.map_err(ItemError::Retrieve)?;
        if let Some(record) = manifest.files.get(url)
            && record.updated_at == page.last_edited_time
        {
            tracing::debug!(url = %url, "skipping unchanged page");
            return Ok(ItemOutcome::Skipped);
        }

        // Placement is always derived from the page as it is now.
        let folder = resolve_folder(&page, &self.source).await;
        let key = artifact_path(folder.folder(), &page);
        let bytes = self
            .renderer
            .render_document(&page.id)
            .await
            .map_err(ItemError::Render)?;
        self.blobs
            .write(&key, &bytes)
            .await
            .map_err(|source| ItemError::Write {
                key: key.clone(),
                source,
            })?;
        tracing::info!(url = %url, path = %key, "wrote page");

        let previous = manifest.files.insert(
            url.to_string(),
            FileRecord {
                url: url.to_string(),
                file_path: key.clone(),
                updated_at: page.last_edited_time.clone(),
                size_in_bytes: bytes.len() as u64,
            },
        );
        if let Some(previous) = previous
            && previous.file_path != key
        {
            if path_in_use(manifest, &previous.file_path, |other| other != url) {
                tracing::debug!(
                    url = %url,
                    path = %previous.file_path,
                    "previous artifact now belongs to another page, keeping it"
                );
                return Ok(ItemOutcome::Written);
            }
            match self.blobs.delete(&previous.file_path).await {
                Ok(()) | Err(BlobError::NotFound(_)) => {
                    tracing::info!(
                        url = %url,
                        path = %previous.file_path,
                        "removed moved artifact"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        url = %url,
                        path = %previous.file_path,
                        "failed to remove moved artifact: {err}"
                    );
                }
            }
        }
        Ok(ItemOutcome::Written)
    }

    async fn delete_orphans(
        &self,
        manifest: &mut Manifest,
        current: &HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<(), EngineError> {
        let orphans: Vec<(String, String)> = manifest
            .files
            .iter()
            .filter(|(url, _)| !current.contains(*url))
            .map(|(url, record)| (url.clone(), record.file_path.clone()))
            .collect();

        for (url, path) in orphans {
            // A listed page may have been written to the same key this run.
            if path_in_use(manifest, &path, |other| current.contains(other)) {
                manifest.files.remove(&url);
                report.deleted += 1;
                tracing::info!(
                    url = %url,
                    path = %path,
                    "dropped orphan record, artifact belongs to a listed page"
                );
                self.save(manifest).await?;
                continue;
            }
            match self.blobs.delete(&path).await {
                Ok(()) => {}
                Err(BlobError::NotFound(_)) => {
                    tracing::debug!(path = %path, "orphan artifact already gone");
                }
                Err(err) => {
                    // The record stays, so the next run retries the delete.
                    tracing::warn!(path = %path, "failed to delete orphan: {err}");
                    report.delete_failed += 1;
                    continue;
                }
            }
            manifest.files.remove(&url);
            report.deleted += 1;
            tracing::info!(url = %url, path = %path, "deleted orphan");
            self.save(manifest).await?;
        }
        Ok(())
    }

    async fn save(&self, manifest: &Manifest) -> Result<(), EngineError> {
        Ok(self.manifests.save(&self.blobs, manifest).await?)
    }
}

fn path_in_use(manifest: &Manifest, path: &str, holder: impl Fn(&str) -> bool) -> bool {
    manifest
        .files
        .iter()
        .any(|(url, record)| record.file_path == path && holder(url))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
