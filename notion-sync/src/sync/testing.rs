use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use notion_core::{NotionError, Page, Parent, Property, StatusCode};

use super::blob::{BlobError, BlobStore};
use super::source::DocumentSource;
use crate::render::DocumentRenderer;

pub fn page(id: &str, title: &str, parent: Option<&str>, edited: &str) -> Page {
    let mut doc = untitled_page(id, parent, edited);
    doc.properties.insert("title".into(), Property::title(title));
    doc
}

pub fn untitled_page(id: &str, parent: Option<&str>, edited: &str) -> Page {
    Page {
        id: id.to_string(),
        url: url_of(id),
        archived: false,
        parent: parent.map(Parent::page).unwrap_or_else(Parent::workspace),
        last_edited_time: edited.to_string(),
        properties: BTreeMap::new(),
    }
}

pub fn url_of(id: &str) -> String {
    format!("https://www.notion.so/{id}")
}

fn api_error(status: StatusCode) -> NotionError {
    NotionError::Api {
        status,
        body: String::new(),
    }
}

#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<Vec<Page>>,
    failing: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    retrievals: AtomicUsize,
}

impl FakeSource {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages: Mutex::new(pages),
            ..Self::default()
        }
    }

    pub fn page(&self, id: &str) -> Page {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap()
    }

    pub fn upsert(&self, page: Page) {
        let mut pages = self.pages.lock().unwrap();
        match pages.iter_mut().find(|p| p.id == page.id) {
            Some(existing) => *existing = page,
            None => pages.push(page),
        }
    }

    pub fn update(&self, id: &str, edit: impl FnOnce(&mut Page)) {
        let mut pages = self.pages.lock().unwrap();
        let page = pages.iter_mut().find(|p| p.id == id).unwrap();
        edit(page);
    }

    pub fn remove(&self, id: &str) {
        self.pages.lock().unwrap().retain(|p| p.id != id);
    }

    pub fn fail_retrieve(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn list_documents(&self) -> Result<Vec<Page>, NotionError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(api_error(StatusCode::UNAUTHORIZED));
        }
        Ok(self.pages.lock().unwrap().clone())
    }

    async fn retrieve(&self, id: &str) -> Result<Page, NotionError> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(id) {
            return Err(api_error(StatusCode::FORBIDDEN));
        }
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND))
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    failing: Mutex<HashSet<String>>,
    renders: AtomicUsize,
}

impl FakeRenderer {
    pub fn fail_render(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn render_document(&self, id: &str) -> Result<Vec<u8>, NotionError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(id) {
            return Err(api_error(StatusCode::BAD_GATEWAY));
        }
        Ok(format!("content of {id}\n").into_bytes())
    }
}

/// In-memory blob store with injectable failures and write/delete logs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    writes: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(key).cloned()
    }

    pub fn insert(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        lock(&self.blobs).insert(key.to_string(), bytes.into());
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.blobs).keys().cloned().collect()
    }

    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.failing_writes).insert(key.to_string());
    }

    pub fn fail_deletes_of(&self, key: &str) {
        lock(&self.failing_deletes).insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_writes).clear();
        lock(&self.failing_deletes).clear();
    }

    /// Keys written so far, in order, manifest saves included.
    pub fn write_log(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    pub fn delete_log(&self) -> Vec<String> {
        lock(&self.deletes).clone()
    }

    pub fn clear_logs(&self) {
        lock(&self.writes).clear();
        lock(&self.deletes).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(key: &str) -> BlobError {
    BlobError::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("injected failure for {key}"),
    ))
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.get(key)
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        if lock(&self.failing_writes).contains(key) {
            return Err(injected(key));
        }
        lock(&self.blobs).insert(key.to_string(), bytes.to_vec());
        lock(&self.writes).push(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        if lock(&self.failing_deletes).contains(key) {
            return Err(injected(key));
        }
        lock(&self.blobs)
            .remove(key)
            .ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        lock(&self.deletes).push(key.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn memory_store_injects_failures() {
    let store = MemoryBlobStore::new();
    store.insert("a.md", "a");
    store.fail_deletes_of("a.md");

    assert!(matches!(store.delete("a.md").await, Err(BlobError::Io(_))));
    assert!(store.get("a.md").is_some());

    store.clear_failures();
    store.delete("a.md").await.unwrap();
    assert_eq!(store.delete_log(), vec!["a.md".to_string()]);
}
