use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::blob::{BlobError, BlobStore};

pub const DEFAULT_MANIFEST_KEY: &str = ".metadata.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write manifest: {0}")]
    Write(#[from] BlobError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub size_in_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub folder_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub tree: BTreeMap<String, TreeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manifest {
    pub files: BTreeMap<String, FileRecord>,
    pub state: SyncState,
    pub status: String,
    /// Top-level keys written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    /// Fails only on bytes that are not JSON. Anything else is repaired:
    /// malformed `files` or `tree` entries are dropped one by one and a
    /// non-string `status` is reset.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::repair(value))
    }

    fn repair(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            tracing::warn!("manifest is not a JSON object, starting empty");
            return Self::default();
        };

        let files = repair_entries(root.remove("files"), "files");
        let tree = match root.remove("state") {
            Some(Value::Object(mut state)) => {
                repair_entries(state.remove("tree"), "state.tree")
            }
            None | Some(Value::Null) => BTreeMap::new(),
            Some(other) => {
                tracing::warn!("manifest state is {}, resetting", kind_of(&other));
                BTreeMap::new()
            }
        };
        let status = match root.remove("status") {
            Some(Value::String(status)) => status,
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                tracing::warn!("manifest status is {}, resetting", kind_of(&other));
                String::new()
            }
        };

        Self {
            files,
            state: SyncState { tree },
            status,
            extra: root.into_iter().collect(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn repair_entries<T>(value: Option<Value>, field: &str) -> BTreeMap<String, T>
where
    T: DeserializeOwned,
{
    let entries = match value {
        Some(Value::Object(entries)) => entries,
        None | Some(Value::Null) => return BTreeMap::new(),
        Some(other) => {
            tracing::warn!("manifest {field} is {}, resetting", kind_of(&other));
            return BTreeMap::new();
        }
    };
    entries
        .into_iter()
        .filter_map(|(key, entry)| match serde_json::from_value(entry) {
            Ok(entry) => Some((key, entry)),
            Err(err) => {
                tracing::warn!(key = %key, "dropping malformed manifest {field} entry: {err}");
                None
            }
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
pub struct ManifestStore {
    key: String,
}

impl Default for ManifestStore {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_KEY)
    }
}

impl ManifestStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Never fails: a missing or unreadable manifest starts a fresh one.
    pub async fn load<B: BlobStore + ?Sized>(&self, blobs: &B) -> Manifest {
        let bytes = match blobs.read(&self.key).await {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound(_)) => {
                tracing::debug!(key = %self.key, "no manifest yet, starting empty");
                return Manifest::default();
            }
            Err(err) => {
                tracing::warn!(key = %self.key, "failed to read manifest, starting empty: {err}");
                return Manifest::default();
            }
        };
        match Manifest::parse(&bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(key = %self.key, "manifest is malformed, starting empty: {err}");
                Manifest::default()
            }
        }
    }

    pub async fn save<B: BlobStore + ?Sized>(
        &self,
        blobs: &B,
        manifest: &Manifest,
    ) -> Result<(), ManifestError> {
        let bytes = manifest.to_bytes()?;
        blobs.write(&self.key, &bytes).await?;
        Ok(())
    }
}
