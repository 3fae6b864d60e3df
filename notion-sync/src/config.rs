use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sync::manifest::DEFAULT_MANIFEST_KEY;

pub const TOKEN_ENV: &str = "NOTION_TOKEN";
pub const WORKSPACE_ENV: &str = "NOTION_SYNC_WORKSPACE";
pub const BASE_URL_ENV: &str = "NOTION_API_BASE_URL";
pub const MANIFEST_ENV: &str = "NOTION_SYNC_METADATA";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("NOTION_TOKEN is not set")]
    MissingToken,
    #[error("current directory is unavailable")]
    NoWorkingDir,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub token: String,
    pub workspace_root: PathBuf,
    pub api_base_url: Option<String>,
    pub manifest_key: String,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let token = read(TOKEN_ENV).ok_or(ConfigError::MissingToken)?;
        let workspace_root = match read(WORKSPACE_ENV) {
            Some(value) => match dirs::home_dir() {
                Some(home) => expand_with_home(&value, &home),
                None => PathBuf::from(value),
            },
            None => std::env::current_dir().map_err(|_| ConfigError::NoWorkingDir)?,
        };
        let manifest_key = read(MANIFEST_ENV).unwrap_or_else(|| DEFAULT_MANIFEST_KEY.to_string());

        Ok(Self {
            token,
            workspace_root,
            api_base_url: read(BASE_URL_ENV),
            manifest_key,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}
