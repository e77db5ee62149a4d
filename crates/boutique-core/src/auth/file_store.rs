//! JSON-file backed stores used by the operator CLI.
//!
//! Each operation reads the file, applies the change and writes it back,
//! so separate processes observe each other's writes on the next read.
//! Writes are atomic renames; concurrent writers are last-writer-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::store::{CookieOptions, CookieStore, KeyValueStore, SameSite, StorageError};

fn read_map<T: DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>, StorageError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Write through a sibling temp file and rename it into place, so a
/// reader in another process sees either the old map or the new one.
fn write_map<T: Serialize>(path: &Path, map: &HashMap<String, T>) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(map)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.{:x}.tmp",
        file_name,
        std::process::id(),
        rand::random::<u32>()
    ));

    let written =
        std::fs::write(&tmp_path, contents).and_then(|_| std::fs::rename(&tmp_path, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Persistent key/value store kept in a single JSON object.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut map: HashMap<String, String> = read_map(&self.path)?;
        Ok(map.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map: HashMap<String, String> = read_map(&self.path)?;
        map.insert(key.to_string(), value.to_string());
        write_map(&self.path, &map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map: HashMap<String, String> = read_map(&self.path)?;
        if map.remove(key).is_some() {
            write_map(&self.path, &map)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    path: String,
    same_site: SameSite,
    secure: bool,
    expires_at: Option<DateTime<Utc>>,
}

/// Cookie jar persisted as JSON. Expired cookies are dropped on the next write.
pub struct FileCookieJar {
    path: PathBuf,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CookieStore for FileCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let mut map: HashMap<String, StoredCookie> = read_map(&self.path)?;
        let now = Utc::now();
        Ok(map.remove(name).and_then(|c| match c.expires_at {
            Some(expiry) if now >= expiry => None,
            _ => Some(c.value),
        }))
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut map: HashMap<String, StoredCookie> = read_map(&self.path)?;
        map.retain(|_, c| c.expires_at.map_or(true, |e| e > now));
        map.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                path: options.path.clone(),
                same_site: options.same_site,
                secure: options.secure,
                expires_at: options.expires_at(now),
            },
        );
        write_map(&self.path, &map)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        let mut map: HashMap<String, StoredCookie> = read_map(&self.path)?;
        if map.remove(name).is_some() {
            write_map(&self.path, &map)?;
        }
        Ok(())
    }
}
