//! Storage seams for session signals.
//!
//! The gate reads and writes two independent mechanisms: a cookie jar
//! (values carry path, max-age, SameSite and Secure attributes) and a
//! persistent key/value store with no built-in expiry. Both are shared
//! with other writers, so implementations use interior mutability and
//! last-writer-wins semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Attributes written alongside a cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    /// `None` makes a browser-session cookie.
    pub max_age: Option<Duration>,
    pub same_site: SameSite,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: None,
            same_site: SameSite::Strict,
            secure: true,
        }
    }
}

impl CookieOptions {
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Absolute expiry implied by `max_age`, measured from `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age.map(|age| now + age)
    }
}

pub trait CookieStore: Send + Sync {
    /// Returns the cookie value, or `None` if absent or past its max-age.
    fn get(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), StorageError>;
    fn remove(&self, name: &str) -> Result<(), StorageError>;
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryCookie {
    value: String,
    options: CookieOptions,
    expires_at: Option<DateTime<Utc>>,
}

/// Cookie jar held in memory. Clones share the same jar.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    cookies: Arc<Mutex<HashMap<String, MemoryCookie>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes the cookie was last written with.
    pub fn options(&self, name: &str) -> Option<CookieOptions> {
        self.lock().get(name).map(|c| c.options.clone())
    }

    /// Whether a cookie entry exists, ignoring expiry.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryCookie>> {
        self.cookies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CookieStore for MemoryCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let cookies = self.lock();
        Ok(cookies.get(name).and_then(|c| match c.expires_at {
            Some(expiry) if Utc::now() >= expiry => None,
            _ => Some(c.value.clone()),
        }))
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), StorageError> {
        let cookie = MemoryCookie {
            value: value.to_string(),
            options: options.clone(),
            expires_at: options.expires_at(Utc::now()),
        };
        self.lock().insert(name.to_string(), cookie);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.lock().remove(name);
        Ok(())
    }
}

/// Key/value store held in memory. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}
