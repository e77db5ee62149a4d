//! Operator configuration.
//!
//! Configuration is stored at `~/.config/boutique/config.json` and
//! overridden field by field from `BOUTIQUE_*` environment variables.
//! Session state files live under the platform cache directory.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{GateConfig, LegacyPolicy};
use crate::remote::{Backoff, InvokeOptions};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "boutique";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cookie jar file name in the state directory
const COOKIE_FILE: &str = "cookies.json";

/// Persistent key/value store file name in the state directory
const STORE_FILE: &str = "local_storage.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Project URL of the hosted backend, e.g. `https://xyz.supabase.co`.
    pub functions_url: Option<String>,
    pub anon_key: Option<String>,
    /// Argon2 PHC string for the operator password.
    pub admin_password_hash: Option<String>,
    /// Base64 sealing key; when unset the OS keychain is used.
    pub session_key: Option<String>,
    pub session_ttl_minutes: Option<i64>,
    pub check_interval_secs: Option<u64>,
    pub legacy_policy: Option<LegacyPolicy>,
    pub invoke_retries: Option<u32>,
    pub backoff_unit_ms: Option<u64>,
}

fn parse_var<T: FromStr>(key: &str, raw: String) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Invalid {key} value, ignoring: {e}");
            None
        }
    }
}

impl Config {
    /// Load from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `BOUTIQUE_*` overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("BOUTIQUE_FUNCTIONS_URL") {
            self.functions_url = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_ANON_KEY") {
            self.anon_key = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_ADMIN_PASSWORD_HASH") {
            self.admin_password_hash = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_SESSION_KEY") {
            self.session_key = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_SESSION_TTL_MINUTES")
            .and_then(|raw| parse_var("BOUTIQUE_SESSION_TTL_MINUTES", raw))
        {
            self.session_ttl_minutes = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_CHECK_INTERVAL_SECS")
            .and_then(|raw| parse_var("BOUTIQUE_CHECK_INTERVAL_SECS", raw))
        {
            self.check_interval_secs = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_LEGACY_POLICY")
            .and_then(|raw| parse_var("BOUTIQUE_LEGACY_POLICY", raw))
        {
            self.legacy_policy = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_INVOKE_RETRIES")
            .and_then(|raw| parse_var("BOUTIQUE_INVOKE_RETRIES", raw))
        {
            self.invoke_retries = Some(v);
        }
        if let Some(v) = text("BOUTIQUE_BACKOFF_UNIT_MS")
            .and_then(|raw| parse_var("BOUTIQUE_BACKOFF_UNIT_MS", raw))
        {
            self.backoff_unit_ms = Some(v);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the cookie jar and key/value store files.
    pub fn state_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cookie_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(COOKIE_FILE))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(STORE_FILE))
    }

    pub fn gate_config(&self) -> GateConfig {
        let mut gate = GateConfig::default();
        if let Some(minutes) = self.session_ttl_minutes.filter(|m| *m > 0) {
            gate.session_ttl = chrono::Duration::minutes(minutes);
        }
        if let Some(policy) = self.legacy_policy {
            gate.legacy_policy = policy;
        }
        gate
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(crate::auth::monitor::DEFAULT_CHECK_INTERVAL)
    }

    pub fn invoke_options(&self) -> InvokeOptions {
        let mut options = InvokeOptions::default();
        if let Some(retries) = self.invoke_retries {
            options.retries = retries;
        }
        if let Some(unit) = self.backoff_unit_ms {
            options.backoff = Backoff::linear(Duration::from_millis(unit));
        }
        options
    }
}
