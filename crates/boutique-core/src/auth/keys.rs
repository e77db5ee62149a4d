use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use keyring::Entry;
use tracing::info;

use super::token::{SessionSealer, KEY_LEN};

const SERVICE_NAME: &str = "boutique-admin";
const SEALING_KEY_ACCOUNT: &str = "session-sealing-key";

/// OS keychain storage for the session sealing key.
pub struct KeyStore;

impl KeyStore {
    /// Load the sealing key, generating and storing one on first use.
    pub fn load_or_create() -> Result<[u8; KEY_LEN]> {
        let entry = Self::entry()?;
        match entry.get_password() {
            Ok(encoded) => decode_key(&encoded),
            Err(keyring::Error::NoEntry) => {
                let key = SessionSealer::generate_key();
                entry
                    .set_password(&STANDARD.encode(key))
                    .context("Failed to store sealing key in keychain")?;
                info!("Generated new session sealing key");
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to read sealing key from keychain"),
        }
    }

    /// Replace the sealing key. Every outstanding session stops verifying.
    pub fn rotate() -> Result<[u8; KEY_LEN]> {
        let key = SessionSealer::generate_key();
        Self::entry()?
            .set_password(&STANDARD.encode(key))
            .context("Failed to store sealing key in keychain")?;
        info!("Rotated session sealing key");
        Ok(key)
    }

    pub fn delete() -> Result<()> {
        Self::entry()?
            .delete_credential()
            .context("Failed to delete sealing key from keychain")?;
        Ok(())
    }

    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, SEALING_KEY_ACCOUNT).context("Failed to create keyring entry")
    }
}

/// Decode a base64 sealing key, as stored in the keychain or supplied
/// through configuration.
pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("Sealing key is not valid base64")?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        anyhow::anyhow!(
            "Sealing key must be {} bytes, got {}",
            KEY_LEN,
            bytes.len()
        )
    })
}
