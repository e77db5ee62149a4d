//! Admin session module.
//!
//! This module provides:
//! - `SessionGate`: the single authoritative admin session check
//! - `SessionMonitor`: periodic and event-driven re-checks of the gate
//! - `SessionSealer`: authenticated encryption of session tokens
//! - `CookieStore` / `KeyValueStore`: the two storage seams the gate reconciles
//! - `KeyStore`: OS keychain storage for the sealing key
//!
//! Every signal carries a sealed token; a bare flag never authenticates.

pub mod file_store;
pub mod gate;
pub mod keys;
pub mod monitor;
pub mod password;
pub mod routes;
pub mod store;
pub mod token;

pub use file_store::{FileCookieJar, FileStore};
pub use gate::{
    GateConfig, GateError, LegacyPolicy, SessionGate, SessionStatus, SessionVerdict, SignalSource,
};
pub use keys::{decode_key, KeyStore};
pub use monitor::{GateEvent, MonitorHandle, SessionMonitor};
pub use password::{hash_admin_password, verify_admin_password, PasswordError};
pub use routes::{AdminRoutes, GuardAction};
pub use store::{
    CookieOptions, CookieStore, KeyValueStore, MemoryCookieJar, MemoryStore, SameSite,
    StorageError,
};
pub use token::{SessionClaims, SessionSealer, TokenError};
