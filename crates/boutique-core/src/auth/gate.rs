//! The admin session gate.
//!
//! Four signal sources are consulted, in this order:
//! 1. the primary session cookie
//! 2. the primary persistent-store entry plus its expiry entry
//! 3. the legacy bypass cookie
//! 4. the legacy bypass persistent-store entry plus its expiry entry
//!
//! A signal only counts if its sealed token opens under the gate's key and
//! has not expired. Legacy sources are consulted only under
//! `LegacyPolicy::HonorSealed`; otherwise they are swept away.
//!
//! All operations take the gate's cycle lock, so a check can never
//! interleave with `logout` on the same gate. Gates in other processes
//! sharing the stores are covered by the revocation mark `logout` writes:
//! tokens issued at or before it never verify, so a session copied back
//! mid-logout is dead on arrival.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::routes::{AdminRoutes, GuardAction};
use super::store::{CookieOptions, CookieStore, KeyValueStore, StorageError};
use super::token::{SessionClaims, SessionSealer, TokenError};

// ============================================================================
// Constants
// ============================================================================

pub const PRIMARY_COOKIE: &str = "admin_session";
pub const PRIMARY_STORE_KEY: &str = "admin_session";
pub const PRIMARY_EXPIRY_KEY: &str = "admin_session_expiry";
pub const LEGACY_COOKIE: &str = "admin_bypass";
pub const LEGACY_STORE_KEY: &str = "admin_bypass";
pub const LEGACY_EXPIRY_KEY: &str = "admin_bypass_expiry";

/// Store entry holding the instant of the last logout (RFC 3339).
/// Never removed; later logouts overwrite it.
pub const REVOKED_AT_KEY: &str = "admin_session_revoked_at";

/// Default admin session lifetime.
/// A working day plus margin; operators re-authenticate daily.
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Subject written into tokens issued by `establish`.
const DEFAULT_SUBJECT: &str = "admin";

// ============================================================================
// Verdict types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    PrimaryCookie,
    PersistentStore,
    LegacyBypassCookie,
    LegacyBypassStore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionVerdict {
    pub status: SessionStatus,
    pub source: Option<SignalSource>,
    pub expiry: Option<DateTime<Utc>>,
}

impl SessionVerdict {
    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            source: None,
            expiry: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

impl Default for SessionVerdict {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// How the legacy bypass signals are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyPolicy {
    /// Legacy signals never authenticate and are removed on sweep.
    #[default]
    Ignore,
    /// Legacy signals authenticate only when they carry a valid sealed token.
    HonorSealed,
}

impl FromStr for LegacyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "honor_sealed" | "honor-sealed" => Ok(Self::HonorSealed),
            other => Err(format!("unknown legacy policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub session_ttl: Duration,
    /// Attributes for the session cookie; `max_age` is set per write.
    pub cookie: CookieOptions,
    pub legacy_policy: LegacyPolicy,
    pub routes: AdminRoutes,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            cookie: CookieOptions::default(),
            legacy_policy: LegacyPolicy::default(),
            routes: AdminRoutes::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

// ============================================================================
// Signals
// ============================================================================

/// A verified signal read from one source.
#[derive(Debug, Clone)]
struct Signal {
    source: SignalSource,
    token: String,
    expiry: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Signals {
    primary_cookie: Option<Signal>,
    primary_store: Option<Signal>,
    legacy_cookie: Option<Signal>,
    legacy_store: Option<Signal>,
}

impl Signals {
    fn verdict(&self) -> SessionVerdict {
        [
            &self.primary_cookie,
            &self.primary_store,
            &self.legacy_cookie,
            &self.legacy_store,
        ]
        .into_iter()
        .flatten()
        .next()
        .map(|signal| SessionVerdict {
            status: SessionStatus::Authenticated,
            source: Some(signal.source),
            expiry: Some(signal.expiry),
        })
        .unwrap_or_default()
    }
}

fn encode_expiry(expiry: DateTime<Utc>) -> String {
    expiry.timestamp_millis().to_string()
}

fn decode_expiry(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

// ============================================================================
// Gate
// ============================================================================

pub struct SessionGate {
    cookies: Box<dyn CookieStore>,
    store: Box<dyn KeyValueStore>,
    sealer: SessionSealer,
    config: GateConfig,
    /// Last observed status; also the cycle lock.
    state: Mutex<SessionStatus>,
}

impl SessionGate {
    pub fn new(
        cookies: impl CookieStore + 'static,
        store: impl KeyValueStore + 'static,
        sealer: SessionSealer,
        config: GateConfig,
    ) -> Self {
        Self {
            cookies: Box::new(cookies),
            store: Box::new(store),
            sealer,
            config,
            state: Mutex::new(SessionStatus::Unauthenticated),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Status recorded by the most recent check, login or logout.
    pub fn last_status(&self) -> SessionStatus {
        *self.lock()
    }

    /// Read every signal source and decide whether this context is an
    /// authenticated administrator.
    pub fn evaluate(&self) -> SessionVerdict {
        let _guard = self.lock();
        self.read_signals(Utc::now()).verdict()
    }

    /// Copy a valid primary signal into whichever mechanism lacks one.
    pub fn reconcile(&self) {
        let _guard = self.lock();
        let now = Utc::now();
        self.reconcile_locked(&self.read_signals(now), now);
    }

    /// Remove persistent-store entries that are expired or unreadable.
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let _guard = self.lock();
        self.sweep_locked(Utc::now())
    }

    /// One evaluate, reconcile and sweep cycle under a single lock.
    pub fn check(&self) -> SessionVerdict {
        let mut state = self.lock();
        let now = Utc::now();

        let signals = self.read_signals(now);
        let verdict = signals.verdict();
        self.reconcile_locked(&signals, now);
        let removed = self.sweep_locked(now);
        if removed > 0 {
            debug!(removed, "Swept stale session entries");
        }

        let previous = *state;
        if previous != verdict.status {
            info!(
                from = ?previous,
                to = ?verdict.status,
                source = ?verdict.source,
                "Admin session state changed"
            );
            *state = verdict.status;
        }
        verdict
    }

    /// Decide what to do with a navigation to `path`.
    pub fn guard(&self, path: &str) -> GuardAction {
        if !self.config.routes.requires_session(path) {
            return GuardAction::Allow;
        }
        if self.evaluate().is_authenticated() {
            GuardAction::Allow
        } else {
            debug!(path, "Redirecting unauthenticated admin navigation");
            GuardAction::RedirectToLogin
        }
    }

    /// Issue a fresh session token and write it to both mechanisms.
    /// Callers are responsible for having authenticated the operator.
    pub fn establish(&self) -> Result<SessionVerdict, GateError> {
        self.establish_for(DEFAULT_SUBJECT)
    }

    /// Writes go store first, cookie last. If any write fails, whatever was
    /// written is removed again and the gate stays unauthenticated.
    pub fn establish_for(&self, subject: &str) -> Result<SessionVerdict, GateError> {
        let mut state = self.lock();
        let (token, claims) = self.sealer.issue(subject, self.config.session_ttl)?;

        let written = self
            .store
            .set(PRIMARY_STORE_KEY, &token)
            .and_then(|_| {
                self.store
                    .set(PRIMARY_EXPIRY_KEY, &encode_expiry(claims.expires_at))
            })
            .and_then(|_| self.write_cookie(&token, &claims, Utc::now()));
        if let Err(e) = written {
            warn!(subject, error = %e, "Failed to establish admin session, rolling back");
            self.discard_primary();
            *state = SessionStatus::Unauthenticated;
            return Err(e.into());
        }

        *state = SessionStatus::Authenticated;
        info!(subject, expires_at = %claims.expires_at, "Admin session established");
        Ok(SessionVerdict {
            status: SessionStatus::Authenticated,
            source: Some(SignalSource::PrimaryCookie),
            expiry: Some(claims.expires_at),
        })
    }

    /// Revoke every token issued so far, then clear all four signal
    /// sources. Every step is attempted; the first failure is returned.
    pub fn logout(&self) -> Result<(), GateError> {
        let mut state = self.lock();
        let mut first_error: Option<StorageError> = None;
        let mut record = |result: Result<(), StorageError>, what: &str| {
            if let Err(e) = result {
                warn!(entry = what, error = %e, "Failed to clear session entry");
                first_error.get_or_insert(e);
            }
        };

        let revoked_at = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        record(self.store.set(REVOKED_AT_KEY, &revoked_at), REVOKED_AT_KEY);
        record(self.cookies.remove(PRIMARY_COOKIE), PRIMARY_COOKIE);
        record(self.cookies.remove(LEGACY_COOKIE), LEGACY_COOKIE);
        for key in [
            PRIMARY_STORE_KEY,
            PRIMARY_EXPIRY_KEY,
            LEGACY_STORE_KEY,
            LEGACY_EXPIRY_KEY,
        ] {
            record(self.store.remove(key), key);
        }

        *state = SessionStatus::Unauthenticated;
        info!("Admin session cleared");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ===== Internals (callers hold the cycle lock) =====

    fn lock(&self) -> MutexGuard<'_, SessionStatus> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Best-effort removal of the primary session from both mechanisms.
    fn discard_primary(&self) {
        if let Err(e) = self.cookies.remove(PRIMARY_COOKIE) {
            warn!(error = %e, "Failed to remove session cookie");
        }
        for key in [PRIMARY_STORE_KEY, PRIMARY_EXPIRY_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove session entry");
            }
        }
    }

    /// Instant of the most recent logout seen by the shared store.
    /// An unreadable store reports none; its own signals are absent then too.
    fn revoked_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(REVOKED_AT_KEY).ok().flatten()?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable revocation mark");
                None
            }
        }
    }

    fn is_revoked(&self, claims: &SessionClaims) -> bool {
        self.revoked_at()
            .is_some_and(|revoked| claims.issued_at <= revoked)
    }

    fn read_signals(&self, now: DateTime<Utc>) -> Signals {
        let honor_legacy = self.config.legacy_policy == LegacyPolicy::HonorSealed;
        Signals {
            primary_cookie: self.read_cookie(PRIMARY_COOKIE, SignalSource::PrimaryCookie, now),
            primary_store: self.read_store(
                PRIMARY_STORE_KEY,
                PRIMARY_EXPIRY_KEY,
                SignalSource::PersistentStore,
                now,
            ),
            legacy_cookie: honor_legacy
                .then(|| self.read_cookie(LEGACY_COOKIE, SignalSource::LegacyBypassCookie, now))
                .flatten(),
            legacy_store: honor_legacy
                .then(|| {
                    self.read_store(
                        LEGACY_STORE_KEY,
                        LEGACY_EXPIRY_KEY,
                        SignalSource::LegacyBypassStore,
                        now,
                    )
                })
                .flatten(),
        }
    }

    fn read_cookie(&self, name: &str, source: SignalSource, now: DateTime<Utc>) -> Option<Signal> {
        let token = match self.cookies.get(name) {
            Ok(token) => token?,
            Err(e) => {
                warn!(cookie = name, error = %e, "Cookie access failed, treating signal as absent");
                return None;
            }
        };
        let claims = self.verify(&token, source, now)?;
        Some(Signal {
            source,
            token,
            expiry: claims.expires_at,
        })
    }

    fn read_store(
        &self,
        key: &str,
        expiry_key: &str,
        source: SignalSource,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let read = |k: &str| match self.store.get(k) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = k, error = %e, "Store access failed, treating signal as absent");
                None
            }
        };

        let token = read(key)?;
        let stored_expiry = match read(expiry_key).as_deref().and_then(decode_expiry) {
            Some(expiry) => expiry,
            None => {
                debug!(key, "Session entry has no readable expiry");
                return None;
            }
        };
        if stored_expiry <= now {
            debug!(key, expiry = %stored_expiry, "Session entry expired");
            return None;
        }

        let claims = self.verify(&token, source, now)?;
        Some(Signal {
            source,
            token,
            expiry: stored_expiry.min(claims.expires_at),
        })
    }

    fn verify(&self, token: &str, source: SignalSource, now: DateTime<Utc>) -> Option<SessionClaims> {
        match self.sealer.open(token) {
            Ok(claims) if claims.is_expired_at(now) => {
                debug!(source = ?source, "Session token expired");
                None
            }
            Ok(claims) if self.is_revoked(&claims) => {
                debug!(source = ?source, "Session token revoked by logout");
                None
            }
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!(source = ?source, error = %e, "Rejected session signal");
                None
            }
        }
    }

    fn write_cookie(
        &self,
        token: &str,
        claims: &SessionClaims,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let options = self
            .config
            .cookie
            .clone()
            .with_max_age(claims.expires_at - now);
        self.cookies.set(PRIMARY_COOKIE, token, &options)
    }

    fn reconcile_locked(&self, signals: &Signals, now: DateTime<Utc>) {
        match (&signals.primary_cookie, &signals.primary_store) {
            (Some(cookie), None) => {
                let result = self
                    .store
                    .set(PRIMARY_STORE_KEY, &cookie.token)
                    .and_then(|_| self.store.set(PRIMARY_EXPIRY_KEY, &encode_expiry(cookie.expiry)));
                match result {
                    Ok(()) => debug!("Propagated session cookie to persistent store"),
                    Err(e) => warn!(error = %e, "Failed to propagate session to persistent store"),
                }
            }
            (None, Some(stored)) => {
                let options = self
                    .config
                    .cookie
                    .clone()
                    .with_max_age(stored.expiry - now);
                match self.cookies.set(PRIMARY_COOKIE, &stored.token, &options) {
                    Ok(()) => debug!("Propagated persistent session to cookie"),
                    Err(e) => warn!(error = %e, "Failed to propagate session to cookie"),
                }
            }
            _ => {}
        }
    }

    fn sweep_locked(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        let mut remove = |key: &str| match self.store.remove(key) {
            Ok(()) => removed += 1,
            Err(e) => warn!(key, error = %e, "Failed to remove stale session entry"),
        };

        let legacy_ignored = self.config.legacy_policy == LegacyPolicy::Ignore;
        for (key, expiry_key) in [
            (PRIMARY_STORE_KEY, PRIMARY_EXPIRY_KEY),
            (LEGACY_STORE_KEY, LEGACY_EXPIRY_KEY),
        ] {
            let token = self.store.get(key).ok().flatten();
            let raw_expiry = self.store.get(expiry_key).ok().flatten();
            if token.is_none() && raw_expiry.is_none() {
                continue;
            }

            let revoked = token
                .as_deref()
                .and_then(|t| self.sealer.open(t).ok())
                .is_some_and(|claims| self.is_revoked(&claims));
            let stale = revoked
                || (legacy_ignored && key == LEGACY_STORE_KEY)
                || match raw_expiry.as_deref().map(decode_expiry) {
                    Some(Some(expiry)) => expiry <= now,
                    // Unparseable expiry, or a token without one
                    _ => true,
                };
            if stale {
                if token.is_some() {
                    remove(key);
                }
                if raw_expiry.is_some() {
                    remove(expiry_key);
                }
            }
        }

        if legacy_ignored {
            match self.cookies.get(LEGACY_COOKIE) {
                Ok(Some(_)) => match self.cookies.remove(LEGACY_COOKIE) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(error = %e, "Failed to remove legacy bypass cookie"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Cookie access failed during sweep"),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryCookieJar, MemoryStore};
    use crate::auth::token::KEY_LEN;
    use std::sync::Arc;

    const KEY: [u8; KEY_LEN] = [42u8; KEY_LEN];

    fn gate_with(config: GateConfig) -> (SessionGate, MemoryCookieJar, MemoryStore) {
        let cookies = MemoryCookieJar::new();
        let store = MemoryStore::new();
        let gate = SessionGate::new(
            cookies.clone(),
            store.clone(),
            SessionSealer::new(&KEY),
            config,
        );
        (gate, cookies, store)
    }

    fn gate() -> (SessionGate, MemoryCookieJar, MemoryStore) {
        gate_with(GateConfig::default())
    }

    fn sealed(ttl: Duration) -> (String, SessionClaims) {
        let claims = SessionClaims::new("admin", ttl);
        (SessionSealer::new(&KEY).seal(&claims).unwrap(), claims)
    }

    fn put_store_signal(store: &MemoryStore, key: &str, expiry_key: &str, ttl: Duration) {
        let (token, claims) = sealed(ttl);
        store.set(key, &token).unwrap();
        store.set(expiry_key, &encode_expiry(claims.expires_at)).unwrap();
    }

    /// A store that fails every access.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("storage disabled".into()))
        }
        fn set(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("storage disabled".into()))
        }
        fn remove(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("storage disabled".into()))
        }
    }

    /// A cookie jar that fails every access.
    struct BrokenJar;

    impl CookieStore for BrokenJar {
        fn get(&self, _: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("cookies disabled".into()))
        }
        fn set(&self, _: &str, _: &str, _: &CookieOptions) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("cookies disabled".into()))
        }
        fn remove(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("cookies disabled".into()))
        }
    }

    /// Shared store whose writes to one key fail.
    struct RejectsKey {
        inner: MemoryStore,
        key: &'static str,
    }

    impl KeyValueStore for RejectsKey {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.key {
                return Err(StorageError::Unavailable("quota exceeded".into()));
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    type Hook = Box<dyn FnOnce() + Send>;

    /// Shared store that runs a hook once, just before `key` is removed.
    struct BeforeRemove {
        inner: MemoryStore,
        key: &'static str,
        hook: Arc<Mutex<Option<Hook>>>,
    }

    impl KeyValueStore for BeforeRemove {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            if key == self.key {
                let hook = self.hook.lock().unwrap().take();
                if let Some(hook) = hook {
                    hook();
                }
            }
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_empty_stores_are_unauthenticated() {
        let (gate, _, _) = gate();
        assert_eq!(gate.evaluate(), SessionVerdict::unauthenticated());
    }

    #[test]
    fn test_store_only_signal_authenticates_and_reconciles_to_cookie() {
        let (gate, cookies, store) = gate();
        put_store_signal(&store, PRIMARY_STORE_KEY, PRIMARY_EXPIRY_KEY, Duration::hours(1));

        let verdict = gate.evaluate();
        assert!(verdict.is_authenticated());
        assert_eq!(verdict.source, Some(SignalSource::PersistentStore));
        assert!(cookies.get(PRIMARY_COOKIE).unwrap().is_none());

        gate.reconcile();
        let cookie = cookies.get(PRIMARY_COOKIE).unwrap();
        assert_eq!(cookie, store.get(PRIMARY_STORE_KEY).unwrap());
        let options = cookies.options(PRIMARY_COOKIE).unwrap();
        assert!(options.secure);
        assert!(options.max_age.unwrap() <= Duration::hours(1));
        assert_eq!(gate.evaluate().source, Some(SignalSource::PrimaryCookie));
    }

    #[test]
    fn test_cookie_only_signal_reconciles_to_store() {
        let (gate, cookies, store) = gate();
        let (token, claims) = sealed(Duration::hours(2));
        cookies
            .set(PRIMARY_COOKIE, &token, &CookieOptions::default())
            .unwrap();

        gate.reconcile();
        assert_eq!(store.get(PRIMARY_STORE_KEY).unwrap().as_deref(), Some(token.as_str()));
        let stored_expiry = store.get(PRIMARY_EXPIRY_KEY).unwrap().unwrap();
        assert_eq!(
            decode_expiry(&stored_expiry).map(|e| e.timestamp_millis()),
            Some(claims.expires_at.timestamp_millis())
        );
    }

    #[test]
    fn test_expired_store_signal_is_rejected_and_swept() {
        let (gate, _, store) = gate();
        put_store_signal(&store, PRIMARY_STORE_KEY, PRIMARY_EXPIRY_KEY, Duration::minutes(-5));

        assert!(!gate.evaluate().is_authenticated());
        assert_eq!(gate.sweep_expired(), 2);
        assert!(!store.contains(PRIMARY_STORE_KEY));
        assert!(!store.contains(PRIMARY_EXPIRY_KEY));
    }

    #[test]
    fn test_stored_expiry_in_past_overrides_token() {
        let (gate, _, store) = gate();
        let (token, _) = sealed(Duration::hours(1));
        store.set(PRIMARY_STORE_KEY, &token).unwrap();
        let past = Utc::now() - Duration::seconds(30);
        store.set(PRIMARY_EXPIRY_KEY, &encode_expiry(past)).unwrap();

        assert!(!gate.evaluate().is_authenticated());
        assert_eq!(gate.sweep_expired(), 2);
    }

    #[test]
    fn test_unparseable_expiry_is_swept() {
        let (gate, _, store) = gate();
        let (token, _) = sealed(Duration::hours(1));
        store.set(PRIMARY_STORE_KEY, &token).unwrap();
        store.set(PRIMARY_EXPIRY_KEY, "tomorrow").unwrap();

        assert!(!gate.evaluate().is_authenticated());
        gate.sweep_expired();
        assert!(!store.contains(PRIMARY_STORE_KEY));
    }

    #[test]
    fn test_forged_flags_do_not_authenticate_or_propagate() {
        let (gate, cookies, store) = gate();
        cookies
            .set(PRIMARY_COOKIE, "true", &CookieOptions::default())
            .unwrap();
        store.set(PRIMARY_STORE_KEY, "true").unwrap();
        let future = Utc::now() + Duration::days(365);
        store.set(PRIMARY_EXPIRY_KEY, &encode_expiry(future)).unwrap();

        assert!(!gate.evaluate().is_authenticated());
        gate.reconcile();
        assert_eq!(cookies.get(PRIMARY_COOKIE).unwrap().as_deref(), Some("true"));
        assert_eq!(store.get(PRIMARY_STORE_KEY).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_token_from_other_key_is_rejected() {
        let (gate, cookies, _) = gate();
        let foreign = SessionSealer::new(&[1u8; KEY_LEN]);
        let (token, _) = foreign.issue("admin", Duration::hours(1)).unwrap();
        cookies
            .set(PRIMARY_COOKIE, &token, &CookieOptions::default())
            .unwrap();
        assert!(!gate.evaluate().is_authenticated());
    }

    #[test]
    fn test_legacy_signals_ignored_by_default_and_swept() {
        let (gate, cookies, store) = gate();
        let (token, _) = sealed(Duration::hours(1));
        cookies
            .set(LEGACY_COOKIE, &token, &CookieOptions::default())
            .unwrap();
        put_store_signal(&store, LEGACY_STORE_KEY, LEGACY_EXPIRY_KEY, Duration::hours(1));

        assert!(!gate.evaluate().is_authenticated());
        assert_eq!(gate.sweep_expired(), 3);
        assert!(!cookies.contains(LEGACY_COOKIE));
        assert!(!store.contains(LEGACY_STORE_KEY));
        assert!(!store.contains(LEGACY_EXPIRY_KEY));
    }

    #[test]
    fn test_legacy_signals_honored_when_sealed() {
        let config = GateConfig {
            legacy_policy: LegacyPolicy::HonorSealed,
            ..GateConfig::default()
        };
        let (gate, cookies, store) = gate_with(config);
        put_store_signal(&store, LEGACY_STORE_KEY, LEGACY_EXPIRY_KEY, Duration::hours(1));

        let verdict = gate.evaluate();
        assert!(verdict.is_authenticated());
        assert_eq!(verdict.source, Some(SignalSource::LegacyBypassStore));
        assert_eq!(gate.sweep_expired(), 0);

        cookies
            .set(LEGACY_COOKIE, "1", &CookieOptions::default())
            .unwrap();
        assert_eq!(gate.evaluate().source, Some(SignalSource::LegacyBypassStore));
    }

    #[test]
    fn test_guard_redirects_only_protected_paths() {
        let (gate, _, _) = gate();
        assert_eq!(gate.guard("/admin/orders"), GuardAction::RedirectToLogin);
        assert_eq!(gate.guard("/admin/login"), GuardAction::Allow);
        assert_eq!(gate.guard("/collections/spring"), GuardAction::Allow);

        gate.establish().unwrap();
        assert_eq!(gate.guard("/admin/orders"), GuardAction::Allow);
        assert_eq!(gate.guard("/admin/login"), GuardAction::Allow);
    }

    #[test]
    fn test_establish_writes_both_mechanisms() {
        let (gate, cookies, store) = gate();
        let verdict = gate.establish().unwrap();
        assert!(verdict.is_authenticated());
        assert_eq!(gate.last_status(), SessionStatus::Authenticated);

        assert!(cookies.get(PRIMARY_COOKIE).unwrap().is_some());
        assert!(store.contains(PRIMARY_STORE_KEY));
        let expiry = decode_expiry(&store.get(PRIMARY_EXPIRY_KEY).unwrap().unwrap()).unwrap();
        assert!(expiry > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn test_logout_clears_all_four_sources() {
        let config = GateConfig {
            legacy_policy: LegacyPolicy::HonorSealed,
            ..GateConfig::default()
        };
        let (gate, cookies, store) = gate_with(config);
        gate.establish().unwrap();
        let (token, _) = sealed(Duration::hours(1));
        cookies
            .set(LEGACY_COOKIE, &token, &CookieOptions::default())
            .unwrap();
        put_store_signal(&store, LEGACY_STORE_KEY, LEGACY_EXPIRY_KEY, Duration::hours(1));
        assert!(gate.evaluate().is_authenticated());

        gate.logout().unwrap();
        assert_eq!(gate.evaluate(), SessionVerdict::unauthenticated());
        assert_eq!(gate.last_status(), SessionStatus::Unauthenticated);
        for name in [PRIMARY_COOKIE, LEGACY_COOKIE] {
            assert!(!cookies.contains(name));
        }
        for key in [
            PRIMARY_STORE_KEY,
            PRIMARY_EXPIRY_KEY,
            LEGACY_STORE_KEY,
            LEGACY_EXPIRY_KEY,
        ] {
            assert!(!store.contains(key));
        }
    }

    #[test]
    fn test_check_after_logout_does_not_resurrect() {
        let (gate, _, _) = gate();
        gate.establish().unwrap();
        assert!(gate.check().is_authenticated());
        gate.logout().unwrap();
        assert!(!gate.check().is_authenticated());
        assert!(!gate.check().is_authenticated());
    }

    #[test]
    fn test_check_tracks_state_transitions() {
        let (gate, _, store) = gate();
        assert_eq!(gate.last_status(), SessionStatus::Unauthenticated);
        put_store_signal(&store, PRIMARY_STORE_KEY, PRIMARY_EXPIRY_KEY, Duration::hours(1));
        gate.check();
        assert_eq!(gate.last_status(), SessionStatus::Authenticated);
    }

    #[test]
    fn test_storage_failure_fails_closed() {
        let cookies = MemoryCookieJar::new();
        let gate = SessionGate::new(
            cookies.clone(),
            BrokenStore,
            SessionSealer::new(&KEY),
            GateConfig::default(),
        );
        assert!(!gate.evaluate().is_authenticated());
        assert_eq!(gate.sweep_expired(), 0);
        gate.reconcile();
        assert!(gate.establish().is_err());
        assert!(gate.logout().is_err());
    }

    #[test]
    fn test_storage_failure_on_store_still_uses_cookie() {
        let cookies = MemoryCookieJar::new();
        let gate = SessionGate::new(
            cookies.clone(),
            BrokenStore,
            SessionSealer::new(&KEY),
            GateConfig::default(),
        );
        let (token, _) = sealed(Duration::hours(1));
        cookies
            .set(PRIMARY_COOKIE, &token, &CookieOptions::default())
            .unwrap();
        let verdict = gate.check();
        assert!(verdict.is_authenticated());
        assert_eq!(verdict.source, Some(SignalSource::PrimaryCookie));
    }

    #[test]
    fn test_failed_establish_leaves_no_session() {
        let cookies = MemoryCookieJar::new();
        let store = MemoryStore::new();
        let gate = SessionGate::new(
            cookies.clone(),
            RejectsKey {
                inner: store.clone(),
                key: PRIMARY_EXPIRY_KEY,
            },
            SessionSealer::new(&KEY),
            GateConfig::default(),
        );

        assert!(gate.establish().is_err());
        assert_eq!(gate.evaluate(), SessionVerdict::unauthenticated());
        assert_eq!(gate.last_status(), SessionStatus::Unauthenticated);
        assert!(!cookies.contains(PRIMARY_COOKIE));
        assert!(!store.contains(PRIMARY_STORE_KEY));
    }

    #[test]
    fn test_failed_cookie_write_rolls_back_store() {
        let store = MemoryStore::new();
        let gate = SessionGate::new(
            BrokenJar,
            store.clone(),
            SessionSealer::new(&KEY),
            GateConfig::default(),
        );

        assert!(gate.establish().is_err());
        assert!(!gate.evaluate().is_authenticated());
        assert!(!store.contains(PRIMARY_STORE_KEY));
        assert!(!store.contains(PRIMARY_EXPIRY_KEY));
    }

    #[test]
    fn test_check_from_other_gate_during_logout_cannot_resurrect() {
        let cookies = MemoryCookieJar::new();
        let store = MemoryStore::new();
        let hook: Arc<Mutex<Option<Hook>>> = Arc::new(Mutex::new(None));
        let leaving = SessionGate::new(
            cookies.clone(),
            BeforeRemove {
                inner: store.clone(),
                key: PRIMARY_STORE_KEY,
                hook: hook.clone(),
            },
            SessionSealer::new(&KEY),
            GateConfig::default(),
        );
        let watcher = Arc::new(SessionGate::new(
            cookies.clone(),
            store.clone(),
            SessionSealer::new(&KEY),
            GateConfig::default(),
        ));

        leaving.establish().unwrap();
        assert!(watcher.check().is_authenticated());

        // Cookies are already gone, store entries not yet.
        let seen: Arc<Mutex<Option<SessionVerdict>>> = Arc::new(Mutex::new(None));
        let (w, out) = (watcher.clone(), seen.clone());
        *hook.lock().unwrap() = Some(Box::new(move || {
            *out.lock().unwrap() = Some(w.check());
        }));

        leaving.logout().unwrap();
        let during = seen.lock().unwrap().clone().unwrap();
        assert!(!during.is_authenticated());
        assert!(!cookies.contains(PRIMARY_COOKIE));
        assert_eq!(leaving.evaluate(), SessionVerdict::unauthenticated());
        assert!(!watcher.check().is_authenticated());
    }

    #[test]
    fn test_copied_token_is_dead_after_logout() {
        let (gate, cookies, store) = gate();
        gate.establish().unwrap();
        let token = store.get(PRIMARY_STORE_KEY).unwrap().unwrap();
        let expiry = store.get(PRIMARY_EXPIRY_KEY).unwrap().unwrap();

        gate.logout().unwrap();
        store.set(PRIMARY_STORE_KEY, &token).unwrap();
        store.set(PRIMARY_EXPIRY_KEY, &expiry).unwrap();
        cookies
            .set(PRIMARY_COOKIE, &token, &CookieOptions::default())
            .unwrap();

        assert!(!gate.check().is_authenticated());
        assert!(!store.contains(PRIMARY_STORE_KEY));
    }

    #[test]
    fn test_login_after_logout_succeeds() {
        let (gate, _, store) = gate();
        gate.establish().unwrap();
        gate.logout().unwrap();
        assert!(store.contains(REVOKED_AT_KEY));

        gate.establish().unwrap();
        assert!(gate.check().is_authenticated());
    }

    #[test]
    fn test_legacy_policy_parsing() {
        assert_eq!("ignore".parse::<LegacyPolicy>(), Ok(LegacyPolicy::Ignore));
        assert_eq!(
            "Honor-Sealed".parse::<LegacyPolicy>(),
            Ok(LegacyPolicy::HonorSealed)
        );
        assert!("always".parse::<LegacyPolicy>().is_err());
    }
}
