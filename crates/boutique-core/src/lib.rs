//! Core library for the boutique storefront back-office.
//!
//! This crate provides:
//! - `auth`: the admin session gate (sealed session signals kept in a cookie
//!   jar and a persistent key/value store, reconciliation, expiry sweeping,
//!   route guarding) and its background monitor
//! - `remote`: invocation of named serverless functions with classified,
//!   bounded retry
//! - `notify`: invoice email requests sent through the remote invoker
//! - `config`: operator configuration with environment overrides

pub mod auth;
pub mod config;
pub mod notify;
pub mod remote;

pub use auth::{
    AdminRoutes, GateConfig, GateEvent, GuardAction, LegacyPolicy, SessionGate, SessionMonitor,
    SessionStatus, SessionVerdict, SignalSource,
};
pub use config::Config;
pub use remote::{
    Backoff, ErrorKind, FunctionsClient, InvokeError, InvokeHooks, InvokeOptions, Invoker,
    RemoteDispatcher, RemoteError,
};
