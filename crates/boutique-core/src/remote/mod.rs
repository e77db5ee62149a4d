//! Remote function invocation.
//!
//! This module provides the `Invoker` for calling named serverless
//! functions with bounded, classified retry, and `FunctionsClient`, the
//! HTTP dispatcher for the hosted functions endpoint.
//!
//! Transport failures are retried with backoff; anything the dispatcher
//! reports as an application error is surfaced immediately.

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod invoke;

pub use backoff::Backoff;
pub use dispatcher::{FunctionsClient, RemoteDispatcher};
pub use error::{ErrorKind, InvokeError, RemoteError};
pub use invoke::{Envelope, InvokeHooks, InvokeOptions, Invoker, NoHooks};
