//! Bounded, classified retry around a single remote function call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Backoff, InvokeError, RemoteDispatcher, RemoteError};

/// Default number of retries after the first attempt.
/// Two retries ride out a brief network drop without stalling the caller.
pub const DEFAULT_RETRIES: u32 = 2;

/// Lifecycle callbacks for one invocation. All default to no-ops.
pub trait InvokeHooks: Send + Sync {
    fn on_start(&self, _function: &str) {}

    /// Before attempt `attempt` (>= 1), after waiting has been scheduled.
    fn on_retry(&self, _attempt: u32, _delay: Duration, _last_error: &RemoteError) {}

    /// Every failed attempt, retryable or not.
    fn on_error(&self, _attempt: u32, _error: &RemoteError) {}

    fn on_success(&self, _attempt: u32, _data: &Value) {}

    /// Once, when the invocation gives up.
    fn on_final_error(&self, _error: &RemoteError) {}
}

pub struct NoHooks;

impl InvokeHooks for NoHooks {}

pub type Classifier = Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct InvokeOptions {
    pub retries: u32,
    pub backoff: Backoff,
    /// Decides whether an error is worth retrying.
    pub classifier: Classifier,
    pub hooks: Arc<dyn InvokeHooks>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            backoff: Backoff::default(),
            classifier: Arc::new(RemoteError::is_transient),
            hooks: Arc::new(NoHooks),
        }
    }
}

impl fmt::Debug for InvokeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeOptions")
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl InvokeOptions {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&RemoteError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn InvokeHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

/// `{ data, error }` view of an invocation result for JSON consumers.
/// Exactly one field is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Option<Value>,
    pub error: Option<RemoteError>,
}

impl From<Result<Value, InvokeError>> for Envelope {
    fn from(result: Result<Value, InvokeError>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                data: None,
                error: Some(e.last),
            },
        }
    }
}

/// Invokes named functions through a dispatcher. Holds no state across
/// calls; each `invoke` is a self-contained attempt loop.
pub struct Invoker<D> {
    dispatcher: D,
}

impl<D: RemoteDispatcher> Invoker<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub async fn invoke(
        &self,
        function: &str,
        payload: &Value,
        options: &InvokeOptions,
    ) -> Result<Value, InvokeError> {
        let hooks = options.hooks.as_ref();
        hooks.on_start(function);

        let mut attempt: u32 = 0;
        loop {
            match self.dispatcher.call(function, payload).await {
                Ok(data) => {
                    debug!(function, attempt, "Remote call succeeded");
                    hooks.on_success(attempt, &data);
                    return Ok(data);
                }
                Err(error) => {
                    hooks.on_error(attempt, &error);

                    let retryable = (options.classifier)(&error);
                    if !retryable || attempt >= options.retries {
                        if retryable {
                            warn!(function, attempts = attempt + 1, error = %error, "Retry budget exhausted");
                        } else {
                            warn!(function, attempt, error = %error, "Terminal error, not retrying");
                        }
                        hooks.on_final_error(&error);
                        return Err(InvokeError {
                            function: function.to_string(),
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    attempt += 1;
                    let delay = options.backoff.delay_for(attempt);
                    warn!(
                        function,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    hooks.on_retry(attempt, delay, &error);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
