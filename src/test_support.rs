//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Timeouts;
use crate::registry::ClientRegistry;
use crate::retry::RetryError;
use crate::sdk::{
    ApiRequest, ApiResponse, ApiTransport, Credential, SdkError, SdkFuture, StaticCredential,
};

/// Returns the credential used by scripted clients.
#[must_use]
pub fn test_credential() -> Credential {
    Credential::new("AKID-test", "secret-test")
}

/// Timeouts short enough for tests to run through every wait.
#[must_use]
pub const fn fast_timeouts() -> Timeouts {
    Timeouts::uniform(Duration::from_millis(200))
}

/// Builds a registry whose clients all send through `transport`.
#[must_use]
pub fn scripted_registry(transport: &ScriptedTransport) -> ClientRegistry {
    ClientRegistry::new(
        "eu-central-1",
        Arc::new(StaticCredential::new(test_credential())),
        Arc::new(transport.clone()),
        fast_timeouts(),
    )
}

/// Scripted transport that returns pre-seeded responses in FIFO order.
///
/// Every request is recorded. Once the queue is empty further calls fail with
/// a network error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    responses: Arc<StdMutex<VecDeque<Result<ApiResponse, SdkError>>>>,
    requests: Arc<StdMutex<Vec<ApiRequest>>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, response: Result<ApiResponse, SdkError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Queues a successful response body.
    pub fn push_response(&self, body: Value) {
        self.push(Ok(ApiResponse {
            request_id: String::from("req-scripted"),
            body,
        }));
    }

    /// Queues an arbitrary failure.
    pub fn push_error(&self, error: SdkError) {
        self.push(Err(error));
    }

    /// Queues an API error envelope with the given code.
    pub fn push_api_error(&self, code: &str, message: &str) {
        self.push_error(SdkError::Api {
            code: code.to_owned(),
            message: message.to_owned(),
            request_id: String::from("req-scripted"),
        });
    }

    /// Returns a snapshot of every request sent so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the action names of every request sent so far.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.action)
            .collect()
    }

    /// Number of responses still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ApiTransport for ScriptedTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SdkFuture<'a, ApiResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| Err(SdkError::network("no scripted response available")))
        })
    }
}

/// One scripted accessor answer.
pub type StatusStep = Result<Option<String>, RetryError<String>>;

/// Scripted status accessor for driving convergence waits.
///
/// Answers are returned in order; the final answer repeats once the script is
/// exhausted. Every call is counted.
#[derive(Debug)]
pub struct StatusScript {
    steps: StdMutex<VecDeque<StatusStep>>,
    last: StdMutex<StatusStep>,
    calls: AtomicUsize,
}

impl StatusScript {
    /// Creates a script from a sequence of answers.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = StatusStep>) -> Self {
        Self {
            steps: StdMutex::new(steps.into_iter().collect()),
            last: StdMutex::new(Ok(None)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script that reports the given statuses in order.
    #[must_use]
    pub fn statuses(statuses: &[&str]) -> Self {
        Self::new(
            statuses
                .iter()
                .map(|status| Ok(Some((*status).to_owned()))),
        )
    }

    /// Returns the next answer.
    pub fn answer(&self) -> StatusStep {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(step) = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            *last = step;
        }
        last.clone()
    }

    /// Number of answers handed out.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs.iter().map(|(key, value)| (*key, Some(*value)))).await
    }

    /// Removes the given variables while holding the global mutex.
    pub async fn unset_vars(keys: &[&str]) -> Self {
        Self::apply(keys.iter().map(|key| (*key, None))).await
    }

    async fn apply<'a>(requested: impl Iterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let changes: Vec<_> = requested.collect();
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                changes.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push((key.to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
