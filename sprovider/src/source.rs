//! Fragment stream contract and the in-memory scripted source.
//!
//! ```rust
//! use sprovider::{FragmentStream, VecFragmentStream};
//!
//! let stream = VecFragmentStream::new(vec![Ok("hello".to_string())]);
//! let _boxed: FragmentStream<'static> = Box::pin(stream);
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures_core::Stream;
use scommon::BoxFuture;

use crate::{ProviderError, ProviderKind};

/// Lazy, finite, non-restartable sequence of UTF-8 text fragments.
///
/// Invariants for consumers:
/// - Fragments are emitted in generation order.
/// - An `Err` item reports a failure while iterating; nothing useful follows it.
/// - Once the stream yields `None`, it must not yield additional items.
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send + 'a>>;

pub trait FragmentSource: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Opens a generation run. Failing here means no fragment was produced.
    fn stream<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<FragmentStream<'a>, ProviderError>>;
}

#[derive(Debug)]
pub struct VecFragmentStream {
    items: VecDeque<Result<String, ProviderError>>,
}

impl VecFragmentStream {
    pub fn new(items: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl Stream for VecFragmentStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.items.pop_front())
    }
}

/// Replays a fixed script: queued open failures first, then the same items on every open.
#[derive(Debug, Default)]
pub struct ScriptedFragmentSource {
    items: Vec<Result<String, ProviderError>>,
    open_failures: Mutex<VecDeque<ProviderError>>,
    requests: Mutex<Vec<ScriptedRequest>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedRequest {
    pub model: String,
    pub prompt: String,
}

impl ScriptedFragmentSource {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_items(fragments.into_iter().map(|fragment| Ok(fragment.into())).collect())
    }

    pub fn from_items(items: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            items,
            open_failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a mid-stream failure after the scripted fragments.
    pub fn then_fail(mut self, error: ProviderError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Queues a failure for the next `stream` call that has not yet consumed one.
    pub fn with_open_failure(self, error: ProviderError) -> Self {
        if let Ok(mut failures) = self.open_failures.lock() {
            failures.push_back(error);
        }
        self
    }

    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

impl FragmentSource for ScriptedFragmentSource {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Scripted
    }

    fn stream<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<FragmentStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.requests
                .lock()
                .map_err(|_| ProviderError::other("scripted source lock poisoned"))?
                .push(ScriptedRequest {
                    model: model.to_string(),
                    prompt: prompt.to_string(),
                });

            let failure = self
                .open_failures
                .lock()
                .map_err(|_| ProviderError::other("scripted source lock poisoned"))?
                .pop_front();
            if let Some(error) = failure {
                return Err(error);
            }

            Ok(Box::pin(VecFragmentStream::new(self.items.clone())) as FragmentStream<'a>)
        })
    }
}
