//! Queue-based fakes shared by the unit tests.

use crate::api::{BackendFuture, ChatBackend, CompletionRequest};
use crate::cache::CACHE_PREFIX;
use crate::error::{CoreError, ProviderError, StoreError};
use crate::provider::{LlmProvider, ProviderFactory, credentials};
use crate::settings::{ApiProvider, ProviderSettings};
use crate::store::{KeyValueStore, MemoryStore};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Backend that pops queued replies and records every request.
/// With an empty queue it answers `"mock reply <n>"`.
pub struct MockBackend {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queue_ok(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn queue_err(&self, err: ProviderError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// Shared handle to the recorded requests.
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.calls.clone()
    }
}

impl ChatBackend for MockBackend {
    fn provider(&self) -> ApiProvider {
        ApiProvider::OpenAi
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BackendFuture<'a> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("mock reply {n}")));
        Box::pin(async move { reply })
    }
}

/// Provider whose calls can be held open until the test releases them.
pub struct MockProvider {
    pub summarize_calls: AtomicUsize,
    pub question_calls: AtomicUsize,
    gate: Option<Semaphore>,
    reply: Result<String, ProviderError>,
}

impl MockProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            summarize_calls: AtomicUsize::new(0),
            question_calls: AtomicUsize::new(0),
            gate: None,
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            reply: Err(err),
            ..Self::replying("")
        }
    }

    /// Calls block until [`release`](Self::release) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }

    async fn wait(&self) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
    }
}

impl LlmProvider for MockProvider {
    fn summarize<'a>(&'a self, content: &'a str, _template: Option<&'a str>) -> BackendFuture<'a> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.wait().await;
            self.reply.clone().map(|r| if r.is_empty() { content.to_string() } else { r })
        })
    }

    fn answer_question<'a>(
        &'a self,
        _context: &'a str,
        _summary: &'a str,
        question: &'a str,
        template: Option<&'a str>,
    ) -> BackendFuture<'a> {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.wait().await;
            self.reply
                .clone()
                .map(|r| format!("{r} [{question}] [{}]", template.unwrap_or("builtin")))
        })
    }
}

/// Factory handing out one shared [`MockProvider`], after the same
/// credential checks as the real factory.
pub struct MockFactory {
    pub provider: Arc<MockProvider>,
    pub created: AtomicUsize,
}

impl MockFactory {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            created: AtomicUsize::new(0),
        }
    }
}

impl ProviderFactory for MockFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, CoreError> {
        credentials(settings)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.clone())
    }
}

/// Memory store that cannot read or delete cache entries.
#[derive(Default)]
pub struct BrokenCacheStore {
    inner: MemoryStore,
}

fn unplugged(key: &str) -> StoreError {
    StoreError::Io {
        path: key.to_string(),
        source: std::io::Error::other("disk unplugged"),
    }
}

impl KeyValueStore for BrokenCacheStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if key.starts_with(CACHE_PREFIX) {
            return Err(unplugged(key));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    fn remove(&self, keys: &[String]) -> Result<(), StoreError> {
        if let Some(key) = keys.iter().find(|k| k.starts_with(CACHE_PREFIX)) {
            return Err(unplugged(key));
        }
        self.inner.remove(keys)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}
