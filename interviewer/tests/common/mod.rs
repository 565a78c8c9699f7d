#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use interviewer::errors::{ProviderError, ProviderErrorKind};
use interviewer::retry::RetryPolicy;
use interviewer::schemas::completion_request::CompletionParams;
use interviewer::transport::CompletionTransport;
use interviewer::CompletionClient;
use serde_json::{json, Value};

/// Transport that replays scripted outcomes and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    seen: Mutex<Vec<CompletionParams>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: impl IntoIterator<Item = Result<Value, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn replying(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|text| Ok(completion_body(&[*text]))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<CompletionParams> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last_params(&self) -> CompletionParams {
        self.seen().pop().expect("transport was never called")
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn create(&self, params: &CompletionParams) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(params.clone());
        // Yield so concurrent callers get a chance to interleave.
        tokio::task::yield_now().await;
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(completion_body(&["default reply"])))
    }
}

pub fn completion_body(texts: &[&str]) -> Value {
    let choices: Vec<Value> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| json!({"text": text, "index": index, "finish_reason": "stop"}))
        .collect();
    json!({
        "id": "cmpl-test",
        "object": "text_completion",
        "choices": choices,
        "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
    })
}

pub fn provider_error(kind: ProviderErrorKind) -> ProviderError {
    ProviderError::new(kind, "scripted failure")
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_unit(Duration::from_millis(1))
}

pub fn client_for(transport: &Arc<ScriptedTransport>) -> CompletionClient {
    CompletionClient::new(transport.clone()).with_retry_policy(fast_retry())
}
