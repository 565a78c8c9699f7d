mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{client_for, completion_body, provider_error, ScriptedTransport};
use interviewer::cache::{CacheError, CacheKey, CacheStore, SqliteCacheStore};
use interviewer::errors::ProviderErrorKind;
use interviewer::llm_wrapper::resolve_params;
use interviewer::schemas::completion_result::RawResponse;
use interviewer::{CompletionError, CompletionRequest, Mode};

fn request() -> CompletionRequest {
    CompletionRequest::new("Interviewer: Hi\nCandidate: Hello\nInterviewer:")
        .with_max_tokens(64)
        .with_temperature(0.7)
        .with_stop(["Candidate:", "Interviewer:"])
}

#[tokio::test]
async fn normalizes_a_fresh_response() {
    let transport = ScriptedTransport::new([Ok(completion_body(&[" Nice to meet you.", " Hi."]))]);
    let client = client_for(&transport);

    let result = client.complete(&request(), Some("greeting")).await.unwrap();

    assert_eq!(result.completion, " Nice to meet you.");
    assert_eq!(result.all_completions, vec![" Nice to meet you.", " Hi."]);
    assert_eq!(result.num_tokens, 30);
    assert_eq!(result.usage.prompt_tokens, 20);
    assert_eq!(result.request_tag.as_deref(), Some("greeting"));
    assert_eq!(result.request_params.max_tokens, 64);
    assert!(!result.from_cache);
    assert_eq!(result.attempts, 1);
    assert!(result.latency >= 0.0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn prepopulated_cache_is_served_without_remote_call() {
    let transport = ScriptedTransport::new([]);
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let key = CacheKey::from_params(&resolve_params(&request()).unwrap());
    let cached = RawResponse {
        body: completion_body(&[" From the cache."]),
        latency: 1.234,
    };
    store.set(&key, &cached, Some("seed")).await.unwrap();

    let client = client_for(&transport).with_cache(store);
    let result = client.complete(&request(), None).await.unwrap();

    assert_eq!(transport.calls(), 0);
    assert_eq!(result.raw_response, cached);
    assert_eq!(result.completion, " From the cache.");
    assert_eq!(result.latency, 1.234);
    assert!(result.from_cache);
    assert_eq!(result.attempts, 0);
}

#[tokio::test]
async fn miss_is_stored_and_replayed() {
    let transport = ScriptedTransport::replying(&[" first answer"]);
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let client = client_for(&transport).with_cache(store.clone());

    let first = client.complete(&request(), Some("t1")).await.unwrap();
    let second = client.complete(&request(), Some("t2")).await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(store.len().await.unwrap(), 1);
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.completion, " first answer");
    assert!((second.latency - first.latency).abs() < 1e-9);
    assert_eq!(second.request_tag.as_deref(), Some("t2"));
}

#[tokio::test]
async fn without_cache_every_call_goes_remote() {
    let transport = ScriptedTransport::replying(&["a", "b"]);
    let client = client_for(&transport);
    assert!(!client.has_cache());

    assert_eq!(client.complete(&request(), None).await.unwrap().completion, "a");
    assert_eq!(client.complete(&request(), None).await.unwrap().completion, "b");
    assert_eq!(transport.calls(), 2);
}

struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<RawResponse>, CacheError> {
        Err(CacheError::Worker("disk unplugged".into()))
    }

    async fn set(
        &self,
        _key: &CacheKey,
        _payload: &RawResponse,
        _tag: Option<&str>,
    ) -> Result<(), CacheError> {
        Err(CacheError::Worker("disk unplugged".into()))
    }

    async fn len(&self) -> Result<u64, CacheError> {
        Err(CacheError::Worker("disk unplugged".into()))
    }
}

#[tokio::test]
async fn cache_failures_fall_through_to_remote_call() {
    let transport = ScriptedTransport::replying(&["still works"]);
    let client = client_for(&transport).with_cache(Arc::new(BrokenCache));

    let result = client.complete(&request(), None).await.unwrap();

    assert_eq!(result.completion, "still works");
    assert!(!result.from_cache);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn symbolic_stop_tokens_are_rewritten_before_dispatch() {
    let transport = ScriptedTransport::replying(&["ok"]);
    let client = client_for(&transport);
    let request =
        CompletionRequest::new("Q:").with_stop(["newline", "double-newline", "Candidate:"]);

    client.complete(&request, None).await.unwrap();

    let stop = transport.last_params().stop.unwrap();
    assert!(stop.contains(&"\n".to_string()));
    assert!(stop.contains(&"\n\n".to_string()));
    assert!(stop.contains(&"Candidate:".to_string()));
    assert!(!stop.iter().any(|s| s == "newline" || s == "double-newline"));
    assert_eq!(
        request.stop.as_deref(),
        Some(&["newline".to_string(), "double-newline".to_string(), "Candidate:".to_string()][..])
    );
}

#[tokio::test]
async fn insert_mode_sends_prefix_and_suffix() {
    let transport = ScriptedTransport::replying(&["filled"]);
    let client = client_for(&transport);
    let request = CompletionRequest::new("def add(a, b):\n[Insert]\nprint(add(1, 2))")
        .with_mode(Mode::Insert);

    client.complete(&request, None).await.unwrap();

    let params = transport.last_params();
    assert_eq!(params.prompt, "def add(a, b):\n");
    assert_eq!(params.suffix.as_deref(), Some("\nprint(add(1, 2))"));
}

#[tokio::test]
async fn bad_insert_prompt_fails_before_any_remote_call() {
    let transport = ScriptedTransport::new([]);
    let client = client_for(&transport);

    for prompt in ["nothing to fill", "[insert] and [INSERT]"] {
        let request = CompletionRequest::new(prompt).with_mode(Mode::Insert);
        let err = client.complete(&request, None).await.unwrap_err();
        assert!(matches!(err, CompletionError::Validation { .. }), "{err:?}");
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn rate_limit_is_retried_once() {
    let transport = ScriptedTransport::new([
        Err(provider_error(ProviderErrorKind::RateLimit)),
        Ok(completion_body(&["second time lucky"])),
    ]);
    let client = client_for(&transport);

    let result = client.complete(&request(), None).await.unwrap();

    assert_eq!(result.completion, "second time lucky");
    assert_eq!(result.attempts, 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let transport = ScriptedTransport::new([
        Err(provider_error(ProviderErrorKind::InvalidRequest)),
        Ok(completion_body(&["never reached"])),
    ]);
    let client = client_for(&transport);

    let err = client.complete(&request(), None).await.unwrap_err();

    match err {
        CompletionError::Permanent(source) => {
            assert_eq!(source.kind, ProviderErrorKind::InvalidRequest)
        }
        other => panic!("expected permanent failure, got {other:?}"),
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_failure() {
    let transport = ScriptedTransport::new([
        Err(provider_error(ProviderErrorKind::Timeout)),
        Err(provider_error(ProviderErrorKind::ServiceUnavailable)),
        Ok(completion_body(&["too late"])),
    ]);
    let client = client_for(&transport);

    let err = client.complete(&request(), None).await.unwrap_err();

    match err {
        CompletionError::Transient { attempts, source } => {
            assert_eq!(attempts, 2);
            assert_eq!(source.kind, ProviderErrorKind::ServiceUnavailable);
        }
        other => panic!("expected transient failure, got {other:?}"),
    }
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn failed_calls_are_not_cached() {
    let transport = ScriptedTransport::new([
        Err(provider_error(ProviderErrorKind::Authentication)),
        Ok(completion_body(&["after fixing the key"])),
    ]);
    let store = Arc::new(SqliteCacheStore::in_memory().unwrap());
    let client = client_for(&transport).with_cache(store.clone());

    assert!(client.complete(&request(), None).await.is_err());
    assert!(store.is_empty().await.unwrap());

    let result = client.complete(&request(), None).await.unwrap();
    assert_eq!(result.completion, "after fixing the key");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn malformed_response_is_reported() {
    let transport = ScriptedTransport::new([Ok(serde_json::json!({"unexpected": true}))]);
    let client = client_for(&transport);

    let err = client.complete(&request(), None).await.unwrap_err();
    assert!(matches!(err, CompletionError::InvalidResponse(_)));
}
