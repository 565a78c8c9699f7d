use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use regex::Regex;
use tokio_retry2::{Retry, RetryError};

use crate::cache::{CacheKey, CacheStore};
use crate::errors::{CompletionError, ProviderError};
use crate::retry::RetryPolicy;
use crate::schemas::completion_request::{CompletionParams, CompletionRequest, Mode};
use crate::schemas::completion_result::{CompletionResult, RawResponse};
use crate::transport::CompletionTransport;

pub const INSERT_MARKER: &str = "[insert]";

const STOP_ALIASES: [(&str, &str); 2] = [("newline", "\n"), ("double-newline", "\n\n")];

fn insert_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[insert\]").expect("insert marker pattern is valid"))
}

/// Replace the symbolic `newline` / `double-newline` stop tokens with the
/// characters they stand for. Returns a new list; `None` or an empty list
/// yields `None`.
pub fn normalize_stop(stop: Option<&[String]>) -> Option<Vec<String>> {
    let stop = stop?;
    if stop.is_empty() {
        return None;
    }
    Some(
        stop.iter()
            .map(|token| {
                STOP_ALIASES
                    .iter()
                    .find(|(alias, _)| alias == token)
                    .map(|(_, literal)| literal.to_string())
                    .unwrap_or_else(|| token.clone())
            })
            .collect(),
    )
}

/// Turn a caller's request into the parameters sent to the provider.
///
/// Insert mode splits the prompt around the single `[insert]` marker into
/// `prompt` and `suffix`.
pub fn resolve_params(request: &CompletionRequest) -> Result<CompletionParams, CompletionError> {
    let (prompt, suffix) = match request.mode {
        Mode::Complete => (request.prompt.clone(), None),
        Mode::Insert => {
            let markers: Vec<_> = insert_marker_re().find_iter(&request.prompt).collect();
            if markers.len() != 1 {
                return Err(CompletionError::Validation {
                    marker: INSERT_MARKER,
                    found: markers.len(),
                });
            }
            let marker = markers[0];
            (
                request.prompt[..marker.start()].to_string(),
                Some(request.prompt[marker.end()..].to_string()),
            )
        }
    };

    Ok(CompletionParams {
        prompt,
        model: request.model.clone(),
        n: request.n,
        top_p: request.top_p,
        best_of: request.best_of,
        temperature: request.temperature,
        logprobs: request.logprobs,
        max_tokens: request.max_tokens,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        stop: normalize_stop(request.stop.as_deref()),
        logit_bias: request.logit_bias.clone(),
        suffix,
    })
}

/// Completion API client with response caching and retries.
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    cache: Option<Arc<dyn CacheStore>>,
    retry: RetryPolicy,
}

impl CompletionClient {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            cache: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
        request_tag: Option<&str>,
    ) -> Result<CompletionResult, CompletionError> {
        let tag = request_tag.unwrap_or("-");
        tracing::debug!("[OAI:{}] Prompt:\n{}", tag, request.prompt);

        let params = resolve_params(request)?;
        tracing::debug!("[OAI:{}] Params: {:?}", tag, params);

        let (raw, from_cache, attempts) = self.complete_with_cache(&params, request_tag).await?;
        tracing::debug!("[OAI:{}] Response:\n{}", tag, raw.body);

        let result = CompletionResult::normalize(
            raw,
            params,
            request_tag.map(str::to_owned),
            from_cache,
            attempts,
        )?;
        tracing::debug!("[OAI:{}] Post-processed: {:?}", tag, result.all_completions);

        Ok(result)
    }

    async fn complete_with_cache(
        &self,
        params: &CompletionParams,
        request_tag: Option<&str>,
    ) -> Result<(RawResponse, bool, u32), CompletionError> {
        let tag = request_tag.unwrap_or("-");
        let key = CacheKey::from_params(params);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(cached)) => {
                    let entries = cache.len().await.unwrap_or_default();
                    tracing::info!("[OAI:{}] Cache hit!. Entries {}", tag, entries);
                    return Ok((cached, true, 0));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[OAI:{}] Cache read failed, calling API: {}", tag, e);
                }
            }
        }

        let (raw, attempts) = self.call_with_retry(params, tag).await?;
        tracing::debug!("[OAI:{}] Latency: {}.", tag, raw.latency);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &raw, request_tag).await {
                tracing::warn!("[OAI:{}] Failed to cache response: {}", tag, e);
            }
        }

        Ok((raw, false, attempts))
    }

    async fn call_with_retry(
        &self,
        params: &CompletionParams,
        tag: &str,
    ) -> Result<(RawResponse, u32), CompletionError> {
        let delays = self.retry.delays();
        let max_attempts = self.retry.max_attempts;
        let attempt = AtomicU32::new(0);

        let (this, attempt_ref, delays_ref) = (self, &attempt, &delays);
        let result = Retry::spawn(delays.clone(), move || async move {
            let current_attempt = attempt_ref.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                "[OAI:{}] Completion attempt {}/{}",
                tag,
                current_attempt + 1,
                max_attempts
            );

            match this.timed_call(params).await {
                Ok(raw) => Ok(raw),
                Err(e) if this.retry.should_retry(&e) => {
                    if let Some(wait) = delays_ref.get(current_attempt as usize) {
                        tracing::info!(
                            "[OAI:{}] Attempt {}/{} failed ({}), retrying in {:.3}s",
                            tag,
                            current_attempt + 1,
                            max_attempts,
                            e,
                            wait.as_secs_f64()
                        );
                    }
                    Err(RetryError::transient(e))
                }
                Err(e) => Err(RetryError::permanent(e)),
            }
        })
        .await;

        let attempts = attempt.load(Ordering::SeqCst);
        match result {
            Ok(raw) => Ok((raw, attempts)),
            Err(e) if self.retry.should_retry(&e) => {
                tracing::error!(
                    "[OAI:{}] Completion failed after {} attempts. Final error: {}",
                    tag,
                    attempts,
                    e
                );
                Err(CompletionError::Transient {
                    attempts,
                    source: e,
                })
            }
            Err(e) => {
                tracing::warn!("[OAI:{}] Completion rejected: {}", tag, e);
                Err(CompletionError::Permanent(e))
            }
        }
    }

    async fn timed_call(&self, params: &CompletionParams) -> Result<RawResponse, ProviderError> {
        let start = Instant::now();
        let body = self.transport.create(params).await?;
        let latency = (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
        Ok(RawResponse { body, latency })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrites_symbolic_stop_tokens() {
        let stop = strings(&["newline", "double-newline", "Candidate:"]);
        let rewritten = normalize_stop(Some(stop.as_slice())).unwrap();

        assert_eq!(rewritten, strings(&["\n", "\n\n", "Candidate:"]));
        assert_eq!(stop, strings(&["newline", "double-newline", "Candidate:"]));
    }

    #[test]
    fn empty_stop_list_becomes_none() {
        assert_eq!(normalize_stop(Some(&[][..])), None);
        assert_eq!(normalize_stop(None), None);
    }

    #[test]
    fn insert_mode_splits_around_marker() {
        let request = CompletionRequest::new("We're writing to [INSERT] this into a paragraph.")
            .with_mode(Mode::Insert);
        let params = resolve_params(&request).unwrap();

        assert_eq!(params.prompt, "We're writing to ");
        assert_eq!(params.suffix.as_deref(), Some(" this into a paragraph."));
    }

    #[test]
    fn insert_marker_at_edges_gives_empty_parts() {
        let request = CompletionRequest::new("[insert]").with_mode(Mode::Insert);
        let params = resolve_params(&request).unwrap();
        assert_eq!(params.prompt, "");
        assert_eq!(params.suffix.as_deref(), Some(""));
    }

    #[test]
    fn insert_mode_requires_exactly_one_marker() {
        for prompt in ["no marker", "[insert] twice [Insert]"] {
            let request = CompletionRequest::new(prompt).with_mode(Mode::Insert);
            match resolve_params(&request) {
                Err(CompletionError::Validation { found, .. }) => {
                    assert_eq!(found, prompt.to_lowercase().matches(INSERT_MARKER).count())
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn complete_mode_ignores_marker() {
        let request = CompletionRequest::new("keep [insert] as text");
        let params = resolve_params(&request).unwrap();
        assert_eq!(params.prompt, "keep [insert] as text");
        assert!(params.suffix.is_none());
    }
}
