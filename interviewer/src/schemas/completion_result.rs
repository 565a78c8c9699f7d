use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CompletionError;
use crate::schemas::completion_request::CompletionParams;

/// Provider response body plus the wall-clock latency of the call that produced it.
///
/// This is the payload kept in the cache, so a cache hit replays the latency
/// measured on the original call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub body: Value,
    pub latency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    pub raw_response: RawResponse,
    pub num_tokens: u64,
    pub all_completions: Vec<String>,
    pub completion: String,
    pub latency: f64,
    pub usage: Usage,
    pub request_params: CompletionParams,
    pub request_tag: Option<String>,
    pub from_cache: bool,
    /// Remote calls made for this result; zero when served from cache.
    pub attempts: u32,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct WireChoice {
    text: String,
}

impl CompletionResult {
    pub(crate) fn normalize(
        raw_response: RawResponse,
        request_params: CompletionParams,
        request_tag: Option<String>,
        from_cache: bool,
        attempts: u32,
    ) -> Result<Self, CompletionError> {
        let wire: WireResponse = serde_json::from_value(raw_response.body.clone())
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let all_completions: Vec<String> = wire.choices.into_iter().map(|c| c.text).collect();
        let completion = all_completions
            .first()
            .cloned()
            .ok_or_else(|| CompletionError::InvalidResponse("response has no choices".into()))?;

        Ok(CompletionResult {
            num_tokens: wire.usage.total_tokens,
            latency: raw_response.latency,
            usage: wire.usage,
            all_completions,
            completion,
            raw_response,
            request_params,
            request_tag,
            from_cache,
            attempts,
        })
    }
}
