use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::schemas::completion_request::CompletionParams;

pub const OPENAI_COMPLETIONS_URL: &str = "https://api.openai.com/v1/completions";

/// One raw call to a remote completion API.
///
/// Returns the provider's response body untouched; schema handling happens in
/// [`CompletionResult`](crate::schemas::completion_result::CompletionResult).
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn create(&self, params: &CompletionParams) -> Result<Value, ProviderError>;
}

#[derive(Clone)]
pub struct OpenAiTransport {
    inner: Arc<Client>,
    url: String,
    api_key: String,
    organization_id: Option<String>,
}

impl OpenAiTransport {
    pub fn new(api_key: impl Into<String>, organization_id: Option<String>) -> Self {
        Self {
            inner: Arc::new(Client::new()),
            url: OPENAI_COMPLETIONS_URL.to_string(),
            api_key: api_key.into(),
            organization_id,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn create(&self, params: &CompletionParams) -> Result<Value, ProviderError> {
        let mut request = self
            .inner
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(params);
        if let Some(org) = &self.organization_id {
            request = request.header("OpenAI-Organization", org);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let kind = if e.is_timeout() {
                    ProviderErrorKind::Timeout
                } else if e.is_connect() || e.is_request() || e.is_body() {
                    ProviderErrorKind::Connection
                } else {
                    ProviderErrorKind::Api
                };
                return Err(ProviderError::new(kind, format!("request error: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP error: {}", status));
            tracing::warn!("Completion API returned {}: {}", status, error_body);
            return Err(ProviderError::new(classify_status(status), error_body)
                .with_status(status.as_u16()));
        }

        response.json::<Value>().await.map_err(|e| {
            ProviderError::new(ProviderErrorKind::Decode, format!("JSON parsing error: {e}"))
        })
    }
}

/// Map a non-success HTTP status to a failure kind.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimit,
        StatusCode::SERVICE_UNAVAILABLE => ProviderErrorKind::ServiceUnavailable,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ProviderErrorKind::Timeout,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Authentication,
        StatusCode::CONFLICT => ProviderErrorKind::TryAgain,
        status if status.is_client_error() => ProviderErrorKind::InvalidRequest,
        _ => ProviderErrorKind::Api,
    }
}
