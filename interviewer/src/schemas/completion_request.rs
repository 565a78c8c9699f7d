use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "text-davinci-002";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Complete,
    Insert,
}

/// A text-completion request as the caller describes it.
///
/// Built with the `with_*` methods and then handed to
/// [`CompletionClient::complete`](crate::llm_wrapper::CompletionClient::complete)
/// by reference; the client never modifies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub stop: Option<Vec<String>>,
    pub n: u32,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub best_of: u32,
    pub logprobs: Option<u32>,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub logit_bias: BTreeMap<String, f64>,
    pub mode: Mode,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            stop: None,
            n: 1,
            max_tokens: 256,
            temperature: 0.0,
            top_p: 1.0,
            best_of: 1,
            logprobs: None,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            logit_bias: BTreeMap::new(),
            mode: Mode::Complete,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = Some(stop.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_best_of(mut self, best_of: u32) -> Self {
        self.best_of = best_of;
        self
    }

    pub fn with_logprobs(mut self, logprobs: u32) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f64) -> Self {
        self.frequency_penalty = penalty;
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f64) -> Self {
        self.presence_penalty = penalty;
        self
    }

    pub fn with_logit_bias(mut self, token: impl Into<String>, bias: f64) -> Self {
        self.logit_bias.insert(token.into(), bias);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// The fully resolved parameters dispatched to the provider.
///
/// Produced from a [`CompletionRequest`] after insert-mode splitting and stop
/// sequence rewriting. Cache keys are derived from this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub prompt: String,
    pub model: String,
    pub n: u32,
    pub top_p: f64,
    pub best_of: u32,
    pub temperature: f64,
    pub logprobs: Option<u32>,
    pub max_tokens: u32,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stop: Option<Vec<String>>,
    pub logit_bias: BTreeMap<String, f64>,
    pub suffix: Option<String>,
}

impl CompletionParams {
    /// Every parameter as a `(name, rendered value)` pair, in declaration order.
    ///
    /// Absent optional values render as `None` rather than being skipped.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("prompt", format!("{:?}", self.prompt)),
            ("model", format!("{:?}", self.model)),
            ("n", self.n.to_string()),
            ("top_p", format!("{:?}", self.top_p)),
            ("best_of", self.best_of.to_string()),
            ("temperature", format!("{:?}", self.temperature)),
            ("logprobs", format!("{:?}", self.logprobs)),
            ("max_tokens", self.max_tokens.to_string()),
            ("frequency_penalty", format!("{:?}", self.frequency_penalty)),
            ("presence_penalty", format!("{:?}", self.presence_penalty)),
            ("stop", format!("{:?}", self.stop)),
            ("logit_bias", format!("{:?}", self.logit_bias)),
            ("suffix", format!("{:?}", self.suffix)),
        ]
    }
}
