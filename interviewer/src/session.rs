use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::CompletionError;
use crate::llm_wrapper::CompletionClient;
use crate::prompt::inject;
use crate::prompt_library::{make_prompt_id, PromptLibrary, PromptLibraryError};
use crate::schemas::completion_request::{CompletionRequest, DEFAULT_MODEL};
use crate::schemas::completion_result::CompletionResult;
use crate::transcript::{Speaker, Transcript, Utterance};

pub const MODELS: [&str; 6] = [
    "text-davinci-002",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
    "code-davinci-002",
    "code-cushman-001",
];

pub const INITIAL_GREETING: &str = "Hi, how are you doing today?";
pub const DEFAULT_RESUME: &str = include_str!("../prompts/resume.txt");
pub const DEFAULT_QUESTION: &str = include_str!("../prompts/system_design.txt");
pub const FEEDBACK_PROMPT: &str = include_str!("../prompts/feedback.txt");

/// Stop sequences that end the interviewer's turn before the model writes the next one.
pub const TURN_STOP: [&str; 2] = ["Candidate:", "Interviewer:"];

pub const FEEDBACK_MAX_TOKENS: u32 = 400;
pub const FEEDBACK_BEST_OF: u32 = 3;

/// Sampling settings chosen for the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for InterviewParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 64,
            temperature: 0.7,
        }
    }
}

/// One interview: resume, question template, and the transcript they produce.
///
/// The transcript sits behind a lock that is held for a whole turn, so
/// submissions are processed one at a time and in order.
pub struct Session {
    id: String,
    client: Arc<CompletionClient>,
    params: InterviewParams,
    resume: String,
    question: String,
    transcript: Mutex<Transcript>,
}

impl Session {
    pub fn new(
        client: Arc<CompletionClient>,
        params: InterviewParams,
        resume: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client,
            params,
            resume: resume.into(),
            question: question.into(),
            transcript: Mutex::new(Transcript::seeded(INITIAL_GREETING)),
        }
    }

    /// Replace the opening interviewer line.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.transcript = Mutex::new(Transcript::seeded(greeting));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn params(&self) -> &InterviewParams {
        &self.params
    }

    pub async fn transcript(&self) -> Transcript {
        self.transcript.lock().await.clone()
    }

    /// The question template with resume and transcript filled in.
    pub fn compose_prompt(&self, transcript: &str) -> String {
        inject(
            &self.question,
            [("transcript", transcript), ("resume", self.resume.as_str())],
        )
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::new(prompt)
            .with_model(self.params.model.clone())
            .with_max_tokens(self.params.max_tokens)
            .with_temperature(self.params.temperature)
            .with_stop(TURN_STOP)
    }

    /// Record the candidate's reply and ask the model for the interviewer's next line.
    ///
    /// Both lines are appended only once the completion succeeds; on error the
    /// transcript is left as it was and the candidate can resubmit.
    pub async fn submit(&self, candidate_text: &str) -> Result<Utterance, CompletionError> {
        let mut transcript = self.transcript.lock().await;

        let candidate = Utterance::candidate(candidate_text.trim());
        let history = format!("{}\n{}", transcript.render(), candidate);
        let prompt = format!("{}\n{}:", self.compose_prompt(&history), Speaker::Interviewer);

        let result = self
            .client
            .complete(&self.request(prompt), Some("interview"))
            .await?;

        let reply = Utterance::interviewer(result.completion.trim());
        if reply.text.is_empty() {
            tracing::info!("Session {}: empty interviewer turn", self.id);
        }
        transcript.push(candidate);
        transcript.push(reply.clone());
        Ok(reply)
    }

    /// Ask for a structured evaluation of the interview so far.
    pub async fn feedback(&self) -> Result<CompletionResult, CompletionError> {
        let prompt = self.feedback_prompt().await;
        let request = self
            .request(prompt)
            .with_max_tokens(FEEDBACK_MAX_TOKENS)
            .with_best_of(FEEDBACK_BEST_OF);

        self.client.complete(&request, Some("feedback")).await
    }

    pub async fn feedback_prompt(&self) -> String {
        let transcript = self.transcript.lock().await;
        format!(
            "{}\n\n{}",
            self.compose_prompt(&transcript.render()),
            FEEDBACK_PROMPT.trim()
        )
    }

    /// Save the current composed prompt, its parameters and inputs to `library`.
    pub async fn save_prompt(
        &self,
        library: &PromptLibrary,
        prompt_name: &str,
    ) -> Result<String, PromptLibraryError> {
        let transcript = self.transcript.lock().await;
        let prompt_id = make_prompt_id(prompt_name);
        let params = serde_json::to_value(&self.params)?;
        let inputs = BTreeMap::from([
            ("resume".to_string(), Value::from(self.resume.clone())),
            ("transcript".to_string(), Value::from(transcript.lines())),
        ]);

        library.save(
            &prompt_id,
            &self.compose_prompt(&transcript.render()),
            &params,
            &inputs,
        )?;
        Ok(prompt_id)
    }

    /// Write the transcript to `<dir>/<session id>.json`.
    pub async fn dump_transcript(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let transcript = self.transcript.lock().await;
        let path = dir.join(format!("{}.json", self.id));
        let json = serde_json::to_string_pretty(&*transcript)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}
