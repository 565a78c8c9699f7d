use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Interviewer,
    Candidate,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Interviewer => "Interviewer",
            Speaker::Candidate => "Candidate",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
}

impl Utterance {
    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Interviewer,
            text: text.into(),
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            text: text.into(),
        }
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// Append-only record of an interview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    utterances: Vec<Utterance>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript opened by a single interviewer line.
    pub fn seeded(greeting: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(Utterance::interviewer(greeting));
        transcript
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.iter()
    }

    /// One `"Speaker: text"` line per utterance.
    pub fn lines(&self) -> Vec<String> {
        self.utterances.iter().map(ToString::to_string).collect()
    }

    pub fn render(&self) -> String {
        self.lines().join("\n")
    }
}
