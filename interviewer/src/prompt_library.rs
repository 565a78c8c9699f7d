use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

const PARAMS_FILE: &str = "params.json";
const PROMPT_FILE: &str = "prompt.txt";
const INPUTS_FILE: &str = "inputs.json";

#[derive(Debug, Error)]
pub enum PromptLibraryError {
    #[error("invalid prompt id {0:?}")]
    InvalidId(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode prompt params: {0}")]
    Params(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPrompt {
    pub params: Value,
    pub prompt_text: String,
    pub inputs: BTreeMap<String, Value>,
}

/// Saved prompts on disk, one directory per id holding `params.json`,
/// `prompt.txt` and `inputs.json`.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

/// `<name>_<8 hex chars>`
pub fn make_prompt_id(prompt_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prompt_name, &suffix[..8])
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn prompt_dir(&self, prompt_id: &str) -> Result<PathBuf, PromptLibraryError> {
        let valid = !prompt_id.is_empty()
            && prompt_id != "."
            && prompt_id != ".."
            && !prompt_id.contains(['/', '\\']);
        if !valid {
            return Err(PromptLibraryError::InvalidId(prompt_id.to_string()));
        }
        Ok(self.dir.join(prompt_id))
    }

    pub fn save(
        &self,
        prompt_id: &str,
        prompt_text: &str,
        params: &Value,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<PathBuf, PromptLibraryError> {
        let dir = self.prompt_dir(prompt_id)?;
        fs::create_dir_all(&dir).map_err(|source| io_err(&dir, source))?;

        write_json(&dir.join(PARAMS_FILE), params)?;
        let prompt_path = dir.join(PROMPT_FILE);
        fs::write(&prompt_path, prompt_text).map_err(|source| io_err(&prompt_path, source))?;
        write_json(&dir.join(INPUTS_FILE), inputs)?;

        tracing::debug!("Saved prompt {} to {}", prompt_id, dir.display());
        Ok(dir)
    }

    pub fn load(&self, prompt_id: &str) -> Result<SavedPrompt, PromptLibraryError> {
        let dir = self.prompt_dir(prompt_id)?;
        let prompt_path = dir.join(PROMPT_FILE);

        Ok(SavedPrompt {
            params: read_json(&dir.join(PARAMS_FILE))?,
            prompt_text: fs::read_to_string(&prompt_path)
                .map_err(|source| io_err(&prompt_path, source))?,
            inputs: read_json(&dir.join(INPUTS_FILE))?,
        })
    }

    pub fn delete(&self, prompt_id: &str) -> Result<(), PromptLibraryError> {
        let dir = self.prompt_dir(prompt_id)?;
        fs::remove_dir_all(&dir).map_err(|source| io_err(&dir, source))
    }

    /// Saved prompt ids, sorted. A library directory that does not exist yet is empty.
    pub fn list(&self) -> Result<Vec<String>, PromptLibraryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_err(&self.dir, source)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_err(&self.dir, source))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn io_err(path: &Path, source: io::Error) -> PromptLibraryError {
    PromptLibraryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PromptLibraryError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PromptLibraryError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| io_err(path, source))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PromptLibraryError> {
    let text = fs::read_to_string(path).map_err(|source| io_err(path, source))?;
    serde_json::from_str(&text).map_err(|source| PromptLibraryError::Json {
        path: path.to_path_buf(),
        source,
    })
}
