use std::env;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError};
use thiserror::Error;

pub const DEFAULT_ENV_FILE: &str = ".env.secret";

/// (variable, required)
const SECRET_VARIABLES: [(&str, bool); 2] = [("OPENAI_API_KEY", true), ("OPENAI_ORG_ID", false)];
const PATH_VARIABLES: [(&str, &str); 3] = [
    ("DISK_CACHE_DIR", "/tmp/disk_cache"),
    ("PROMPT_HISTORY_PATH", "./.prompt_history"),
    ("CHAT_TURNS_DIR", "./.chat_turns"),
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Missing required secret variable {0}")]
    MissingSecret(&'static str),
    #[error("failed to read {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_org_id: Option<String>,
    pub disk_cache_dir: PathBuf,
    pub prompt_history_path: PathBuf,
    pub chat_turns_dir: PathBuf,
}

impl Settings {
    /// Load secrets from a dotenv file, let process environment variables of the
    /// same names override them, and create the local history directories.
    ///
    /// A missing file is not an error on its own; a missing `OPENAI_API_KEY` is.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let mut vars: Vec<(String, String)> = match dotenv::from_path_iter(path) {
            Ok(iter) => iter
                .collect::<Result<_, _>>()
                .map_err(|source| SettingsError::EnvFile {
                    path: path.to_path_buf(),
                    source,
                })?,
            Err(e) if e.not_found() => {
                tracing::debug!("No secrets file at {}, using environment", path.display());
                Vec::new()
            }
            Err(source) => {
                return Err(SettingsError::EnvFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let names = SECRET_VARIABLES
            .iter()
            .map(|(name, _)| *name)
            .chain(PATH_VARIABLES.iter().map(|(name, _)| *name));
        for name in names {
            if let Ok(value) = env::var(name) {
                vars.push((name.to_string(), value));
            }
        }

        let settings = Self::from_vars(vars)?;
        settings.ensure_dirs()?;
        Ok(settings)
    }

    /// Build settings from `(NAME, value)` pairs; later pairs win.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut builder = Config::builder();
        for (name, default) in PATH_VARIABLES {
            builder = builder.set_default(name.to_lowercase(), default)?;
        }

        let known = |key: &str| {
            SECRET_VARIABLES.iter().any(|(name, _)| name.eq_ignore_ascii_case(key))
                || PATH_VARIABLES.iter().any(|(name, _)| name.eq_ignore_ascii_case(key))
        };
        for (key, value) in vars {
            let key = key.as_ref();
            if known(key) {
                builder = builder.set_override(key.to_lowercase(), value.into())?;
            }
        }
        let cfg = builder.build()?;

        let secret = |name: &str| {
            cfg.get_string(&name.to_lowercase())
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        for (name, required) in SECRET_VARIABLES {
            if required && secret(name).is_none() {
                return Err(SettingsError::MissingSecret(name));
            }
        }

        Ok(Settings {
            openai_api_key: secret("OPENAI_API_KEY").unwrap_or_default(),
            openai_org_id: secret("OPENAI_ORG_ID"),
            disk_cache_dir: cfg.get_string("disk_cache_dir")?.into(),
            prompt_history_path: cfg.get_string("prompt_history_path")?.into(),
            chat_turns_dir: cfg.get_string("chat_turns_dir")?.into(),
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), SettingsError> {
        for dir in [&self.chat_turns_dir, &self.prompt_history_path] {
            std::fs::create_dir_all(dir).map_err(|source| SettingsError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
