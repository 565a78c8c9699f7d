//! Interview simulator built on a cached, retrying text-completion client.

pub mod cache;
pub mod errors;
pub mod llm_wrapper;
pub mod prompt;
pub mod prompt_library;
pub mod retry;
pub mod schemas;
pub mod session;
pub mod settings;
pub mod transcript;
pub mod transport;

pub use errors::{CompletionError, ProviderError, ProviderErrorKind};
pub use llm_wrapper::CompletionClient;
pub use schemas::completion_request::{CompletionRequest, Mode};
pub use schemas::completion_result::CompletionResult;
pub use session::Session;
pub use settings::Settings;
