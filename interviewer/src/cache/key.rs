use std::fmt;

use sha2::{Digest, Sha256};

use crate::schemas::completion_request::CompletionParams;

/// Canonical fingerprint of a resolved completion request.
///
/// Built from the `name=value` pairs of every parameter, sorted by name, so two
/// requests that agree field-for-field always share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_params(params: &CompletionParams) -> Self {
        let mut fields = params.fields();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let joined = fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(":");

        CacheKey(format!("completion:{joined}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-length hex digest used as the storage key.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
