use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("placeholder pattern is valid"))
}

/// Substitute `{{name}}` placeholders in `template`.
///
/// Names match case-insensitively. Placeholders without an input are left as
/// they are. Substituted text is not scanned again, so values may contain
/// placeholder-like text safely.
pub fn inject<I, K, V>(template: &str, inputs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: ToString,
{
    let values: HashMap<String, String> = inputs
        .into_iter()
        .map(|(name, value)| (name.as_ref().to_lowercase(), value.to_string()))
        .collect();

    placeholder_re()
        .replace_all(template, |caps: &Captures<'_>| {
            values
                .get(&caps[1].to_lowercase())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
