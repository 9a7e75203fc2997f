//! Query → (prompt, keyword, system message).
//!
//! The first word of a query picks a persona from the template table.
//! Unknown keywords fall back to the configured default persona and the
//! whole query becomes the prompt.

use tracing::debug;

use crate::templates::PromptTemplate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub prompt: String,
    pub keyword: String,
    pub system_message: String,
}

/// Resolve a query that the caller already knows ends with `stop_marker`.
///
/// Every trailing character that appears in `stop_marker` is stripped, so
/// `"hi|||"` with `"||"` becomes `"hi"`. The first row matching the keyword
/// with a non-empty system message wins.
pub fn resolve(
    query: &str,
    stop_marker: &str,
    templates: &[PromptTemplate],
    default_keyword: &str,
) -> ResolvedPrompt {
    let text = query
        .trim_end_matches(|c: char| stop_marker.contains(c))
        .trim();

    let (first, rest) = match text.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, Some(rest.trim_start())),
        None => (text, None),
    };
    let candidate = first.to_lowercase();

    let resolved = match find_system_message(templates, &candidate) {
        Some(system_message) => ResolvedPrompt {
            prompt: rest.unwrap_or(first).to_string(),
            keyword: candidate,
            system_message: system_message.to_string(),
        },
        None => ResolvedPrompt {
            prompt: text.to_string(),
            keyword: default_keyword.to_string(),
            system_message: find_system_message(templates, default_keyword)
                .unwrap_or_default()
                .to_string(),
        },
    };

    debug!(
        "Prompt: {} | keyword: {} | system message: {}",
        resolved.prompt, resolved.keyword, resolved.system_message
    );
    resolved
}

fn find_system_message<'a>(templates: &'a [PromptTemplate], keyword: &str) -> Option<&'a str> {
    templates
        .iter()
        .find(|row| row.keyword == keyword && !row.system_message.is_empty())
        .map(|row| row.system_message.as_str())
}
