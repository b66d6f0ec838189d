// Lenient JSON recovery for model output

use serde::de::DeserializeOwned;

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix("```json") {
        rest
    } else if let Some(rest) = s.strip_prefix("```") {
        rest
    } else {
        s
    };
    if let Some(rest) = s.strip_suffix("```") {
        rest.trim()
    } else {
        s.trim()
    }
}

/// Parse a JSON value out of model output.
///
/// Tries the fenced-stripped text directly, then the widest `{...}` slice,
/// then the widest `[...]` slice. Returns `None` when nothing parses.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let stripped = strip_markdown_fences(text);

    if let Ok(value) = serde_json::from_str::<T>(stripped) {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (stripped.find(open), stripped.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<T>(&stripped[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}
