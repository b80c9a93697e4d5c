//! Prompt assembly and response parsing.
//!
//! ### Placeholders
//! - `$PROJECT` and `${PROJECT}` are replaced with the project name
//! - `$$` is a literal `$`
//! - Any other `$name` is left untouched
//!
//! ### Structured answers
//! The span from the first `{` to the last `}` of a response is parsed as
//! JSON; an object becomes [`Answer::fields`].

use pagewise_core::Answer;

const PLACEHOLDER: &str = "PROJECT";

/// Substitute the project placeholders in `template`.
pub fn render_template(template: &str, project: &str) -> String {
    let mut out = String::with_capacity(template.len() + project.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix("{PROJECT}") {
            out.push_str(project);
            rest = tail;
        } else if let Some(tail) = after.strip_prefix(PLACEHOLDER)
            && !tail.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        {
            out.push_str(project);
            rest = tail;
        } else {
            out.push('$');
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

/// Full prompt: rendered template, then page content, then one space.
pub fn build_prompt(template: &str, project: &str, content: &str) -> String {
    format!("{}{content} ", render_template(template, project))
}

/// Parse the first `{` .. last `}` span of `text` as a JSON object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("response JSON span did not parse: {e}");
            None
        }
    }
}

/// Wrap a completion response as an [`Answer`].
pub fn parse_answer(text: String) -> Answer {
    let fields = extract_json_object(&text);
    if fields.is_none() {
        let preview: String = text.chars().take(100).collect();
        tracing::warn!("no JSON object found in response: {preview}");
    }
    Answer { text, fields }
}
