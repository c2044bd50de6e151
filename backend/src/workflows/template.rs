// Workflow Templates - `{{path}}` token substitution against an execution context

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::ExecutionContext;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Render a free-text template. Tokens that do not resolve are left verbatim.
pub fn render(template: &str, context: &ExecutionContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match context.lookup(&caps[1]) {
            Some(value) => value_to_text(&value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render a template whose every token must resolve.
/// Returns the first unresolved token on failure.
pub fn render_strict(template: &str, context: &ExecutionContext) -> Result<String, String> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .find(|caps| context.lookup(&caps[1]).is_none())
    {
        return Err(missing[0].to_string());
    }
    Ok(render(template, context))
}

/// Whether the string contains at least one `{{...}}` token
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
