use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Placeholder pattern: `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Substitute environment placeholders in raw config text
///
/// Comment lines are copied verbatim so a commented-out key never
/// requires its variable to be set.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in placeholder().captures_iter(line) {
        let Some(whole) = captures.get(0) else { continue };
        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(var) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}
