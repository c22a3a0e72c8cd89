/// Canonical lookup key for a note title: case-folded, whitespace collapsed.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path component for a collection name. Lower-cased, separators and
/// whitespace folded to single dashes. Returns `None` when nothing usable remains.
#[must_use]
pub fn sanitize_path_component(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' || c == '.' {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else if (c.is_whitespace() || matches!(c, '-' | '/' | '\\')) && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches(|c| c == '-' || c == '.');
    if out.is_empty() {
        None
    } else {
        Some(out.to_string())
    }
}
