//! Naming rules for canonical service names and derived short forms.

use std::path::Path;

/// Trailing hyphen-delimited token that marks a conventional service name.
pub const RESERVED_SUFFIX: &str = "mcp";

/// Short forms of a canonical name that ends in `-mcp`.
///
/// `sequentialthinking-mcp` yields `sequentialthinking`; `brave-search-mcp`
/// yields `brave-search` and `brave`. Names without the suffix yield nothing.
pub fn short_names(name: &str) -> Vec<String> {
    let mut out = Vec::new();
    let suffix = format!("-{RESERVED_SUFFIX}");
    let Some(stripped) = name.strip_suffix(&suffix) else {
        return out;
    };
    if !stripped.is_empty() {
        out.push(stripped.to_string());
    }
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() >= 3
        && parts.last() == Some(&RESERVED_SUFFIX)
        && !parts[0].is_empty()
        && parts[0] != stripped
    {
        out.push(parts[0].to_string());
    }
    out
}

/// Service name for a server program path: its basename without extension.
pub fn service_name_from_path(path: &str) -> Option<String> {
    let stem = Path::new(path).file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
