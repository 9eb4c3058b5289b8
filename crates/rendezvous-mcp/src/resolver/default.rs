/// Well-known services and their conventional short names.
pub const BUILTIN_SERVICES: &[(&str, &[&str])] = &[
    (
        "sequentialthinking-mcp",
        &["sequentialthinking", "sequential-thinking", "thinking"],
    ),
    ("filesystem-mcp", &["filesystem", "fs"]),
    ("github-mcp", &["github", "gh"]),
    ("playwright-mcp", &["playwright", "pw", "browser"]),
    ("mcp-assistant-server", &["assistant", "mcp-assistant"]),
];

/// Canonical name of this assistant when it registers itself.
pub const SELF_SERVICE_NAME: &str = "mcp-assistant-server";

pub fn self_aliases() -> Vec<String> {
    BUILTIN_SERVICES
        .iter()
        .find(|(name, _)| *name == SELF_SERVICE_NAME)
        .map(|(_, aliases)| aliases.iter().map(|a| a.to_string()).collect())
        .unwrap_or_default()
}
