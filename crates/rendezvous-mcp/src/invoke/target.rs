//! Turning a stdio endpoint into a launchable shell command.

use std::path::{Path, PathBuf};

use crate::discovery::process::STDIO_SCHEME;

const NPM_PREFIX: &str = "npm:";
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Shell command line plus the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioTarget {
    pub command: String,
    pub cwd: PathBuf,
}

impl StdioTarget {
    /// Resolve relative to the process working directory.
    pub fn from_endpoint(endpoint: &str, service_name: &str) -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_endpoint_in(endpoint, service_name, &base)
    }

    pub fn from_endpoint_in(endpoint: &str, service_name: &str, base: &Path) -> Self {
        let raw = endpoint.trim();
        let raw = raw.strip_prefix(STDIO_SCHEME).unwrap_or(raw).trim();
        let raw = if raw.is_empty() { service_name } else { raw };

        if let Some(pkg) = raw.strip_prefix(NPM_PREFIX) {
            return Self {
                command: format!("npx {}", pkg.trim()),
                cwd: base.to_path_buf(),
            };
        }

        let (program, rest) = match raw.split_once(char::is_whitespace) {
            Some((p, r)) => (p, r.trim()),
            None => (raw, ""),
        };
        let program_path = Path::new(program);
        let is_script = program_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

        let resolved = if is_script && program_path.is_relative() {
            base.join(program_path)
        } else {
            program_path.to_path_buf()
        };

        let cwd = match resolved.parent() {
            Some(dir) if resolved.is_absolute() && dir.is_dir() => dir.to_path_buf(),
            _ => base.to_path_buf(),
        };

        let mut command = if is_script {
            format!("node {}", shell_quote(&resolved.to_string_lossy()))
        } else {
            program.to_string()
        };
        if !rest.is_empty() {
            command.push(' ');
            command.push_str(rest);
        }
        Self { command, cwd }
    }
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_script_runs_through_node_in_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("server.js");
        std::fs::write(&script, "").unwrap();
        let endpoint = format!("stdio://{}", script.display());
        let t = StdioTarget::from_endpoint_in(&endpoint, "srv", Path::new("/"));
        assert!(t.command.starts_with("node "), "{}", t.command);
        assert!(t.command.ends_with("server.js"), "{}", t.command);
        assert_eq!(t.cwd, dir.path());
    }

    #[test]
    fn relative_script_resolves_against_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("srv")).unwrap();
        let t = StdioTarget::from_endpoint_in("stdio://srv/index.mjs --flag", "x", dir.path());
        assert_eq!(
            t.command,
            format!("node {} --flag", shell_quote(&dir.path().join("srv/index.mjs").to_string_lossy()))
        );
        assert_eq!(t.cwd, dir.path().join("srv"));
    }

    #[test]
    fn npm_package_uses_npx() {
        let t = StdioTarget::from_endpoint_in("stdio://npm:@acme/fs-server", "fs", Path::new("/tmp"));
        assert_eq!(t.command, "npx @acme/fs-server");
        assert_eq!(t.cwd, Path::new("/tmp"));
    }

    #[test]
    fn plain_commands_run_verbatim() {
        let t = StdioTarget::from_endpoint_in("uvx git-server --repo .", "git", Path::new("/tmp"));
        assert_eq!(t.command, "uvx git-server --repo .");
        assert_eq!(t.cwd, Path::new("/tmp"));
    }

    #[test]
    fn empty_endpoint_falls_back_to_service_name() {
        let t = StdioTarget::from_endpoint_in("stdio://", "weather-server", Path::new("/tmp"));
        assert_eq!(t.command, "weather-server");
    }

    #[test]
    fn quoting_protects_spaces() {
        assert_eq!(shell_quote("/a b/c.js"), "'/a b/c.js'");
        assert_eq!(shell_quote("/a/c.js"), "/a/c.js");
    }
}
