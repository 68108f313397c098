//! Environment File Loader
//!
//! Reads `KEY=VALUE` files so API keys and tunnel tokens can live outside the
//! shell profile. Lookup order:
//!
//! 1. the path in `EDU_MCP_ENV_FILE`
//! 2. `.env` in the current directory
//! 3. `/etc/edu-mcp/environment`
//!
//! Variables that are already set are never overridden.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Variable naming a custom environment file
pub const ENV_FILE_VAR: &str = "EDU_MCP_ENV_FILE";

/// Default paths, in order of priority
pub const ENV_FILE_PATHS: &[&str] = &[".env", "/etc/edu-mcp/environment"];

/// Load the first environment file found.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var(ENV_FILE_VAR) {
        if load_env_file(&custom_path).is_some() {
            return Some(custom_path);
        }
    }

    for path in ENV_FILE_PATHS {
        if load_env_file(path).is_some() {
            return Some(path.to_string());
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Load a single environment file.
///
/// Returns the number of variables set, or None if the file is missing or
/// unreadable.
pub fn load_env_file(path: impl AsRef<Path>) -> Option<usize> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read environment file");
            return None;
        }
    };

    let mut loaded = 0;
    let mut skipped = 0;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = parse_env_line(line) else {
            continue;
        };

        if std::env::var(&key).is_ok() {
            skipped += 1;
            debug!(key = %key, "Skipped (already set)");
            continue;
        }

        std::env::set_var(&key, &value);
        loaded += 1;
        debug!(key = %key, value = %masked(&key, &value), "Loaded");
    }

    info!(
        path = %path.display(),
        loaded,
        skipped,
        "Loaded environment file"
    );
    Some(loaded)
}

fn masked<'a>(key: &str, value: &'a str) -> &'a str {
    if key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET") {
        "***"
    } else {
        value
    }
}

/// Parse `KEY=VALUE`, `KEY="VALUE"` or `KEY='VALUE'`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"').and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");

        let (_, v) = parse_env_line("FOO='bar'").unwrap();
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_export_and_equals_in_value() {
        let (k, v) = parse_env_line("export URL=http://x/?a=b").unwrap();
        assert_eq!(k, "URL");
        assert_eq!(v, "http://x/?a=b");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_load_env_file_does_not_override() {
        std::env::set_var("EDU_CORE_TEST_PRESET", "from-shell");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "EDU_CORE_TEST_FRESH=\"fresh value\"").unwrap();
        writeln!(file, "EDU_CORE_TEST_PRESET=replaced").unwrap();

        let loaded = load_env_file(file.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(std::env::var("EDU_CORE_TEST_FRESH").unwrap(), "fresh value");
        assert_eq!(std::env::var("EDU_CORE_TEST_PRESET").unwrap(), "from-shell");
    }

    #[test]
    fn test_load_env_file_missing() {
        assert!(load_env_file("/nonexistent/edu-mcp/environment").is_none());
    }

    #[test]
    fn test_masked() {
        assert_eq!(masked("OPENAI_API_KEY", "sk-123"), "***");
        assert_eq!(masked("NGROK_AUTHTOKEN", "abc"), "***");
        assert_eq!(masked("OPENAI_BASE_URL", "http://x"), "http://x");
    }
}
