//! Environment configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Env var naming the env file to load before resolving configuration.
pub const ENV_FILE: &str = "CHATRELAY_ENV_FILE";
/// Upstream API credential.
pub const API_KEY: &str = "GROQ_API_KEY";
/// Per-request completion token budget.
pub const MAX_TOKENS: &str = "MAX_TOKENS";
/// Optional override for the provider endpoint.
pub const BASE_URL: &str = "GROQ_BASE_URL";

const HTTP_HOST: &str = "CHATRELAY_HTTP_HOST";
const HTTP_PORT: &str = "CHATRELAY_HTTP_PORT";

/// Server configuration resolved from the process environment, with values
/// from the env file taking precedence.
///
/// The token budget stays raw here: it is validated per request, so a
/// malformed value rejects requests without taking the process down.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Port to listen on (default: 8080)
    pub port: u16,
    /// Upstream API key
    pub api_key: String,
    /// Raw per-request token budget
    pub max_tokens: Option<String>,
    /// Provider endpoint override, for API-compatible services
    pub base_url: Option<String>,
}

impl Config {
    /// Resolve configuration from the env file and process environment.
    ///
    /// An explicitly named env file must be readable; the default `.env` is
    /// optional.
    pub fn load() -> Result<Self> {
        let overrides = read_env_file()?;

        let host = lookup(&overrides, HTTP_HOST)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup(&overrides, HTTP_PORT)
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            host,
            port,
            api_key: lookup(&overrides, API_KEY).unwrap_or_default(),
            max_tokens: lookup(&overrides, MAX_TOKENS),
            base_url: lookup(&overrides, BASE_URL),
        })
    }

    /// Parse the per-request completion budget. An absent or malformed value
    /// is a request-fatal setup error.
    pub fn token_budget(&self) -> Result<u32> {
        let raw = self
            .max_tokens
            .as_deref()
            .with_context(|| format!("{MAX_TOKENS} is not set"))?;
        raw.trim()
            .parse::<u32>()
            .with_context(|| format!("invalid {MAX_TOKENS} value: {raw}"))
    }
}

fn lookup(overrides: &HashMap<String, String>, key: &str) -> Option<String> {
    overrides
        .get(key)
        .cloned()
        .or_else(|| std::env::var(key).ok())
}

fn read_env_file() -> Result<HashMap<String, String>> {
    match std::env::var(ENV_FILE) {
        Ok(path) => parse_env_file(Path::new(&path)),
        Err(_) => {
            let default = Path::new(".env");
            if default.exists() {
                parse_env_file(default)
            } else {
                Ok(HashMap::new())
            }
        }
    }
}

/// Parse `KEY=VALUE` lines; empty lines and `#` comments are skipped.
fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to open env file {}", path.display()))?;

    let mut pairs = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            pairs.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_budget(max_tokens: Option<&str>) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key: "test-key".to_string(),
            max_tokens: max_tokens.map(str::to_string),
            base_url: None,
        }
    }

    #[test]
    fn token_budget_parses_valid_value() {
        let config = config_with_budget(Some("512"));
        assert_eq!(config.token_budget().unwrap(), 512);
    }

    #[test]
    fn token_budget_rejects_missing_value() {
        let config = config_with_budget(None);
        assert!(config.token_budget().is_err());
    }

    #[test]
    fn token_budget_rejects_malformed_value() {
        let config = config_with_budget(Some("not-a-number"));
        assert!(config.token_budget().is_err());
    }

    #[test]
    fn env_file_parsing_skips_comments_and_blanks() {
        let path = std::env::temp_dir().join(format!("chatrelay-env-{}", std::process::id()));
        fs::write(
            &path,
            "# credentials\nGROQ_API_KEY=abc123\n\nMAX_TOKENS=64\nBROKEN LINE\n",
        )
        .unwrap();

        let pairs = parse_env_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(pairs.get("GROQ_API_KEY").map(String::as_str), Some("abc123"));
        assert_eq!(pairs.get("MAX_TOKENS").map(String::as_str), Some("64"));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn env_file_parsing_fails_for_missing_file() {
        let path = std::env::temp_dir().join("chatrelay-does-not-exist.env");
        assert!(parse_env_file(&path).is_err());
    }
}
