//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::parse_duration;
use crate::types::DnsStrategy;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists; returns whether a file was loaded
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load a specific env file if it exists
    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "HTTP_PING_TARGET" => {
                if value.is_empty() {
                    return Err(AppError::config("HTTP_PING_TARGET cannot be empty"));
                }
            }
            "HTTP_PING_COUNT" => {
                let count: u64 = value.parse()
                    .map_err(|e| AppError::config(format!("Invalid HTTP_PING_COUNT value '{}': {}", value, e)))?;
                if count == 0 {
                    return Err(AppError::config("HTTP_PING_COUNT must be greater than 0"));
                }
            }
            "HTTP_PING_WORKERS" => {
                let workers: usize = value.parse()
                    .map_err(|e| AppError::config(format!("Invalid HTTP_PING_WORKERS value '{}': {}", value, e)))?;
                if workers == 0 {
                    return Err(AppError::config("HTTP_PING_WORKERS must be greater than 0"));
                }
            }
            "HTTP_PING_INTERVAL" | "HTTP_PING_WAIT" => {
                parse_duration(value)
                    .map_err(|e| AppError::config(format!("Invalid {} value: {}", key, e)))?;
            }
            "HTTP_PING_DNS_SERVER" => {
                DnsStrategy::parse_server(value)?;
            }
            "HTTP_PING_DOH_URL" => {
                DnsStrategy::DoH(value.to_string()).validate()?;
            }
            "HTTP_PING_ENABLE_COLOR" => {
                value.parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid HTTP_PING_ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {
                // Unknown environment variable, ignore
            }
        }

        Ok(())
    }

    /// Supported environment variables with descriptions and examples
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("HTTP_PING_TARGET", "Target URL", "https://example.com"),
            ("HTTP_PING_COUNT", "Number of requests", "10"),
            ("HTTP_PING_INTERVAL", "Pause between requests", "500ms"),
            ("HTTP_PING_WAIT", "Per-request timeout", "5s"),
            ("HTTP_PING_WORKERS", "Concurrent workers", "4"),
            ("HTTP_PING_DNS_SERVER", "DNS server queried directly", "1.1.1.1"),
            ("HTTP_PING_DOH_URL", "DNS-over-HTTPS endpoint", "https://cloudflare-dns.com/dns-query"),
            ("HTTP_PING_USER_AGENT", "User-Agent header", "http-ping/0.4.0"),
            ("HTTP_PING_ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Environment variable help text
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<24} {}\n", var, description));
            help.push_str(&format!("  {:<24} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate the entries of an env file without loading it
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = Self::validate_env_var(key.trim(), value) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }

        Ok(Some(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("HTTP_PING_COUNT", "5").is_ok());
        assert!(EnvManager::validate_env_var("HTTP_PING_INTERVAL", "250ms").is_ok());
        assert!(EnvManager::validate_env_var("HTTP_PING_DNS_SERVER", "8.8.8.8").is_ok());
        assert!(EnvManager::validate_env_var("HTTP_PING_DOH_URL", "https://dns.google/resolve").is_ok());
        assert!(EnvManager::validate_env_var("HTTP_PING_ENABLE_COLOR", "false").is_ok());
        assert!(EnvManager::validate_env_var("SOMETHING_ELSE", "whatever").is_ok());

        assert!(EnvManager::validate_env_var("HTTP_PING_COUNT", "0").is_err());
        assert!(EnvManager::validate_env_var("HTTP_PING_WORKERS", "many").is_err());
        assert!(EnvManager::validate_env_var("HTTP_PING_WAIT", "soon").is_err());
        assert!(EnvManager::validate_env_var("HTTP_PING_DNS_SERVER", "not-an-ip").is_err());
        assert!(EnvManager::validate_env_var("HTTP_PING_DOH_URL", "http://insecure.test/dns").is_err());
        assert!(EnvManager::validate_env_var("HTTP_PING_ENABLE_COLOR", "maybe").is_err());
    }

    #[test]
    fn test_load_env_file_from() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "HTTP_PING_TEST_ONLY_LOADED=yes").unwrap();

        assert!(EnvManager::load_env_file_from(file.path()).unwrap());
        assert_eq!(std::env::var("HTTP_PING_TEST_ONLY_LOADED").unwrap(), "yes");
        std::env::remove_var("HTTP_PING_TEST_ONLY_LOADED");

        assert!(!EnvManager::load_env_file_from(Path::new("/nonexistent/.env")).unwrap());
    }

    #[test]
    fn test_check_env_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "HTTP_PING_COUNT=3").unwrap();
        writeln!(file, "HTTP_PING_WORKERS=0").unwrap();

        let warnings = EnvManager::check_env_file(file.path()).unwrap().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("HTTP_PING_WORKERS"));
        assert!(EnvManager::check_env_file(Path::new("/nonexistent/.env")).unwrap().is_none());
    }

    #[test]
    fn test_display_env_help() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("HTTP_PING_COUNT"));
        assert!(help.contains("Configuration Priority"));
    }
}
