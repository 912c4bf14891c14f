use anyhow::{Context, Result};
use serde::Deserialize;

use crate::tenant::Tenant;

/// Env var naming the TOML config file
pub const CONFIG_PATH_VAR: &str = "APPLIFT_CONFIG";

/// Complete service configuration.
///
/// Token secret keys are not part of the file; they come only from the
/// environment (see [`crate::token::TokenKeys`]).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Single origin allowed by CORS; `None` disables the CORS layer.
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origin: None,
        }
    }
}

/// One SQLite file per tenant
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_company_path")]
    pub company_path: String,
    #[serde(default = "default_student_path")]
    pub student_path: String,
}

fn default_company_path() -> String {
    "company.db".to_string()
}

fn default_student_path() -> String {
    "student.db".to_string()
}

impl DatabaseConfig {
    pub fn path_for(&self, tenant: Tenant) -> &str {
        match tenant {
            Tenant::Company => &self.company_path,
            Tenant::Student => &self.student_path,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            company_path: default_company_path(),
            student_path: default_student_path(),
        }
    }
}

/// Token issuance configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime (minutes)
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
    /// Upper bound on a single store round-trip (milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_access_token_ttl_minutes() -> i64 {
    15
}

fn default_store_timeout_ms() -> u64 {
    2000
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_minutes: default_access_token_ttl_minutes(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiConfig {
    /// Include the diagnostic `detail` field in error responses
    #[serde(default)]
    pub expose_error_detail: bool,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AuthConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AuthConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

impl AuthConfig {
    /// Loads the file named by `APPLIFT_CONFIG`, or defaults when unset.
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => load_config(&path),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.allowed_origin, None);
        assert_eq!(config.database.path_for(Tenant::Company), "company.db");
        assert_eq!(config.database.path_for(Tenant::Student), "student.db");
        assert_eq!(config.tokens.access_token_ttl_minutes, 15);
        assert_eq!(config.tokens.store_timeout_ms, 2000);
        assert!(!config.api.expose_error_detail);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            allowed_origin = "https://app.example.com"

            [database]
            company_path = "/var/lib/applift/company.db"
            student_path = "/var/lib/applift/student.db"

            [tokens]
            access_token_ttl_minutes = 5
            store_timeout_ms = 500

            [api]
            expose_error_detail = true
        "#;

        let config: AuthConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(
            config.server.allowed_origin.as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(
            config.database.path_for(Tenant::Student),
            "/var/lib/applift/student.db"
        );
        assert_eq!(config.tokens.access_token_ttl_minutes, 5);
        assert_eq!(config.tokens.store_timeout_ms, 500);
        assert!(config.api.expose_error_detail);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [tokens]
            store_timeout_ms = 100
        "#;

        let config: AuthConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tokens.store_timeout_ms, 100);
        assert_eq!(config.tokens.access_token_ttl_minutes, 15); // Default
        assert_eq!(config.database.company_path, "company.db"); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.toml");
        std::fs::write(&path, "[server]\nbind_addr = \"127.0.0.1:1\"\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:1");

        assert!(load_config("/nonexistent/auth.toml").is_err());
    }
}
