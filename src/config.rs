/*
 * Responsibility
 * - Process settings from the environment (PORT, APP_ENV, CORS, gate config path)
 * - Loading the gate's JSON configuration and applying credential overrides
 * - Validation (startup fails when something required is missing)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::services::auth::GateSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
    Unreadable { path: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
            ConfigError::Unreadable { path, reason } => {
                write!(f, "cannot read configuration file {}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl CredentialOverrides {
    /// Replaces the file's credentials with any non-empty override.
    pub fn apply(&self, settings: &mut GateSettings) {
        if let Some(id) = self.client_id.as_ref().filter(|s| !s.is_empty()) {
            settings.client_id = Some(id.clone());
        }
        if let Some(secret) = self.client_secret.as_ref().filter(|s| !s.is_empty()) {
            settings.client_secret = Some(secret.clone());
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub addr: SocketAddr,

    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    pub gate_config_path: PathBuf,
    pub credential_overrides: CredentialOverrides,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = match std::env::var("PORT") {
            Ok(s) => s.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            Err(_) => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let cors_allowed_origins =
            parse_origins(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let gate_config_path = std::env::var("IDCS_GATE_CONFIG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("IDCS_GATE_CONFIG"))?;

        let credential_overrides = CredentialOverrides {
            client_id: std::env::var("IDCS_CLIENT_ID").ok(),
            client_secret: std::env::var("IDCS_CLIENT_SECRET").ok(),
        };

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            gate_config_path,
            credential_overrides,
        })
    }

    /// Reads the gate's JSON file with the environment credentials applied.
    pub fn gate_settings(&self) -> Result<GateSettings, ConfigError> {
        let mut settings = GateSettings::from_file(&self.gate_config_path)?;
        self.credential_overrides.apply(&mut settings);
        Ok(settings)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_accepts_short_and_long_production_names() {
        assert_eq!(AppEnv::parse("production"), AppEnv::Production);
        assert_eq!(AppEnv::parse("PROD"), AppEnv::Production);
        assert_eq!(AppEnv::parse("staging"), AppEnv::Development);
    }

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_origins(" https://a.example , ,https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn overrides_replace_file_credentials() {
        let mut settings = GateSettings {
            client_id: Some("from-file".into()),
            client_secret: Some("file-secret".into()),
            ..Default::default()
        };
        CredentialOverrides {
            client_id: Some("from-env".into()),
            client_secret: Some(String::new()),
        }
        .apply(&mut settings);

        assert_eq!(settings.client_id.as_deref(), Some("from-env"));
        assert_eq!(settings.client_secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn gate_settings_are_read_from_the_configured_file() {
        let path = std::env::temp_dir().join(format!("idcs-gate-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"idcs_url": "https://idcs.example.com", "client_id": "svc"}"#)
            .unwrap();

        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            app_env: AppEnv::Development,
            cors_allowed_origins: Vec::new(),
            gate_config_path: path.clone(),
            credential_overrides: CredentialOverrides {
                client_id: None,
                client_secret: Some("env-secret".into()),
            },
        };
        let settings = config.gate_settings().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.idcs_url, "https://idcs.example.com");
        assert_eq!(settings.client_id.as_deref(), Some("svc"));
        assert_eq!(settings.client_secret.as_deref(), Some("env-secret"));
    }

    #[test]
    fn unreadable_gate_file_is_reported_with_its_path() {
        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            app_env: AppEnv::Development,
            cors_allowed_origins: Vec::new(),
            gate_config_path: PathBuf::from("/nonexistent/idcs-gate.json"),
            credential_overrides: CredentialOverrides::default(),
        };

        match config.gate_settings() {
            Err(ConfigError::Unreadable { path, .. }) => {
                assert_eq!(path, "/nonexistent/idcs-gate.json")
            }
            other => panic!("expected unreadable, got {other:?}"),
        }
    }
}
