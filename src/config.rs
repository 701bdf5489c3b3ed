//! Application configuration and startup environment validation.
//!
//! Critical variables (`DATABASE_URL`, `AUDIT_SIGNING_KEY`) block production
//! startup when missing; everything else degrades with a logged warning.
//! `EnvReport` backs the `/health/details` view and never carries secret
//! values, only boolean flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::redaction::RetentionPolicy;

/// The documented development signing key. Production refuses to start (or
/// export) while the configured key still equals this value.
pub const DEV_DEFAULT_SIGNING_KEY: &str = "dev-audit-signing-key";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Dev,
    Prod,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Dev => "dev",
            AppEnv::Prod => "prod",
        }
    }
}

/// Application settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub app_env: AppEnv,
    pub database_url: Option<String>,
    pub audit_signing_key: Option<String>,
    pub cors_origins: Option<String>,
    pub dev_seed_token: Option<String>,
    pub openai_api_key_set: bool,
    pub gemini_api_key_set: bool,
    pub retention: RetentionPolicy,
    /// Directory holding the default database file.
    pub data_dir: PathBuf,
    /// Root of the attachment blob tree: `{uploads_root}/{case_id}/{id}.{ext}`.
    pub uploads_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8001,
            app_env: AppEnv::Dev,
            database_url: None,
            audit_signing_key: None,
            cors_origins: None,
            dev_seed_token: None,
            openai_api_key_set: false,
            gemini_api_key_set: false,
            retention: RetentionPolicy::default(),
            data_dir: PathBuf::from("./data"),
            uploads_root: PathBuf::from("./data/uploads"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_days(name: &str, default: i64) -> i64 {
    env_var(name)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(default)
}

impl AppConfig {
    /// Resolve configuration from process environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let app_env = match env_var("APP_ENV").as_deref() {
            Some("prod") => AppEnv::Prod,
            _ => AppEnv::Dev,
        };

        let data_dir = env_var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let uploads_root = env_var("UPLOADS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads"));

        Self {
            port: env_var("PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            app_env,
            database_url: env_var("DATABASE_URL"),
            audit_signing_key: env_var("AUDIT_SIGNING_KEY"),
            cors_origins: env_var("CORS_ORIGINS"),
            dev_seed_token: env_var("DEV_SEED_TOKEN"),
            openai_api_key_set: env_var("OPENAI_API_KEY").is_some(),
            gemini_api_key_set: env_var("GEMINI_API_KEY").is_some(),
            retention: RetentionPolicy {
                evidence_retention_days: env_days("EVIDENCE_RETENTION_DAYS", 30),
                payload_retention_days: env_days("PAYLOAD_RETENTION_DAYS", 90),
            },
            data_dir,
            uploads_root,
        }
    }

    /// Default sqlite file path when `DATABASE_URL` is unset.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("autocomply.db")
    }

    /// The HMAC key used to sign export bundles.
    ///
    /// Development falls back to the documented default; production requires
    /// a real key and refuses the dev default.
    pub fn signing_key(&self) -> AppResult<String> {
        match (&self.audit_signing_key, self.app_env) {
            (Some(key), AppEnv::Prod) if key == DEV_DEFAULT_SIGNING_KEY => Err(AppError::Internal(
                "AUDIT_SIGNING_KEY is still the dev default; refusing to sign in production"
                    .to_string(),
            )),
            (Some(key), _) => Ok(key.clone()),
            (None, AppEnv::Dev) => Ok(DEV_DEFAULT_SIGNING_KEY.to_string()),
            (None, AppEnv::Prod) => Err(AppError::Internal(
                "AUDIT_SIGNING_KEY is not set; refusing to sign in production".to_string(),
            )),
        }
    }

    /// Validate the environment for startup and the health-details view.
    pub fn validate(&self) -> EnvReport {
        let mut missing_env = Vec::new();
        let mut warnings = Vec::new();

        if self.app_env == AppEnv::Prod {
            if self.database_url.is_none() {
                missing_env.push("DATABASE_URL".to_string());
            }
            match &self.audit_signing_key {
                None => missing_env.push("AUDIT_SIGNING_KEY".to_string()),
                Some(key) if key == DEV_DEFAULT_SIGNING_KEY => {
                    missing_env.push("AUDIT_SIGNING_KEY".to_string());
                    warnings.push(
                        "AUDIT_SIGNING_KEY is still the documented dev default".to_string(),
                    );
                }
                Some(_) => {}
            }
            if self.cors_origins.as_deref() == Some("*") {
                warnings.push("CORS_ORIGINS is '*' in production".to_string());
            }
            if self.dev_seed_token.is_none() {
                warnings.push("DEV_SEED_TOKEN not set; seed endpoint unavailable".to_string());
            }
        }

        if !self.openai_api_key_set && !self.gemini_api_key_set {
            warnings.push(
                "OPENAI_API_KEY / GEMINI_API_KEY not set; RAG features disabled".to_string(),
            );
        }

        EnvReport {
            ok: missing_env.is_empty(),
            environment: self.app_env.as_str().to_string(),
            missing_env,
            warnings,
            config: ConfigFlags {
                database_url_set: self.database_url.is_some(),
                audit_signing_key_set: self
                    .audit_signing_key
                    .as_deref()
                    .map(|k| k != DEV_DEFAULT_SIGNING_KEY)
                    .unwrap_or(false),
                cors_configured: self.cors_origins.is_some(),
                dev_seed_enabled: self.dev_seed_token.is_some(),
                rag_enabled: self.openai_api_key_set || self.gemini_api_key_set,
            },
        }
    }
}

/// Boolean configuration flags, safe to expose. Never secret values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFlags {
    pub database_url_set: bool,
    pub audit_signing_key_set: bool,
    pub cors_configured: bool,
    pub dev_seed_enabled: bool,
    pub rag_enabled: bool,
}

/// Environment validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvReport {
    pub ok: bool,
    pub environment: String,
    pub missing_env: Vec<String>,
    pub warnings: Vec<String>,
    pub config: ConfigFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_defaults_are_permissive() {
        let config = AppConfig::default();
        let report = config.validate();
        assert!(report.ok);
        assert_eq!(report.environment, "dev");
        assert!(report.missing_env.is_empty());
        // no AI keys -> RAG warning
        assert!(report.warnings.iter().any(|w| w.contains("RAG")));
        assert_eq!(config.signing_key().unwrap(), DEV_DEFAULT_SIGNING_KEY);
    }

    #[test]
    fn test_prod_requires_critical_vars() {
        let config = AppConfig {
            app_env: AppEnv::Prod,
            ..AppConfig::default()
        };
        let report = config.validate();
        assert!(!report.ok);
        assert!(report.missing_env.contains(&"DATABASE_URL".to_string()));
        assert!(report.missing_env.contains(&"AUDIT_SIGNING_KEY".to_string()));
        assert!(config.signing_key().is_err());
    }

    #[test]
    fn test_prod_refuses_dev_default_key() {
        let config = AppConfig {
            app_env: AppEnv::Prod,
            database_url: Some("sqlite:prod.db".to_string()),
            audit_signing_key: Some(DEV_DEFAULT_SIGNING_KEY.to_string()),
            ..AppConfig::default()
        };
        let report = config.validate();
        assert!(!report.ok);
        assert!(config.signing_key().is_err());
    }

    #[test]
    fn test_prod_with_real_key_is_ok() {
        let config = AppConfig {
            app_env: AppEnv::Prod,
            database_url: Some("sqlite:prod.db".to_string()),
            audit_signing_key: Some("real-secret".to_string()),
            ..AppConfig::default()
        };
        let report = config.validate();
        assert!(report.ok);
        assert!(report.config.audit_signing_key_set);
        assert_eq!(config.signing_key().unwrap(), "real-secret");
    }

    #[test]
    fn test_report_never_contains_secret_values() {
        let config = AppConfig {
            audit_signing_key: Some("super-secret-value".to_string()),
            dev_seed_token: Some("seed-token-value".to_string()),
            ..AppConfig::default()
        };
        let report = config.validate();
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("super-secret-value"));
        assert!(!json.contains("seed-token-value"));
    }

    #[test]
    fn test_cors_wildcard_warning_in_prod() {
        let config = AppConfig {
            app_env: AppEnv::Prod,
            database_url: Some("sqlite:prod.db".to_string()),
            audit_signing_key: Some("real-secret".to_string()),
            cors_origins: Some("*".to_string()),
            ..AppConfig::default()
        };
        let report = config.validate();
        assert!(report.ok);
        assert!(report.warnings.iter().any(|w| w.contains("CORS")));
    }
}
