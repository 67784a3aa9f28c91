//! Configuration file management for planscan.
//!
//! Provides a TOML-based config file at `~/.config/planscan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use planscan_core::image::StorageConfig;
use planscan_core::model::ModelConfig;
use planscan_core::pipeline::DEFAULT_LOCK_WAIT;
use planscan_db::config::DbConfig;

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const MODEL_BASE_URL_ENV: &str = "PLANSCAN_MODEL_BASE_URL";
pub const PRIMARY_MODEL_ENV: &str = "PLANSCAN_PRIMARY_MODEL";
pub const FALLBACK_MODEL_ENV: &str = "PLANSCAN_FALLBACK_MODEL";
pub const STORAGE_URL_ENV: &str = "PLANSCAN_STORAGE_URL";
pub const STORAGE_KEY_ENV: &str = "PLANSCAN_STORAGE_KEY";
pub const BUCKET_ENV: &str = "PLANSCAN_BUCKET";
pub const HTTP_TIMEOUT_ENV: &str = "PLANSCAN_HTTP_TIMEOUT_SECS";
pub const LOCK_WAIT_ENV: &str = "PLANSCAN_LOCK_WAIT_SECS";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// How long a request waits for another one on the same property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_wait_secs: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the planscan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/planscan` or
/// `~/.config/planscan`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("planscan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("planscan")
}

/// Return the path to the planscan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since the file holds API keys.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolution helpers
// -----------------------------------------------------------------------

/// Non-empty env var, else the config file value.
fn env_or(var: &str, file_value: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| file_value.filter(|v| !v.trim().is_empty()).cloned())
}

/// Whole seconds from a non-empty env var, else the config file value.
fn env_secs(var: &str, file_value: Option<u64>) -> Result<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{var} is not a whole number of seconds")),
        _ => Ok(file_value),
    }
}

/// DB URL: `cli_db_url` > `PLANSCAN_DATABASE_URL` > config file > default.
pub fn resolve_db_config(cli_db_url: Option<&str>, file: Option<&ConfigFile>) -> DbConfig {
    let url = cli_db_url
        .map(str::to_string)
        .or_else(|| env_or(DbConfig::ENV_VAR, file.map(|f| &f.database.url)))
        .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string());
    DbConfig::new(url)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PlanscanConfig {
    pub db_config: DbConfig,
    pub model_config: ModelConfig,
    pub storage_config: StorageConfig,
    pub http_timeout: Duration,
    pub lock_wait: Duration,
}

impl PlanscanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// The model API key, storage URL and storage key have no default; a
    /// missing value is an error naming the env var to set.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file = load_config().ok();
        let file = file.as_ref();

        let db_config = resolve_db_config(cli_db_url, file);

        let http = file.map(|f| &f.http);
        let timeout_secs = env_secs(HTTP_TIMEOUT_ENV, http.and_then(|h| h.timeout_secs))?
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if timeout_secs == 0 {
            bail!("HTTP timeout must be at least one second");
        }
        let http_timeout = Duration::from_secs(timeout_secs);
        // Zero is allowed: a busy property then fails with a conflict at once.
        let lock_wait = env_secs(LOCK_WAIT_ENV, http.and_then(|h| h.lock_wait_secs))?
            .map_or(DEFAULT_LOCK_WAIT, Duration::from_secs);

        let model = file.map(|f| &f.model);
        let Some(api_key) = env_or(API_KEY_ENV, model.and_then(|m| m.api_key.as_ref())) else {
            bail!(
                "model API key not found; set {API_KEY_ENV} or run `planscan init --api-key ...`"
            );
        };
        let model_config = ModelConfig {
            api_key,
            base_url: env_or(MODEL_BASE_URL_ENV, model.and_then(|m| m.base_url.as_ref()))
                .unwrap_or_else(|| ModelConfig::DEFAULT_BASE_URL.to_string()),
            primary_model: env_or(PRIMARY_MODEL_ENV, model.and_then(|m| m.primary_model.as_ref()))
                .unwrap_or_else(|| ModelConfig::DEFAULT_PRIMARY_MODEL.to_string()),
            fallback_model: env_or(
                FALLBACK_MODEL_ENV,
                model.and_then(|m| m.fallback_model.as_ref()),
            )
            .unwrap_or_else(|| ModelConfig::DEFAULT_FALLBACK_MODEL.to_string()),
            timeout: http_timeout,
        };

        let storage = file.map(|f| &f.storage);
        let Some(base_url) = env_or(STORAGE_URL_ENV, storage.and_then(|s| s.url.as_ref())) else {
            bail!("storage URL not found; set {STORAGE_URL_ENV} or add [storage] url to the config file");
        };
        let Some(service_key) =
            env_or(STORAGE_KEY_ENV, storage.and_then(|s| s.service_key.as_ref()))
        else {
            bail!(
                "storage service key not found; set {STORAGE_KEY_ENV} or add [storage] service_key to the config file"
            );
        };
        let storage_config = StorageConfig {
            base_url,
            service_key,
            bucket: env_or(BUCKET_ENV, storage.and_then(|s| s.bucket.as_ref()))
                .unwrap_or_else(|| StorageConfig::DEFAULT_BUCKET.to_string()),
            timeout: http_timeout,
        };

        Ok(Self {
            db_config,
            model_config,
            storage_config,
            http_timeout,
            lock_wait,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        DbConfig::ENV_VAR,
        API_KEY_ENV,
        MODEL_BASE_URL_ENV,
        PRIMARY_MODEL_ENV,
        FALLBACK_MODEL_ENV,
        STORAGE_URL_ENV,
        STORAGE_KEY_ENV,
        BUCKET_ENV,
        HTTP_TIMEOUT_ENV,
        LOCK_WAIT_ENV,
    ];

    /// Points XDG_CONFIG_HOME at a temp dir and clears planscan env vars,
    /// restoring both on drop.
    struct IsolatedEnv {
        _lock: std::sync::MutexGuard<'static, ()>,
        tmp: tempfile::TempDir,
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl IsolatedEnv {
        fn new() -> Self {
            let lock = crate::test_util::lock_env();
            let tmp = tempfile::TempDir::new().unwrap();
            let mut saved = Vec::new();
            for var in ALL_VARS.iter().copied().chain(["XDG_CONFIG_HOME"]) {
                saved.push((var, std::env::var(var).ok()));
                unsafe { std::env::remove_var(var) };
            }
            unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
            Self {
                _lock: lock,
                tmp,
                saved,
            }
        }

        fn set(&self, var: &str, value: &str) {
            unsafe { std::env::set_var(var, value) };
        }

        fn set_required(&self) {
            self.set(API_KEY_ENV, "env-api-key");
            self.set(STORAGE_URL_ENV, "https://storage.example.com");
            self.set(STORAGE_KEY_ENV, "env-service-key");
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            for (var, value) in &self.saved {
                match value {
                    Some(v) => unsafe { std::env::set_var(var, v) },
                    None => unsafe { std::env::remove_var(var) },
                }
            }
        }
    }

    fn file_config() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".to_string(),
            },
            model: ModelSection {
                api_key: Some("file-api-key".into()),
                primary_model: Some("file-primary".into()),
                ..Default::default()
            },
            storage: StorageSection {
                url: Some("https://file-storage.example.com".into()),
                service_key: Some("file-service-key".into()),
                bucket: Some("file-bucket".into()),
            },
            http: HttpSection {
                timeout_secs: Some(15),
                lock_wait_secs: Some(3),
            },
        }
    }

    #[test]
    fn config_toml_roundtrip() {
        let original = file_config();
        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.model.api_key, original.model.api_key);
        assert_eq!(loaded.model.base_url, None);
        assert_eq!(loaded.storage.bucket.as_deref(), Some("file-bucket"));
        assert_eq!(loaded.http.timeout_secs, Some(15));
    }

    #[test]
    fn minimal_config_file_parses() {
        let loaded: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://h:5432/db\"\n").unwrap();
        assert_eq!(loaded.database.url, "postgresql://h:5432/db");
        assert!(loaded.model.api_key.is_none());
        assert!(loaded.storage.url.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let env = IsolatedEnv::new();
        save_config(&file_config()).unwrap();

        let path = env.tmp.path().join("planscan").join("config.toml");
        assert_eq!(config_path(), path);
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(load_config().unwrap().database.url, "postgresql://file:5432/filedb");
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let env = IsolatedEnv::new();
        env.set_required();
        env.set(DbConfig::ENV_VAR, "postgresql://env:5432/envdb");
        save_config(&file_config()).unwrap();

        let config = PlanscanConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn resolve_env_overrides_config_file() {
        let env = IsolatedEnv::new();
        env.set_required();
        env.set(DbConfig::ENV_VAR, "postgresql://env:5432/envdb");
        env.set(HTTP_TIMEOUT_ENV, "5");
        save_config(&file_config()).unwrap();

        let config = PlanscanConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.model_config.api_key, "env-api-key");
        assert_eq!(config.storage_config.service_key, "env-service-key");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        // Values the environment does not set still come from the file.
        assert_eq!(config.model_config.primary_model, "file-primary");
        assert_eq!(config.storage_config.bucket, "file-bucket");
    }

    #[test]
    fn resolve_reads_config_file() {
        let _env = IsolatedEnv::new();
        save_config(&file_config()).unwrap();

        let config = PlanscanConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.model_config.api_key, "file-api-key");
        assert_eq!(config.storage_config.base_url, "https://file-storage.example.com");
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        assert_eq!(config.storage_config.timeout, Duration::from_secs(15));
        assert_eq!(config.lock_wait, Duration::from_secs(3));
    }

    #[test]
    fn resolve_defaults_when_only_required_set() {
        let env = IsolatedEnv::new();
        env.set_required();

        let config = PlanscanConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.model_config.base_url, ModelConfig::DEFAULT_BASE_URL);
        assert_eq!(config.model_config.primary_model, ModelConfig::DEFAULT_PRIMARY_MODEL);
        assert_eq!(config.model_config.fallback_model, ModelConfig::DEFAULT_FALLBACK_MODEL);
        assert_eq!(config.storage_config.bucket, StorageConfig::DEFAULT_BUCKET);
        assert_eq!(config.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert_eq!(config.lock_wait, DEFAULT_LOCK_WAIT);
    }

    #[test]
    fn resolve_errors_without_api_key() {
        let env = IsolatedEnv::new();
        env.set(STORAGE_URL_ENV, "https://storage.example.com");
        env.set(STORAGE_KEY_ENV, "key");

        let msg = PlanscanConfig::resolve(None).unwrap_err().to_string();
        assert!(msg.contains(API_KEY_ENV), "unexpected error: {msg}");
    }

    #[test]
    fn resolve_errors_without_storage_url() {
        let env = IsolatedEnv::new();
        env.set(API_KEY_ENV, "k");
        env.set(STORAGE_KEY_ENV, "key");

        let msg = PlanscanConfig::resolve(None).unwrap_err().to_string();
        assert!(msg.contains(STORAGE_URL_ENV), "unexpected error: {msg}");
    }

    #[test]
    fn resolve_rejects_bad_timeout() {
        let env = IsolatedEnv::new();
        env.set_required();

        env.set(HTTP_TIMEOUT_ENV, "soon");
        assert!(PlanscanConfig::resolve(None).is_err());

        env.set(HTTP_TIMEOUT_ENV, "0");
        assert!(PlanscanConfig::resolve(None).is_err());
    }

    #[test]
    fn resolve_lock_wait_from_env() {
        let env = IsolatedEnv::new();
        env.set_required();
        save_config(&file_config()).unwrap();

        env.set(LOCK_WAIT_ENV, "0");
        let config = PlanscanConfig::resolve(None).unwrap();
        assert_eq!(config.lock_wait, Duration::ZERO);

        env.set(LOCK_WAIT_ENV, "later");
        let msg = PlanscanConfig::resolve(None).unwrap_err().to_string();
        assert!(msg.contains(LOCK_WAIT_ENV), "unexpected error: {msg}");
    }

    #[test]
    fn blank_env_var_falls_through_to_file() {
        let env = IsolatedEnv::new();
        env.set(API_KEY_ENV, "  ");
        save_config(&file_config()).unwrap();

        let config = PlanscanConfig::resolve(None).unwrap();
        assert_eq!(config.model_config.api_key, "file-api-key");
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let env = IsolatedEnv::new();
        env.set_required();

        let rendered = format!("{:?}", PlanscanConfig::resolve(None).unwrap());
        assert!(!rendered.contains("env-api-key"));
        assert!(!rendered.contains("env-service-key"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("planscan/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
