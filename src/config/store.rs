use std::path::{Path, PathBuf};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Environment variable selecting the config file
pub const CONFIG_PATH_ENV: &str = "HUALAI_VIEWER_CONFIG";

/// Config file used when neither the CLI nor the environment names one
pub const DEFAULT_CONFIG_FILE: &str = "viewer.toml";

/// Configuration loaded from a TOML file with environment overrides
///
/// The file is optional; a missing file yields the defaults. Account
/// settings can always be supplied (or overridden) through `HUALAI_*`
/// environment variables, which keeps secrets out of the file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigStore {
    /// Load configuration from `path` and apply process environment overrides
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path).await?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Resolve the config path (CLI arg > environment > default)
    pub fn resolve_path(cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    async fn read_file(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Config file {} not found, using defaults", path.display());
                Ok(AppConfig::default())
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> AppConfig {
        self.config
    }
}

/// Apply `HUALAI_*` overrides using the given variable lookup
///
/// Empty values are ignored so an exported-but-blank variable does not wipe
/// a value from the file.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let account = &mut config.account;
    let fields: [(&str, &mut String); 6] = [
        ("HUALAI_URL", &mut account.host),
        ("HUALAI_PHONE_ID", &mut account.phone_id),
        ("HUALAI_USERNAME", &mut account.username),
        ("HUALAI_PASSWORD", &mut account.password),
        ("HUALAI_SC", &mut account.sc),
        ("HUALAI_SV", &mut account.sv),
    ];

    for (key, field) in fields {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
            *field = value;
        }
    }
}
