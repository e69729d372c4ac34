use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::gateway::{ClientConfig, Credentials, DEFAULT_BASE_URL};
use crate::reports::DEFAULT_RANGE_DAYS;

const CONFIG_FILE: &str = "config.json";
pub const ENV_CONFIG_DIR: &str = "LCE_CONFIG_DIR";
pub const ENV_BASE_URL: &str = "LCE_BASE_URL";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// User-editable configuration. Secrets are deliberately absent: the
/// password and HMAC key only ever come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub base_url: String,
    pub username: Option<String>,
    pub hmac_user: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub default_range_days: i64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            username: None,
            hmac_user: None,
            output_dir: None,
            default_range_days: DEFAULT_RANGE_DAYS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// `LCE_BASE_URL` wins over the stored value.
    pub fn effective_base_url(&self) -> String {
        std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.effective_base_url(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }

    /// Non-secret identities remembered from earlier runs.
    pub fn stored_credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone().unwrap_or_default(),
            hmac_user: self.hmac_user.clone().unwrap_or_default(),
            ..Credentials::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PersistedSettings {
    settings: Settings,
    #[serde(with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

pub struct SettingsManager {
    path: PathBuf,
    inner: RwLock<PersistedSettings>,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        let path = resolve_config_path()?;
        Self::at(path)
    }

    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let persisted = load_settings(&path)?;
        Ok(Self {
            path,
            inner: RwLock::new(persisted),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn read(&self) -> Settings {
        self.inner.read().settings.clone()
    }

    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.inner.read().updated_at
    }

    pub fn write(&self, settings: Settings) -> Result<()> {
        let mut guard = self.inner.write();
        guard.settings = settings;
        guard.updated_at = Some(OffsetDateTime::now_utc());
        persist_settings(self.path.as_path(), &guard)
    }

    pub fn update<F>(&self, apply: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.read();
        apply(&mut settings);
        self.write(settings.clone())?;
        Ok(settings)
    }
}

fn resolve_config_path() -> Result<PathBuf> {
    let dir = match std::env::var_os(ENV_CONFIG_DIR) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => ProjectDirs::from("com", "LCReports", "LCReportDownloader")
            .context("missing project directories")?
            .config_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir).context("creating config directory failed")?;
    Ok(dir.join(CONFIG_FILE))
}

fn load_settings(path: &Path) -> Result<PersistedSettings> {
    if !path.exists() {
        return Ok(PersistedSettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
    serde_json::from_slice(&bytes).context("config json could not be parsed")
}

fn persist_settings(path: &Path, settings: &PersistedSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {parent:?}"))?;
    }
    let serialized =
        serde_json::to_vec_pretty(settings).context("serialize settings to json failed")?;
    fs::write(path, serialized).with_context(|| format!("write settings to {path:?}"))?;
    Ok(())
}
