//! Configuration file management for tareas.
//!
//! Provides a TOML-based config file at `~/.config/tareas/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use tareas_core::config::{ApiConfig, AuthConfig};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub backend: BackendSection,
    pub auth: AuthSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendSection {
    /// Base URL of the task API.
    pub url: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: ApiConfig::DEFAULT_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Supabase project URL.
    pub url: String,
    /// Public anon key of the project.
    pub anon_key: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/tareas` or `~/.config/tareas`, on every platform.
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"])
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// `$XDG_STATE_HOME/tareas` or `~/.local/state/tareas`.
pub fn state_dir() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", &[".local", "state"])
}

/// Where the terminal UI writes its log.
pub fn log_path() -> PathBuf {
    state_dir().join("tareas.log")
}

fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    if let Ok(dir) = std::env::var(var) {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("tareas");
        }
    }
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.extend(fallback);
    path.join("tareas")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(&config_path(), config)
}

/// Write `config` to `path` with mode 0600 on Unix. The file holds the anon
/// key.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line, highest priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides<'a> {
    pub backend_url: Option<&'a str>,
    pub auth_url: Option<&'a str>,
    pub anon_key: Option<&'a str>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TareasConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    /// Config file that contributed values, if one was read.
    pub source: Option<PathBuf>,
}

impl TareasConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Backend URL: `--backend-url` > `TAREAS_BACKEND_URL` > `backend.url` > `ApiConfig::DEFAULT_URL`
    /// - Auth URL: `--auth-url` > `TAREAS_AUTH_URL` > `auth.url` > error
    /// - Anon key: `--anon-key` > `TAREAS_ANON_KEY` > `auth.anon_key` > error
    pub fn resolve(overrides: Overrides<'_>) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            Some(load_config_from(&path)?)
        } else {
            None
        };

        let backend_url = pick(
            overrides.backend_url,
            ApiConfig::ENV_URL,
            file_config.as_ref().map(|c| c.backend.url.as_str()),
        )
        .unwrap_or_else(|| ApiConfig::DEFAULT_URL.to_string());

        let Some(auth_url) = pick(
            overrides.auth_url,
            AuthConfig::ENV_URL,
            file_config.as_ref().map(|c| c.auth.url.as_str()),
        ) else {
            bail!(
                "auth URL not found; pass --auth-url, set {} or run `tareas init`",
                AuthConfig::ENV_URL
            );
        };

        let Some(anon_key) = pick(
            overrides.anon_key,
            AuthConfig::ENV_ANON_KEY,
            file_config.as_ref().map(|c| c.auth.anon_key.as_str()),
        ) else {
            bail!(
                "anon key not found; pass --anon-key, set {} or run `tareas init`",
                AuthConfig::ENV_ANON_KEY
            );
        };

        let api = ApiConfig::new(&backend_url).context("invalid backend URL")?;
        let auth = AuthConfig::new(&auth_url, anon_key).context("invalid auth settings")?;

        Ok(Self {
            api,
            auth,
            source: file_config.map(|_| path),
        })
    }
}

/// First non-empty value of flag, env var, file.
fn pick(flag: Option<&str>, env: &str, file: Option<&str>) -> Option<String> {
    fn non_empty(v: &str) -> bool {
        !v.trim().is_empty()
    }
    flag.filter(|v| non_empty(v))
        .map(str::to_string)
        .or_else(|| std::env::var(env).ok().filter(|v| non_empty(v)))
        .or_else(|| file.filter(|v| non_empty(v)).map(str::to_string))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
