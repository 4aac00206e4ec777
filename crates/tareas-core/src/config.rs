use url::Url;

/// Errors raised while building a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {what} URL {value:?}: {source}")]
    InvalidUrl {
        what: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{what} URL {value:?} must use http or https")]
    UnsupportedScheme { what: &'static str, value: String },

    #[error("missing {0}")]
    Missing(&'static str),
}

/// Parse and sanity-check a base URL, dropping any trailing slash.
pub fn parse_base_url(what: &'static str, value: &str) -> Result<Url, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|source| ConfigError::InvalidUrl {
        what,
        value: value.to_owned(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            what,
            value: value.to_owned(),
        });
    }
    Ok(url)
}

/// Task API configuration.
///
/// The CLI fills it from `TAREAS_BACKEND_URL`, falling back to
/// `http://localhost:8000` when unset.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
}

impl ApiConfig {
    /// The backend URL used when nothing else is configured.
    pub const DEFAULT_URL: &str = "http://localhost:8000";

    pub const ENV_URL: &str = "TAREAS_BACKEND_URL";

    /// Build a config from an explicit URL (tests and CLI flags).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("backend", base_url)?,
        })
    }
}

/// Identity provider configuration: project URL plus the public anon key.
#[derive(Clone)]
pub struct AuthConfig {
    pub url: Url,
    pub anon_key: String,
}

impl AuthConfig {
    pub const ENV_URL: &str = "TAREAS_AUTH_URL";
    pub const ENV_ANON_KEY: &str = "TAREAS_ANON_KEY";

    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        let anon_key = anon_key.into();
        if anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("auth anon key"));
        }
        Ok(Self {
            url: parse_base_url("auth", url)?,
            anon_key,
        })
    }

    /// The anon key with everything but the edges hidden, for display.
    pub fn redacted_key(&self) -> String {
        redact(&self.anon_key)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &self.redacted_key())
            .finish()
    }
}

fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
