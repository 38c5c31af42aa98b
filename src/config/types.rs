//! Raw configuration types for TOML parsing

use super::*;
use serde::Deserialize;

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub server: Option<RawServerConfig>,
    pub identity: Option<RawIdentityConfig>,
    pub admin: Option<RawAdminConfig>,
    pub upstream: Option<RawUpstreamConfig>,
    pub storage: Option<RawStorageConfig>,
    pub logging: Option<RawLoggingConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawServerConfig {
    pub bind: Option<String>,
    pub max_body_bytes: Option<usize>,
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        let max_body_bytes = raw.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
        if max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            bind: raw.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
            max_body_bytes,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawIdentityConfig {
    pub header: Option<String>,
    pub fallback_email: Option<String>,
}

impl TryFrom<RawIdentityConfig> for IdentityConfig {
    type Error = ConfigError;

    fn try_from(raw: RawIdentityConfig) -> Result<Self, Self::Error> {
        let name = raw
            .header
            .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string())
            .to_ascii_lowercase();
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!("identity.header is not a valid header name: {}", name))
        })?;

        Ok(Self {
            header,
            fallback_email: raw
                .fallback_email
                .unwrap_or_else(|| DEFAULT_FALLBACK_EMAIL.to_string()),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAdminConfig {
    pub hostname: Option<String>,
    pub upstream: Option<String>,
}

impl TryFrom<RawAdminConfig> for AdminConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAdminConfig) -> Result<Self, Self::Error> {
        let upstream = raw
            .upstream
            .map(|u| parse_base_url("admin.upstream", &u))
            .transpose()?;

        Ok(Self {
            hostname: raw.hostname.map(|h| h.trim().to_ascii_lowercase()),
            upstream,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawUpstreamConfig {
    pub scheme: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl TryFrom<RawUpstreamConfig> for UpstreamConfig {
    type Error = ConfigError;

    fn try_from(raw: RawUpstreamConfig) -> Result<Self, Self::Error> {
        let scheme = match raw.scheme.as_deref() {
            Some("https") | None => "https".to_string(),
            Some("http") => "http".to_string(),
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown upstream scheme: {}",
                    other
                )))
            }
        };

        let overrides = raw
            .overrides
            .into_iter()
            .map(|(host, base)| {
                let base = parse_base_url(&format!("upstream.overrides.{}", host), &base)?;
                Ok((host.to_ascii_lowercase(), base))
            })
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        Ok(Self {
            scheme,
            timeout: raw.timeout_secs.map(Duration::from_secs),
            overrides,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawStorageConfig {
    pub backend: Option<String>,
    pub path: Option<String>,
}

impl TryFrom<RawStorageConfig> for StorageConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStorageConfig) -> Result<Self, Self::Error> {
        let backend = match raw.backend.as_deref() {
            Some("sqlite") | None => StorageBackendType::Sqlite,
            Some("memory") => StorageBackendType::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        Ok(Self {
            backend,
            path: raw
                .path
                .map(|p| expand_home(&p))
                .unwrap_or_else(Config::default_database_path),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl From<RawLoggingConfig> for LoggingConfig {
    fn from(raw: RawLoggingConfig) -> Self {
        Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format: match raw.format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Validate an http(s) base URL and strip any trailing slash
fn parse_base_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{} is not a valid URL: {}", key, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigError::Invalid(format!(
                "{} uses unsupported scheme '{}'",
                key, scheme
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(ConfigError::Invalid(format!("{} must include a host", key)));
    }

    Ok(value.trim_end_matches('/').to_string())
}
