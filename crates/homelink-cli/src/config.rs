//! Configuration file management.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to the local cache database
    #[serde(default)]
    pub db: Option<PathBuf>,

    /// Base URL of the remote replica
    #[serde(default)]
    pub replica_url: Option<String>,

    /// User id to sign in as when a replica is configured
    #[serde(default)]
    pub uid: Option<String>,

    /// Auth token for the replica
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Default output format ("text" or "json")
    #[serde(default)]
    pub format: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Per-attempt timeout for device commands, in seconds
    #[serde(default)]
    pub command_timeout: Option<u64>,

    /// Timeout for health probes, in seconds
    #[serde(default)]
    pub health_timeout: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("homelink")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        let path = Self::path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    pub fn health_timeout(&self) -> Option<Duration> {
        self.health_timeout
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }
}

/// Resolve the cache database path from arg or config, else the platform default.
pub fn resolve_db(db: Option<PathBuf>, config: &Config) -> PathBuf {
    db.or_else(|| config.db.clone())
        .unwrap_or_else(homelink_store::default_db_path)
}

/// Connection details for the remote replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub url: String,
    pub uid: String,
    pub auth_token: Option<String>,
}

/// Resolve replica settings from args, falling back to config per field.
///
/// A replica URL without a user id is an error; a user id without a URL is
/// ignored, since there is nothing to sign in to.
pub fn resolve_remote(
    replica_url: Option<String>,
    uid: Option<String>,
    auth_token: Option<String>,
    config: &Config,
) -> Result<Option<Remote>> {
    let url = replica_url.or_else(|| config.replica_url.clone());
    let uid = uid.or_else(|| config.uid.clone());
    let auth_token = auth_token.or_else(|| config.auth_token.clone());

    match (url, uid) {
        (None, _) => Ok(None),
        (Some(_), None) => bail!("A replica URL was given but no user id; pass --uid"),
        (Some(url), Some(uid)) if uid.trim().is_empty() => {
            bail!("Empty user id for replica {}", url)
        }
        (Some(url), Some(uid)) => Ok(Some(Remote {
            url,
            uid,
            auth_token,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_prefers_arg() {
        let config = Config {
            db: Some(PathBuf::from("/config/cache.db")),
            ..Default::default()
        };
        let result = resolve_db(Some(PathBuf::from("/arg/cache.db")), &config);
        assert_eq!(result, PathBuf::from("/arg/cache.db"));
    }

    #[test]
    fn test_resolve_db_falls_back_to_config() {
        let config = Config {
            db: Some(PathBuf::from("/config/cache.db")),
            ..Default::default()
        };
        assert_eq!(resolve_db(None, &config), PathBuf::from("/config/cache.db"));
    }

    #[test]
    fn test_resolve_db_default() {
        let result = resolve_db(None, &Config::default());
        assert!(result.ends_with("homelink/cache.db"));
    }

    #[test]
    fn test_resolve_remote_none_without_url() {
        let result = resolve_remote(None, Some("u1".into()), None, &Config::default()).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_resolve_remote_requires_uid() {
        let result = resolve_remote(
            Some("http://replica".into()),
            None,
            None,
            &Config::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_remote_mixes_args_and_config() {
        let config = Config {
            replica_url: Some("http://replica".into()),
            auth_token: Some("secret".into()),
            ..Default::default()
        };
        let result = resolve_remote(None, Some("u1".into()), None, &config)
            .unwrap()
            .unwrap();
        assert_eq!(
            result,
            Remote {
                url: "http://replica".into(),
                uid: "u1".into(),
                auth_token: Some("secret".into()),
            }
        );
    }

    #[test]
    fn test_timeouts_ignore_zero() {
        let config = Config {
            command_timeout: Some(0),
            health_timeout: Some(3),
            ..Default::default()
        };
        assert_eq!(config.command_timeout(), None);
        assert_eq!(config.health_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_config_parses_toml() {
        let config: Config = toml::from_str(
            r#"
            replica_url = "http://replica"
            uid = "u1"
            format = "json"
            command_timeout = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.uid.as_deref(), Some("u1"));
        assert_eq!(config.format.as_deref(), Some("json"));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(4)));
        assert!(!config.no_color);
    }
}
