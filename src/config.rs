// Daemon configuration from the process environment

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_WORKDIR: &str = "/tmp/dkb2ynab";

/// WebDAV server credentials
#[derive(Clone, PartialEq, Eq)]
pub struct WebDavConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

// Keep the password out of logs
impl fmt::Debug for WebDavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub webdav: WebDavConfig,
    /// Remote folder holding new DKB exports
    pub csv_folder: String,
    /// Remote folder receiving YNAB files
    pub ynab_folder: String,
    pub interval: Duration,
    pub workdir: PathBuf,
}

impl DaemonConfig {
    /// Read WEBDAV_HOST, WEBDAV_USER, WEBDAV_PASSWORD, CSV_FOLDER,
    /// YNAB_FOLDER, INTERVAL and WORKDIR.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let interval = match get("INTERVAL") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        name: "INTERVAL",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "INTERVAL",
                        value: raw,
                        reason: "must be at least one second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_INTERVAL_SECS),
        };

        let host = required("WEBDAV_HOST")?;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "WEBDAV_HOST",
                value: host,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        Ok(DaemonConfig {
            webdav: WebDavConfig {
                host: host.trim_end_matches('/').to_string(),
                user: required("WEBDAV_USER")?,
                password: required("WEBDAV_PASSWORD")?,
            },
            csv_folder: normalize_folder(&required("CSV_FOLDER")?),
            ynab_folder: normalize_folder(&required("YNAB_FOLDER")?),
            interval,
            workdir: get("WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKDIR)),
        })
    }

    /// Local folder for converted files awaiting upload
    pub fn output_dir(&self) -> PathBuf {
        self.workdir.join("ynab")
    }
}

/// "/exports/" and "exports" both become "exports"
fn normalize_folder(raw: &str) -> String {
    raw.trim().trim_matches('/').to_string()
}
