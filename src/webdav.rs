// WebDAV transport for the sync daemon
//
// Only the handful of verbs the daemon needs: PROPFIND (list / exists),
// GET, PUT and DELETE, all with basic auth over a blocking client.

use crate::config::WebDavConfig;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#;

#[derive(Debug, Error)]
pub enum WebDavError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
    },

    #[error("remote folder {0:?} does not exist")]
    MissingFolder(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    Request(String),
}

pub type Result<T> = std::result::Result<T, WebDavError>;

pub struct WebDavClient {
    client: Client,
    base: String,
    user: String,
    password: String,
    propfind: Method,
}

impl WebDavClient {
    pub fn new(config: &WebDavConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let propfind =
            Method::from_bytes(b"PROPFIND").map_err(|e| WebDavError::Request(e.to_string()))?;

        Ok(WebDavClient {
            client,
            base: config.host.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            propfind,
        })
    }

    /// Absolute URL for a remote path, each segment percent-encoded.
    pub fn url(&self, remote_path: &str) -> String {
        let encoded: Vec<String> = remote_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base, encoded.join("/"))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
    }

    fn check(response: Response, method: &Method, url: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(WebDavError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status,
            })
        }
    }

    fn propfind(&self, folder: &str, depth: &str) -> Result<Option<String>> {
        let url = format!("{}/", self.url(folder));
        let response = self
            .request(self.propfind.clone(), &url)
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response, &self.propfind, &url)?;
        Ok(Some(response.text()?))
    }

    pub fn exists(&self, folder: &str) -> Result<bool> {
        Ok(self.propfind(folder, "0")?.is_some())
    }

    /// File names directly inside `folder`, without hidden entries or subfolders.
    pub fn list(&self, folder: &str) -> Result<Vec<String>> {
        let body = self
            .propfind(folder, "1")?
            .ok_or_else(|| WebDavError::MissingFolder(folder.to_string()))?;
        let names = file_names(&body);
        debug!(folder, count = names.len(), "listed remote folder");
        Ok(names)
    }

    pub fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let url = self.url(remote_path);
        let mut response = Self::check(self.request(Method::GET, &url).send()?, &Method::GET, &url)?;

        let io_err = |source| WebDavError::Io {
            path: local_path.to_path_buf(),
            source,
        };
        let mut file = File::create(local_path).map_err(io_err)?;
        response.copy_to(&mut file)?;
        Ok(())
    }

    /// Upload a local file into `remote_folder`, keeping its file name.
    pub fn upload(&self, local_path: &Path, remote_folder: &str) -> Result<String> {
        if !self.exists(remote_folder)? {
            return Err(WebDavError::MissingFolder(remote_folder.to_string()));
        }

        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WebDavError::Request(format!("no file name in {}", local_path.display())))?;
        let remote_path = format!("{}/{}", remote_folder, name);
        let url = self.url(&remote_path);

        let body = std::fs::read(local_path).map_err(|source| WebDavError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let response = self
            .request(Method::PUT, &url)
            .header("Content-Type", "text/csv; charset=utf-8")
            .body(body)
            .send()?;
        Self::check(response, &Method::PUT, &url)?;
        Ok(remote_path)
    }

    pub fn delete(&self, remote_path: &str) -> Result<()> {
        let url = self.url(remote_path);
        let response = self.request(Method::DELETE, &url).send()?;
        Self::check(response, &Method::DELETE, &url)?;
        Ok(())
    }
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?href>\s*(.*?)\s*</(?:[A-Za-z0-9_]+:)?href>")
            .expect("static href pattern")
    })
}

/// Extract plain file names from a PROPFIND multistatus body.
///
/// Collections (the listed folder itself and subfolders) end in '/', hidden
/// files start with '.'; both are dropped.
pub fn file_names(multistatus: &str) -> Vec<String> {
    href_pattern()
        .captures_iter(multistatus)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str();
            if href.ends_with('/') {
                return None;
            }
            let segment = href.rsplit('/').next()?;
            let name = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            // Decoded separators would escape the local work directory
            if name.contains(['/', '\\']) || name.contains("..") {
                warn!(href, "ignoring remote file name with path components");
                return None;
            }
            if name.is_empty() || name.starts_with('.') {
                None
            } else {
                Some(name)
            }
        })
        .collect()
}
