// 🔄 Sync daemon
//
// Each iteration: pull new DKB exports from WebDAV into the work directory,
// then convert each local export and push its YNAB file straight back.

use crate::config::DaemonConfig;
use crate::converter::{ConversionOptions, Converter, OutputLocation};
use crate::webdav::{WebDavClient, WebDavError};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What one iteration did, for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IterationStats {
    pub downloaded: usize,
    pub converted: usize,
    pub failed: usize,
    pub uploaded: usize,
}

pub struct Daemon {
    config: DaemonConfig,
    client: WebDavClient,
    converter: Converter,
}

impl Daemon {
    pub fn new(config: DaemonConfig, options: ConversionOptions) -> Result<Self> {
        let client = WebDavClient::new(&config.webdav).context("Failed to build WebDAV client")?;
        Ok(Daemon {
            config,
            client,
            converter: Converter::new(options),
        })
    }

    /// Run forever, sleeping the configured interval between iterations.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.run_once()?;
            info!(seconds = self.config.interval.as_secs(), "sleeping");
            std::thread::sleep(self.config.interval);
        }
    }

    /// One sync-convert-upload pass. Only local directory setup is fatal.
    pub fn run_once(&mut self) -> Result<IterationStats> {
        // Fresh date for file names on every pass
        self.converter = Converter::new(self.converter.options().clone());

        ensure_dir(&self.config.workdir)?;
        let output_dir = self.config.output_dir();
        ensure_dir(&output_dir)?;

        let mut stats = IterationStats::default();

        match self.download_new_exports() {
            Ok(count) => stats.downloaded = count,
            Err(WebDavError::MissingFolder(folder)) => {
                error!(folder = %folder, "WebDAV directory does not exist");
            }
            Err(err) => error!(error = %err, "failed to fetch exports from WebDAV"),
        }

        // Leftovers from an earlier failed upload go first
        for pending in local_exports(&output_dir)? {
            if self.upload_output(&pending) {
                stats.uploaded += 1;
            }
        }

        let exports = local_exports(&self.config.workdir)?;
        if exports.is_empty() {
            info!(folder = %self.config.csv_folder, "no new files found");
        }

        // Each output is uploaded before the next export is converted, and
        // directory mode never reuses the name of a file still waiting
        for export in exports {
            match self
                .converter
                .convert_file(&export, &OutputLocation::Dir(output_dir.clone()))
            {
                Ok(report) => {
                    stats.converted += 1;
                    if let Err(e) = fs::remove_file(&export) {
                        error!(file = %export.display(), error = %e, "failed to delete source CSV");
                    } else {
                        info!(file = %export.display(), "deleted source CSV after successful conversion");
                    }
                    debug!(?report, "conversion report");

                    if let Some(output) = &report.output {
                        if self.upload_output(output) {
                            stats.uploaded += 1;
                        }
                    }
                }
                Err(err) => {
                    stats.failed += 1;
                    error!(file = %export.display(), error = %err, "failed to convert file");
                }
            }
        }

        info!(
            downloaded = stats.downloaded,
            converted = stats.converted,
            failed = stats.failed,
            uploaded = stats.uploaded,
            "iteration finished"
        );
        Ok(stats)
    }

    /// Upload one YNAB file and delete the local copy. A failed upload
    /// leaves the file in place for the next iteration.
    fn upload_output(&self, output: &Path) -> bool {
        match self.client.upload(output, &self.config.ynab_folder) {
            Ok(remote) => {
                info!(file = %output.display(), remote = %remote, "uploaded YNAB file");
                if let Err(e) = fs::remove_file(output) {
                    error!(file = %output.display(), error = %e, "failed to delete local YNAB file");
                }
                true
            }
            Err(err) => {
                error!(file = %output.display(), error = %err, "failed to upload file");
                false
            }
        }
    }

    /// Download every visible CSV from the export folder, deleting each
    /// remote copy once it is stored locally.
    fn download_new_exports(&self) -> Result<usize, WebDavError> {
        let folder = &self.config.csv_folder;
        let names: Vec<String> = self
            .client
            .list(folder)?
            .into_iter()
            .filter(|name| is_csv(Path::new(name)))
            .collect();

        if names.is_empty() {
            info!(folder = %folder, "no new files in WebDAV directory");
            return Ok(0);
        }

        let mut downloaded = 0;
        for name in names {
            let remote = format!("{}/{}", folder, name);
            let local = self.config.workdir.join(&name);

            match self.client.download(&remote, &local) {
                Ok(()) => {
                    downloaded += 1;
                    info!(file = %name, folder = %folder, "downloaded file from WebDAV");
                    match self.client.delete(&remote) {
                        Ok(()) => info!(file = %remote, "deleted file from WebDAV"),
                        Err(err) => error!(file = %remote, error = %err, "could not delete file from WebDAV"),
                    }
                }
                Err(err) => {
                    error!(file = %name, folder = %folder, error = %err, "could not download file");
                }
            }
        }
        Ok(downloaded)
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Create `dir` with parents if it is missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        debug!(dir = %dir.display(), "directory already exists");
        return Ok(());
    }
    warn!(dir = %dir.display(), "directory does not exist, creating it");
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    info!(dir = %dir.display(), "directory created");
    Ok(())
}

/// CSV files directly inside `dir`, sorted by name.
pub fn local_exports(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden && is_csv(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
