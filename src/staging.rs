//! Per-request staged files.
//!
//! External tools take their input through files: host lists, YAML rule
//! sets, credential configs. Each request gets its own staging directory
//! named after the correlation id, created immediately before the command
//! runs and removed on every exit path. Output artifacts that are part of
//! the declared result live in a separate per-request artifact directory
//! whose lifecycle is decided by the retention flag.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tempfile::TempDir;
use tracing::debug;

use crate::error::WorkerError;

/// Staging directory for one request's input files.
///
/// The directory and everything in it is removed when this value drops;
/// removal failures are tolerated silently. Paths are namespaced by the
/// request's correlation id, so concurrent worker instances sharing a
/// temp root cannot collide.
pub struct Staging {
    dir: TempDir,
    request_id: String,
}

impl Staging {
    /// Create the staging directory under `temp_root`.
    pub fn create(temp_root: &Path, request_id: &str) -> Result<Self, WorkerError> {
        fs::create_dir_all(temp_root)
            .with_context(|| format!("creating temp root {}", temp_root.display()))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("recon-{request_id}-"))
            .tempdir_in(temp_root)
            .context("creating staging directory")?;
        debug!(request_id = %request_id, path = %dir.path().display(), "Created staging directory");
        Ok(Self {
            dir,
            request_id: request_id.to_string(),
        })
    }

    /// Path of the staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path a staged file would have, without creating it. Used for
    /// output files the external tool writes itself.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a list-valued parameter as one item per line.
    pub fn write_lines(&self, name: &str, items: &[String]) -> Result<PathBuf, WorkerError> {
        let path = self.file_path(name);
        let mut body = items.join("\n");
        body.push('\n');
        fs::write(&path, body).with_context(|| format!("staging {name}"))?;
        Ok(path)
    }

    /// Serialize a structured rule set as a YAML file.
    pub fn write_yaml<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, WorkerError> {
        let path = self.file_path(name);
        let body = serde_yaml::to_string(value).context("serializing rule file")?;
        fs::write(&path, body).with_context(|| format!("staging {name}"))?;
        Ok(path)
    }

    /// Write credential material scoped to this request.
    ///
    /// The file is created with mode 0600 and must be removed with
    /// [`Self::remove`] as soon as the external command returns; the Drop
    /// cleanup covers the paths where that call is never reached.
    /// Credential contents are never logged.
    pub fn write_credentials<T: Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, WorkerError> {
        let path = self.write_yaml(name, value)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting {name}"))?;
        }
        Ok(path)
    }

    /// Remove a single staged file eagerly. Failures (file already gone)
    /// are tolerated silently.
    pub fn remove(&self, path: &Path) {
        let _ = fs::remove_file(path);
    }

    /// Correlation id this staging belongs to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Create the per-request artifact directory under `artifact_root`.
///
/// Unlike staging, artifacts are part of the declared result; whether the
/// worker deletes them after replying is governed by the retention flag.
pub fn artifact_dir(artifact_root: &Path, request_id: &str) -> Result<PathBuf, WorkerError> {
    let dir = artifact_root.join(request_id);
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating artifact directory {}", dir.display()))?;
    Ok(dir)
}

/// Discard an artifact directory the parent declined to keep.
/// Best effort; a directory that is already gone is fine.
pub fn discard_artifacts(dir: &Path) {
    let _ = fs::remove_dir_all(dir);
}
