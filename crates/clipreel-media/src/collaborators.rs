//! Boundaries the export pipeline delivers through: the permission gate
//! guarding the media library and the sink that receives finished files.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::SinkError;

/// Authorization state of the destination library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Authorized,
    Denied,
    NotDetermined,
    /// Partial access; enough to add new items.
    Limited,
}

impl PermissionStatus {
    /// Whether an export may proceed.
    pub fn allows_export(self) -> bool {
        matches!(self, Self::Authorized | Self::Limited)
    }
}

/// Guards write access to the destination library.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Current status, without prompting.
    fn status(&self) -> PermissionStatus;

    /// Ask for access. Only meaningful while `NotDetermined`.
    async fn request(&self) -> PermissionStatus;
}

/// Receives finished export files.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Take ownership of the file's content. The caller removes its own copy
    /// only after this returns `Ok`.
    async fn save(&self, path: &Path) -> Result<(), SinkError>;
}

/// Gate with a fixed answer, for headless use.
#[derive(Debug)]
pub struct StaticPermissionGate {
    status: Mutex<PermissionStatus>,
    grant_on_request: PermissionStatus,
}

impl StaticPermissionGate {
    /// Always reports `status`.
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            grant_on_request: status,
        }
    }

    /// Starts `NotDetermined` and settles on `answer` once asked.
    pub fn prompting(answer: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(PermissionStatus::NotDetermined),
            grant_on_request: answer,
        }
    }

    pub fn authorized() -> Self {
        Self::new(PermissionStatus::Authorized)
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    fn status(&self) -> PermissionStatus {
        *self.status.lock()
    }

    async fn request(&self) -> PermissionStatus {
        let mut status = self.status.lock();
        if *status == PermissionStatus::NotDetermined {
            *status = self.grant_on_request;
        }
        *status
    }
}

/// Sink that copies exports into a library directory.
#[derive(Debug, Clone)]
pub struct LibraryDirectorySink {
    root: PathBuf,
}

impl LibraryDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ExportSink for LibraryDirectorySink {
    async fn save(&self, path: &Path) -> Result<(), SinkError> {
        let sink_err = |reason: String| SinkError {
            path: path.to_path_buf(),
            reason,
        };
        let name = path
            .file_name()
            .ok_or_else(|| sink_err("export path has no file name".into()))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| sink_err(e.to_string()))?;
        let target = self.root.join(name);
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| sink_err(e.to_string()))?;
        info!(target = %target.display(), "Export saved to library");
        Ok(())
    }
}
