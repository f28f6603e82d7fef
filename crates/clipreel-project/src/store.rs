//! Project persistence collaborator.
//!
//! The engine treats every store operation as request/acknowledge and never
//! assumes a write is visible before the call returns. `update` is
//! last-write-wins keyed by project ID.

use async_trait::async_trait;
use clipreel_core::{ClipReelError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::project::{Project, ProjectId};
use crate::segment::{CameraFacing, Segment, SegmentId};
use crate::document;

/// Storage for projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Create and persist an empty project.
    async fn create(&self, name: &str) -> Result<Project>;

    /// Load the latest persisted state of a project.
    async fn load(&self, id: ProjectId) -> Result<Project>;

    /// All projects, ordered by ID.
    async fn list(&self) -> Result<Vec<Project>>;

    /// Persist a project, replacing whatever is stored under its ID.
    async fn update(&self, project: &Project) -> Result<()>;

    /// Delete a project.
    async fn delete(&self, id: ProjectId) -> Result<()>;

    /// Rename a project.
    async fn rename(&self, id: ProjectId, name: &str) -> Result<Project> {
        let mut project = self.load(id).await?;
        project.rename(name);
        self.update(&project).await?;
        Ok(project)
    }

    /// Record a new clip at the end of a project.
    async fn append_segment(
        &self,
        id: ProjectId,
        source: PathBuf,
        facing: CameraFacing,
    ) -> Result<Segment> {
        let mut project = self.load(id).await?;
        let segment_id = project.record_segment(source, facing);
        self.update(&project).await?;
        project
            .segment(segment_id)
            .cloned()
            .ok_or_else(|| ClipReelError::Internal("recorded segment vanished".into()))
    }

    /// Remove one segment from a project.
    async fn remove_segment(&self, id: ProjectId, segment_id: SegmentId) -> Result<()> {
        let mut project = self.load(id).await?;
        if project.remove_segment(segment_id).is_none() {
            return Err(ClipReelError::NotFound(format!(
                "segment {} in project {}",
                segment_id, id
            )));
        }
        self.update(&project).await
    }
}

// ── In-memory store ────────────────────────────────────────────

/// Process-local store, used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<BTreeMap<ProjectId, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing project.
    pub fn insert(&self, project: Project) {
        self.projects.write().insert(project.id, project);
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create(&self, name: &str) -> Result<Project> {
        let mut projects = self.projects.write();
        let id = projects.keys().next_back().map_or(1, |max| max + 1);
        let project = Project::new(id, name);
        projects.insert(id, project.clone());
        Ok(project)
    }

    async fn load(&self, id: ProjectId) -> Result<Project> {
        self.projects
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClipReelError::NotFound(format!("project {}", id)))
    }

    async fn list(&self) -> Result<Vec<Project>> {
        Ok(self.projects.read().values().cloned().collect())
    }

    async fn update(&self, project: &Project) -> Result<()> {
        self.projects.write().insert(project.id, project.clone());
        Ok(())
    }

    async fn delete(&self, id: ProjectId) -> Result<()> {
        self.projects
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClipReelError::NotFound(format!("project {}", id)))
    }
}

// ── JSON directory store ───────────────────────────────────────

/// One versioned JSON document per project inside a directory.
#[derive(Debug, Clone)]
pub struct JsonProjectStore {
    root: PathBuf,
}

impl JsonProjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: ProjectId) -> PathBuf {
        self.root.join(format!("project-{}.json", id))
    }

    fn id_from_path(path: &Path) -> Option<ProjectId> {
        path.file_name()?
            .to_str()?
            .strip_prefix("project-")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }

    async fn ids(&self) -> Result<Vec<ProjectId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = Self::id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn write(&self, project: &Project) -> Result<()> {
        let data = document::encode(project)?;
        let path = self.path_for(project.id);
        // Write-then-rename so readers never see a half-written document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(project_id = project.id, path = %path.display(), "Project written");
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn create(&self, name: &str) -> Result<Project> {
        let id = self.ids().await?.last().map_or(1, |max| max + 1);
        let project = Project::new(id, name);
        self.write(&project).await?;
        Ok(project)
    }

    async fn load(&self, id: ProjectId) -> Result<Project> {
        let path = self.path_for(id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClipReelError::NotFound(format!("project {}", id)));
            }
            Err(e) => return Err(e.into()),
        };
        document::decode(&data)
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for id in self.ids().await? {
            match self.load(id).await {
                Ok(project) => projects.push(project),
                Err(e) => warn!(project_id = id, error = %e, "Skipping unreadable project"),
            }
        }
        Ok(projects)
    }

    async fn update(&self, project: &Project) -> Result<()> {
        self.write(project).await
    }

    async fn delete(&self, id: ProjectId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ClipReelError::NotFound(format!("project {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
