//! On-disk form of a project.
//!
//! Each project is stored as one JSON document tagged with a `format`
//! number. A reader only accepts the format it writes, and refuses a
//! document whose segment list names the same segment twice.

use clipreel_core::{ClipReelError, Result};
use serde::{Deserialize, Serialize};

use crate::project::Project;

/// Format number written into every project document.
pub const FORMAT: u32 = 1;

#[derive(Serialize)]
struct Outgoing<'a> {
    format: u32,
    project: &'a Project,
}

#[derive(Deserialize)]
struct Header {
    format: Option<u32>,
}

#[derive(Deserialize)]
struct Incoming {
    project: Project,
}

/// Serialize `project` as a tagged document.
pub fn encode(project: &Project) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&Outgoing {
        format: FORMAT,
        project,
    })?)
}

/// Parse a tagged document back into a project.
pub fn decode(data: &[u8]) -> Result<Project> {
    let header: Header = serde_json::from_slice(data)?;
    match header.format {
        Some(FORMAT) => {}
        Some(other) => {
            return Err(ClipReelError::Serialization(format!(
                "Unsupported project format {} (expected {})",
                other, FORMAT
            )))
        }
        None => {
            return Err(ClipReelError::Serialization(
                "Project document has no format tag".into(),
            ))
        }
    }

    let Incoming { project } = serde_json::from_slice(data)?;
    reject_duplicate_segments(&project)?;
    Ok(project)
}

fn reject_duplicate_segments(project: &Project) -> Result<()> {
    let mut ids = project.segment_ids();
    ids.sort_unstable();
    match ids.windows(2).find(|w| w[0] == w[1]) {
        Some(pair) => Err(ClipReelError::Serialization(format!(
            "Project {} lists segment {} twice",
            project.id, pair[0]
        ))),
        None => Ok(()),
    }
}
