//! Per-invocation run directories.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineResult;

pub const FRAMES_DIR: &str = "frames";
pub const CLIPS_DIR: &str = "clips";

/// Isolated directory tree holding all artifacts of one pipeline run.
///
/// Layout:
/// ```text
/// <runs_root>/<prefix_>YYYYMMDD_HHMMSS_<8 hex>/
///     frames/
///     clips/
/// ```
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
}

impl RunWorkspace {
    /// Allocate a fresh run directory under `runs_root`.
    ///
    /// A name collision is an error; existing directories are never reused.
    pub fn create(runs_root: impl AsRef<Path>, prefix: Option<&str>) -> PipelineResult<Self> {
        let runs_root = runs_root.as_ref();
        fs::create_dir_all(runs_root)?;
        let runs_root = runs_root.canonicalize()?;

        let root = runs_root.join(run_dir_name(prefix));
        fs::create_dir(&root)?;
        fs::create_dir(root.join(FRAMES_DIR))?;
        fs::create_dir(root.join(CLIPS_DIR))?;

        debug!(run_dir = %root.display(), "Created run workspace");
        Ok(Self { root })
    }

    /// Absolute path of the run directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.root.join(CLIPS_DIR)
    }

    /// Workspace-relative identifier of a sampled frame.
    pub fn frame_identifier(index: usize) -> String {
        format!("{}/frame_{:06}.jpg", FRAMES_DIR, index)
    }

    /// Workspace-relative path of an encoded clip.
    pub fn clip_identifier(file_name: &str) -> String {
        format!("{}/{}", CLIPS_DIR, file_name)
    }

    /// Resolve a workspace-relative identifier to an absolute path.
    pub fn resolve(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Delete every file in the clips directory, returning how many were removed.
    pub fn clear_clips(&self) -> PipelineResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.clips_dir())? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Write a pretty-printed JSON artifact at the workspace root.
    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> PipelineResult<PathBuf> {
        let path = self.root.join(name);
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Sortable run directory name with a random suffix.
fn run_dir_name(prefix: Option<&str>) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];

    match prefix.map(sanitize_prefix).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}_{}", prefix, stamp, suffix),
        None => format!("{}_{}", stamp, suffix),
    }
}

/// Keep only characters that are safe in a single path component.
fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
