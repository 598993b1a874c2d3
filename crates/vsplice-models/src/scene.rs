//! Scene assignments and representative frames.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::FrameRecord;

/// Scene identifier.
///
/// Ids from density clustering may recur at non-adjacent points in time.
/// Ids minted for noise runs are always fresh.
pub type SceneId = u32;

/// Mapping from frame identifier to scene id.
///
/// Persisted as `clusters.json`. Frame identifiers are zero-padded paths,
/// so the map's key order matches chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SceneAssignment(BTreeMap<String, SceneId>);

impl SceneAssignment {
    /// Create an empty assignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a scene id to a frame identifier, replacing any previous entry.
    pub fn insert(&mut self, identifier: impl Into<String>, scene_id: SceneId) {
        self.0.insert(identifier.into(), scene_id);
    }

    /// Scene id for a frame identifier.
    pub fn get(&self, identifier: &str) -> Option<SceneId> {
        self.0.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(identifier, scene_id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SceneId)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Distinct scene ids, ascending.
    pub fn distinct_scene_ids(&self) -> BTreeSet<SceneId> {
        self.0.values().copied().collect()
    }

    /// Identifiers of frames that have no entry.
    pub fn missing<'a>(&self, frames: &'a [FrameRecord]) -> Vec<&'a str> {
        frames
            .iter()
            .filter(|f| !self.0.contains_key(&f.identifier))
            .map(|f| f.identifier.as_str())
            .collect()
    }
}

impl FromIterator<(String, SceneId)> for SceneAssignment {
    fn from_iter<I: IntoIterator<Item = (String, SceneId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The frame nearest a scene's embedding centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Representative {
    pub scene_id: SceneId,
    /// Identifier of the chosen frame
    pub identifier: String,
    /// Index of the chosen frame in the sampled sequence
    pub index: usize,
    pub timestamp: f64,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entries() {
        let frames = vec![
            FrameRecord::new(0, 0.0, "frames/frame_000000.jpg"),
            FrameRecord::new(1, 2.0, "frames/frame_000001.jpg"),
        ];
        let mut assignment = SceneAssignment::new();
        assignment.insert("frames/frame_000000.jpg", 0);

        assert_eq!(assignment.missing(&frames), vec!["frames/frame_000001.jpg"]);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let assignment: SceneAssignment = vec![
            ("frames/frame_000001.jpg".to_string(), 4),
            ("frames/frame_000000.jpg".to_string(), 2),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&assignment).unwrap();
        assert_eq!(
            json,
            r#"{"frames/frame_000000.jpg":2,"frames/frame_000001.jpg":4}"#
        );
        assert_eq!(assignment.distinct_scene_ids().len(), 2);
    }
}
