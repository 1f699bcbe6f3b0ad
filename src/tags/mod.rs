
use serde::{Deserialize, Serialize};

/// The caller-facing half of a tag; the artifact identifier is supplied by the
/// index when forming the full [`IndexTag`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchAndDir {
    pub branch: String,
    pub directory: String,
}

/// A `(branch, directory, artifactId)` triple naming one logical corpus.
/// Its encoded form names the LanceDB table holding that corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTag {
    pub branch: String,
    pub directory: String,
    pub artifact_id: String,
}

impl IndexTag {
    #[inline]
    pub fn new(branch: impl Into<String>, directory: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            directory: directory.into(),
            artifact_id: artifact_id.into(),
        }
    }

    #[inline]
    pub fn from_branch_and_dir(tag: &BranchAndDir, artifact_id: impl Into<String>) -> Self {
        Self {
            branch: tag.branch.clone(),
            directory: tag.directory.clone(),
            artifact_id: artifact_id.into(),
        }
    }

    /// Encoded table name for this tag.
    ///
    /// Components are encoded independently and joined with `-`. Inside a
    /// component, every byte outside `[A-Za-z0-9.]` is written as `_hh` (two
    /// lowercase hex digits), so `-` never occurs within an encoded component
    /// and distinct tags always map to distinct table names. The output
    /// alphabet is `[A-Za-z0-9_.\-]`, which the columnar store accepts as a
    /// table identifier.
    #[inline]
    pub fn table_name(&self) -> String {
        format!(
            "{}-{}-{}",
            encode_component(&self.directory),
            encode_component(&self.branch),
            encode_component(&self.artifact_id),
        )
    }
}

fn encode_component(component: &str) -> String {
    let mut encoded = String::with_capacity(component.len());
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02x}", byte));
        }
    }
    encoded
}
