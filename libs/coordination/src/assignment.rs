//! Assignment records written by the leader.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The artifact files every job ships to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Executable code bundle.
    Bundle,
    /// Serialized topology descriptor.
    Topology,
    /// Serialized job configuration.
    Config,
}

impl ArtifactKind {
    /// Every artifact a fully installed job directory contains.
    pub const ALL: [ArtifactKind; 3] = [Self::Bundle, Self::Topology, Self::Config];

    /// File name of the artifact, both on the leader and in the local cache.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Bundle => "stormjar.jar",
            Self::Topology => "stormcode.ser",
            Self::Config => "stormconf.ser",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Coordination store record mapping a job to its leader-held artifacts.
///
/// Unknown fields written by newer leaders are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Artifact directory on the leader, as understood by the download transport.
    pub master_code_dir: String,

    /// Leader host that accepted the submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,

    /// Worker node id to host name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_host: BTreeMap<String, String>,

    /// When the leader produced this assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Create an assignment pointing at a leader artifact directory.
    pub fn new(master_code_dir: impl Into<String>) -> Self {
        Self {
            master_code_dir: master_code_dir.into(),
            leader: None,
            node_host: BTreeMap::new(),
            assigned_at: None,
        }
    }

    /// Decode a record as stored in the coordination store.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Encode a record for the coordination store.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
