//! # External Collaborators
//!
//! Narrow interfaces the engine consumes. Implementations (network
//! transport, telemetry polling, proposal storage) live outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{EaC, Proposal, StatsMap};
use crate::errors::EditorResult;
use crate::history::Snapshot;

/// Processing state reported by the remote document service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    Queued,
    Processing,
    Complete,
    Error,
}

/// Acknowledgment of a remote commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitStatus {
    pub processing: ProcessingState,

    #[serde(default)]
    pub message: String,
}

impl CommitStatus {
    pub fn complete() -> Self {
        Self {
            processing: ProcessingState::Complete,
            message: String::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processing == ProcessingState::Complete
    }
}

/// One document visible to the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EaCSummary {
    #[serde(rename = "ID")]
    pub id: String,

    pub name: String,
}

/// Remote store the orchestrator commits to and loads from
#[async_trait]
pub trait RemoteDocumentService: Send + Sync {
    async fn commit(&self, snapshot: &Snapshot) -> EditorResult<CommitStatus>;

    async fn get(&self) -> EditorResult<EaC>;

    async fn list_for_user(&self) -> EditorResult<Vec<EaCSummary>>;

    async fn archive(&self) -> EditorResult<()>;
}

/// Live metrics per node
#[async_trait]
pub trait TelemetryService: Send + Sync {
    async fn get_stats(&self, node_type: &str, id: &str) -> EditorResult<StatsMap>;
}

/// Read-only source of proposals for overlay composition
pub trait ProposalService: Send + Sync {
    fn get_pending(&self) -> Vec<Proposal>;

    fn get_by_id(&self, id: &str) -> Option<Proposal>;
}
