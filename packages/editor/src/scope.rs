//! # Scope Managers
//!
//! A scope decides which part of the document is visible and turns UI
//! interaction into document patches. The projected [`FlowGraph`] is always
//! rebuilt in full from the document; only the document itself is diffed.
//!
//! Concrete scopes only say *which* entries they show
//! ([`ScopeManager::node_keys`]); graph projection and interaction
//! translation are shared provided methods.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::{CapabilityContext, NodeCapability};
use crate::diff::{canonically_equal, deep_merge};
use crate::document::{EaC, FlowGraph, FlowGraphNode, NodeUpdate, Position, ID_SEPARATOR};
use crate::errors::{EditorError, EditorResult};
use crate::registry::CapabilityRegistry;

/// Viewing scope ("zoom level")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    #[default]
    Workspace,
    Surface,
}

/// A position or selection change reported by the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeChange {
    Position { id: String, position: Position },
    Select { id: String, selected: bool },
}

/// An edge change reported by the canvas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EdgeChange {
    Remove { id: String },
}

/// In-memory nodes after a batch of changes, plus the combined document patch
#[derive(Debug, Clone, PartialEq)]
pub struct NodeChangeOutcome {
    pub nodes: Vec<FlowGraphNode>,
    pub patch: Option<EaC>,
}

/// State every scope carries
#[derive(Debug, Clone)]
pub struct ScopeState {
    pub registry: CapabilityRegistry,
    pub graph: FlowGraph,
}

impl ScopeState {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry,
            graph: FlowGraph::default(),
        }
    }
}

pub trait ScopeManager: fmt::Debug + Send + Sync {
    fn kind(&self) -> ScopeKind;

    /// Surface lookup for surface scope
    fn lookup(&self) -> Option<&str>;

    fn state(&self) -> &ScopeState;

    fn state_mut(&mut self) -> &mut ScopeState;

    /// `(node type, node id)` for every entry addressable in this scope, in order
    fn node_keys(&self, eac: &EaC) -> Vec<(&'static str, String)>;

    /// Whether an addressable entry is drawn on the canvas
    fn is_projected(&self, _eac: &EaC, _node_type: &str, _id: &str) -> bool {
        true
    }

    /// Patch adding a batch of simulator entries to the document
    fn install_simulators(&self, _eac: &EaC, _simulators: &EaC) -> EditorResult<EaC> {
        Err(EditorError::NotSupported(format!(
            "installing simulators in {:?} scope",
            self.kind()
        )))
    }

    fn context<'a>(&'a self, eac: &'a EaC) -> CapabilityContext<'a> {
        match (self.kind(), self.lookup()) {
            (ScopeKind::Surface, Some(surface)) => CapabilityContext::surface(eac, surface),
            _ => CapabilityContext::workspace(eac),
        }
    }

    fn registry(&self) -> &CapabilityRegistry {
        &self.state().registry
    }

    /// Last projected graph
    fn graph(&self) -> &FlowGraph {
        &self.state().graph
    }

    /// Project the document without storing the result.
    ///
    /// Selection is carried over from the previous graph for ids still present.
    fn project(&self, eac: &EaC) -> FlowGraph {
        let ctx = self.context(eac);
        let registry = self.registry();
        let previous = self.graph();

        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for (node_type, id) in self.node_keys(eac) {
            if !self.is_projected(eac, node_type, &id) {
                continue;
            }
            if !seen.insert(id.clone()) {
                warn!(node_id = %id, node_type, "Duplicate node id in scope, skipping");
                continue;
            }
            if let Some(mut node) = registry.build_node(node_type, &id, &ctx) {
                node.selected = previous.node(&id).map(|n| n.selected).unwrap_or(false);
                nodes.push(node);
            }
        }

        let mut edge_ids = HashSet::new();
        let mut edges = Vec::new();
        for node in &nodes {
            for edge in registry.build_edges_for_node(node, &ctx) {
                let connected = seen.contains(&edge.source) && seen.contains(&edge.target);
                if connected && edge_ids.insert(edge.id.clone()) {
                    edges.push(edge);
                }
            }
        }

        FlowGraph { nodes, edges }
    }

    /// Rebuild and store the graph for `eac`
    fn build_graph(&mut self, eac: &EaC) -> &FlowGraph {
        let graph = self.project(eac);
        debug!(
            scope = ?self.kind(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Rebuilt graph"
        );
        self.state_mut().graph = graph;
        self.graph()
    }

    fn reset_graph(&mut self) {
        self.state_mut().graph = FlowGraph::default();
    }

    /// Build the node for `id` straight from the document
    fn resolve_node(&self, eac: &EaC, id: &str) -> Option<FlowGraphNode> {
        let ctx = self.context(eac);
        self.node_keys(eac)
            .into_iter()
            .find(|(_, key)| key == id)
            .and_then(|(node_type, key)| self.registry().build_node(node_type, &key, &ctx))
    }

    /// Handler for `node`, or `CapabilityNotFound`
    fn capability_for(&self, node: &FlowGraphNode) -> EditorResult<&dyn NodeCapability> {
        self.registry()
            .capability_for(node)
            .map(|c| c.as_ref())
            .ok_or_else(|| EditorError::CapabilityNotFound(node.node_type.clone()))
    }

    /// Apply position/selection changes to `current_nodes`, then build one
    /// combined patch for every node whose position moved away from the document.
    ///
    /// Nodes without a handler or document entry are skipped.
    fn update_nodes_from_changes(
        &self,
        eac: &EaC,
        changes: &[NodeChange],
        current_nodes: &[FlowGraphNode],
    ) -> NodeChangeOutcome {
        let mut nodes = current_nodes.to_vec();
        for change in changes {
            match change {
                NodeChange::Position { id, position } => {
                    if let Some(node) = nodes.iter_mut().find(|n| n.id == *id) {
                        node.metadata.position = *position;
                    }
                }
                NodeChange::Select { id, selected } => {
                    if let Some(node) = nodes.iter_mut().find(|n| n.id == *id) {
                        node.selected = *selected;
                    }
                }
            }
        }

        let ctx = self.context(eac);
        let mut patch: Option<EaC> = None;
        for node in &nodes {
            let Some(capability) = self.registry().capability_for(node) else {
                debug!(node_id = %node.id, node_type = %node.node_type, "No capability for node, skipping");
                continue;
            };
            let Some(recorded) = capability.build_node(&node.id, &ctx) else {
                continue;
            };
            if recorded.metadata.position == node.metadata.position {
                continue;
            }

            let update = NodeUpdate::position(node.metadata.position);
            if let Some(node_patch) = capability.build_update_patch(node, &update, &ctx) {
                deep_merge(patch.get_or_insert_with(EaC::new), &node_patch);
            }
        }

        NodeChangeOutcome { nodes, patch }
    }

    /// Binding patch for a new `source -> target` edge, built by the target's handler
    fn create_connection_edge(
        &self,
        eac: &EaC,
        source_id: &str,
        target_id: &str,
    ) -> EditorResult<Option<EaC>> {
        let source = self
            .resolve_node(eac, source_id)
            .ok_or_else(|| EditorError::NodeNotFound(source_id.to_string()))?;
        let target = self
            .resolve_node(eac, target_id)
            .ok_or_else(|| EditorError::NodeNotFound(target_id.to_string()))?;

        self.capability_for(&target)?
            .build_connection_patch(&source, &target, &self.context(eac))
    }

    /// Tombstone patch removing the binding behind `edge_id`
    fn remove_connection_edge(&self, eac: &EaC, edge_id: &str) -> EditorResult<Option<EaC>> {
        let (source, target) = match self.graph().edge(edge_id) {
            Some(edge) => (
                self.resolve_node(eac, &edge.source)
                    .ok_or_else(|| EditorError::NodeNotFound(edge.source.clone()))?,
                self.resolve_node(eac, &edge.target)
                    .ok_or_else(|| EditorError::NodeNotFound(edge.target.clone()))?,
            ),
            None => split_edge_id(self, eac, edge_id)
                .ok_or_else(|| EditorError::InvalidEdge(edge_id.to_string()))?,
        };

        self.capability_for(&target)?
            .build_disconnection_patch(&source, &target, &self.context(eac))
    }

    fn create_partial_from_preset(
        &self,
        eac: &EaC,
        node_type: &str,
        id: &str,
        position: Position,
    ) -> EditorResult<EaC> {
        self.registry()
            .build_preset_patch(node_type, id, position, &self.context(eac))
    }

    fn build_partial_for_node_delete(&self, eac: &EaC, id: &str) -> EditorResult<Option<EaC>> {
        let node = self
            .resolve_node(eac, id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;

        Ok(self
            .capability_for(&node)?
            .build_delete_patch(&node, &self.context(eac)))
    }

    /// Update patch for one node, or `None` when merging it would leave the
    /// document canonically unchanged
    fn update_node_patch(
        &self,
        eac: &EaC,
        id: &str,
        update: &NodeUpdate,
    ) -> EditorResult<Option<EaC>> {
        let node = self
            .resolve_node(eac, id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;

        let Some(patch) = self
            .capability_for(&node)?
            .build_update_patch(&node, update, &self.context(eac))
        else {
            return Ok(None);
        };

        let mut merged = eac.clone();
        deep_merge(&mut merged, &patch);
        if canonically_equal(&merged, eac) {
            return Ok(None);
        }

        Ok(Some(patch))
    }
}

/// Split an edge id at the first `->` where both sides resolve to nodes.
///
/// Compound node ids contain `->` themselves, so the split point is ambiguous.
fn split_edge_id<S: ScopeManager + ?Sized>(
    scope: &S,
    eac: &EaC,
    edge_id: &str,
) -> Option<(FlowGraphNode, FlowGraphNode)> {
    edge_id.match_indices(ID_SEPARATOR).find_map(|(at, _)| {
        let source = scope.resolve_node(eac, &edge_id[..at])?;
        let target = scope.resolve_node(eac, &edge_id[at + ID_SEPARATOR.len()..])?;
        Some((source, target))
    })
}
