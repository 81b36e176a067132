//! # Node Capabilities
//!
//! One [`NodeCapability`] per node `Type`. Every structural change to the
//! document is produced by exactly one capability:
//!
//! - projection of an entry into a graph node and its edges
//! - preset, update and delete patches
//! - connection and disconnection patches (when the node accepts edges)
//! - read-only extraction for inspectors
//!
//! Capabilities never touch the document themselves; they return patches
//! (additive `EaC` fragments or tombstone fragments) that the orchestrator
//! merges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::diff::{canonical_value_string, deep_merge};
use crate::document::{
    entry_at, kinds, patch_at, EaC, EaCCode, FlowGraphEdge, FlowGraphNode, NodeUpdate, Position,
    StatsMap, ID_SEPARATOR,
};
use crate::errors::EditorResult;
use crate::scope::ScopeKind;
use crate::services::TelemetryService;

/// What a capability sees while building nodes and patches
#[derive(Debug, Clone, Copy)]
pub struct CapabilityContext<'a> {
    pub eac: &'a EaC,
    pub scope: ScopeKind,
    /// Surface lookup when the scope is a single surface
    pub surface: Option<&'a str>,
}

impl<'a> CapabilityContext<'a> {
    pub fn workspace(eac: &'a EaC) -> Self {
        Self {
            eac,
            scope: ScopeKind::Workspace,
            surface: None,
        }
    }

    pub fn surface(eac: &'a EaC, surface: &'a str) -> Self {
        Self {
            eac,
            scope: ScopeKind::Surface,
            surface: Some(surface),
        }
    }

    /// Strip the `"surface->"` prefix from a compound id
    pub fn child_key<'b>(&self, id: &'b str) -> &'b str {
        match self.surface {
            Some(surface) => id
                .strip_prefix(surface)
                .and_then(|rest| rest.strip_prefix(ID_SEPARATOR))
                .unwrap_or(id),
            None => id,
        }
    }
}

/// Palette entry for creating new nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PresetDescriptor {
    #[serde(rename = "Type")]
    pub node_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PresetDescriptor {
    pub fn new(node_type: &str, label: &str, icon: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            label: label.to_string(),
            icon: Some(icon.to_string()),
        }
    }
}

/// Semantic UI events raised on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeEvent {
    /// "Manage" action, e.g. drilling into a surface
    Manage,
    Custom(String),
}

/// Side effect requested by a capability's event router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutedAction {
    SwitchScope {
        scope: ScopeKind,
        lookup: Option<String>,
    },
}

/// Per-node-type behavior
///
/// Only [`node_type`](Self::node_type), [`entry_path`](Self::entry_path) and
/// [`build_preset_patch`](Self::build_preset_patch) are required; the rest
/// default to working on the entry at `entry_path`.
#[async_trait]
pub trait NodeCapability: Send + Sync + fmt::Debug {
    /// The `Type` discriminator this capability handles
    fn node_type(&self) -> &'static str;

    /// Key path of the document entry behind node `id`
    fn entry_path(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<Vec<String>>;

    /// Patch that instantiates a brand-new entry at `position`
    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC>;

    fn matches(&self, node: &FlowGraphNode) -> bool {
        node.node_type == self.node_type()
    }

    /// Project the entry into a node; `None` when the entry is missing
    fn build_node(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<FlowGraphNode> {
        let path = self.entry_path(id, ctx)?;
        let entry = entry_at(ctx.eac, &path)?;
        Some(FlowGraphNode::from_entry(id, self.node_type(), entry))
    }

    /// Edges derived from this node's document relationships
    fn build_edges_for_node(
        &self,
        _node: &FlowGraphNode,
        _ctx: &CapabilityContext<'_>,
    ) -> Vec<FlowGraphEdge> {
        Vec::new()
    }

    /// Patch for a `{Details?, Metadata?}` change; `None` when nothing changes
    fn build_update_patch(
        &self,
        node: &FlowGraphNode,
        update: &NodeUpdate,
        ctx: &CapabilityContext<'_>,
    ) -> Option<EaC> {
        let path = self.entry_path(&node.id, ctx)?;
        entry_update_patch(ctx.eac, &path, update)
    }

    /// Tombstone fragment removing this entry
    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        let path = self.entry_path(&node.id, ctx)?;
        entry_at(ctx.eac, &path)?;
        Some(patch_at(&path, Value::Null))
    }

    /// Patch binding `source` into this (target) node; `None` when unsupported
    fn build_connection_patch(
        &self,
        _source: &FlowGraphNode,
        _target: &FlowGraphNode,
        _ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        Ok(None)
    }

    /// Tombstone fragment removing the binding; `None` when unsupported
    fn build_disconnection_patch(
        &self,
        _source: &FlowGraphNode,
        _target: &FlowGraphNode,
        _ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        Ok(None)
    }

    /// Current `{Details, Metadata}` of the entry
    fn get_as_code(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaCCode> {
        let path = self.entry_path(&node.id, ctx)?;
        Some(entry_as_code(entry_at(ctx.eac, &path)?))
    }

    /// Fetch metrics for a node from the telemetry collaborator
    async fn get_stats(
        &self,
        node_type: &str,
        id: &str,
        telemetry: &dyn TelemetryService,
    ) -> EditorResult<StatsMap> {
        telemetry.get_stats(node_type, id).await
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        None
    }

    /// Renderer key used by the UI
    fn renderer(&self) -> Option<&'static str> {
        None
    }

    /// Inspector key used by the UI
    fn inspector(&self) -> Option<&'static str> {
        None
    }

    /// Static inspector configuration for node `id`
    fn config(&self, _id: &str) -> Option<Value> {
        None
    }

    fn route_event(&self, _event: &NodeEvent, _node: &FlowGraphNode) -> Option<RoutedAction> {
        None
    }
}

/// `{Details, Metadata}` of an entry, as stored
pub fn entry_as_code(entry: &Map<String, Value>) -> EaCCode {
    EaCCode {
        details: entry
            .get(kinds::DETAILS)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        metadata: entry
            .get(kinds::METADATA)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    }
}

/// Build `{path: {Details, Metadata}}` for an update, or `None` if it would not
/// change the entry at `path`
pub fn entry_update_patch<S: AsRef<str>>(
    eac: &EaC,
    path: &[S],
    update: &NodeUpdate,
) -> Option<EaC> {
    let current = entry_at(eac, path)?;

    let mut fragment = Map::new();
    if let Some(details) = &update.details {
        fragment.insert(kinds::DETAILS.to_string(), Value::Object(details.clone()));
    }
    if let Some(metadata) = &update.metadata {
        fragment.insert(kinds::METADATA.to_string(), Value::Object(metadata.clone()));
    }

    if !changes_entry(current, &fragment) {
        return None;
    }

    Some(patch_at(path, Value::Object(fragment)))
}

/// True when merging `fragment` into `entry` changes its canonical form
pub fn changes_entry(entry: &Map<String, Value>, fragment: &Map<String, Value>) -> bool {
    let mut merged = entry.clone();
    deep_merge(&mut merged, fragment);
    canonical_value_string(&Value::Object(merged))
        != canonical_value_string(&Value::Object(entry.clone()))
}

/// Standard new-entry body: `{Details: {Type, Name}, Metadata: {Position, Enabled}}`
pub fn preset_entry(details_type: &str, name: &str, position: Position) -> Value {
    let mut details = Map::new();
    details.insert(kinds::TYPE.to_string(), Value::String(details_type.to_string()));
    details.insert(kinds::NAME.to_string(), Value::String(name.to_string()));

    let mut entry = Map::new();
    entry.insert(kinds::DETAILS.to_string(), Value::Object(details));
    entry.insert(
        kinds::METADATA.to_string(),
        crate::document::NodeMetadata::at(position).to_value(),
    );
    Value::Object(entry)
}
