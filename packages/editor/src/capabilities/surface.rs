use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{CONNECTION_TYPE, SURFACE_TYPE};
use crate::capability::{
    preset_entry, CapabilityContext, NodeCapability, NodeEvent, PresetDescriptor, RoutedAction,
};
use crate::diff::merge_tombstones;
use crate::document::{
    entry_at, kinds, patch_at, record_keys, EaC, FlowGraphEdge, FlowGraphNode, NodeMetadata,
    Position,
};
use crate::errors::{EditorError, EditorResult};
use crate::scope::ScopeKind;

/// `Surfaces` entries.
///
/// A surface binds connections under its nested `DataConnections` map and may
/// name a parent surface through `ParentSurfaceLookup`. Connecting one surface
/// to another nests the target, which then leaves the workspace canvas.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceCapability;

fn parent_lookup<'a>(eac: &'a EaC, surface: &str) -> Option<&'a str> {
    entry_at(eac, &[kinds::SURFACES, surface])
        .and_then(|entry| entry.get(kinds::PARENT_SURFACE_LOOKUP))
        .and_then(Value::as_str)
}

/// True when `ancestor` appears on the parent chain of `surface`
fn is_ancestor(eac: &EaC, ancestor: &str, surface: &str) -> bool {
    let mut visited = HashSet::new();
    let mut current = surface;
    while let Some(parent) = parent_lookup(eac, current) {
        if parent == ancestor {
            return true;
        }
        if !visited.insert(parent) {
            return false;
        }
        current = parent;
    }
    false
}

#[async_trait]
impl NodeCapability for SurfaceCapability {
    fn node_type(&self) -> &'static str {
        SURFACE_TYPE
    }

    fn entry_path(&self, id: &str, _ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        Some(vec![kinds::SURFACES.to_string(), id.to_string()])
    }

    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        _ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        Ok(patch_at(
            &[kinds::SURFACES, id],
            preset_entry("Surface", "New Surface", position),
        ))
    }

    fn build_edges_for_node(
        &self,
        node: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> Vec<FlowGraphEdge> {
        record_keys(
            ctx.eac,
            &[kinds::SURFACES, node.id.as_str(), kinds::DATA_CONNECTIONS],
        )
        .into_iter()
        .filter(|conn| entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, conn.as_str()]).is_some())
        .map(|conn| FlowGraphEdge::between(&conn, &node.id))
        .collect()
    }

    /// Removes the surface (with everything nested under it) and detaches child surfaces
    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        entry_at(ctx.eac, &[kinds::SURFACES, node.id.as_str()])?;

        let mut tombstone = patch_at(&[kinds::SURFACES, node.id.as_str()], Value::Null);

        for child in record_keys(ctx.eac, &[kinds::SURFACES]) {
            if parent_lookup(ctx.eac, &child) == Some(node.id.as_str()) {
                let lookup = [kinds::SURFACES, child.as_str(), kinds::PARENT_SURFACE_LOOKUP];
                merge_tombstones(&mut tombstone, &patch_at(&lookup, Value::Null));
            }
        }

        Some(tombstone)
    }

    fn build_connection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        if entry_at(ctx.eac, &[kinds::SURFACES, target.id.as_str()]).is_none() {
            return Ok(None);
        }

        match source.node_type.as_str() {
            CONNECTION_TYPE => {
                let mut binding = Map::new();
                binding.insert(
                    kinds::METADATA.to_string(),
                    NodeMetadata::at(source.metadata.position).to_value(),
                );
                Ok(Some(patch_at(
                    &[
                        kinds::SURFACES,
                        target.id.as_str(),
                        kinds::DATA_CONNECTIONS,
                        source.id.as_str(),
                    ],
                    Value::Object(binding),
                )))
            }
            SURFACE_TYPE if source.id == target.id => Err(EditorError::InvalidEdge(format!(
                "surface {} cannot be its own parent",
                source.id
            ))),
            SURFACE_TYPE if is_ancestor(ctx.eac, &target.id, &source.id) => {
                Err(EditorError::InvalidEdge(format!(
                    "surface {} already contains {}",
                    target.id, source.id
                )))
            }
            SURFACE_TYPE => Ok(Some(patch_at(
                &[kinds::SURFACES, target.id.as_str(), kinds::PARENT_SURFACE_LOOKUP],
                Value::String(source.id.clone()),
            ))),
            _ => Ok(None),
        }
    }

    fn build_disconnection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        match source.node_type.as_str() {
            CONNECTION_TYPE => {
                let path = [
                    kinds::SURFACES,
                    target.id.as_str(),
                    kinds::DATA_CONNECTIONS,
                    source.id.as_str(),
                ];
                Ok(entry_at(ctx.eac, &path).map(|_| patch_at(&path, Value::Null)))
            }
            SURFACE_TYPE if parent_lookup(ctx.eac, &target.id) == Some(source.id.as_str()) => {
                Ok(Some(patch_at(
                    &[kinds::SURFACES, target.id.as_str(), kinds::PARENT_SURFACE_LOOKUP],
                    Value::Null,
                )))
            }
            _ => Ok(None),
        }
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(SURFACE_TYPE, "Surface", "layers"))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("surface-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("surface-inspector")
    }

    fn route_event(&self, event: &NodeEvent, node: &FlowGraphNode) -> Option<RoutedAction> {
        match event {
            NodeEvent::Manage => Some(RoutedAction::SwitchScope {
                scope: ScopeKind::Surface,
                lookup: Some(node.id.clone()),
            }),
            NodeEvent::Custom(_) => None,
        }
    }
}
