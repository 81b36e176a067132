use async_trait::async_trait;
use serde_json::Value;

use super::{AGENT_TYPE, SCHEMA_TYPE, SURFACE_CONNECTION_TYPE};
use crate::capability::{preset_entry, CapabilityContext, NodeCapability, PresetDescriptor};
use crate::diff::merge_tombstones;
use crate::document::{
    compound_id, detail_str, entry_at, kinds, patch_at, record_keys, EaC, FlowGraphEdge,
    FlowGraphNode, Position,
};
use crate::errors::{EditorError, EditorResult};

/// Schemas nested under a surface, each fed by one bound connection
/// through `Details.DataConnectionLookup`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaCapability;

#[async_trait]
impl NodeCapability for SchemaCapability {
    fn node_type(&self) -> &'static str {
        SCHEMA_TYPE
    }

    fn entry_path(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        let surface = ctx.surface?;
        Some(vec![
            kinds::SURFACES.to_string(),
            surface.to_string(),
            kinds::SCHEMAS.to_string(),
            ctx.child_key(id).to_string(),
        ])
    }

    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        let path = self
            .entry_path(id, ctx)
            .ok_or_else(|| EditorError::NotSupported("schemas outside surface scope".to_string()))?;
        Ok(patch_at(&path, preset_entry("Schema", "New Schema", position)))
    }

    fn build_edges_for_node(
        &self,
        node: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> Vec<FlowGraphEdge> {
        let Some(surface) = ctx.surface else {
            return Vec::new();
        };
        let Some(entry) = self
            .entry_path(&node.id, ctx)
            .and_then(|path| entry_at(ctx.eac, &path))
        else {
            return Vec::new();
        };

        match detail_str(entry, kinds::DATA_CONNECTION_LOOKUP) {
            Some(conn)
                if entry_at(ctx.eac, &[kinds::SURFACES, surface, kinds::DATA_CONNECTIONS, conn])
                    .is_some() =>
            {
                vec![FlowGraphEdge::between(&compound_id(surface, conn), &node.id)]
            }
            _ => Vec::new(),
        }
    }

    /// Removes the schema and every agent's reference to it
    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        let surface = ctx.surface?;
        let path = self.entry_path(&node.id, ctx)?;
        entry_at(ctx.eac, &path)?;

        let key = ctx.child_key(&node.id);
        let mut tombstone = patch_at(&path, Value::Null);

        for agent in record_keys(ctx.eac, &[kinds::SURFACES, surface, kinds::AGENTS]) {
            let lookup = [
                kinds::SURFACES,
                surface,
                kinds::AGENTS,
                agent.as_str(),
                kinds::SCHEMA_LOOKUPS,
                key,
            ];
            if crate::document::value_at(ctx.eac, &lookup).is_some() {
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
        if source.node_type != SURFACE_CONNECTION_TYPE {
            return Ok(None);
        }
        let Some(mut path) = self.entry_path(&target.id, ctx) else {
            return Ok(None);
        };
        if entry_at(ctx.eac, &path).is_none() {
            return Ok(None);
        }

        path.push(kinds::DETAILS.to_string());
        path.push(kinds::DATA_CONNECTION_LOOKUP.to_string());
        Ok(Some(patch_at(
            &path,
            Value::String(ctx.child_key(&source.id).to_string()),
        )))
    }

    fn build_disconnection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        if source.node_type != SURFACE_CONNECTION_TYPE {
            return Ok(None);
        }
        let Some(mut path) = self.entry_path(&target.id, ctx) else {
            return Ok(None);
        };

        let bound = entry_at(ctx.eac, &path)
            .and_then(|entry| detail_str(entry, kinds::DATA_CONNECTION_LOOKUP))
            == Some(ctx.child_key(&source.id));
        if !bound {
            return Ok(None);
        }

        path.push(kinds::DETAILS.to_string());
        path.push(kinds::DATA_CONNECTION_LOOKUP.to_string());
        Ok(Some(patch_at(&path, Value::Null)))
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(SCHEMA_TYPE, "Schema", "table"))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("schema-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("schema-inspector")
    }
}
