use async_trait::async_trait;
use serde_json::{json, Value};

use super::{AGENT_TYPE, SCHEMA_TYPE};
use crate::capability::{preset_entry, CapabilityContext, NodeCapability, PresetDescriptor};
use crate::document::{
    compound_id, entry_at, kinds, patch_at, value_at, EaC, FlowGraphEdge, FlowGraphNode, Position,
};
use crate::errors::{EditorError, EditorResult};

/// Agents nested under a surface. An agent watches any number of schemas,
/// recorded as keys of its `SchemaLookups` map.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgentCapability;

impl AgentCapability {
    fn lookup_path(&self, target: &FlowGraphNode, schema: &str, ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        let mut path = self.entry_path(&target.id, ctx)?;
        path.push(kinds::SCHEMA_LOOKUPS.to_string());
        path.push(schema.to_string());
        Some(path)
    }
}

#[async_trait]
impl NodeCapability for AgentCapability {
    fn node_type(&self) -> &'static str {
        AGENT_TYPE
    }

    fn entry_path(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        let surface = ctx.surface?;
        Some(vec![
            kinds::SURFACES.to_string(),
            surface.to_string(),
            kinds::AGENTS.to_string(),
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
            .ok_or_else(|| EditorError::NotSupported("agents outside surface scope".to_string()))?;
        Ok(patch_at(&path, preset_entry("Agent", "New Agent", position)))
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

        entry
            .get(kinds::SCHEMA_LOOKUPS)
            .and_then(Value::as_object)
            .map(|lookups| {
                lookups
                    .keys()
                    .filter(|schema| {
                        entry_at(ctx.eac, &[kinds::SURFACES, surface, kinds::SCHEMAS, schema.as_str()])
                            .is_some()
                    })
                    .map(|schema| FlowGraphEdge::between(&compound_id(surface, schema), &node.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn build_connection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        if source.node_type != SCHEMA_TYPE {
            return Ok(None);
        }
        let exists = self
            .entry_path(&target.id, ctx)
            .and_then(|path| entry_at(ctx.eac, &path))
            .is_some();
        if !exists {
            return Ok(None);
        }

        Ok(self
            .lookup_path(target, ctx.child_key(&source.id), ctx)
            .map(|path| patch_at(&path, json!(true))))
    }

    fn build_disconnection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        if source.node_type != SCHEMA_TYPE {
            return Ok(None);
        }

        Ok(self
            .lookup_path(target, ctx.child_key(&source.id), ctx)
            .filter(|path| value_at(ctx.eac, path).is_some())
            .map(|path| patch_at(&path, Value::Null)))
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(AGENT_TYPE, "Agent", "bot"))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("agent-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("agent-inspector")
    }
}
