use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CONNECTION_TYPE, SIMULATOR_TYPE};
use crate::capability::{preset_entry, CapabilityContext, NodeCapability, PresetDescriptor};
use crate::diff::merge_tombstones;
use crate::document::{
    detail_str, entry_at, kinds, patch_at, record_keys, EaC, FlowGraphEdge, FlowGraphNode,
    Position,
};
use crate::errors::EditorResult;

/// Root-level `DataConnections` entries
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionCapability;

#[async_trait]
impl NodeCapability for ConnectionCapability {
    fn node_type(&self) -> &'static str {
        CONNECTION_TYPE
    }

    fn entry_path(&self, id: &str, _ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        Some(vec![kinds::DATA_CONNECTIONS.to_string(), id.to_string()])
    }

    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        _ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        Ok(patch_at(
            &[kinds::DATA_CONNECTIONS, id],
            preset_entry("DataConnection", "New Connection", position),
        ))
    }

    fn build_edges_for_node(
        &self,
        node: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> Vec<FlowGraphEdge> {
        let Some(entry) = entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, node.id.as_str()]) else {
            return Vec::new();
        };

        match detail_str(entry, kinds::SIMULATOR_LOOKUP) {
            Some(simulator) if entry_at(ctx.eac, &[kinds::SIMULATORS, simulator]).is_some() => {
                vec![FlowGraphEdge::between(simulator, &node.id)]
            }
            _ => Vec::new(),
        }
    }

    /// Removes the connection, its surface bindings and schema references to it
    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, node.id.as_str()])?;

        let mut tombstone = patch_at(&[kinds::DATA_CONNECTIONS, node.id.as_str()], Value::Null);

        for surface in record_keys(ctx.eac, &[kinds::SURFACES]) {
            let bound = [kinds::SURFACES, surface.as_str(), kinds::DATA_CONNECTIONS, node.id.as_str()];
            if entry_at(ctx.eac, &bound).is_some() {
                merge_tombstones(&mut tombstone, &patch_at(&bound, Value::Null));
            }

            for schema in record_keys(ctx.eac, &[kinds::SURFACES, surface.as_str(), kinds::SCHEMAS]) {
                let path = [kinds::SURFACES, surface.as_str(), kinds::SCHEMAS, schema.as_str()];
                let references = entry_at(ctx.eac, &path)
                    .and_then(|entry| detail_str(entry, kinds::DATA_CONNECTION_LOOKUP))
                    == Some(node.id.as_str());
                if references {
                    let lookup = [
                        kinds::SURFACES,
                        surface.as_str(),
                        kinds::SCHEMAS,
                        schema.as_str(),
                        kinds::DETAILS,
                        kinds::DATA_CONNECTION_LOOKUP,
                    ];
                    merge_tombstones(&mut tombstone, &patch_at(&lookup, Value::Null));
                }
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
        if source.node_type != SIMULATOR_TYPE {
            return Ok(None);
        }
        if entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, target.id.as_str()]).is_none() {
            return Ok(None);
        }

        Ok(Some(patch_at(
            &[kinds::DATA_CONNECTIONS, target.id.as_str(), kinds::DETAILS, kinds::SIMULATOR_LOOKUP],
            Value::String(source.id.clone()),
        )))
    }

    fn build_disconnection_patch(
        &self,
        source: &FlowGraphNode,
        target: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<Option<EaC>> {
        if source.node_type != SIMULATOR_TYPE {
            return Ok(None);
        }

        let bound = entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, target.id.as_str()])
            .and_then(|entry| detail_str(entry, kinds::SIMULATOR_LOOKUP))
            == Some(source.id.as_str());
        if !bound {
            return Ok(None);
        }

        Ok(Some(patch_at(
            &[kinds::DATA_CONNECTIONS, target.id.as_str(), kinds::DETAILS, kinds::SIMULATOR_LOOKUP],
            Value::Null,
        )))
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(CONNECTION_TYPE, "Data Connection", "link"))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("connection-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("connection-inspector")
    }

    fn config(&self, id: &str) -> Option<Value> {
        Some(json!({
            "RecordKind": kinds::DATA_CONNECTIONS,
            "Lookup": id,
            "Editable": ["Name", "Description", kinds::SIMULATOR_LOOKUP],
        }))
    }
}
