use async_trait::async_trait;
use serde_json::Value;

use super::SIMULATOR_TYPE;
use crate::capability::{preset_entry, CapabilityContext, NodeCapability, PresetDescriptor};
use crate::diff::merge_tombstones;
use crate::document::{
    detail_str, entry_at, kinds, patch_at, record_keys, EaC, FlowGraphNode, Position,
};
use crate::errors::EditorResult;

/// Root-level `Simulators` entries. Simulators feed connections but never
/// accept incoming edges themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatorCapability;

#[async_trait]
impl NodeCapability for SimulatorCapability {
    fn node_type(&self) -> &'static str {
        SIMULATOR_TYPE
    }

    fn entry_path(&self, id: &str, _ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        Some(vec![kinds::SIMULATORS.to_string(), id.to_string()])
    }

    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        _ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        Ok(patch_at(
            &[kinds::SIMULATORS, id],
            preset_entry("Simulator", "New Simulator", position),
        ))
    }

    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        entry_at(ctx.eac, &[kinds::SIMULATORS, node.id.as_str()])?;

        let mut tombstone = patch_at(&[kinds::SIMULATORS, node.id.as_str()], Value::Null);

        for connection in record_keys(ctx.eac, &[kinds::DATA_CONNECTIONS]) {
            let fed = entry_at(ctx.eac, &[kinds::DATA_CONNECTIONS, connection.as_str()])
                .and_then(|entry| detail_str(entry, kinds::SIMULATOR_LOOKUP))
                == Some(node.id.as_str());
            if fed {
                let lookup = [
                    kinds::DATA_CONNECTIONS,
                    connection.as_str(),
                    kinds::DETAILS,
                    kinds::SIMULATOR_LOOKUP,
                ];
                merge_tombstones(&mut tombstone, &patch_at(&lookup, Value::Null));
            }
        }

        Some(tombstone)
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(SIMULATOR_TYPE, "Simulator", "cpu"))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("simulator-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("simulator-inspector")
    }
}
