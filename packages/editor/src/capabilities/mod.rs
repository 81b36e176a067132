//! Built-in node capabilities
//!
//! Workspace scope: `connection`, `simulator`, `surface`.
//! Surface scope: `surface-connection`, `schema`, `agent`.

mod agent;
mod connection;
mod schema;
mod simulator;
mod surface;
mod surface_connection;

use std::sync::Arc;

pub use agent::AgentCapability;
pub use connection::ConnectionCapability;
pub use schema::SchemaCapability;
pub use simulator::SimulatorCapability;
pub use surface::SurfaceCapability;
pub use surface_connection::SurfaceConnectionCapability;

use crate::capability::NodeCapability;

pub const CONNECTION_TYPE: &str = "connection";
pub const SIMULATOR_TYPE: &str = "simulator";
pub const SURFACE_TYPE: &str = "surface";
pub const SURFACE_CONNECTION_TYPE: &str = "surface-connection";
pub const SCHEMA_TYPE: &str = "schema";
pub const AGENT_TYPE: &str = "agent";

/// Capabilities active in workspace scope
pub fn workspace_capabilities() -> Vec<Arc<dyn NodeCapability>> {
    vec![
        Arc::new(ConnectionCapability),
        Arc::new(SimulatorCapability),
        Arc::new(SurfaceCapability),
    ]
}

/// Capabilities active in surface scope
pub fn surface_capabilities() -> Vec<Arc<dyn NodeCapability>> {
    vec![
        Arc::new(SurfaceConnectionCapability),
        Arc::new(SchemaCapability),
        Arc::new(AgentCapability),
    ]
}
