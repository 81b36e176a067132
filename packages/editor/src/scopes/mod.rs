//! Concrete viewing scopes

mod surface;
mod workspace;

pub use surface::SurfaceScopeManager;
pub use workspace::WorkspaceScopeManager;
