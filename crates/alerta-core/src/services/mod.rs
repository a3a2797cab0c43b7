//! Shared services used by client apps.

mod incidents;
mod store;

pub use incidents::IncidentService;
pub use store::IncidentStore;
