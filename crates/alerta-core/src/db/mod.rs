//! Database layer for Alerta360

mod connection;
mod incident_repository;
mod migrations;

pub use connection::Database;
pub use incident_repository::{IncidentRepository, LibSqlIncidentRepository};
