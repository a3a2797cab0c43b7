//! alerta-core - Core library for Alerta360
//!
//! This crate contains the incident models, the local store, the remote API
//! client, and the offline-first sync machinery shared by Alerta360 clients.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod network;
pub mod notify;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Incident, IncidentId, NewIncident, SyncStats, SyncStatus};
