//! Inventory service access
//!
//! Typed records returned by the inventory REST API and the `InventoryApi`
//! trait the sync workers depend on. `InventoryClient` is the REST
//! implementation.

mod client;
mod types;

pub use client::{InventoryApi, InventoryClient, EVENT_CATEGORIES};
pub use types::{ClusterRecord, EventRecord, HostRecord, InfraEnvRecord, VersionRecord};
