//! Tenant-isolated read model storage.

pub mod contacts;
pub mod tenant_store;

pub use contacts::{ContactDirectory, ContactRecord};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
