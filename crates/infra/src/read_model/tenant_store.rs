use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use shipadvice_core::TenantId;

/// Key/value storage for rebuildable read models, partitioned by tenant.
///
/// No operation ever reads across partitions.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;

    fn upsert(&self, tenant_id: TenantId, key: K, value: V);

    /// Records of the tenant accepted by `filter`, in no particular order.
    fn find(&self, tenant_id: TenantId, filter: &dyn Fn(&V) -> bool) -> Vec<V>;

    /// Drop a tenant's partition before a rebuild.
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn find(&self, tenant_id: TenantId, filter: &dyn Fn(&V) -> bool) -> Vec<V> {
        (**self).find(tenant_id, filter)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    partitions: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// Poisoned locks still serve their data: every record can be rebuilt.
impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let partitions = self.partitions.read().unwrap_or_else(|e| e.into_inner());
        partitions.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        let mut partitions = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        partitions.entry(tenant_id).or_default().insert(key, value);
    }

    fn find(&self, tenant_id: TenantId, filter: &dyn Fn(&V) -> bool) -> Vec<V> {
        let partitions = self.partitions.read().unwrap_or_else(|e| e.into_inner());
        partitions
            .get(&tenant_id)
            .map(|records| records.values().filter(|v| filter(v)).cloned().collect())
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        let mut partitions = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        partitions.remove(&tenant_id);
    }
}
