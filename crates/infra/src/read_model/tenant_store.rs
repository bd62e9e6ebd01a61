use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use quoteflow_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Read models are rebuilt from the event store, so a failed write here is
/// never a lost fact.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Every tenant that currently has at least one record.
    fn tenants(&self) -> Vec<TenantId>;
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

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn tenants(&self) -> Vec<TenantId> {
        (**self).tenants()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(&(tenant_id, key.clone()))
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        map.iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn tenants(&self) -> Vec<TenantId> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        let mut tenants: Vec<TenantId> = map.keys().map(|(t, _)| *t).collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_never_leak_across_tenants() {
        let store: InMemoryTenantStore<u32, &'static str> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, 1, "studio a");
        store.upsert(b, 1, "studio b");

        assert_eq!(store.get(a, &1), Some("studio a"));
        assert_eq!(store.list(b), vec!["studio b"]);
        assert_eq!(store.tenants().len(), 2);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.remove(b, &1), Some("studio b"));
        assert!(store.tenants().is_empty());
    }
}
