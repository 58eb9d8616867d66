use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::component::Component;

/// Everything guarded by the registry lock.
#[derive(Default)]
pub(crate) struct RegistryState {
    components: HashMap<String, Arc<Component>>,
    /// names in first-registration order
    order: Vec<String>,
    /// name → first load error; Failed is terminal
    failed: HashMap<String, String>,
    remote: bool,
}

impl RegistryState {
    pub(crate) fn get(&self, name: &str) -> Option<Arc<Component>> {
        self.components.get(name).cloned()
    }

    pub(crate) fn insert(&mut self, component: Component) -> Arc<Component> {
        let name = component.name().to_string();
        let component = Arc::new(component);
        self.failed.remove(&name);
        if self
            .components
            .insert(name.clone(), Arc::clone(&component))
            .is_none()
        {
            self.order.push(name);
        }
        component
    }

    /// Undo an insert whose startup did not complete.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<Component>> {
        let removed = self.components.remove(name)?;
        self.order.retain(|n| n != name);
        Some(removed)
    }

    pub(crate) fn failure(&self, name: &str) -> Option<&str> {
        self.failed.get(name).map(String::as_str)
    }

    pub(crate) fn mark_failed(&mut self, name: &str, reason: String) {
        self.failed.entry(name.to_string()).or_insert(reason);
    }

    fn by_service_key(&self, key: &str) -> Option<Arc<Component>> {
        self.order
            .iter()
            .filter_map(|name| self.components.get(name))
            .find(|c| c.service_key() == key)
            .cloned()
    }
}

/// Name → component map shared by the host and the router.
///
/// One reader/writer lock covers the map and the remote-mode flag: readers
/// never observe a partially registered component, and writers (registration,
/// lazy loads) are serialized.
#[derive(Default)]
pub struct ComponentRegistry {
    state: RwLock<RegistryState>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the component registered under its name.
    pub async fn register(&self, component: Component) -> Arc<Component> {
        let mut state = self.state.write().await;
        tracing::info!(
            component = %component.name(),
            service_key = %component.service_key(),
            kind = %component.kind(),
            listen_address = ?component.listen_address(),
            "Registering component"
        );
        state.insert(component)
    }

    pub async fn lookup_by_name(&self, name: &str) -> Option<Arc<Component>> {
        self.state.read().await.get(name)
    }

    /// First component, in registration order, carrying `key`.
    ///
    /// Scans every entry; component counts are small.
    pub async fn lookup_by_service_key(&self, key: &str) -> Option<Arc<Component>> {
        self.state.read().await.by_service_key(key)
    }

    /// All components in registration order.
    pub async fn list(&self) -> Vec<Arc<Component>> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|name| state.components.get(name).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.components.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.components.is_empty()
    }

    /// The recorded load error of a component that failed to load.
    pub async fn failure(&self, name: &str) -> Option<String> {
        self.state.read().await.failure(name).map(str::to_string)
    }

    /// Switch remote mode: every routed call goes over the network.
    pub async fn set_remote(&self, remote: bool) {
        let mut state = self.state.write().await;
        if state.remote != remote {
            tracing::info!(remote, "Remote mode changed");
        }
        state.remote = remote;
    }

    pub async fn is_remote(&self) -> bool {
        self.state.read().await.remote
    }

    /// Exclusive access for a load that must check and register atomically.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;
    use crate::service::ServiceTable;

    fn local(name: &str, key: &str) -> Component {
        Component::local(name, key, ServiceTable::new(format!("{name}.Service")))
    }

    #[tokio::test]
    async fn lookup_returns_what_was_registered() {
        let registry = ComponentRegistry::new();
        let component = local("orders", "orders.v1").with_listen_address("127.0.0.1:9100");
        registry.register(component.clone()).await;

        let found = registry.lookup_by_name("orders").await.unwrap();
        assert_eq!(*found, component);
        assert_eq!(found.kind(), ComponentKind::Local);
        assert_eq!(found.listen_address(), Some("127.0.0.1:9100"));
        assert!(registry.lookup_by_name("billing").await.is_none());
    }

    #[tokio::test]
    async fn register_overwrites_by_name() {
        let registry = ComponentRegistry::new();
        registry.register(local("orders", "orders.v1")).await;
        registry.register(local("orders", "orders.v2")).await;

        assert_eq!(registry.len().await, 1);
        let found = registry.lookup_by_name("orders").await.unwrap();
        assert_eq!(found.service_key(), "orders.v2");
    }

    #[tokio::test]
    async fn service_key_lookup_prefers_first_registered() {
        let registry = ComponentRegistry::new();
        registry.register(local("orders-a", "orders.v1")).await;
        registry.register(local("orders-b", "orders.v1")).await;
        registry.register(local("billing", "billing.v1")).await;

        let found = registry.lookup_by_service_key("orders.v1").await.unwrap();
        assert_eq!(found.name(), "orders-a");
        assert!(registry.lookup_by_service_key("shipping.v1").await.is_none());

        let names: Vec<_> = registry
            .list()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, ["orders-a", "orders-b", "billing"]);
    }

    #[tokio::test]
    async fn failures_are_kept_until_a_registration_replaces_them() {
        let registry = ComponentRegistry::new();
        {
            let mut state = registry.write().await;
            state.mark_failed("orders", "initializer returned status 3".into());
            state.mark_failed("orders", "second attempt".into());
        }
        assert_eq!(
            registry.failure("orders").await.as_deref(),
            Some("initializer returned status 3")
        );
        assert!(registry.lookup_by_name("orders").await.is_none());

        registry.register(local("orders", "orders.v1")).await;
        assert!(registry.failure("orders").await.is_none());
    }

    #[tokio::test]
    async fn removed_components_leave_the_order() {
        let registry = ComponentRegistry::new();
        registry.register(local("orders", "orders.v1")).await;
        registry.register(local("billing", "billing.v1")).await;

        assert!(registry.write().await.remove("orders").is_some());
        assert!(registry.write().await.remove("orders").is_none());

        let names: Vec<_> = registry
            .list()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, ["billing"]);
        assert!(registry.lookup_by_service_key("orders.v1").await.is_none());
    }

    #[tokio::test]
    async fn remote_flag_defaults_off() {
        let registry = ComponentRegistry::new();
        assert!(!registry.is_remote().await);
        registry.set_remote(true).await;
        assert!(registry.is_remote().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_only_see_complete_components() {
        let registry = Arc::new(ComponentRegistry::new());

        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..200 {
                    let name = format!("c{i}");
                    let key = format!("key{i}");
                    let listen = format!("127.0.0.1:{}", 9000 + i);
                    registry
                        .register(local(&name, &key).with_listen_address(listen))
                        .await;
                }
            })
        };

        let reader = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..500 {
                    for component in registry.list().await {
                        let i: u32 = component.name()[1..].parse().unwrap();
                        assert_eq!(component.service_key(), format!("key{i}"));
                        assert_eq!(
                            component.listen_address(),
                            Some(format!("127.0.0.1:{}", 9000 + i).as_str())
                        );
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(registry.len().await, 200);
    }
}
