//! Lazily instantiating service registry.
//!
//! A [`ServiceManager`] maps names to factories. The first
//! [`ServiceManager::get_or_create_instance`] for a name builds an instance,
//! awaits its `initialize`, and caches it; later calls return the cached
//! instance. Creation uses double-checked locking so concurrent first calls
//! build exactly one instance.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};
use crate::service::{Agent, ManagedService, ToolService};
use crate::types::ServiceConfig;

/// Builds a fresh, uninitialized service instance.
pub type ServiceFactory<T> = Arc<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// Registry of agents.
pub type AgentManager = ServiceManager<dyn Agent>;

/// Registry of tool services.
pub type ToolManager = ServiceManager<dyn ToolService>;

/// Name-keyed factories plus the instances created from them.
pub struct ServiceManager<T: ?Sized> {
    kind: &'static str,
    factories: RwLock<HashMap<String, ServiceFactory<T>>>,
    instances: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> std::fmt::Debug for ServiceManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> ServiceManager<T>
where
    T: ManagedService + ?Sized,
{
    /// Create an empty manager. `kind` labels log lines ("agent", "tool").
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidName` for an empty name and
    /// `ServiceError::FactoryExists` if the name is taken.
    pub async fn register_factory<F>(&self, name: &str, factory: F) -> Result<()>
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidName);
        }

        let mut factories = self.factories.write().await;
        if factories.contains_key(name) {
            return Err(ServiceError::FactoryExists(name.to_string()));
        }
        factories.insert(name.to_string(), Arc::new(factory));
        tracing::info!(kind = self.kind, name = %name, "Service factory registered");
        Ok(())
    }

    /// Return the cached instance for `name`, creating and initializing it
    /// with `config` on first use.
    ///
    /// `config` is ignored when the instance already exists.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::FactoryNotFound` for an unregistered name, or the
    /// factory's or `initialize`'s error. A failed instance is not cached.
    pub async fn get_or_create_instance(&self, name: &str, config: ServiceConfig) -> Result<Arc<T>> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidName);
        }

        if let Some(instance) = self.instances.read().await.get(name) {
            return Ok(Arc::clone(instance));
        }

        let mut instances = self.instances.write().await;
        if let Some(instance) = instances.get(name) {
            return Ok(Arc::clone(instance));
        }

        let factory = self
            .factories
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::FactoryNotFound(name.to_string()))?;

        let instance = factory()?;
        instance.initialize(config).await.map_err(|err| {
            tracing::error!(kind = self.kind, name = %name, error = %err, "Service initialization failed");
            err
        })?;

        instances.insert(name.to_string(), Arc::clone(&instance));
        tracing::info!(
            kind = self.kind,
            name = %name,
            version = %instance.version(),
            "Service instance created"
        );
        Ok(instance)
    }

    /// Drop the cached instance for `name` and shut it down.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InstanceNotFound` if no instance exists, or the
    /// instance's shutdown error.
    pub async fn release_instance(&self, name: &str) -> Result<()> {
        let instance = self
            .instances
            .write()
            .await
            .remove(name)
            .ok_or_else(|| ServiceError::InstanceNotFound(name.to_string()))?;

        instance.shutdown().await?;
        tracing::info!(kind = self.kind, name = %name, "Service instance released");
        Ok(())
    }

    /// Whether a factory is registered under `name`.
    pub async fn has_factory(&self, name: &str) -> bool {
        self.factories.read().await.contains_key(name)
    }

    /// Names with a registered factory, sorted.
    pub async fn list_available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names with a live instance, sorted.
    pub async fn list_instances(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shut down and drop every instance.
    ///
    /// Every instance is shut down even if some fail.
    ///
    /// # Errors
    ///
    /// Returns the first shutdown error encountered.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<(String, Arc<T>)> = self.instances.write().await.drain().collect();

        let mut first_error = None;
        for (name, instance) in drained {
            if let Err(err) = instance.shutdown().await {
                tracing::warn!(kind = self.kind, name = %name, error = %err, "Service shutdown failed");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::example::{ExampleAgent, ExampleToolService};

    fn agent_factory(created: Arc<AtomicUsize>) -> impl Fn() -> Result<Arc<dyn Agent>> + Send + Sync {
        move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ExampleAgent::new()) as Arc<dyn Agent>)
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_empty_names() {
        let manager = AgentManager::new("agent");
        let created = Arc::new(AtomicUsize::new(0));

        manager
            .register_factory("a", agent_factory(Arc::clone(&created)))
            .await
            .unwrap();
        assert_eq!(
            manager
                .register_factory("a", agent_factory(Arc::clone(&created)))
                .await
                .unwrap_err(),
            ServiceError::FactoryExists("a".into())
        );
        assert_eq!(
            manager
                .register_factory("", agent_factory(created))
                .await
                .unwrap_err(),
            ServiceError::InvalidName
        );
    }

    #[tokio::test]
    async fn instance_is_created_once_and_cached() {
        let manager = Arc::new(AgentManager::new("agent"));
        let created = Arc::new(AtomicUsize::new(0));
        manager
            .register_factory(ExampleAgent::NAME, agent_factory(Arc::clone(&created)))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager
                        .get_or_create_instance(ExampleAgent::NAME, ServiceConfig::new())
                        .await
                })
            })
            .collect();

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(manager.list_instances().await, vec![ExampleAgent::NAME]);
    }

    #[tokio::test]
    async fn has_factory_tracks_registration() {
        let manager = AgentManager::new("agent");
        assert!(!manager.has_factory(ExampleAgent::NAME).await);
        manager
            .register_factory(ExampleAgent::NAME, agent_factory(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap();
        assert!(manager.has_factory(ExampleAgent::NAME).await);
        assert!(!manager.has_factory("ghost").await);
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let manager = ToolManager::new("tool");
        let result = manager
            .get_or_create_instance("ghost", ServiceConfig::new())
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::FactoryNotFound(name)) if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn failed_initialization_is_not_cached() {
        let manager = AgentManager::new("agent");
        let created = Arc::new(AtomicUsize::new(0));
        manager
            .register_factory(ExampleAgent::NAME, agent_factory(Arc::clone(&created)))
            .await
            .unwrap();

        let mut bad = ServiceConfig::new();
        bad.insert("latency_ms".into(), serde_json::json!(-1));
        assert!(manager
            .get_or_create_instance(ExampleAgent::NAME, bad)
            .await
            .is_err());
        assert!(manager.list_instances().await.is_empty());

        manager
            .get_or_create_instance(ExampleAgent::NAME, ServiceConfig::new())
            .await
            .unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn release_and_close_all() {
        let manager = ToolManager::new("tool");
        manager
            .register_factory(ExampleToolService::NAME, || {
                Ok(Arc::new(ExampleToolService::new()) as Arc<dyn ToolService>)
            })
            .await
            .unwrap();

        manager
            .get_or_create_instance(ExampleToolService::NAME, ServiceConfig::new())
            .await
            .unwrap();
        manager.release_instance(ExampleToolService::NAME).await.unwrap();
        assert_eq!(
            manager
                .release_instance(ExampleToolService::NAME)
                .await
                .unwrap_err(),
            ServiceError::InstanceNotFound(ExampleToolService::NAME.into())
        );

        manager
            .get_or_create_instance(ExampleToolService::NAME, ServiceConfig::new())
            .await
            .unwrap();
        manager.close_all().await.unwrap();
        assert!(manager.list_instances().await.is_empty());
        assert_eq!(manager.list_available().await, vec![ExampleToolService::NAME]);
    }
}
