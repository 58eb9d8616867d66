use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::component::Component;
use crate::error::LoadError;
use crate::loader::{DefaultModuleLoader, ModuleLoader};
use crate::manifest::{Manifest, ModuleEntry};
use crate::registry::{ComponentRegistry, RegistryState};
use crate::supervisor::ServiceLoops;

/// Loads manifest entries into a [`ComponentRegistry`].
///
/// Eager entries are loaded once by [`ModuleHost::init`]; lazy entries on
/// first reference through [`ModuleHost::resolve_component`].
///
/// # Threading
///
/// `ModuleHost` is `Send + Sync` and is typically wrapped in `Arc`. Every
/// load runs under the registry's exclusive lock, so loads are serialized
/// process-wide, including loads of unrelated components.
pub struct ModuleHost {
    registry: Arc<ComponentRegistry>,
    manifest: Manifest,
    loader: Arc<dyn ModuleLoader>,
    loops: ServiceLoops,
    initialized: OnceCell<()>,
}

impl ModuleHost {
    pub fn new(registry: Arc<ComponentRegistry>, manifest: Manifest) -> Self {
        Self::with_loader(registry, manifest, Arc::new(DefaultModuleLoader))
    }

    pub fn with_loader(
        registry: Arc<ComponentRegistry>,
        manifest: Manifest,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            registry,
            manifest,
            loader,
            loops: ServiceLoops::new(),
            initialized: OnceCell::new(),
        }
    }

    /// Load every non-lazy entry in manifest order.
    ///
    /// Applies the manifest's remote flag first. The first failing entry
    /// aborts startup; components loaded before it stay registered and the
    /// failed one stays failed. Runs at most once successfully; later calls
    /// return immediately.
    pub async fn init(&self) -> Result<(), LoadError> {
        self.initialized
            .get_or_try_init(|| async {
                self.registry.set_remote(self.manifest.remote).await;

                for entry in self.manifest.eager() {
                    let mut state = self.registry.write().await;
                    if state.get(&entry.name).is_some() {
                        tracing::debug!(component = %entry.name, "Already registered, skipping");
                        continue;
                    }
                    check_not_failed(&state, &entry.name)?;
                    self.load_entry(&mut state, entry).await?;
                }

                tracing::info!(
                    components = self.registry.len().await,
                    remote = self.manifest.remote,
                    "Eager startup complete"
                );
                Ok::<(), LoadError>(())
            })
            .await
            .map(|_| ())
    }

    /// Return the component registered as `name`, loading it from the
    /// manifest first if needed.
    ///
    /// A component whose load failed is not loaded again; its first error
    /// comes back as [`LoadError::Failed`].
    pub async fn resolve_component(&self, name: &str) -> Result<Arc<Component>, LoadError> {
        // Fast path: already registered
        if let Some(component) = self.registry.lookup_by_name(name).await {
            return Ok(component);
        }

        let mut state = self.registry.write().await;
        // Another caller may have finished the load while we waited.
        if let Some(component) = state.get(name) {
            tracing::debug!(component = name, "Loaded by a concurrent caller");
            return Ok(component);
        }
        check_not_failed(&state, name)?;

        let entry = self
            .manifest
            .entry(name)
            .ok_or_else(|| LoadError::UnknownComponent(name.to_string()))?;
        tracing::info!(component = name, "Lazy loading component");
        self.load_entry(&mut state, entry).await
    }

    /// Load, register and start one entry, recording a failure. Caller
    /// holds the write lock.
    async fn load_entry(
        &self,
        state: &mut RegistryState,
        entry: &ModuleEntry,
    ) -> Result<Arc<Component>, LoadError> {
        let (component, running) = match self.start_entry(state, entry) {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(component = %entry.name, error = %e, "Failed to load component");
                state.mark_failed(&entry.name, e.to_string());
                return Err(e);
            }
        };

        if running {
            if let Some(wait) = entry.after_load_wait() {
                tracing::debug!(
                    component = %component.name(),
                    ?wait,
                    "Waiting for component to settle"
                );
                tokio::time::sleep(wait).await;
            }
        }

        Ok(component)
    }

    /// Returns the registered component and whether its loop was started.
    fn start_entry(
        &self,
        state: &mut RegistryState,
        entry: &ModuleEntry,
    ) -> Result<(Arc<Component>, bool), LoadError> {
        let loaded = self.loader.load(entry)?;
        if let Some(address) = loaded.component.listen_address() {
            if loaded.component.listen_port().is_none() {
                return Err(LoadError::ListenAddr {
                    name: entry.name.clone(),
                    reason: format!("{address:?} has no usable port"),
                });
            }
        }

        let component = state.insert(loaded.component);
        tracing::info!(
            component = %component.name(),
            service_key = %component.service_key(),
            kind = %component.kind(),
            listen_address = ?component.listen_address(),
            "Component registered"
        );

        let Some(run) = loaded.run else {
            return Ok((component, false));
        };
        if let Err(e) = self.loops.spawn(component.name(), run) {
            state.remove(component.name());
            return Err(e);
        }
        Ok((component, true))
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn service_loops(&self) -> &ServiceLoops {
        &self.loops
    }
}

fn check_not_failed(state: &RegistryState, name: &str) -> Result<(), LoadError> {
    match state.failure(name) {
        Some(reason) => Err(LoadError::Failed {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
