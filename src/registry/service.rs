//! Module registry collaborator and an in-process implementation
//!
//! The bridge never owns modules. It consumes a [`ModuleRegistry`]: something
//! that can enumerate descriptors and push change events. [`InMemoryRegistry`]
//! is the implementation embedders use when modules live in the same process,
//! optionally seeded from YAML module files.

use crate::adapters::ModuleIdNormalizer;
use crate::error::{BridgeError, Result};
use crate::registry::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the registry event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Contract consumed by the bridge for module discovery and change events
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// (Re)scan module sources; returns the number of known modules
    async fn discover(&self) -> Result<usize>;

    /// Ids of modules matching the filter, in ascending order
    fn list(&self, filter: &ModuleFilter) -> Vec<String>;

    /// Descriptor for a module id, if registered
    fn get_definition(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>>;

    /// Subscribe to register/unregister events
    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent>;
}

/// On-disk layout of a YAML module file
#[derive(Debug, Deserialize)]
struct ModuleFile {
    #[serde(default)]
    modules: Vec<ModuleDescriptor>,
}

/// Registry holding descriptors in memory
pub struct InMemoryRegistry {
    modules: RwLock<BTreeMap<String, Arc<ModuleDescriptor>>>,
    events: broadcast::Sender<RegistryEvent>,
    sources: Vec<PathBuf>,
    normalizer: ModuleIdNormalizer,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry whose event channel buffers `capacity` events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            modules: RwLock::new(BTreeMap::new()),
            events,
            sources: Vec::new(),
            normalizer: ModuleIdNormalizer::new(),
        }
    }

    /// Add a YAML module file that [`discover`](ModuleRegistry::discover) loads
    pub fn with_source<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Register or replace a module; invalid ids are rejected
    pub fn register(&self, descriptor: ModuleDescriptor) -> Result<()> {
        self.normalizer.validate(&descriptor.id)?;

        let module_id = descriptor.id.clone();
        let descriptor = Arc::new(descriptor);
        // Broadcast under the write guard so event order matches map order
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        modules.insert(module_id.clone(), Arc::clone(&descriptor));
        debug!(module_id = %module_id, "Module registered");
        // No subscribers is not an error
        let _ = self.events.send(RegistryEvent::Register {
            module_id,
            descriptor,
        });
        Ok(())
    }

    /// Remove a module; returns whether it was registered
    pub fn unregister(&self, module_id: &str) -> bool {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        let removed = modules.remove(module_id).is_some();
        if removed {
            debug!(module_id = %module_id, "Module unregistered");
            let _ = self.events.send(RegistryEvent::Unregister {
                module_id: module_id.to_string(),
            });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a YAML module file without registering anything
    pub async fn load_module_file(path: &Path) -> Result<Vec<ModuleDescriptor>> {
        let content = tokio::fs::read_to_string(path).await?;
        let file: ModuleFile = serde_yaml::from_str(&content).map_err(|e| {
            BridgeError::config(format!("Failed to parse module file {}: {}", path.display(), e))
        })?;
        Ok(file.modules)
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleRegistry for InMemoryRegistry {
    async fn discover(&self) -> Result<usize> {
        for source in &self.sources {
            if !source.exists() {
                warn!("Module file not found: {}", source.display());
                continue;
            }

            let descriptors = Self::load_module_file(source).await?;
            let count = descriptors.len();
            for descriptor in descriptors {
                let module_id = descriptor.id.clone();
                if let Err(e) = self.register(descriptor) {
                    warn!(module_id = %module_id, "Skipped module from {}: {}", source.display(), e);
                }
            }
            info!("Loaded {} modules from {}", count, source.display());
        }

        Ok(self.len())
    }

    fn list(&self, filter: &ModuleFilter) -> Vec<String> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules
            .values()
            .filter(|descriptor| filter.matches(descriptor))
            .map(|descriptor| descriptor.id.clone())
            .collect()
    }

    fn get_definition(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules.get(module_id).cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}
