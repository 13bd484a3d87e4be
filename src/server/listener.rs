//! Live tool snapshot maintained from registry events
//!
//! Readers call [`RegistryListener::snapshot`] and get an `Arc` to an
//! immutable [`RegistrySnapshot`]; they never wait on a writer. Writers build a
//! new snapshot from the current one and swap it in while holding a mutex, so
//! updates are applied one at a time in delivery order.

use crate::error::{BridgeError, Result};
use crate::mcp::{ArgumentValidator, Tool};
use crate::registry::{ModuleDescriptor, ModuleFilter, ModuleRegistry, RegistryEvent};
use crate::server::factory::ToolBuilder;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One exposed module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub module_id: String,
    pub tool: Tool,
    /// Input schema kept a recursive `$ref`
    pub cyclic: bool,
    #[serde(skip)]
    pub descriptor: Arc<ModuleDescriptor>,
    /// Compiled `tool.input_schema`, shared by every call
    #[serde(skip)]
    pub validator: ArgumentValidator,
}

/// Immutable point-in-time view of every exposed tool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    entries: BTreeMap<String, SnapshotEntry>,
    #[serde(skip)]
    names: BTreeMap<String, String>,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with `entry` added or replaced; a name owned by another module is a collision
    pub fn with_entry(&self, entry: SnapshotEntry) -> Result<Self> {
        if let Some(existing) = self.names.get(&entry.tool.name) {
            if existing != &entry.module_id {
                return Err(BridgeError::NameCollision {
                    name: entry.tool.name.clone(),
                    existing: existing.clone(),
                });
            }
        }

        let mut next = self.without(&entry.module_id);
        next.names.insert(entry.tool.name.clone(), entry.module_id.clone());
        next.entries.insert(entry.module_id.clone(), entry);
        Ok(next)
    }

    /// Copy with the module removed
    pub fn without(&self, module_id: &str) -> Self {
        let mut next = self.clone();
        if let Some(removed) = next.entries.remove(module_id) {
            next.names.remove(&removed.tool.name);
        }
        next
    }

    pub fn get(&self, module_id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(module_id)
    }

    /// Look up an entry by its protocol-facing tool name
    pub fn get_by_name(&self, name: &str) -> Option<&SnapshotEntry> {
        self.names.get(name).and_then(|module_id| self.entries.get(module_id))
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.entries.contains_key(module_id)
    }

    /// Entries ordered by module id
    pub fn entries(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    /// Tools ordered by module id
    pub fn tools(&self) -> Vec<Tool> {
        self.entries.values().map(|entry| entry.tool.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keeps a [`RegistrySnapshot`] in step with a [`ModuleRegistry`]
pub struct RegistryListener {
    snapshot: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
    builder: ToolBuilder,
    filter: ModuleFilter,
    active: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RegistryListener {
    pub fn new(builder: ToolBuilder) -> Self {
        Self::with_filter(builder, ModuleFilter::default())
    }

    /// Only modules matching `filter` are exposed
    pub fn with_filter(builder: ToolBuilder, filter: ModuleFilter) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::new()),
            write_lock: Mutex::new(()),
            builder,
            filter,
            active: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Current snapshot; never blocks
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Tools in the current snapshot, ordered by module id
    pub fn tools(&self) -> Vec<Tool> {
        self.snapshot.load().tools()
    }

    pub fn builder(&self) -> &ToolBuilder {
        &self.builder
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Build and expose a module, replacing any previous version.
    ///
    /// A module that fails to build is logged and removed from the snapshot;
    /// the rest of the snapshot is untouched.
    pub fn register(&self, descriptor: Arc<ModuleDescriptor>) -> Result<()> {
        let module_id = descriptor.id.clone();
        if !self.filter.matches(&descriptor) {
            debug!(module_id = %module_id, "Module excluded by filter");
            self.unregister(&module_id);
            return Ok(());
        }

        let built = match self.builder.build(&descriptor) {
            Ok(built) => built,
            Err(e) => {
                warn!(module_id = %module_id, "Failed to build tool: {}", e);
                self.unregister(&module_id);
                return Err(e);
            }
        };

        let entry = SnapshotEntry {
            module_id: module_id.clone(),
            tool: built.tool,
            cyclic: built.cyclic,
            descriptor,
            validator: built.validator,
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match self.snapshot.load().with_entry(entry) {
            Ok(next) => next,
            Err(e) => {
                warn!(module_id = %module_id, "Tool not exposed: {}", e);
                return Err(e);
            }
        };
        self.snapshot.store(Arc::new(next));
        info!(module_id = %module_id, "Tool registered");
        Ok(())
    }

    /// Remove a module; returns whether it was exposed
    pub fn unregister(&self, module_id: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load();
        if !current.contains(module_id) {
            return false;
        }
        let next = current.without(module_id);
        self.snapshot.store(Arc::new(next));
        info!(module_id = %module_id, "Tool unregistered");
        true
    }

    /// Apply one registry event
    pub fn apply(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::Register { descriptor, .. } => {
                // Failures are already logged per module
                let _ = self.register(descriptor);
            }
            RegistryEvent::Unregister { module_id } => {
                self.unregister(&module_id);
            }
        }
    }

    /// Rebuild the snapshot wholesale from the registry's current contents.
    ///
    /// Runs entirely under the write lock so a concurrent [`register`](Self::register)
    /// lands either before the rebuild reads the registry or after it is stored.
    pub fn sync(&self, registry: &dyn ModuleRegistry) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = RegistrySnapshot::new();
        for module_id in registry.list(&self.filter) {
            let Some(descriptor) = registry.get_definition(&module_id) else {
                warn!(module_id = %module_id, "Skipped module: no definition found");
                continue;
            };
            let built = match self.builder.build(&descriptor) {
                Ok(built) => built,
                Err(e) => {
                    warn!(module_id = %module_id, "Failed to build tool: {}", e);
                    continue;
                }
            };
            let entry = SnapshotEntry {
                module_id: module_id.clone(),
                tool: built.tool,
                cyclic: built.cyclic,
                descriptor,
                validator: built.validator,
            };
            match next.with_entry(entry) {
                Ok(updated) => next = updated,
                Err(e) => warn!(module_id = %module_id, "Tool not exposed: {}", e),
            }
        }

        let count = next.len();
        self.snapshot.store(Arc::new(next));
        debug!("Snapshot rebuilt with {} tools", count);
        count
    }

    /// Subscribe to the registry and keep the snapshot current in a background task.
    ///
    /// Subscribes before the initial [`sync`](Self::sync) so no event is lost
    /// in between. Calling it again while active is a no-op.
    pub fn start(self: &Arc<Self>, registry: Arc<dyn ModuleRegistry>) -> usize {
        if self.active.swap(true, Ordering::SeqCst) {
            return self.snapshot.load().len();
        }

        let mut events = registry.subscribe();
        let count = self.sync(registry.as_ref());

        let listener = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if !listener.is_active() {
                            break;
                        }
                        listener.apply(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} registry events, resynchronizing", skipped);
                        // Restart at the tail first; anything newer than the resync is redelivered
                        events = events.resubscribe();
                        listener.sync(registry.as_ref());
                    }
                    Err(RecvError::Closed) => {
                        debug!("Registry event channel closed");
                        break;
                    }
                }
            }
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!("Registry listener started with {} tools", count);
        count
    }

    /// Stop applying events; the current snapshot stays readable
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        info!("Registry listener stopped");
    }
}

impl Drop for RegistryListener {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}
