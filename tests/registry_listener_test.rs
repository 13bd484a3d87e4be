//! Integration tests for the registry listener and its live snapshot

use async_trait::async_trait;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use toolbridge::registry::{InMemoryRegistry, ModuleDescriptor, ModuleFilter, ModuleRegistry, RegistryEvent};
use toolbridge::server::{RegistryListener, ToolBuilder, ToolNaming};

fn descriptor(id: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(
        id,
        format!("Module {}", id),
        json!({"type": "object", "properties": {"n": {"type": "integer"}}}),
    )
}

/// Delegates to an [`InMemoryRegistry`] and counts rescans
struct CountingRegistry {
    inner: InMemoryRegistry,
    discovers: AtomicUsize,
}

impl CountingRegistry {
    fn new(inner: InMemoryRegistry) -> Self {
        Self {
            inner,
            discovers: AtomicUsize::new(0),
        }
    }

    fn discovers(&self) -> usize {
        self.discovers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleRegistry for CountingRegistry {
    async fn discover(&self) -> toolbridge::Result<usize> {
        self.discovers.fetch_add(1, Ordering::SeqCst);
        self.inner.discover().await
    }

    fn list(&self, filter: &ModuleFilter) -> Vec<String> {
        self.inner.list(filter)
    }

    fn get_definition(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.inner.get_definition(module_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.subscribe()
    }
}

fn module_file(count: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "modules:").unwrap();
    for i in 0..count {
        writeln!(file, "  - id: file.m{}\n    description: File module {}", i, i).unwrap();
    }
    file
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[cfg(test)]
mod registry_listener_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_picks_up_existing_and_new_modules() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.register(descriptor("image.resize")).unwrap();

        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));
        let count = listener.start(registry.clone());
        assert_eq!(count, 1);

        registry.register(descriptor("text.upper")).unwrap();
        wait_for(|| listener.snapshot().len() == 2).await;

        registry.unregister("image.resize");
        wait_for(|| !listener.snapshot().contains("image.resize")).await;

        let names: Vec<String> = listener.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["text.upper"]);
        listener.stop();
    }

    #[tokio::test]
    async fn test_filter_applies_to_events() {
        let registry = Arc::new(InMemoryRegistry::new());
        let filter = ModuleFilter::new().with_prefix("image.");
        let listener = Arc::new(RegistryListener::with_filter(ToolBuilder::default(), filter));
        listener.start(registry.clone());

        registry.register(descriptor("text.upper")).unwrap();
        registry.register(descriptor("image.crop")).unwrap();
        wait_for(|| listener.snapshot().contains("image.crop")).await;

        assert!(!listener.snapshot().contains("text.upper"));
        listener.stop();
    }

    #[tokio::test]
    async fn test_normalized_naming() {
        let listener = RegistryListener::new(ToolBuilder::new(ToolNaming::Normalized));
        listener.register(Arc::new(descriptor("image.resize"))).unwrap();

        let snapshot = listener.snapshot();
        let entry = snapshot.get_by_name("image-resize").unwrap();
        assert_eq!(entry.module_id, "image.resize");
    }

    #[tokio::test]
    async fn test_lagged_listener_resynchronizes() {
        let registry = Arc::new(InMemoryRegistry::with_capacity(1));
        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));
        listener.start(registry.clone());

        for i in 0..64 {
            registry.register(descriptor(&format!("bulk.m{}", i))).unwrap();
        }

        wait_for(|| listener.snapshot().len() == 64).await;
        assert_eq!(listener.snapshot().len(), registry.list(&ModuleFilter::default()).len());
        listener.stop();
    }

    #[tokio::test]
    async fn test_lag_recovery_returns_to_event_handling() {
        let file = module_file(8);
        let registry = Arc::new(CountingRegistry::new(
            InMemoryRegistry::with_capacity(4).with_source(file.path()),
        ));
        registry.discover().await.unwrap();

        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));
        assert_eq!(listener.start(registry.clone()), 8);

        for i in 0..10 {
            registry.inner.register(descriptor(&format!("bulk.m{}", i))).unwrap();
        }
        wait_for(|| listener.snapshot().len() == 18).await;

        // Recovery rebuilds from the registry's contents without rescanning sources
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.discovers(), 1);

        registry.inner.register(descriptor("late.arrival")).unwrap();
        wait_for(|| listener.snapshot().contains("late.arrival")).await;
        registry.inner.unregister("file.m0");
        wait_for(|| !listener.snapshot().contains("file.m0")).await;

        assert_eq!(registry.discovers(), 1);
        assert_eq!(listener.snapshot().len(), registry.list(&ModuleFilter::default()).len());
        listener.stop();
    }

    #[test]
    fn test_sync_does_not_lose_concurrent_registrations() {
        let registry = Arc::new(InMemoryRegistry::new());
        for i in 0..20 {
            registry.register(descriptor(&format!("base.m{}", i))).unwrap();
        }
        registry.register(descriptor("hot.module")).unwrap();
        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));
        listener.sync(registry.as_ref());

        let syncer = {
            let (listener, registry) = (listener.clone(), registry.clone());
            std::thread::spawn(move || {
                for _ in 0..200 {
                    listener.sync(registry.as_ref());
                }
            })
        };
        for revision in 0..200 {
            let updated = descriptor("hot.module").with_documentation(format!("revision {}", revision));
            registry.register(updated.clone()).unwrap();
            listener.register(Arc::new(updated)).unwrap();
        }
        syncer.join().unwrap();

        let snapshot = listener.snapshot();
        let exposed = snapshot.get("hot.module").unwrap();
        assert_eq!(exposed.descriptor.documentation.as_deref(), Some("revision 199"));
        assert_eq!(snapshot.len(), 21);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_always_see_consistent_snapshots() {
        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));

        let writer = {
            let listener = listener.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    listener.register(Arc::new(descriptor(&format!("load.m{}", i)))).unwrap();
                    if i % 3 == 0 {
                        listener.unregister(&format!("load.m{}", i));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let listener = listener.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let snapshot = listener.snapshot();
                        for entry in snapshot.entries() {
                            let by_name = snapshot.get_by_name(&entry.tool.name).unwrap();
                            assert_eq!(by_name.module_id, entry.module_id);
                        }
                        assert_eq!(snapshot.tools().len(), snapshot.len());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }

        // 34 of the 100 ids are multiples of three
        assert_eq!(listener.snapshot().len(), 66);
    }

    #[tokio::test]
    async fn test_register_then_unregister_restores_snapshot() {
        let listener = RegistryListener::new(ToolBuilder::default());
        listener.register(Arc::new(descriptor("a.one"))).unwrap();
        let before = listener.snapshot();

        listener.register(Arc::new(descriptor("b.two"))).unwrap();
        assert!(listener.unregister("b.two"));

        let after = listener.snapshot();
        assert_eq!(*before, *after);
        assert_eq!(
            serde_json::to_vec(&*before).unwrap(),
            serde_json::to_vec(&*after).unwrap()
        );
    }
}
