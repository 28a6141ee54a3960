//! Keyed registry of loaded model services.
//!
//! The single correctness property here: an expensive load happens at most
//! once per key, no matter how many callers race for it. Each key owns a
//! `OnceCell` slot; the first caller runs the load while the rest block on
//! the cell and wake with the same instance. A failed load leaves the cell
//! empty, so the key reads as absent again and a later attempt may retry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::core::model::factory;
use crate::error::ModelError;
use crate::service::ModelService;

type Loader = dyn Fn(&str) -> Result<ModelService, ModelError> + Send + Sync;

struct Slot {
    cell: Arc<OnceCell<Arc<ModelService>>>,
    last_used: u64,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Slot>,
    /// Insertion order of keys, for stable `list_keys` output.
    order: Vec<String>,
    tick: u64,
}

impl Registry {
    fn touch(&mut self, name: &str) -> Option<Arc<OnceCell<Arc<ModelService>>>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(name).map(|slot| {
            slot.last_used = tick;
            Arc::clone(&slot.cell)
        })
    }

    fn insert(&mut self, name: &str) -> Arc<OnceCell<Arc<ModelService>>> {
        self.tick += 1;
        let cell = Arc::new(OnceCell::new());
        self.entries.insert(
            name.to_string(),
            Slot {
                cell: Arc::clone(&cell),
                last_used: self.tick,
            },
        );
        self.order.push(name.to_string());
        cell
    }

    fn remove(&mut self, name: &str) {
        self.entries.remove(name);
        self.order.retain(|n| n != name);
    }

    fn ready_count(&self) -> usize {
        self.entries.values().filter(|s| s.cell.get().is_some()).count()
    }

    /// Least-recently-used key among ready entries. In-flight loads are
    /// never eviction candidates.
    fn lru_ready(&self) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, s)| s.cell.get().is_some())
            .min_by_key(|(_, s)| s.last_used)
            .map(|(name, _)| name.clone())
    }
}

pub struct ModelManager {
    registry: Mutex<Registry>,
    max_loaded: usize,
    loader: Box<Loader>,
}

impl ModelManager {
    /// Manager backed by the on-disk model catalog.
    pub fn new(models_dir: &Path, max_loaded: usize) -> Self {
        let models_dir = models_dir.to_path_buf();
        Self::with_loader(max_loaded, move |name| {
            factory::load_service(&models_dir, name)
        })
    }

    /// Manager with an injected constructor; tests substitute counting or
    /// failing loaders here.
    pub fn with_loader<F>(max_loaded: usize, loader: F) -> Self
    where
        F: Fn(&str) -> Result<ModelService, ModelError> + Send + Sync + 'static,
    {
        Self {
            registry: Mutex::new(Registry::default()),
            max_loaded: max_loaded.max(1),
            loader: Box::new(loader),
        }
    }

    /// Cached service for `name`, loading it on first use.
    ///
    /// Concurrent callers for the same uncached key block until the one
    /// in-flight load resolves, then all hold the same instance.
    pub fn get_service(&self, name: &str) -> Result<Arc<ModelService>, ModelError> {
        let cell = {
            let mut registry = self.registry.lock();
            match registry.touch(name) {
                Some(cell) => cell,
                None => {
                    while registry.ready_count() >= self.max_loaded {
                        match registry.lru_ready() {
                            Some(victim) => {
                                tracing::info!(model = %victim, "evicting least-recently-used model");
                                registry.remove(&victim);
                            }
                            None => break,
                        }
                    }
                    registry.insert(name)
                }
            }
        };
        // The load runs outside the registry lock: loads for different keys
        // proceed in parallel, and waiters block on the cell, not the map.
        let result = cell.get_or_try_init(|| {
            tracing::info!(model = %name, "loading model");
            (self.loader)(name).map(Arc::new)
        });
        match result {
            Ok(service) => Ok(Arc::clone(service)),
            Err(e) => {
                let mut registry = self.registry.lock();
                if let Some(slot) = registry.entries.get(name) {
                    if slot.cell.get().is_none() && Arc::ptr_eq(&slot.cell, &cell) {
                        registry.remove(name);
                    }
                }
                Err(e)
            }
        }
    }

    /// Names of models currently loaded, in insertion order.
    pub fn list_keys(&self) -> Vec<String> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter(|name| {
                registry
                    .entries
                    .get(*name)
                    .is_some_and(|s| s.cell.get().is_some())
            })
            .cloned()
            .collect()
    }

    /// `get_service` + the service's marker-free tokenize path. Errors
    /// propagate unchanged.
    pub fn tokenize_only(&self, text: &str, name: &str) -> Result<Vec<String>, ModelError> {
        self.get_service(name)?.tokenize(text)
    }
}
