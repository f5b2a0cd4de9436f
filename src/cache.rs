use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

type Slot<M> = Arc<Mutex<Option<Arc<M>>>>;

/// Lazily loaded models keyed by vehicle index.
///
/// Entries are never evicted or reloaded. Concurrent first access to the
/// same index runs the loader once; other callers wait on that index's slot
/// and get the same instance. Distinct indices load in parallel.
pub struct ModelCache<M> {
    slots: Mutex<HashMap<usize, Slot<M>>>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the model for `index`, calling `loader` if none is stored yet.
    /// A failed load stores nothing; the next caller tries again.
    pub fn get_or_load<F, E>(&self, index: usize, loader: F) -> Result<Arc<M>, E>
    where
        F: FnOnce() -> Result<M, E>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(index).or_default().clone()
        };

        let mut entry = slot.lock();
        if let Some(model) = entry.as_ref() {
            return Ok(model.clone());
        }

        let model = Arc::new(loader()?);
        *entry = Some(model.clone());
        tracing::info!("loaded model for vehicle {}", index);
        Ok(model)
    }

    pub fn get(&self, index: usize) -> Option<Arc<M>> {
        let slot = self.slots.lock().get(&index).cloned()?;
        let entry = slot.lock();
        entry.clone()
    }

    /// Number of indices with a loaded model.
    /// Number of indices with a loaded model. Waits on in-flight loads
    /// without holding the index map.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<M>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
