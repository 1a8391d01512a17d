use crate::types::EntityId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

/// In-memory mirror of per-entity subscription state. One boolean cell per
/// entity id, written from exactly one place (the toggle coordinator) and
/// watched from many. Values are never persisted; during an in-flight toggle
/// the cell may be ahead of the remote truth.
#[derive(Debug, Default)]
pub struct SubscriptionCache {
    cells: Mutex<HashMap<EntityId, watch::Sender<bool>>>,
}

impl SubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for the entity; unknown entities read unsubscribed.
    pub fn get(&self, entity: &EntityId) -> bool {
        let cells = self.cells.lock().unwrap();
        cells.get(entity).map(|tx| *tx.borrow()).unwrap_or(false)
    }

    /// Watch the entity's cell. The receiver sees the value current at call
    /// time and every change after it.
    pub fn watch(&self, entity: &EntityId) -> watch::Receiver<bool> {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(entity.clone())
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    /// Overwrite the entity's cell, e.g. when reconciling from a refetch.
    pub fn set(&self, entity: &EntityId, value: bool) {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(entity.clone())
            .or_insert_with(|| watch::channel(false).0)
            .send_replace(value);
    }

    /// Invert the entity's cell and return the new value.
    pub fn flip(&self, entity: &EntityId) -> bool {
        let mut cells = self.cells.lock().unwrap();
        let tx = cells
            .entry(entity.clone())
            .or_insert_with(|| watch::channel(false).0);
        let next = !*tx.borrow();
        tx.send_replace(next);
        next
    }
}
