use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::model::Dataset;

/// Single owner of the in-memory dataset.
///
/// Domain logic mutates through [`SharedDataset::update`]; remote pulls land
/// through [`SharedDataset::replace`]. Both take the write lock, so readers
/// always see either the old or the new dataset, never a mix. Every change
/// bumps a revision that UI layers can watch to know when to refresh.
#[derive(Clone)]
pub struct SharedDataset {
    data: Arc<RwLock<Dataset>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedDataset {
    fn default() -> Self {
        Self::new(Dataset::default())
    }
}

impl SharedDataset {
    pub fn new(initial: Dataset) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            data: Arc::new(RwLock::new(initial)),
            revision: Arc::new(tx),
        }
    }

    /// Consistent copy for pushing or rendering.
    pub async fn snapshot(&self) -> Dataset {
        self.data.read().await.clone()
    }

    /// Swap the whole dataset in one step.
    pub async fn replace(&self, next: Dataset) {
        {
            let mut guard = self.data.write().await;
            *guard = next;
        }
        self.bump();
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut Dataset) -> R) -> R {
        let out = {
            let mut guard = self.data.write().await;
            f(&mut guard)
        };
        self.bump();
        out
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replace_is_seen_whole() {
        let shared = SharedDataset::default();
        let mut rx = shared.subscribe();

        let mut next = Dataset::default();
        next.inventory.insert("yeso".into(), json!(3));
        next.counters.entradas = 1;
        shared.replace(next.clone()).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(shared.snapshot().await, next);
    }

    #[tokio::test]
    async fn update_returns_closure_value() {
        let shared = SharedDataset::default();
        let len = shared
            .update(|d| {
                d.inventory.insert("cal".into(), json!(1));
                d.inventory.len()
            })
            .await;
        assert_eq!(len, 1);
        assert_eq!(shared.revision(), 1);
    }
}
