//! Per-document mutual exclusion.
//!
//! Every read-modify-write against the store for one document id runs under
//! that id's lock, so overlapping reconciliations of the same document are
//! strictly ordered. Distinct ids never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async lock over document ids.
///
/// Slots are created on first use and dropped once nobody holds or awaits them.
#[derive(Debug, Default)]
pub struct DocumentSequencer {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `document_id`.
    pub async fn acquire(&self, document_id: &str) -> DocumentPermit<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = slot.clone().lock_owned().await;

        DocumentPermit {
            sequencer: self,
            document_id: document_id.to_string(),
            slot,
            guard: Some(guard),
        }
    }

    /// Number of ids with a live slot.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one document id; released on drop.
#[derive(Debug)]
pub struct DocumentPermit<'a> {
    sequencer: &'a DocumentSequencer,
    document_id: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DocumentPermit<'_> {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

impl Drop for DocumentPermit<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self
            .sequencer
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // The map and this permit are the only owners: nobody is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_id_is_serialized() {
        let sequencer = DocumentSequencer::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        let (sequencer, inside, max_inside) = (&sequencer, &inside, &max_inside);
        let task = || async move {
            let _permit = sequencer.acquire("app1").await;
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            max_inside.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
        };

        tokio::join!(task(), task(), task());
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_ids_do_not_contend() {
        let sequencer = DocumentSequencer::new();
        let a = sequencer.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), sequencer.acquire("b"))
            .await
            .expect("distinct id must not block");
        assert_eq!(a.document_id(), "a");
        assert_eq!(b.document_id(), "b");
        assert_eq!(sequencer.active(), 2);
    }

    #[tokio::test]
    async fn slots_are_released() {
        let sequencer = DocumentSequencer::new();
        {
            let _permit = sequencer.acquire("app1").await;
            assert_eq!(sequencer.active(), 1);
        }
        assert_eq!(sequencer.active(), 0);
    }

    #[tokio::test]
    async fn slot_survives_while_waiters_remain() {
        let sequencer = DocumentSequencer::new();
        let first = sequencer.acquire("app1").await;

        let waiter = async {
            let _second = sequencer.acquire("app1").await;
            sequencer.active()
        };
        let release = async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(first);
        };

        let (active_during_second, ()) = tokio::join!(waiter, release);
        assert_eq!(active_during_second, 1);
        assert_eq!(sequencer.active(), 0);
    }
}
