// ── Reactive entity collection ──
//
// Concurrent map keyed by object id, with a sorted snapshot republished
// on every mutation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// Storage for one entity kind.
///
/// Reads go straight to the `DashMap`; subscribers see whole snapshots,
/// ordered by key so that consumers get a stable listing.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Swap the whole collection for `entries` in one publish.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            self.by_key.insert(key, Arc::new(entity));
        }
        self.publish();
    }

    /// Mutate one entity in place (copy-on-write if a reader still holds
    /// the old `Arc`). Returns the updated entity and the closure's result.
    pub(crate) fn modify<R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<(Arc<T>, R)> {
        let (updated, result) = {
            let mut slot = self.by_key.get_mut(key)?;
            let result = f(Arc::make_mut(slot.value_mut()));
            (Arc::clone(slot.value()), result)
        };
        self.publish();
        Some((updated, result))
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();

        // `send_modify` updates even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
