use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per-account async locks.
///
/// Operations lock every account they touch before opening a database
/// transaction. Guards are always taken in ascending id order so two transfers
/// over the same pair can never deadlock.
///
/// These locks only order work per account. The service pool holds a single
/// SQLite connection, so transactions over disjoint accounts skip each other's
/// locks but still run one at a time on that connection.
///
/// A slot lives only while some guard or waiter holds it. The last guard to
/// release an id removes its slot, so ids that were never found leave nothing
/// behind.
#[derive(Default)]
pub struct AccountLocks {
    slots: Slots,
}

/// Held locks; released on drop.
pub struct AccountGuards {
    ids: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
    slots: Slots,
}

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, account_ids: &[&str]) -> AccountGuards {
        let mut ids: Vec<String> = account_ids.iter().map(|id| (*id).to_string()).collect();
        ids.sort_unstable();
        ids.dedup();

        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut slots = lock_slots(&self.slots);
            ids.iter()
                .map(|id| Arc::clone(slots.entry(id.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        AccountGuards {
            ids,
            guards,
            slots: Arc::clone(&self.slots),
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

impl Drop for AccountGuards {
    fn drop(&mut self) {
        self.guards.clear();
        // Handles are only cloned under this mutex, so a count of one means
        // the map holds the last reference.
        let mut slots = lock_slots(&self.slots);
        for id in &self.ids {
            if slots.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(id);
            }
        }
    }
}
