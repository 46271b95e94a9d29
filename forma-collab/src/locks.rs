//! Per-mesh exclusive edit locks.
//!
//! The table is the source of truth; the `lockedBy`/`lockedByName` fields
//! on meshes are a projection written by the state manager whenever the
//! table changes. Acquisition never blocks or queues: it either succeeds
//! or no-ops against a conflicting holder.

use std::collections::HashMap;

use uuid::Uuid;

use forma_scene::MeshId;

/// Result of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Acquired,
    /// The caller already held it; nothing changed.
    AlreadyHeld,
    /// Someone else holds it; nothing changed.
    Conflict(Uuid),
}

/// meshId → holding session.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<MeshId, Uuid>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a mesh's lock, if any.
    pub fn holder(&self, mesh_id: MeshId) -> Option<Uuid> {
        self.locks.get(&mesh_id).copied()
    }

    /// Try to take the lock. Conflicts are reported, never overwritten.
    pub fn acquire(&mut self, mesh_id: MeshId, client_id: Uuid) -> AcquireOutcome {
        match self.locks.get(&mesh_id) {
            Some(holder) if *holder == client_id => AcquireOutcome::AlreadyHeld,
            Some(holder) => AcquireOutcome::Conflict(*holder),
            None => {
                self.locks.insert(mesh_id, client_id);
                AcquireOutcome::Acquired
            }
        }
    }

    /// Release if (and only if) `client_id` is the holder.
    ///
    /// Returns whether anything was released; a stale release from a
    /// non-holder leaves the table untouched.
    pub fn release(&mut self, mesh_id: MeshId, client_id: Uuid) -> bool {
        match self.locks.get(&mesh_id) {
            Some(holder) if *holder == client_id => {
                self.locks.remove(&mesh_id);
                true
            }
            _ => false,
        }
    }

    /// Release every lock a session holds; returns the affected mesh ids.
    pub fn release_all(&mut self, client_id: Uuid) -> Vec<MeshId> {
        let released: Vec<MeshId> = self
            .locks
            .iter()
            .filter(|(_, holder)| **holder == client_id)
            .map(|(mesh_id, _)| *mesh_id)
            .collect();
        for mesh_id in &released {
            self.locks.remove(mesh_id);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutual_exclusion() {
        let mut table = LockTable::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert_eq!(table.acquire(5, alice), AcquireOutcome::Acquired);
        assert_eq!(table.acquire(5, bob), AcquireOutcome::Conflict(alice));
        // Holder unchanged after the conflicting attempt.
        assert_eq!(table.holder(5), Some(alice));
    }

    #[test]
    fn test_reacquire_is_already_held() {
        let mut table = LockTable::new();
        let alice = Uuid::new_v4();

        table.acquire(5, alice);
        assert_eq!(table.acquire(5, alice), AcquireOutcome::AlreadyHeld);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_release_by_non_holder_is_noop() {
        let mut table = LockTable::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        table.acquire(5, alice);
        assert!(!table.release(5, bob));
        assert_eq!(table.holder(5), Some(alice));

        assert!(table.release(5, alice));
        assert_eq!(table.holder(5), None);
        assert!(!table.release(5, alice)); // already gone
    }

    #[test]
    fn test_release_all_only_touches_owner() {
        let mut table = LockTable::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        table.acquire(1, alice);
        table.acquire(2, alice);
        table.acquire(3, bob);

        let mut released = table.release_all(alice);
        released.sort_unstable();
        assert_eq!(released, vec![1, 2]);

        // No entry references alice anymore.
        assert_eq!(table.holder(1), None);
        assert_eq!(table.holder(2), None);
        assert_eq!(table.holder(3), Some(bob));
    }

    #[test]
    fn test_release_all_with_no_locks() {
        let mut table = LockTable::new();
        assert!(table.release_all(Uuid::new_v4()).is_empty());
        assert!(table.is_empty());
    }
}
