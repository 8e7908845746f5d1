use std::sync::{PoisonError, RwLock};

use crate::errors::RegistryError;
use crate::store::{CommitReceipt, RegistryPlan, RegistrySnapshot, RegistryStore};

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<RegistrySnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot as-is, without validation. Used to load
    /// persisted or imported data, which may already violate invariants.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub(crate) fn current(&self) -> RegistrySnapshot {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn apply(&self, plan: &RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        self.apply_then(plan, |_, _| Ok(()))
    }

    /// Applies `plan` to a copy of the state and runs `before_swap` on it while
    /// holding the write lock. The copy only replaces the current state when
    /// both succeed.
    pub(crate) fn apply_then<F>(&self, plan: &RegistryPlan, before_swap: F) -> Result<CommitReceipt, RegistryError>
    where
        F: FnOnce(&RegistrySnapshot, &CommitReceipt) -> Result<(), RegistryError>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = state.clone();
        let receipt = next.apply(plan)?;
        before_swap(&next, &receipt)?;
        *state = next;
        Ok(receipt)
    }
}

impl RegistryStore for MemoryStore {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        Ok(self.current())
    }

    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        self.apply(&plan)
    }
}
