//! Non-blocking, fail-fast resource locking.
//!
//! Deliberately simpler than a textbook lock manager: no wait queue, no
//! wait-for graph, no deadlock detector thread. A conflicting acquisition
//! fails immediately with `AcquireLockFailed`, leaving retry (if any) to the
//! caller. This trades throughput for the absence of deadlock entirely.

use crate::error::{LockModeHint, NormliteError, NormliteResult};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<LockMode> for LockModeHint {
    fn from(mode: LockMode) -> Self {
        match mode {
            LockMode::Shared => Self::Shared,
            LockMode::Exclusive => Self::Exclusive,
        }
    }
}

#[derive(Debug, Clone)]
struct Holder {
    tid: String,
    mode: LockMode,
}

/// Per-resource holder lists, guarded by a single mutex — the entire lock
/// table is one critical section, matching the "single mutex, no wait
/// queue" design.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<String, Vec<Holder>>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to grant `mode` on `resource` to `tid`. Fails immediately,
    /// without blocking, if the request conflicts with an existing holder.
    pub fn acquire(&self, resource: &str, tid: &str, mode: LockMode) -> NormliteResult<()> {
        let mut table = self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let holders = table.entry(resource.to_string()).or_default();

        if holders.iter().any(|h| h.tid == tid && h.mode == mode) {
            return Ok(());
        }

        let others: Vec<&Holder> = holders.iter().filter(|h| h.tid != tid).collect();

        let conflict = match mode {
            LockMode::Shared => others.iter().any(|h| h.mode == LockMode::Exclusive),
            LockMode::Exclusive => !others.is_empty(),
        };

        if conflict {
            let conflicting_holders = others.iter().map(|h| h.tid.clone()).collect();
            warn!(resource, tid, ?mode, "lock conflict");
            return Err(NormliteError::AcquireLockFailed {
                resource: resource.to_string(),
                mode: mode.into(),
                conflicting_holders,
            });
        }

        if mode == LockMode::Exclusive {
            holders.retain(|h| h.tid != tid);
        }
        holders.push(Holder { tid: tid.to_string(), mode });
        info!(resource, tid, ?mode, "lock acquired");
        Ok(())
    }

    /// Releases every lock held by `tid`, across all resources, in one pass.
    pub fn release(&self, tid: &str) {
        let mut table = self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for holders in table.values_mut() {
            holders.retain(|h| h.tid != tid);
        }
        info!(tid, "locks released");
    }

    #[cfg(test)]
    fn holder_count(&self, resource: &str) -> usize {
        let table = self.table.lock().unwrap();
        table.get(resource).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_coexist() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Shared).unwrap();
        manager.acquire("students", "t2", LockMode::Shared).unwrap();
        assert_eq!(manager.holder_count("students"), 2);
    }

    #[test]
    fn exclusive_excludes_everyone_else() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Exclusive).unwrap();
        let err = manager.acquire("students", "t2", LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, NormliteError::AcquireLockFailed { .. }));
        let err = manager.acquire("students", "t2", LockMode::Shared).unwrap_err();
        assert!(matches!(err, NormliteError::AcquireLockFailed { .. }));
    }

    #[test]
    fn sole_shared_holder_upgrades_to_exclusive() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Shared).unwrap();
        manager.acquire("students", "t1", LockMode::Exclusive).unwrap();
        assert_eq!(manager.holder_count("students"), 1);
    }

    #[test]
    fn upgrade_fails_when_not_sole_holder() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Shared).unwrap();
        manager.acquire("students", "t2", LockMode::Shared).unwrap();
        let err = manager.acquire("students", "t1", LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, NormliteError::AcquireLockFailed { .. }));
    }

    #[test]
    fn reacquiring_same_tid_and_mode_is_idempotent() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Shared).unwrap();
        manager.acquire("students", "t1", LockMode::Shared).unwrap();
        assert_eq!(manager.holder_count("students"), 1);
    }

    #[test]
    fn release_clears_every_resource_held_by_a_transaction() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Exclusive).unwrap();
        manager.acquire("grades", "t1", LockMode::Shared).unwrap();
        manager.release("t1");
        assert_eq!(manager.holder_count("students"), 0);
        assert_eq!(manager.holder_count("grades"), 0);
        manager.acquire("students", "t2", LockMode::Exclusive).unwrap();
    }

    #[test]
    fn conflict_reports_the_conflicting_holder() {
        let manager = LockManager::new();
        manager.acquire("students", "t1", LockMode::Exclusive).unwrap();
        let err = manager.acquire("students", "t2", LockMode::Shared).unwrap_err();
        match err {
            NormliteError::AcquireLockFailed { conflicting_holders, .. } => {
                assert_eq!(conflicting_holders, vec!["t1".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
