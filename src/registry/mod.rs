//! Bounded registry of live rendering-context owners.
//!
//! At most `max_contexts` owners are alive after any `register`. When a new
//! owner arrives at capacity, the owner with the lowest priority is evicted
//! (oldest first on ties) and its cleanup runs before the newcomer is stored.

mod cleanup;

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::context::AdmissionConfig;
use crate::errors::{AdmissionError, Result};

pub use cleanup::{Cleanup, CleanupResult};

/// One live context consumer.
pub struct ContextOwner {
    id: String,
    priority: i32,
    created_at: u64,
    seq: u64,
    cleanup: Cleanup,
}

impl ContextOwner {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    // Lowest key is evicted first.
    fn eviction_key(&self) -> (i32, u64, u64) {
        (self.priority, self.created_at, self.seq)
    }
}

impl fmt::Debug for ContextOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOwner")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("created_at", &self.created_at)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Read-only view of an owner, in admission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSnapshot {
    pub id: String,
    pub priority: i32,
    pub created_at: u64,
}

/// What `register` had to do to admit a new owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Admission {
    /// Owner evicted to make room, if the registry was full.
    pub evicted: Option<String>,
    /// True when an owner with the same id was released and replaced.
    pub replaced: bool,
}

/// Admission controller for scarce rendering contexts.
///
/// Single-threaded: owners usually capture `Rc` state, so the registry is not `Send`.
/// Dropping the registry drains it.
pub struct ContextRegistry<C: Clock = MonotonicClock> {
    owners: HashMap<String, ContextOwner>,
    config: AdmissionConfig,
    clock: C,
    next_seq: u64,
}

impl ContextRegistry<MonotonicClock> {
    pub fn new(config: AdmissionConfig) -> Result<Self> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> ContextRegistry<C> {
    pub fn with_clock(config: AdmissionConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            owners: HashMap::with_capacity(config.max_contexts),
            config,
            clock,
            next_seq: 0,
        })
    }

    /// Admit `id`, evicting at most one existing owner to stay within capacity.
    ///
    /// A duplicate id releases the previous owner and takes its place. If the
    /// released owner's cleanup fails, the new owner is not admitted and its
    /// own cleanup runs before the failure is returned.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        cleanup: impl Into<Cleanup>,
        priority: i32,
    ) -> Result<Admission> {
        let id = id.into();
        let cleanup = cleanup.into();
        let mut admission = Admission::default();

        let made_room = if self.owners.contains_key(&id) {
            warn!(id = %id, "context owner already registered, replacing it");
            admission.replaced = true;
            self.release(&id).map(|_| ())
        } else if self.owners.len() >= self.config.max_contexts {
            self.evict_one().map(|evicted| admission.evicted = evicted)
        } else {
            Ok(())
        };

        if let Err(err) = made_room {
            warn!(id = %id, error = %err, "context refused, releasing newcomer");
            if let Err(reason) = cleanup.run() {
                warn!(id = %id, reason = %reason, "newcomer cleanup failed too");
            }
            return Err(err);
        }

        let owner = ContextOwner {
            id: id.clone(),
            priority,
            created_at: self.clock.now(),
            seq: self.next_seq,
            cleanup,
        };
        self.next_seq += 1;
        self.owners.insert(id.clone(), owner);

        debug!(id = %id, priority, live = self.owners.len(), "context admitted");
        Ok(admission)
    }

    /// Release `id` if present. Returns whether anything was released.
    ///
    /// The owner leaves the map first, then its cleanup runs, so a failing
    /// cleanup never leaves a stale entry behind.
    pub fn unregister(&mut self, id: &str) -> Result<bool> {
        self.release(id)
    }

    /// Change an owner's priority in place. Returns whether `id` was present.
    pub fn update_priority(&mut self, id: &str, priority: i32) -> bool {
        match self.owners.get_mut(id) {
            Some(owner) => {
                owner.priority = priority;
                true
            }
            None => false,
        }
    }

    /// Run every cleanup and empty the registry.
    ///
    /// All cleanups run even when some fail; the first failure is returned.
    pub fn cleanup_all(&mut self) -> Result<usize> {
        let drained = std::mem::take(&mut self.owners);
        let count = drained.len();
        let mut first_failure = None;

        for (id, owner) in drained {
            if let Err(reason) = owner.cleanup.run() {
                warn!(id = %id, reason = %reason, "cleanup failed during drain");
                if first_failure.is_none() {
                    first_failure = Some(AdmissionError::CleanupFailed { id, reason });
                }
            }
        }

        info!(count, "context registry drained");
        match first_failure {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_contexts
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn contains(&self, id: &str) -> bool {
        self.owners.contains_key(id)
    }

    pub fn priority(&self, id: &str) -> Option<i32> {
        self.owners.get(id).map(ContextOwner::priority)
    }

    pub fn get(&self, id: &str) -> Option<&ContextOwner> {
        self.owners.get(id)
    }

    /// True once few enough slots remain that callers should hold off on new viewers.
    pub fn is_near_limit(&self) -> bool {
        self.owners.len() >= self.config.near_limit_threshold()
    }

    pub fn snapshot(&self) -> Vec<OwnerSnapshot> {
        self.owners
            .values()
            .sorted_by_key(|o| (o.created_at, o.seq))
            .map(|o| OwnerSnapshot {
                id: o.id.clone(),
                priority: o.priority,
                created_at: o.created_at,
            })
            .collect()
    }

    fn evict_one(&mut self) -> Result<Option<String>> {
        let victim = match self.owners.values().min_by_key(|o| o.eviction_key()) {
            Some(owner) => owner.id.clone(),
            None => return Ok(None),
        };
        info!(
            id = %victim,
            priority = self.owners[&victim].priority,
            "evicting context owner at capacity"
        );
        self.release(&victim)?;
        Ok(Some(victim))
    }

    // Shared by unregister, eviction, and duplicate replacement. The owner is
    // out of the map before its cleanup runs.
    fn release(&mut self, id: &str) -> Result<bool> {
        let Some(owner) = self.owners.remove(id) else {
            return Ok(false);
        };
        debug!(id = %id, live = self.owners.len(), "context released");
        owner
            .cleanup
            .run()
            .map_err(|reason| AdmissionError::CleanupFailed { id: id.to_string(), reason })?;
        Ok(true)
    }
}

impl<C: Clock> Drop for ContextRegistry<C> {
    fn drop(&mut self) {
        if self.owners.is_empty() {
            return;
        }
        if let Err(e) = self.cleanup_all() {
            warn!(error = %e, "context registry dropped with a failing cleanup");
        }
    }
}

impl<C: Clock> fmt::Debug for ContextRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("config", &self.config)
            .field("live", &self.owners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn logging(log: &Log, id: &str) -> Cleanup {
        let log = log.clone();
        let id = id.to_string();
        Cleanup::new(move || log.borrow_mut().push(id))
    }

    fn registry(cap: usize) -> (ContextRegistry<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let reg = ContextRegistry::with_clock(AdmissionConfig::with_capacity(cap), clock.clone()).unwrap();
        (reg, clock)
    }

    #[test]
    fn evicts_lowest_priority_at_capacity() {
        let log = Log::default();
        let (mut reg, clock) = registry(3);
        for (id, pri) in [("A", 5), ("B", 1), ("C", 3)] {
            reg.register(id, logging(&log, id), pri).unwrap();
            clock.advance(1);
        }

        let admission = reg.register("D", logging(&log, "D"), 0).unwrap();

        assert_eq!(admission.evicted.as_deref(), Some("B"));
        assert_eq!(*log.borrow(), vec!["B".to_string()]);
        assert_eq!(reg.len(), 3);
        assert!(!reg.contains("B"));
    }

    #[test]
    fn same_timestamp_falls_back_to_admission_order() {
        let log = Log::default();
        let (mut reg, _clock) = registry(2);
        reg.register("first", logging(&log, "first"), 1).unwrap();
        reg.register("second", logging(&log, "second"), 1).unwrap();

        let admission = reg.register("third", logging(&log, "third"), 1).unwrap();

        assert_eq!(admission.evicted.as_deref(), Some("first"));
    }

    #[test]
    fn updated_priority_changes_the_victim() {
        let (mut reg, clock) = registry(2);
        reg.register("a", Cleanup::noop(), 0).unwrap();
        clock.advance(1);
        reg.register("b", Cleanup::noop(), 0).unwrap();

        assert!(reg.update_priority("a", 10));
        assert!(!reg.update_priority("missing", 10));
        assert_eq!(reg.get("a").map(ContextOwner::created_at), Some(0));

        let admission = reg.register("c", Cleanup::noop(), 0).unwrap();
        assert_eq!(admission.evicted.as_deref(), Some("b"));
    }

    #[test]
    fn failing_eviction_cleanup_blocks_the_newcomer() {
        let (mut reg, _clock) = registry(1);
        reg.register("old", Cleanup::fallible(|| Err("context lost".into())), 0)
            .unwrap();

        let err = reg.register("new", Cleanup::noop(), 0).unwrap_err();

        assert!(matches!(err, AdmissionError::CleanupFailed { ref id, .. } if id == "old"));
        assert!(reg.is_empty());
    }

    #[test]
    fn refused_newcomer_is_released() {
        let log = Log::default();
        let (mut reg, _clock) = registry(1);
        reg.register("old", Cleanup::fallible(|| Err("context lost".into())), 0)
            .unwrap();

        assert!(reg.register("new", logging(&log, "new"), 0).is_err());

        assert_eq!(*log.borrow(), vec!["new".to_string()]);
        assert!(reg.is_empty());
    }

    #[test]
    fn near_limit_uses_margin() {
        let (mut reg, _clock) = registry(4);
        reg.register("a", Cleanup::noop(), 0).unwrap();
        assert!(!reg.is_near_limit());
        reg.register("b", Cleanup::noop(), 0).unwrap();
        assert!(reg.is_near_limit());
    }

    #[test]
    fn snapshot_is_in_admission_order() {
        let (mut reg, clock) = registry(4);
        for id in ["x", "y", "z"] {
            reg.register(id, Cleanup::noop(), 0).unwrap();
            clock.advance(10);
        }
        let ids: Vec<_> = reg.snapshot().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn drop_drains_owners() {
        let log = Log::default();
        {
            let (mut reg, _clock) = registry(3);
            reg.register("a", logging(&log, "a"), 0).unwrap();
            reg.register("b", logging(&log, "b"), 0).unwrap();
        }
        let mut released = log.borrow().clone();
        released.sort();
        assert_eq!(released, vec!["a".to_string(), "b".to_string()]);
    }
}
