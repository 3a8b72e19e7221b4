//! Process-wide program registry.
//!
//! The [`ProgramRegistry`] is the durable source of truth for instance identity: a
//! growable, concurrently readable collection of [`ContextChain`]s indexed by
//! [`ProgramId`]. The host may deallocate and reallocate a program's per-call memory at
//! will; the chain registered here outlives every such block and is how an instance is
//! recognized again.
//!
//! # Storage Strategy
//!
//! Chains are stored in an append-only `boxcar::Vec`, a block-allocated structure whose
//! growth never invalidates previously issued references. Only the append path takes a
//! lock; `get` is lock-free and stays valid while other threads allocate. Index 0 is
//! reserved (it is [`ProgramId::UNSET`]), so a chain's id always equals its index.
//!
//! # Identity Resolution
//!
//! Every search-then-commit identity step - limbo search plus resumption, partial-chain
//! search plus creation, library migration - runs under the registry's dedicated
//! [synchronization guard](ProgramRegistry::sync_guard), making concurrent resumption of
//! the same candidate impossible by construction. The guard is never taken on the
//! tick/deinit fast paths.

mod chain;
mod threads;

pub use chain::ContextChain;
pub use threads::{current_thread_id, ThreadLinkTable};

use std::sync::{Arc, Mutex, MutexGuard};

use boxcar::Vec as BoxcarVec;

use crate::{
    context::{ExecutionContext, ProgramId},
    Error, Result,
};

/// Process-wide, growable collection of [`ContextChain`]s indexed by [`ProgramId`].
///
/// Ids are assigned once, monotonically, by the registry itself and are never reused
/// while the process is alive. An entry persists for the process's lifetime even after
/// its instance has permanently left, to support later limbo and history lookups. The
/// registry holds no external state and is rebuilt empty on process start.
///
/// # Examples
///
/// ```rust
/// use hostsync::{ExecutionContext, ProgramRegistry};
///
/// let registry = ProgramRegistry::new();
/// let chain = registry.allocate(ExecutionContext::empty())?;
/// assert_eq!(chain.program_id().value(), 1);
/// assert_eq!(registry.get(chain.program_id())?.program_id(), chain.program_id());
/// # Ok::<(), hostsync::Error>(())
/// ```
pub struct ProgramRegistry {
    /// Chain storage; slot 0 is a reserved `None` so ids equal indices
    chains: BoxcarVec<Option<Arc<ContextChain>>>,
    /// Serializes structural growth (id assignment + append)
    grow: Mutex<()>,
    /// Serializes identity resolution (search-then-commit steps)
    sync: Mutex<()>,
}

impl ProgramRegistry {
    /// Create an empty registry with the reserved slot 0 in place.
    #[must_use]
    pub fn new() -> Self {
        let chains = BoxcarVec::new();
        chains.push(None);
        ProgramRegistry {
            chains,
            grow: Mutex::new(()),
            sync: Mutex::new(()),
        }
    }

    /// Append a new chain for a brand-new instance and return it.
    ///
    /// The new chain's id is the registry index it was appended at; `master` becomes the
    /// chain's durable copy with that id stamped in.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if the growth lock is poisoned and
    /// [`Error::IllegalState`] on id-space exhaustion.
    pub fn allocate(&self, master: ExecutionContext) -> Result<Arc<ContextChain>> {
        let _guard = self.grow.lock().map_err(|_| Error::Lock)?;

        let id = u32::try_from(self.chains.count())
            .map_err(|_| illegal_state!("program id space exhausted"))?;
        let chain = Arc::new(ContextChain::new(ProgramId::new(id), master));
        let index = self.chains.push(Some(chain.clone()));
        debug_assert_eq!(index, id as usize);
        Ok(chain)
    }

    /// The chain registered under `id`.
    ///
    /// Lock-free; safe while concurrent allocations grow the registry.
    ///
    /// # Errors
    /// An unset or out-of-range id is an [`Error::IllegalState`] - a caller holding such
    /// an id has corrupted state and the condition is never silently ignored.
    pub fn get(&self, id: ProgramId) -> Result<Arc<ContextChain>> {
        if id.is_unset() {
            return Err(illegal_state!("program id not assigned"));
        }
        self.chains
            .get(id.value() as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| illegal_state!("unknown program id {}", id))
    }

    /// The chain registered under `id`, or `None` for unset/unknown ids.
    #[must_use]
    pub fn try_get(&self, id: ProgramId) -> Option<Arc<ContextChain>> {
        if id.is_unset() {
            return None;
        }
        self.chains.get(id.value() as usize).and_then(|slot| slot.clone())
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        // Slot 0 is reserved.
        self.chains.count().saturating_sub(1)
    }

    /// `true` before the first instance was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all registered chains in id order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<ContextChain>> + '_ {
        self.chains.iter().filter_map(|(_, slot)| slot.clone())
    }

    /// Acquire the identity-resolution guard.
    ///
    /// Held across every search-then-commit step so that two threads can never resume or
    /// migrate against the same candidate chain.
    pub(crate) fn sync_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.sync.lock().map_err(|_| Error::Lock)
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramRegistry")
            .field("instances", &self.len())
            .finish()
    }
}
