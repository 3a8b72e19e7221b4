//! Per-instance context chain.
//!
//! A [`ContextChain`] is the ordered collection of context slots belonging to one program
//! instance: slot 0 is the durable master copy, slot 1 the main module, slots ≥ 2 the
//! attached library modules. The master always exists and never becomes empty once the
//! chain is created; the main slot is empty while the instance is in limbo; library slots
//! are append-only and are cleared (not removed) when their module leaves, so the indices
//! of the remaining libraries stay valid.
//!
//! # Thread Safety
//!
//! Slot contents are interior-mutable behind `RwLock`s and the library list grows through
//! an append-only `boxcar::Vec`, so references handed out earlier stay valid while other
//! threads append. Identity-changing operations (attaching a main module, migrating a
//! library) are serialized one level up by the registry's synchronization guard.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

use boxcar::Vec as BoxcarVec;

use crate::{
    context::{ExecutionContext, ProgramId},
    Error, Result,
};

/// Ordered `[master, main, lib…]` context list of one program instance.
///
/// Created exactly once, at first sight of a brand-new instance, and retained for the
/// life of the process - even after the instance's main module has permanently left - to
/// support later limbo and history lookups. A permanently-left chain is marked
/// [finished](ContextChain::is_finished) and is excluded from limbo matching; it is also
/// the precondition for the tester's library-reuse migration.
pub struct ContextChain {
    /// Identity of the instance this chain belongs to
    program_id: ProgramId,
    /// Durable backup copy of the instance state; outlives any host block
    master: RwLock<ExecutionContext>,
    /// Main-module slot; `None` while the instance is in limbo
    main: RwLock<Option<ExecutionContext>>,
    /// Library slots, append-only; a left library leaves an empty slot behind
    libraries: BoxcarVec<RwLock<Option<ExecutionContext>>>,
    /// Set when the main module leaves for a non-cycling reason
    finished: AtomicBool,
}

impl ContextChain {
    /// Create the chain for a new instance from its initial master state.
    ///
    /// The master's program id is stamped with `program_id`; the main slot starts empty
    /// and is attached by the resolver in the same protocol step.
    pub(crate) fn new(program_id: ProgramId, mut master: ExecutionContext) -> Self {
        master.program_id = program_id;
        ContextChain {
            program_id,
            master: RwLock::new(master),
            main: RwLock::new(None),
            libraries: BoxcarVec::new(),
            finished: AtomicBool::new(false),
        }
    }

    /// Identity of the instance this chain belongs to.
    #[must_use]
    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// `true` once the main module has permanently left (non-cycling uninit reason).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// `true` while the instance exists only in its master copy: the main slot is empty,
    /// the master phase is `None` and the instance has not permanently left.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if a slot lock is poisoned.
    pub fn is_in_limbo(&self) -> Result<bool> {
        if self.is_finished() {
            return Ok(false);
        }
        let master = self.master.read().map_err(|_| Error::Lock)?;
        let main = self.main.read().map_err(|_| Error::Lock)?;
        Ok(main.is_none() && master.core_function == crate::context::CoreFunction::None)
    }

    /// Clone of the durable master state.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if the master lock is poisoned.
    pub fn snapshot_master(&self) -> Result<ExecutionContext> {
        Ok(self.master.read().map_err(|_| Error::Lock)?.clone())
    }

    /// Clone of the main-module slot, `None` while the instance is in limbo.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if the main lock is poisoned.
    pub fn snapshot_main(&self) -> Result<Option<ExecutionContext>> {
        Ok(self.main.read().map_err(|_| Error::Lock)?.clone())
    }

    /// Clone of the library slot at `index`, `None` for a cleared slot.
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] for an out-of-range index and [`Error::Lock`] on a
    /// poisoned slot lock.
    pub fn snapshot_library(&self, index: usize) -> Result<Option<ExecutionContext>> {
        match self.libraries.get(index) {
            Some(slot) => Ok(slot.read().map_err(|_| Error::Lock)?.clone()),
            None => Err(illegal_state!(
                "library slot {} out of range for chain {}",
                index,
                self.program_id
            )),
        }
    }

    /// Number of library slots ever appended, including cleared ones.
    #[must_use]
    pub fn library_slots(&self) -> usize {
        self.libraries.count()
    }

    /// Number of currently occupied library slots.
    #[must_use]
    pub fn library_count(&self) -> usize {
        self.libraries
            .iter()
            .filter(|(_, slot)| slot.read().map(|s| s.is_some()).unwrap_or(false))
            .count()
    }

    /// Run `f` against the durable master state under its write lock.
    pub(crate) fn with_master<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> Result<R> {
        let mut master = self.master.write().map_err(|_| Error::Lock)?;
        Ok(f(&mut master))
    }

    /// Run `f` against the durable master state under its read lock.
    pub(crate) fn read_master<R>(&self, f: impl FnOnce(&ExecutionContext) -> R) -> Result<R> {
        let master = self.master.read().map_err(|_| Error::Lock)?;
        Ok(f(&master))
    }

    /// `true` while the main slot holds no context.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if the main lock is poisoned.
    pub fn main_is_empty(&self) -> Result<bool> {
        Ok(self.main.read().map_err(|_| Error::Lock)?.is_none())
    }

    /// Store `ctx` in the main slot, replacing whatever occupied it.
    pub(crate) fn store_main(&self, ctx: ExecutionContext) -> Result<()> {
        let mut main = self.main.write().map_err(|_| Error::Lock)?;
        *main = Some(ctx);
        Ok(())
    }

    /// Run `f` against the occupied main slot.
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] while the slot is empty.
    pub(crate) fn with_main<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> Result<R> {
        let mut main = self.main.write().map_err(|_| Error::Lock)?;
        match main.as_mut() {
            Some(ctx) => Ok(f(ctx)),
            None => Err(illegal_state!(
                "chain {} has no attached main module",
                self.program_id
            )),
        }
    }

    /// Empty the main slot and return the detached context.
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] if the slot is already empty (double leave).
    pub(crate) fn clear_main(&self) -> Result<ExecutionContext> {
        let mut main = self.main.write().map_err(|_| Error::Lock)?;
        main.take().ok_or_else(|| {
            illegal_state!("main slot of chain {} already vacated", self.program_id)
        })
    }

    /// Append a library context, returning its slot index.
    ///
    /// Slots are never removed afterwards, so the returned index stays valid for the
    /// life of the chain.
    pub(crate) fn append_library(&self, ctx: ExecutionContext) -> usize {
        self.libraries.push(RwLock::new(Some(ctx)))
    }

    /// Index of the occupied library slot holding `module_name`, if any.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if a slot lock is poisoned.
    pub fn find_library(&self, module_name: &str) -> Result<Option<usize>> {
        for (index, slot) in self.libraries.iter() {
            let slot = slot.read().map_err(|_| Error::Lock)?;
            if let Some(ctx) = slot.as_ref() {
                if ctx.module_name == module_name {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    /// Run `f` against the occupied library slot at `index`.
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] for an out-of-range or cleared slot.
    pub(crate) fn with_library<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut ExecutionContext) -> R,
    ) -> Result<R> {
        let Some(slot) = self.libraries.get(index) else {
            return Err(illegal_state!(
                "library slot {} out of range for chain {}",
                index,
                self.program_id
            ));
        };
        let mut slot = slot.write().map_err(|_| Error::Lock)?;
        match slot.as_mut() {
            Some(ctx) => Ok(f(ctx)),
            None => Err(illegal_state!(
                "library slot {} of chain {} already vacated",
                index,
                self.program_id
            )),
        }
    }

    /// Clear the library slot at `index` and return the detached context.
    ///
    /// The slot itself stays in place so other libraries keep their indices.
    ///
    /// # Errors
    /// Returns [`Error::IllegalState`] for an out-of-range or already cleared slot.
    pub(crate) fn clear_library(&self, index: usize) -> Result<ExecutionContext> {
        let Some(slot) = self.libraries.get(index) else {
            return Err(illegal_state!(
                "library slot {} out of range for chain {}",
                index,
                self.program_id
            ));
        };
        let mut slot = slot.write().map_err(|_| Error::Lock)?;
        slot.take().ok_or_else(|| {
            illegal_state!(
                "library slot {} of chain {} already vacated",
                index,
                self.program_id
            )
        })
    }
}

impl std::fmt::Debug for ContextChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextChain")
            .field("program_id", &self.program_id)
            .field("finished", &self.is_finished())
            .field("library_slots", &self.library_slots())
            .finish()
    }
}
