//! Thread-to-program linkage.
//!
//! The host invokes the core on arbitrary native threads and error-reporting entry points
//! receive no instance handle, so the core keeps a process-wide record of which program
//! instance each thread executed last. The table is the compatibility shim for call
//! shapes that cannot carry an explicit handle - code that can pass the instance down the
//! call stack should do that instead.
//!
//! # Storage
//!
//! Entries live in a `crossbeam_skiplist::SkipMap`: node-based storage whose references
//! stay valid while other threads insert, which is exactly the growth behavior the
//! registry contract requires. An entry is created the first time a thread is seen and is
//! updated - never removed - for the life of the process. OS-level thread-id reuse is an
//! accepted approximation.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Mutex,
};

use crossbeam_skiplist::SkipMap;

use crate::{
    context::{OsThreadId, ProgramId},
    Error, Result,
};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Process-local identity of the calling thread.
///
/// Issued on first use per thread, starting at 1; stable for the thread's lifetime.
#[must_use]
pub fn current_thread_id() -> OsThreadId {
    OsThreadId::new(THREAD_ID.with(|id| *id))
}

/// One thread's linkage record.
struct ThreadLink {
    /// Position of this entry in table-creation order
    ordinal: usize,
    /// Raw id of the program the thread executed last; 0 while unlinked
    program: AtomicU32,
}

/// Maps OS threads to the program instance each of them executed last.
///
/// Also tracks the host's distinguished UI thread (its single dispatch thread) and the
/// last program that executed on it; the UI thread is where indicator-like programs run
/// and is one of the guards of the limbo-resumption rule.
///
/// # Thread Safety
///
/// Lookups are lock-free; only the creation of a new entry takes a short lock so the
/// entry's ordinal can be assigned consistently.
pub struct ThreadLinkTable {
    /// Linkage entries, created on first sight and never removed
    links: SkipMap<OsThreadId, ThreadLink>,
    /// Serializes entry creation (ordinal assignment)
    grow: Mutex<()>,
    /// Raw id of the host's dispatch thread; 0 while unknown
    ui_thread: AtomicU64,
    /// Raw id of the last program executed on the UI thread; 0 while none
    last_ui_program: AtomicU32,
}

impl ThreadLinkTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        ThreadLinkTable {
            links: SkipMap::new(),
            grow: Mutex::new(()),
            ui_thread: AtomicU64::new(0),
            last_ui_program: AtomicU32::new(0),
        }
    }

    /// Ordinal of `thread`'s entry, creating the entry if the thread is new.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if the growth lock is poisoned.
    pub fn index_of(&self, thread: OsThreadId) -> Result<usize> {
        if let Some(entry) = self.links.get(&thread) {
            return Ok(entry.value().ordinal);
        }

        let _guard = self.grow.lock().map_err(|_| Error::Lock)?;
        if let Some(entry) = self.links.get(&thread) {
            return Ok(entry.value().ordinal);
        }
        let ordinal = self.links.len();
        self.links.insert(
            thread,
            ThreadLink {
                ordinal,
                program: AtomicU32::new(0),
            },
        );
        Ok(ordinal)
    }

    /// Record that `thread` now executes `program`.
    ///
    /// If `thread` is the UI thread the last-UI-program value is updated as well.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for [`ProgramId::UNSET`] and [`Error::Lock`]
    /// if entry creation fails.
    pub fn link(&self, thread: OsThreadId, program: ProgramId) -> Result<()> {
        if program.is_unset() {
            return Err(invalid_parameter!("cannot link a thread to an unset id"));
        }

        self.index_of(thread)?;
        if let Some(entry) = self.links.get(&thread) {
            entry.value().program.store(program.value(), Ordering::Release);
        }
        if self.is_ui_thread(thread) {
            self.last_ui_program.store(program.value(), Ordering::Release);
        }
        Ok(())
    }

    /// The program `thread` executed last, if it has been linked.
    #[must_use]
    pub fn last_program(&self, thread: OsThreadId) -> Option<ProgramId> {
        let entry = self.links.get(&thread)?;
        match entry.value().program.load(Ordering::Acquire) {
            0 => None,
            id => Some(ProgramId::new(id)),
        }
    }

    /// Record `thread` as the host's dispatch (UI) thread.
    ///
    /// Idempotent; a later call simply overwrites the value (the host has exactly one
    /// dispatch thread, so in practice the value never changes once set).
    pub fn mark_ui_thread(&self, thread: OsThreadId) {
        self.ui_thread.store(thread.value(), Ordering::Release);
    }

    /// `true` if `thread` is the recorded UI thread.
    #[must_use]
    pub fn is_ui_thread(&self, thread: OsThreadId) -> bool {
        let ui = self.ui_thread.load(Ordering::Acquire);
        ui != 0 && ui == thread.value()
    }

    /// The recorded UI thread, once known.
    #[must_use]
    pub fn ui_thread(&self) -> Option<OsThreadId> {
        match self.ui_thread.load(Ordering::Acquire) {
            0 => None,
            id => Some(OsThreadId::new(id)),
        }
    }

    /// The last program executed on the UI thread, if any.
    #[must_use]
    pub fn last_ui_program(&self) -> Option<ProgramId> {
        match self.last_ui_program.load(Ordering::Acquire) {
            0 => None,
            id => Some(ProgramId::new(id)),
        }
    }

    /// Number of threads seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// `true` before any thread has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Default for ThreadLinkTable {
    fn default() -> Self {
        Self::new()
    }
}
