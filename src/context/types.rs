//! Core vocabulary of the synchronization core.
//!
//! This module defines the identity newtypes ([`ProgramId`], [`OsThreadId`], [`WindowHandle`],
//! [`SeriesHandle`]) and the lifecycle enums ([`ProgramType`], [`ModuleType`], [`CoreFunction`],
//! [`InitReason`], [`UninitReason`]) shared by the registry, the context chains and the
//! resolver, plus the host-supplied capability masks ([`InitFlags`], [`DeinitFlags`]).
//!
//! All of these are plain value types; the concurrency story lives entirely in the
//! registry and chain containers that hold them.

use std::fmt;

use bitflags::bitflags;
use strum::{Display, FromRepr};

/// Durable identity of one hosted program instance.
///
/// Ids are assigned once by the [`crate::ProgramRegistry`], monotonically, and are never
/// reused while the process is alive. The id survives host-side deallocation of the
/// instance's memory - it is the key under which the instance's durable state is found
/// again during limbo resumption.
///
/// The value `0` ([`ProgramId::UNSET`]) marks a per-call context the host has not yet
/// associated with an instance; registry index `0` is reserved so that an id always
/// equals its registry index.
///
/// # Examples
///
/// ```rust
/// use hostsync::ProgramId;
///
/// let id = ProgramId::new(3);
/// assert_eq!(id.value(), 3);
/// assert!(!id.is_unset());
/// assert!(ProgramId::UNSET.is_unset());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(u32);

impl ProgramId {
    /// The reserved "no instance assigned yet" value.
    pub const UNSET: ProgramId = ProgramId(0);

    /// Create a `ProgramId` from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        ProgramId(value)
    }

    /// The raw id value (also the registry index).
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// `true` if no instance has been assigned yet.
    #[must_use]
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-local identity of an OS thread.
///
/// The host invokes the core from arbitrary native threads; each thread receives a
/// process-local id on first sight (see [`crate::registry::current_thread_id`]). OS-level
/// thread-id reuse is an accepted approximation the extension cannot fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsThreadId(u64);

impl OsThreadId {
    /// Create an `OsThreadId` from its raw value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        OsThreadId(value)
    }

    /// The raw thread id value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OsThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread:{}", self.0)
    }
}

/// Opaque handle of a host chart window.
///
/// Stored and compared, never dereferenced. Identical window handles are one of the
/// conditions under which a limbo instance is considered the same instance again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    /// The null window handle.
    pub const NULL: WindowHandle = WindowHandle(0);

    /// Create a `WindowHandle` from its raw value.
    #[must_use]
    pub fn new(value: isize) -> Self {
        WindowHandle(value)
    }

    /// The raw handle value.
    #[must_use]
    pub fn value(self) -> isize {
        self.0
    }

    /// `true` for [`WindowHandle::NULL`].
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window:0x{:X}", self.0)
    }
}

/// Opaque handle of the host's price-series block for one symbol/timeframe.
///
/// Updated on every tick; never dereferenced by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesHandle(isize);

impl SeriesHandle {
    /// The null series handle.
    pub const NULL: SeriesHandle = SeriesHandle(0);

    /// Create a `SeriesHandle` from its raw value.
    #[must_use]
    pub fn new(value: isize) -> Self {
        SeriesHandle(value)
    }

    /// The raw handle value.
    #[must_use]
    pub fn value(self) -> isize {
        self.0
    }

    /// `true` for [`SeriesHandle::NULL`].
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Kind of a hosted program's main module.
///
/// The program type is fixed for the life of an instance and is one of the guards of the
/// limbo-resumption rule (only indicator-like programs cycle through limbo - they run on
/// the host's single dispatch thread and lose their memory on every chart change).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
pub enum ProgramType {
    /// Event-driven strategy module, executed on a dedicated host thread
    Expert = 1,
    /// Run-once module, executed on a dedicated host thread
    Script = 2,
    /// Chart computation module, executed on the host's dispatch (UI) thread
    Indicator = 3,
}

impl ProgramType {
    /// `true` for programs executing on the host's dispatch thread.
    #[must_use]
    pub fn is_indicator(self) -> bool {
        matches!(self, ProgramType::Indicator)
    }
}

/// Kind of one module within an instance.
///
/// The main module's type mirrors its [`ProgramType`]; attached libraries are
/// [`ModuleType::Library`] regardless of the program that loaded them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
pub enum ModuleType {
    /// Main module of an expert program
    Expert = 1,
    /// Main module of a script program
    Script = 2,
    /// Main module of an indicator program
    Indicator = 3,
    /// Attached library module
    Library = 4,
}

impl ModuleType {
    /// `true` for [`ModuleType::Library`].
    #[must_use]
    pub fn is_library(self) -> bool {
        matches!(self, ModuleType::Library)
    }
}

impl From<ProgramType> for ModuleType {
    fn from(value: ProgramType) -> Self {
        match value {
            ProgramType::Expert => ModuleType::Expert,
            ProgramType::Script => ModuleType::Script,
            ProgramType::Indicator => ModuleType::Indicator,
        }
    }
}

/// Current phase of one module's lifecycle state machine.
///
/// The legal transitions are `None → Init → Tick* → Deinit → (None | Init)`. A module in
/// phase [`CoreFunction::None`] holds no live per-call memory; for a main module this is
/// the limbo interval between deinitialization and the next initialization.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr)]
pub enum CoreFunction {
    /// Between lives; no per-call memory is attached
    #[default]
    None = 0,
    /// Initializing
    Init = 1,
    /// Running the per-tick entry point
    Tick = 2,
    /// Deinitializing
    Deinit = 3,
}

/// Resolved cause of an initialization, as the hosted module will read it back.
///
/// The host does not provide this value - it is derived by the resolver from the
/// (possibly wrong) uninit reason, the test-mode flags and the previous market context of
/// the instance. See `sync::rules::derive_init_reason`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
pub enum InitReason {
    /// Loaded manually by the user
    User = 1,
    /// Loaded as part of a chart template
    Template = 2,
    /// Started programmatically (including test runs)
    Program = 3,
    /// Reloaded on a live chart after a finished test run
    ProgramAfterTest = 4,
    /// Input parameters were changed
    Parameters = 5,
    /// The chart timeframe changed
    TimeframeChange = 6,
    /// The chart symbol changed
    SymbolChange = 7,
    /// The trade account changed
    AccountChange = 8,
    /// The module was recompiled in place
    Recompile = 9,
}

/// Uninitialization cause as reported by the host.
///
/// Host reports are version-dependent and occasionally wrong; the resolver treats them as
/// one input among several, never as the sole truth. The cycling subset (see
/// [`UninitReason::is_cycling`]) marks instances that will come back and must keep their
/// identity across the gap.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr)]
pub enum UninitReason {
    /// No reason given (expert removal, end of test, host shutdown on old builds)
    #[default]
    Undefined = 0,
    /// The program was removed from the chart
    Remove = 1,
    /// The program was recompiled
    Recompile = 2,
    /// Symbol or timeframe of the chart changed
    ChartChange = 3,
    /// The chart window was closed
    ChartClose = 4,
    /// Input parameters were changed
    Parameters = 5,
    /// The trade account changed
    Account = 6,
    /// A chart template was applied
    Template = 7,
    /// The previous initialization failed
    InitFailed = 8,
    /// The host is shutting down
    Close = 9,
}

impl UninitReason {
    /// `true` for reasons after which the same instance reinitializes and must keep its
    /// identity (chart change, parameter change, account change).
    ///
    /// A main module leaving for a cycling reason stays eligible for limbo resumption;
    /// any other reason finishes the instance permanently.
    #[must_use]
    pub fn is_cycling(self) -> bool {
        matches!(
            self,
            UninitReason::ChartChange | UninitReason::Parameters | UninitReason::Account
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Capability requests a module declares at initialization.
    ///
    /// The core stores these verbatim and exposes them through the context accessors; the
    /// services behind the individual bits are provided by utility layers outside this core.
    pub struct InitFlags: u32 {
        /// Module requires timezone configuration before the first tick
        const TIMEZONE = 0x0001;
        /// Module requires the symbol's price scale to be resolved
        const PRICE_SCALE = 0x0002;
        /// Module cannot run before the full bar history is available
        const BARS_REQUIRED = 0x0004;
        /// Module routes its diagnostics through a per-instance buffer
        const BUFFERED_LOG = 0x0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Capability requests a module declares for its deinitialization.
    ///
    /// No bits are currently assigned by any supported host build; the mask is stored
    /// verbatim so newer hosts can pass values through older extension versions.
    pub struct DeinitFlags: u32 {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_id_unset() {
        assert!(ProgramId::UNSET.is_unset());
        assert_eq!(ProgramId::UNSET.value(), 0);
        assert!(!ProgramId::new(1).is_unset());
        assert_eq!(ProgramId::new(42).to_string(), "#42");
    }

    #[test]
    fn test_module_type_from_program_type() {
        assert_eq!(ModuleType::from(ProgramType::Expert), ModuleType::Expert);
        assert_eq!(ModuleType::from(ProgramType::Script), ModuleType::Script);
        assert_eq!(
            ModuleType::from(ProgramType::Indicator),
            ModuleType::Indicator
        );
        assert!(!ModuleType::Indicator.is_library());
        assert!(ModuleType::Library.is_library());
    }

    #[test]
    fn test_core_function_repr() {
        assert_eq!(CoreFunction::from_repr(0), Some(CoreFunction::None));
        assert_eq!(CoreFunction::from_repr(2), Some(CoreFunction::Tick));
        assert_eq!(CoreFunction::from_repr(9), None);
        assert_eq!(CoreFunction::default(), CoreFunction::None);
    }

    #[test]
    fn test_cycling_reasons() {
        assert!(UninitReason::ChartChange.is_cycling());
        assert!(UninitReason::Parameters.is_cycling());
        assert!(UninitReason::Account.is_cycling());

        assert!(!UninitReason::Undefined.is_cycling());
        assert!(!UninitReason::Remove.is_cycling());
        assert!(!UninitReason::Recompile.is_cycling());
        assert!(!UninitReason::ChartClose.is_cycling());
        assert!(!UninitReason::Template.is_cycling());
        assert!(!UninitReason::InitFailed.is_cycling());
        assert!(!UninitReason::Close.is_cycling());
    }

    #[test]
    fn test_flags_passthrough() {
        let flags = InitFlags::TIMEZONE | InitFlags::BARS_REQUIRED;
        assert!(flags.contains(InitFlags::TIMEZONE));
        assert!(!flags.contains(InitFlags::PRICE_SCALE));

        // Unknown host bits survive a verbatim round-trip.
        let raw = InitFlags::from_bits_retain(0x8000_0001);
        assert_eq!(raw.bits(), 0x8000_0001);
        assert_eq!(DeinitFlags::empty().bits(), 0);
    }
}
