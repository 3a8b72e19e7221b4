//! Per-module execution state.
//!
//! An [`ExecutionContext`] is the state record of one module instance - a program's main
//! module or one of its attached libraries. The host allocates (and may re-allocate) the
//! memory behind the per-call record; this core only ever copies state in and out of it.
//! The durable copies live in the [`crate::registry`] and outlive any single host block.
//!
//! # Ownership Model
//!
//! The relationship between host memory and registry state is "weak reference by id plus
//! explicit copy-in/copy-out": a context names its instance through
//! [`ExecutionContext::program_id`], never through a long-lived borrow. Within one call
//! only the executing thread touches the record; the durable master copy is written by
//! whichever thread commits a protocol step, always under the registry's synchronization
//! guard.

mod types;

pub use types::{
    CoreFunction, DeinitFlags, InitFlags, InitReason, ModuleType, OsThreadId, ProgramId,
    ProgramType, SeriesHandle, UninitReason, WindowHandle,
};

use crate::{Result, StatusCode};

/// State record of one module instance (main module or attached library).
///
/// Exactly one `ExecutionContext` per `(program id, chain slot)` pair is live - reachable
/// from a [`crate::ContextChain`] - at any time. A released slot is cleared to empty,
/// never left dangling.
///
/// Most fields are written by the synchronization protocols and only read by the hosted
/// module; the public mutators are the ones a protocol step legitimately delegates to the
/// caller: the write-once super context and the error/warning recording channel.
///
/// # Examples
///
/// ```rust
/// use hostsync::{ExecutionContext, ProgramId};
///
/// // A freshly allocated host block carries no identity yet.
/// let ctx = ExecutionContext::empty();
/// assert_eq!(ctx.program_id(), ProgramId::UNSET);
/// assert!(ctx.last_error().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Stable instance identity; [`ProgramId::UNSET`] until resolved
    pub(crate) program_id: ProgramId,
    /// Kind of the owning program's main module
    pub(crate) program_type: ProgramType,
    /// Kind of this module within the instance
    pub(crate) module_type: ModuleType,
    /// Name of the owning program
    pub(crate) program_name: String,
    /// Name of this module (equals `program_name` for main modules)
    pub(crate) module_name: String,
    /// Current lifecycle phase of this module
    pub(crate) core_function: CoreFunction,
    /// Resolved initialization cause; `None` before the first resolved init
    pub(crate) init_reason: Option<InitReason>,
    /// Last uninitialization cause reported by the host
    pub(crate) uninit_reason: UninitReason,
    /// Capability requests declared at initialization
    pub(crate) init_flags: InitFlags,
    /// Capability requests declared for deinitialization
    pub(crate) deinit_flags: DeinitFlags,
    /// Current market symbol
    pub(crate) symbol: String,
    /// Current chart timeframe in minutes
    pub(crate) timeframe: u32,
    /// Price digits of the symbol
    pub(crate) digits: u32,
    /// Smallest price increment of the symbol
    pub(crate) point: f64,
    /// Instance runs inside the host's tester
    pub(crate) testing: bool,
    /// Tester runs with chart visualization
    pub(crate) visual_mode: bool,
    /// Instance runs inside an optimization batch
    pub(crate) optimization: bool,
    /// Parent instance this module was loaded on behalf of; write-once
    pub(crate) super_context: Option<ProgramId>,
    /// Host chart window of the instance
    pub(crate) window: WindowHandle,
    /// Chart coordinates the program was dropped at, if loaded by drag & drop
    pub(crate) drop_origin: Option<(i32, i32)>,
    /// Thread executing the current call
    pub(crate) thread: OsThreadId,
    /// Core-owned cumulative tick counter; survives limbo through the master copy
    pub(crate) ticks: u64,
    /// Host-reported tick sequence number, stored verbatim for attribution
    pub(crate) tick_sequence: u64,
    /// Bar count of the attached series
    pub(crate) bars: u32,
    /// Bars changed since the previous tick
    pub(crate) changed_bars: u32,
    /// Host price-series block
    pub(crate) series: SeriesHandle,
    /// Host server time of the last tick (seconds since epoch)
    pub(crate) server_time: i64,
    /// Last bid price
    pub(crate) bid: f64,
    /// Last ask price
    pub(crate) ask: f64,
    /// Most recent error recorded on this context
    pub(crate) last_error: Option<(StatusCode, String)>,
    /// Most recent warning recorded on this context
    pub(crate) last_warning: Option<(StatusCode, String)>,
}

impl ExecutionContext {
    /// A blank per-call record, equivalent to the zeroed memory block a host hands in for
    /// a module it has not identified yet.
    ///
    /// Program type and module type carry placeholder values until the first protocol
    /// step stamps them; nothing reads them before that.
    #[must_use]
    pub fn empty() -> Self {
        ExecutionContext {
            program_id: ProgramId::UNSET,
            program_type: ProgramType::Expert,
            module_type: ModuleType::Expert,
            program_name: String::new(),
            module_name: String::new(),
            core_function: CoreFunction::None,
            init_reason: None,
            uninit_reason: UninitReason::Undefined,
            init_flags: InitFlags::empty(),
            deinit_flags: DeinitFlags::empty(),
            symbol: String::new(),
            timeframe: 0,
            digits: 0,
            point: 0.0,
            testing: false,
            visual_mode: false,
            optimization: false,
            super_context: None,
            window: WindowHandle::NULL,
            drop_origin: None,
            thread: OsThreadId::new(0),
            ticks: 0,
            tick_sequence: 0,
            bars: 0,
            changed_bars: 0,
            series: SeriesHandle::NULL,
            server_time: 0,
            bid: 0.0,
            ask: 0.0,
            last_error: None,
            last_warning: None,
        }
    }

    /// Stable instance identity; [`ProgramId::UNSET`] until resolved.
    #[must_use]
    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    /// Kind of the owning program's main module.
    #[must_use]
    pub fn program_type(&self) -> ProgramType {
        self.program_type
    }

    /// Kind of this module within the instance.
    #[must_use]
    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// Name of the owning program.
    #[must_use]
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Name of this module; equals [`ExecutionContext::program_name`] for main modules.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Current lifecycle phase of this module.
    #[must_use]
    pub fn core_function(&self) -> CoreFunction {
        self.core_function
    }

    /// Resolved initialization cause; `None` before the first resolved init.
    #[must_use]
    pub fn init_reason(&self) -> Option<InitReason> {
        self.init_reason
    }

    /// Last uninitialization cause reported by the host.
    #[must_use]
    pub fn uninit_reason(&self) -> UninitReason {
        self.uninit_reason
    }

    /// Capability requests declared at initialization.
    #[must_use]
    pub fn init_flags(&self) -> InitFlags {
        self.init_flags
    }

    /// Capability requests declared for deinitialization.
    #[must_use]
    pub fn deinit_flags(&self) -> DeinitFlags {
        self.deinit_flags
    }

    /// Current market symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current chart timeframe in minutes.
    #[must_use]
    pub fn timeframe(&self) -> u32 {
        self.timeframe
    }

    /// Price digits of the symbol.
    #[must_use]
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Smallest price increment of the symbol.
    #[must_use]
    pub fn point(&self) -> f64 {
        self.point
    }

    /// `true` if the instance runs inside the host's tester.
    #[must_use]
    pub fn testing(&self) -> bool {
        self.testing
    }

    /// `true` if a test run visualizes its chart.
    #[must_use]
    pub fn visual_mode(&self) -> bool {
        self.visual_mode
    }

    /// `true` if the instance runs inside an optimization batch.
    #[must_use]
    pub fn optimization(&self) -> bool {
        self.optimization
    }

    /// Parent instance this module was loaded on behalf of.
    #[must_use]
    pub fn super_context(&self) -> Option<ProgramId> {
        self.super_context
    }

    /// Host chart window of the instance.
    #[must_use]
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    /// Chart coordinates the program was dropped at, if loaded by drag & drop.
    #[must_use]
    pub fn drop_origin(&self) -> Option<(i32, i32)> {
        self.drop_origin
    }

    /// Thread that executed the most recent call of this module.
    #[must_use]
    pub fn thread(&self) -> OsThreadId {
        self.thread
    }

    /// Core-owned cumulative tick counter.
    ///
    /// Incremented once per main-module tick and written through to the master copy, so
    /// the value survives host-side re-allocation of the per-call memory.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Host-reported tick sequence number of the most recent tick.
    #[must_use]
    pub fn tick_sequence(&self) -> u64 {
        self.tick_sequence
    }

    /// Bar count of the attached series.
    #[must_use]
    pub fn bars(&self) -> u32 {
        self.bars
    }

    /// Bars changed since the previous tick.
    #[must_use]
    pub fn changed_bars(&self) -> u32 {
        self.changed_bars
    }

    /// Host price-series block of the current symbol/timeframe.
    #[must_use]
    pub fn series(&self) -> SeriesHandle {
        self.series
    }

    /// Host server time of the last tick, in seconds since the epoch.
    #[must_use]
    pub fn server_time(&self) -> i64 {
        self.server_time
    }

    /// Last bid price.
    #[must_use]
    pub fn bid(&self) -> f64 {
        self.bid
    }

    /// Last ask price.
    #[must_use]
    pub fn ask(&self) -> f64 {
        self.ask
    }

    /// `true` once the context has been associated with an instance.
    #[must_use]
    pub fn has_instance(&self) -> bool {
        !self.program_id.is_unset()
    }

    /// `true` for library-module contexts.
    #[must_use]
    pub fn is_library(&self) -> bool {
        self.module_type.is_library()
    }

    /// Associate this module with a parent instance.
    ///
    /// The super context is write-once: it is set by the protocol step that loads a
    /// module on behalf of another instance and is read-only for everyone else.
    ///
    /// # Errors
    /// Returns [`crate::Error::IllegalState`] if a parent is already recorded, and
    /// [`crate::Error::InvalidParameter`] for [`ProgramId::UNSET`].
    pub fn set_super_context(&mut self, parent: ProgramId) -> Result<()> {
        if parent.is_unset() {
            return Err(invalid_parameter!("super context requires an assigned id"));
        }
        if let Some(existing) = self.super_context {
            return Err(illegal_state!(
                "super context already set to {}, refusing {}",
                existing,
                parent
            ));
        }
        self.super_context = Some(parent);
        Ok(())
    }

    /// Record an error on this context for later inspection by the owning module.
    ///
    /// This is the error-propagation channel of the synchronization protocols: a failing
    /// step returns its error to the caller and, where a living context is identifiable,
    /// leaves the status here as well. Only the most recent error is kept.
    pub fn record_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.last_error = Some((status, message.into()));
    }

    /// Record a warning on this context. Only the most recent warning is kept.
    pub fn record_warning(&mut self, status: StatusCode, message: impl Into<String>) {
        self.last_warning = Some((status, message.into()));
    }

    /// The most recent error recorded on this context.
    #[must_use]
    pub fn last_error(&self) -> Option<(StatusCode, &str)> {
        self.last_error
            .as_ref()
            .map(|(status, message)| (*status, message.as_str()))
    }

    /// The most recent warning recorded on this context.
    #[must_use]
    pub fn last_warning(&self) -> Option<(StatusCode, &str)> {
        self.last_warning
            .as_ref()
            .map(|(status, message)| (*status, message.as_str()))
    }

    /// Remove and return the most recent error, clearing the channel.
    pub fn take_last_error(&mut self) -> Option<(StatusCode, String)> {
        self.last_error.take()
    }
}
