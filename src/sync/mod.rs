//! Lifecycle resolution and the per-call synchronization protocol.
//!
//! The [`LifecycleResolver`] owns the process-wide [`ProgramRegistry`] and
//! [`ThreadLinkTable`] and exposes the entry points the host glue invokes around every
//! module call: main-module init/tick/deinit, library init/deinit, and the explicit
//! leave. Each entry point reconciles the host's possibly wrong or ambiguous lifecycle
//! signals into one unambiguous decision, then writes the resulting per-call state into
//! the context the calling module will read.
//!
//! # Decision Protocol
//!
//! The hardest step is main-module initialization with no host-side identity: the
//! resolver must decide - in order, with no retry path - whether the call resumes a
//! limbo instance, adopts a partial chain created by a reused test library, or describes
//! a brand-new instance. The guarded rules live in [`rules`] as pure functions; this
//! module performs the candidate lookups and commits the outcome. Every
//! search-then-commit sequence runs under the registry's synchronization guard, so two
//! threads can never resume the same candidate.
//!
//! # Failure Semantics
//!
//! Validate-then-commit: each entry point validates its parameters and the structural
//! invariants first and returns a specific error before any state is mutated. Errors are
//! additionally recorded on the affected context for later inspection by the owning
//! module. No entry point blocks beyond the registry's short critical sections.

mod rules;

pub use rules::{LimboProbe, MainInitDecision};

use crate::{
    context::{
        CoreFunction, DeinitFlags, ExecutionContext, InitFlags, InitReason, ModuleType, OsThreadId,
        ProgramId, ProgramType, SeriesHandle, UninitReason, WindowHandle,
    },
    registry::{current_thread_id, ContextChain, ProgramRegistry, ThreadLinkTable},
    Error, Result,
};
use std::sync::Arc;

/// Parameters of a main-module initialization call.
///
/// Carries everything the host reports about the initializing module; the resolver
/// treats the uninit reason as a claim to verify, not as truth.
#[derive(Debug, Clone)]
pub struct MainInitRequest<'a> {
    /// Kind of the initializing program
    pub program_type: ProgramType,
    /// Name of the initializing program
    pub program_name: &'a str,
    /// Uninit reason the host reported for the module's previous life
    pub uninit_reason: UninitReason,
    /// Capability requests for this initialization
    pub init_flags: InitFlags,
    /// Capability requests for the eventual deinitialization
    pub deinit_flags: DeinitFlags,
    /// Current market symbol
    pub symbol: &'a str,
    /// Current chart timeframe in minutes
    pub timeframe: u32,
    /// Price digits of the symbol
    pub digits: u32,
    /// Smallest price increment of the symbol
    pub point: f64,
    /// Module runs inside the host's tester
    pub testing: bool,
    /// Tester runs with chart visualization
    pub visual_mode: bool,
    /// Module runs inside an optimization batch
    pub optimization: bool,
    /// Parent instance this module was loaded on behalf of
    pub super_context: Option<ProgramId>,
    /// Host chart window
    pub window: WindowHandle,
    /// Chart coordinates the program was dropped at, if loaded by drag & drop
    pub drop_origin: Option<(i32, i32)>,
}

/// Parameters of a library-module initialization call.
#[derive(Debug, Clone)]
pub struct LibInitRequest<'a> {
    /// Name of the initializing library module
    pub module_name: &'a str,
    /// Uninit reason the host reported for the library's previous life
    pub uninit_reason: UninitReason,
    /// Capability requests for this initialization
    pub init_flags: InitFlags,
    /// Capability requests for the eventual deinitialization
    pub deinit_flags: DeinitFlags,
    /// Current market symbol
    pub symbol: &'a str,
    /// Current chart timeframe in minutes
    pub timeframe: u32,
    /// Price digits of the symbol
    pub digits: u32,
    /// Smallest price increment of the symbol
    pub point: f64,
    /// Library runs inside an optimization batch
    pub optimization: bool,
}

/// Per-tick market data reported by the host.
#[derive(Debug, Clone, Copy)]
pub struct TickUpdate {
    /// Host price-series block of the current symbol/timeframe
    pub series: SeriesHandle,
    /// Bar count of the series
    pub bars: u32,
    /// Bars changed since the previous tick
    pub changed_bars: u32,
    /// Host-side tick sequence number
    pub tick_sequence: u64,
    /// Host server time in seconds since the epoch
    pub server_time: i64,
    /// Current bid price
    pub bid: f64,
    /// Current ask price
    pub ask: f64,
}

/// The algorithmic core: resolves lifecycle reasons, restores limbo instances, re-homes
/// reused test libraries and drives the per-call synchronization protocol.
///
/// One resolver instance is the durable source of truth for a whole host process; the
/// registry it owns is rebuilt empty on process start and persists nothing.
///
/// # Examples
///
/// ```rust
/// use hostsync::{
///     ExecutionContext, InitFlags, DeinitFlags, LifecycleResolver, MainInitRequest,
///     ProgramType, UninitReason, WindowHandle,
/// };
///
/// let resolver = LifecycleResolver::new();
/// let mut ctx = ExecutionContext::empty();
/// resolver.main_init(
///     &mut ctx,
///     &MainInitRequest {
///         program_type: ProgramType::Expert,
///         program_name: "Baseline",
///         uninit_reason: UninitReason::Undefined,
///         init_flags: InitFlags::empty(),
///         deinit_flags: DeinitFlags::empty(),
///         symbol: "EURUSD",
///         timeframe: 60,
///         digits: 5,
///         point: 0.00001,
///         testing: false,
///         visual_mode: false,
///         optimization: false,
///         super_context: None,
///         window: WindowHandle::new(0x10),
///         drop_origin: None,
///     },
/// )?;
/// assert_eq!(ctx.program_id().value(), 1);
/// # Ok::<(), hostsync::Error>(())
/// ```
pub struct LifecycleResolver {
    /// Process-wide chain registry
    registry: ProgramRegistry,
    /// Thread-to-program linkage
    threads: ThreadLinkTable,
}

impl LifecycleResolver {
    /// Create a resolver with an empty registry and thread table.
    #[must_use]
    pub fn new() -> Self {
        LifecycleResolver {
            registry: ProgramRegistry::new(),
            threads: ThreadLinkTable::new(),
        }
    }

    /// The process-wide program registry.
    #[must_use]
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// The thread-to-program link table.
    #[must_use]
    pub fn threads(&self) -> &ThreadLinkTable {
        &self.threads
    }

    /// Synchronize a main module's initialization.
    ///
    /// Resolves the instance identity (limbo resumption, partial-test adoption or fresh
    /// allocation, checked in that order), stamps the per-call fields into `ctx`,
    /// attaches the context to its chain's main slot and links the calling thread.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for unusable inputs, [`Error::IllegalState`] when the
    /// context contradicts the registry (unknown id, name/type mismatch, finished
    /// instance), [`Error::Lock`] on poisoned locks. The error is also recorded on `ctx`.
    pub fn main_init(&self, ctx: &mut ExecutionContext, request: &MainInitRequest<'_>) -> Result<()> {
        self.main_init_inner(ctx, request)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn main_init_inner(
        &self,
        ctx: &mut ExecutionContext,
        request: &MainInitRequest<'_>,
    ) -> Result<()> {
        if request.program_name.is_empty() {
            return Err(invalid_parameter!("program name must not be empty"));
        }
        if request.symbol.is_empty() {
            return Err(invalid_parameter!("symbol must not be empty"));
        }
        if request.timeframe == 0 {
            return Err(invalid_parameter!("timeframe must be positive"));
        }
        if ctx.module_type.is_library() && ctx.has_instance() {
            return Err(illegal_state!("main init called with a library context"));
        }

        let thread = current_thread_id();

        // Indicators execute on the host's single dispatch thread; the first indicator
        // init with a live window identifies that thread.
        if request.program_type.is_indicator() && !request.window.is_null() {
            self.threads.mark_ui_thread(thread);
        }

        if ctx.program_id.is_unset() {
            let _guard = self.registry.sync_guard()?;

            let probe = LimboProbe {
                window: request.window,
                program_name: request.program_name,
                uninit_reason: request.uninit_reason,
            };
            let limbo = self.scan_limbo(&probe)?;
            let partial = self.partial_for_thread(thread, request.program_name)?;
            let decision = rules::decide_main_init(limbo, partial);

            match decision {
                MainInitDecision::ResumeLimbo(id) | MainInitDecision::ResumePartialTest(id) => {
                    let chain = self.registry.get(id)?;
                    let master = chain.snapshot_master()?;
                    let init_reason = rules::derive_init_reason(
                        decision,
                        request.uninit_reason,
                        Some(&master),
                        request.testing,
                        request.symbol,
                    );

                    // The host handed in fresh memory; restore the durable identity
                    // into it, then stamp the current call on top.
                    let mut restored = master;
                    Self::stamp_main(&mut restored, request, thread, init_reason, true);
                    if restored.super_context.is_none() {
                        restored.super_context = request.super_context;
                    }
                    *ctx = restored;

                    chain.with_master(|master| {
                        Self::stamp_main(master, request, thread, init_reason, true);
                        master.super_context = ctx.super_context;
                    })?;
                    chain.store_main(ctx.clone())?;
                }
                MainInitDecision::Fresh => {
                    let init_reason = rules::derive_init_reason(
                        decision,
                        request.uninit_reason,
                        None,
                        request.testing,
                        request.symbol,
                    );
                    Self::stamp_main(ctx, request, thread, init_reason, true);
                    ctx.ticks = 0;
                    ctx.super_context = request.super_context;

                    let chain = self.registry.allocate(ctx.clone())?;
                    ctx.program_id = chain.program_id();
                    chain.store_main(ctx.clone())?;
                }
            }
        } else {
            // The host kept the module's memory across the cycle; the identity must
            // already be consistent with the registry.
            let chain = self.registry.get(ctx.program_id)?;
            if chain.is_finished() {
                return Err(illegal_state!(
                    "instance {} already finished, cannot reinitialize",
                    ctx.program_id
                ));
            }
            let master = chain.snapshot_master()?;
            if master.program_name != request.program_name
                || master.program_type != request.program_type
            {
                return Err(illegal_state!(
                    "init for {} '{}' does not match instance {} ({} '{}')",
                    request.program_type,
                    request.program_name,
                    ctx.program_id,
                    master.program_type,
                    master.program_name
                ));
            }

            let init_reason = rules::derive_init_reason(
                MainInitDecision::Fresh,
                request.uninit_reason,
                Some(&master),
                request.testing,
                request.symbol,
            );
            Self::stamp_main(ctx, request, thread, init_reason, false);
            chain.with_master(|master| {
                Self::stamp_main(master, request, thread, init_reason, false);
            })?;
            chain.store_main(ctx.clone())?;
        }

        self.threads.link(thread, ctx.program_id)?;
        Ok(())
    }

    /// Synchronize a main module's tick.
    ///
    /// Requires an already-identified instance; moves the phase to `Tick`, advances the
    /// core-owned tick counter (written through to the master so it survives limbo) and
    /// records the reported market data.
    ///
    /// # Errors
    /// [`Error::IllegalState`] on an unidentified instance, a vacated main slot or an
    /// out-of-phase call; [`Error::InvalidParameter`] for inconsistent bar counts.
    pub fn main_tick(&self, ctx: &mut ExecutionContext, update: &TickUpdate) -> Result<()> {
        self.main_tick_inner(ctx, update)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn main_tick_inner(&self, ctx: &mut ExecutionContext, update: &TickUpdate) -> Result<()> {
        if update.changed_bars > update.bars {
            return Err(invalid_parameter!(
                "changed bar count {} exceeds bar count {}",
                update.changed_bars,
                update.bars
            ));
        }
        if ctx.program_id.is_unset() {
            return Err(illegal_state!("tick on an unidentified instance"));
        }
        if ctx.module_type.is_library() {
            return Err(illegal_state!("tick called with a library context"));
        }
        if !matches!(ctx.core_function, CoreFunction::Init | CoreFunction::Tick) {
            return Err(illegal_state!(
                "tick in phase {}, expected Init or Tick",
                ctx.core_function
            ));
        }

        let chain = self.registry.get(ctx.program_id)?;
        if chain.main_is_empty()? {
            return Err(illegal_state!(
                "tick on chain {} with vacated main slot",
                ctx.program_id
            ));
        }

        let thread = current_thread_id();
        ctx.core_function = CoreFunction::Tick;
        ctx.ticks += 1;
        ctx.tick_sequence = update.tick_sequence;
        ctx.bars = update.bars;
        ctx.changed_bars = update.changed_bars;
        ctx.series = update.series;
        ctx.server_time = update.server_time;
        ctx.bid = update.bid;
        ctx.ask = update.ask;
        ctx.thread = thread;

        chain.with_main(|main| *main = ctx.clone())?;
        chain.with_master(|master| {
            master.core_function = CoreFunction::Tick;
            master.ticks = ctx.ticks;
            master.tick_sequence = ctx.tick_sequence;
            master.server_time = ctx.server_time;
            master.bid = ctx.bid;
            master.ask = ctx.ask;
            master.thread = thread;
        })?;
        self.threads.link(thread, ctx.program_id)?;
        Ok(())
    }

    /// Synchronize a main module's deinitialization.
    ///
    /// Moves the phase to `Deinit` and records the uninit reason; the chain slot is not
    /// cleared here - that is the explicit [leave](LifecycleResolver::leave_context).
    ///
    /// # Errors
    /// [`Error::IllegalState`] on an unidentified instance, a vacated main slot or an
    /// out-of-phase call.
    pub fn main_deinit(&self, ctx: &mut ExecutionContext, uninit_reason: UninitReason) -> Result<()> {
        self.main_deinit_inner(ctx, uninit_reason)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn main_deinit_inner(
        &self,
        ctx: &mut ExecutionContext,
        uninit_reason: UninitReason,
    ) -> Result<()> {
        if ctx.program_id.is_unset() {
            return Err(illegal_state!("deinit on an unidentified instance"));
        }
        if ctx.module_type.is_library() {
            return Err(illegal_state!("main deinit called with a library context"));
        }
        if !matches!(ctx.core_function, CoreFunction::Init | CoreFunction::Tick) {
            return Err(illegal_state!(
                "deinit in phase {}, expected Init or Tick",
                ctx.core_function
            ));
        }

        let chain = self.registry.get(ctx.program_id)?;
        if chain.main_is_empty()? {
            return Err(illegal_state!(
                "deinit on chain {} with vacated main slot",
                ctx.program_id
            ));
        }

        let thread = current_thread_id();
        ctx.core_function = CoreFunction::Deinit;
        ctx.uninit_reason = uninit_reason;
        ctx.thread = thread;

        chain.with_main(|main| *main = ctx.clone())?;
        chain.with_master(|master| {
            master.core_function = CoreFunction::Deinit;
            master.uninit_reason = uninit_reason;
        })?;
        self.threads.link(thread, ctx.program_id)?;
        Ok(())
    }

    /// Synchronize a library module's initialization.
    ///
    /// A brand-new library adopts the calling thread's linked instance; a library
    /// re-entering on the UI thread during its main module's limbo cycle only refreshes
    /// phase, reason and market context; a library the tester reused across consecutive
    /// runs of the same program is migrated to the matching partial chain (which is
    /// created here when absent).
    ///
    /// # Errors
    /// [`Error::IllegalState`] when no instance is linked to the calling thread, on
    /// module-name mismatches, or when the target instance has finished outside test
    /// mode.
    pub fn lib_init(&self, ctx: &mut ExecutionContext, request: &LibInitRequest<'_>) -> Result<()> {
        self.lib_init_inner(ctx, request)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn lib_init_inner(&self, ctx: &mut ExecutionContext, request: &LibInitRequest<'_>) -> Result<()> {
        if request.module_name.is_empty() {
            return Err(invalid_parameter!("module name must not be empty"));
        }
        if request.symbol.is_empty() {
            return Err(invalid_parameter!("symbol must not be empty"));
        }
        if request.timeframe == 0 {
            return Err(invalid_parameter!("timeframe must be positive"));
        }

        let thread = current_thread_id();

        if ctx.program_id.is_unset() {
            // Brand-new library: it belongs to whatever instance the calling thread
            // executes, reachable only through the thread link.
            let owner = self.threads.last_program(thread).ok_or_else(|| {
                illegal_state!(
                    "library '{}' loaded on a thread with no linked instance",
                    request.module_name
                )
            })?;
            let chain = self.registry.get(owner)?;
            if chain.is_finished() {
                return Err(illegal_state!(
                    "library '{}' cannot attach to finished instance {}",
                    request.module_name,
                    owner
                ));
            }

            let mut lib = chain.snapshot_master()?;
            lib.program_id = owner;
            lib.last_error = None;
            lib.last_warning = None;
            Self::stamp_library(&mut lib, request, thread);
            chain.append_library(lib.clone());
            *ctx = lib;
        } else {
            if !ctx.module_type.is_library() {
                return Err(illegal_state!("lib init called with a main-module context"));
            }
            if ctx.module_name != request.module_name {
                return Err(illegal_state!(
                    "lib init for '{}' does not match context of '{}'",
                    request.module_name,
                    ctx.module_name
                ));
            }

            let chain = self.registry.get(ctx.program_id)?;
            let master_testing = chain.read_master(|master| master.testing)?;

            if self.threads.is_ui_thread(thread) && !chain.is_finished() {
                // Re-entry while the main module cycles through limbo on this chart:
                // refresh phase, reason and market context only.
                ctx.core_function = CoreFunction::Init;
                ctx.uninit_reason = request.uninit_reason;
                ctx.symbol = request.symbol.to_string();
                ctx.timeframe = request.timeframe;
                ctx.thread = thread;

                match chain.find_library(&ctx.module_name)? {
                    Some(slot) => chain.with_library(slot, |lib| *lib = ctx.clone())?,
                    None => {
                        chain.append_library(ctx.clone());
                    }
                }
            } else if chain.is_finished() && master_testing {
                // The tester reused this library for the next run of the same program:
                // move it to the partial chain awaiting that run's main module.
                let _guard = self.registry.sync_guard()?;

                let old_master = chain.snapshot_master()?;
                let target = match self.find_partial_chain(&old_master.program_name)? {
                    Some(target) => target,
                    None => {
                        let mut partial = old_master;
                        partial.core_function = CoreFunction::Init;
                        partial.ticks = 0;
                        partial.thread = thread;
                        partial.last_error = None;
                        partial.last_warning = None;
                        self.registry.allocate(partial)?
                    }
                };

                if let Some(slot) = chain.find_library(request.module_name)? {
                    chain.clear_library(slot)?;
                }
                ctx.program_id = target.program_id();
                Self::stamp_library(ctx, request, thread);
                target.append_library(ctx.clone());
            } else if !chain.is_finished() {
                // Same-instance re-initialization (e.g. after recompilation).
                Self::stamp_library(ctx, request, thread);
                match chain.find_library(request.module_name)? {
                    Some(slot) => chain.with_library(slot, |lib| *lib = ctx.clone())?,
                    None => {
                        chain.append_library(ctx.clone());
                    }
                }
            } else {
                return Err(illegal_state!(
                    "library '{}' re-entered finished non-test instance {}",
                    request.module_name,
                    ctx.program_id
                ));
            }
        }

        self.threads.link(thread, ctx.program_id)?;
        Ok(())
    }

    /// Synchronize a library module's deinitialization.
    ///
    /// Mirrors [`LifecycleResolver::main_deinit`] but only touches the library's own
    /// slot; master state is untouched.
    ///
    /// # Errors
    /// [`Error::IllegalState`] on an unidentified or detached library or an out-of-phase
    /// call.
    pub fn lib_deinit(&self, ctx: &mut ExecutionContext, uninit_reason: UninitReason) -> Result<()> {
        self.lib_deinit_inner(ctx, uninit_reason)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn lib_deinit_inner(
        &self,
        ctx: &mut ExecutionContext,
        uninit_reason: UninitReason,
    ) -> Result<()> {
        if ctx.program_id.is_unset() {
            return Err(illegal_state!("lib deinit on an unidentified instance"));
        }
        if !ctx.module_type.is_library() {
            return Err(illegal_state!("lib deinit called with a main-module context"));
        }
        if !matches!(ctx.core_function, CoreFunction::Init | CoreFunction::Tick) {
            return Err(illegal_state!(
                "lib deinit in phase {}, expected Init or Tick",
                ctx.core_function
            ));
        }

        let chain = self.registry.get(ctx.program_id)?;
        let slot = chain.find_library(&ctx.module_name)?.ok_or_else(|| {
            illegal_state!(
                "library '{}' not attached to chain {}",
                ctx.module_name,
                ctx.program_id
            )
        })?;

        let thread = current_thread_id();
        ctx.core_function = CoreFunction::Deinit;
        ctx.uninit_reason = uninit_reason;
        ctx.thread = thread;

        chain.with_library(slot, |lib| *lib = ctx.clone())?;
        self.threads.link(thread, ctx.program_id)?;
        Ok(())
    }

    /// Release a module's chain slot when the module is about to drop its context copy.
    ///
    /// For main modules the durable state is written back to the master and the main
    /// slot is emptied; a non-cycling uninit reason additionally finishes the instance.
    /// For libraries the library slot is cleared. The phase is reset to `None` in `ctx`,
    /// so a second leave on the same context fails the phase check.
    ///
    /// # Errors
    /// [`Error::IllegalState`] unless the module is in phase `Deinit` and occupies the
    /// slot its identity claims (double leave is rejected, not a no-op).
    pub fn leave_context(&self, ctx: &mut ExecutionContext) -> Result<()> {
        self.leave_context_inner(ctx)
            .map_err(|err| Self::reject(ctx, err))
    }

    fn leave_context_inner(&self, ctx: &mut ExecutionContext) -> Result<()> {
        if ctx.program_id.is_unset() {
            return Err(illegal_state!("leave on an unidentified instance"));
        }
        if ctx.core_function != CoreFunction::Deinit {
            return Err(illegal_state!(
                "leave in phase {}, expected Deinit",
                ctx.core_function
            ));
        }

        let chain = self.registry.get(ctx.program_id)?;

        if ctx.module_type.is_library() {
            let slot = chain.find_library(&ctx.module_name)?.ok_or_else(|| {
                illegal_state!(
                    "library '{}' not attached to chain {}",
                    ctx.module_name,
                    ctx.program_id
                )
            })?;
            chain.clear_library(slot)?;
        } else {
            let main = chain.snapshot_main()?.ok_or_else(|| {
                illegal_state!("main slot of chain {} already vacated", ctx.program_id)
            })?;
            if main.module_name != ctx.module_name {
                return Err(illegal_state!(
                    "leave for '{}' does not match attached main module '{}'",
                    ctx.module_name,
                    main.module_name
                ));
            }

            // The master is the only copy that survives the gap; write the durable
            // state back before the host reclaims the block.
            chain.with_master(|master| {
                master.core_function = CoreFunction::None;
                master.uninit_reason = ctx.uninit_reason;
                master.init_reason = ctx.init_reason;
                master.ticks = ctx.ticks;
                master.symbol = ctx.symbol.clone();
                master.timeframe = ctx.timeframe;
                master.testing = ctx.testing;
                master.thread = ctx.thread;
            })?;
            chain.clear_main()?;
            if !ctx.uninit_reason.is_cycling() {
                chain.mark_finished();
            }
        }

        ctx.core_function = CoreFunction::None;
        Ok(())
    }

    /// Search the registry for a limbo instance matching the probe.
    ///
    /// Read-only; absence is not an error - it signals a genuinely new instance. The
    /// resolver performs the same scan under the synchronization guard before committing
    /// a resumption.
    ///
    /// # Errors
    /// Returns [`Error::Lock`] if a chain lock is poisoned.
    pub fn find_limbo_candidate(
        &self,
        window: WindowHandle,
        program_name: &str,
        uninit_reason: UninitReason,
    ) -> Result<Option<ProgramId>> {
        self.scan_limbo(&LimboProbe {
            window,
            program_name,
            uninit_reason,
        })
    }

    /// Linear registry scan for a limbo candidate; first match wins.
    fn scan_limbo(&self, probe: &LimboProbe<'_>) -> Result<Option<ProgramId>> {
        let ui_thread = self.threads.ui_thread();
        for chain in self.registry.iter() {
            let finished = chain.is_finished();
            let main_empty = chain.main_is_empty()?;
            let matched = chain.read_master(|master| {
                rules::is_limbo_candidate(master, finished, main_empty, ui_thread, probe)
            })?;
            if matched {
                return Ok(Some(chain.program_id()));
            }
        }
        Ok(None)
    }

    /// The calling thread's previous instance, if it is a partial chain for
    /// `program_name`.
    fn partial_for_thread(
        &self,
        thread: OsThreadId,
        program_name: &str,
    ) -> Result<Option<ProgramId>> {
        let Some(previous) = self.threads.last_program(thread) else {
            return Ok(None);
        };
        let Some(chain) = self.registry.try_get(previous) else {
            return Ok(None);
        };
        let main_empty = chain.main_is_empty()?;
        let matched = chain
            .read_master(|master| rules::is_partial_chain(master, main_empty, program_name))?;
        Ok(matched.then(|| chain.program_id()))
    }

    /// Linear registry scan for a partial chain awaiting `program_name`'s main module.
    fn find_partial_chain(&self, program_name: &str) -> Result<Option<Arc<ContextChain>>> {
        for chain in self.registry.iter() {
            let main_empty = chain.main_is_empty()?;
            let matched = chain
                .read_master(|master| rules::is_partial_chain(master, main_empty, program_name))?;
            if matched {
                return Ok(Some(chain));
            }
        }
        Ok(None)
    }

    /// Write the per-call fields of a main-module init into `ctx`.
    ///
    /// Identity fields (type, names, flags, mode booleans, chart linkage) are stamped
    /// only while `stamp_identity` is set - for fresh memory; a re-init on retained
    /// memory keeps them.
    fn stamp_main(
        ctx: &mut ExecutionContext,
        request: &MainInitRequest<'_>,
        thread: OsThreadId,
        init_reason: InitReason,
        stamp_identity: bool,
    ) {
        ctx.core_function = CoreFunction::Init;
        ctx.init_reason = Some(init_reason);
        ctx.uninit_reason = request.uninit_reason;
        ctx.symbol = request.symbol.to_string();
        ctx.timeframe = request.timeframe;
        ctx.digits = request.digits;
        ctx.point = request.point;
        ctx.thread = thread;

        if stamp_identity {
            ctx.program_type = request.program_type;
            ctx.module_type = ModuleType::from(request.program_type);
            ctx.program_name = request.program_name.to_string();
            ctx.module_name = request.program_name.to_string();
            ctx.init_flags = request.init_flags;
            ctx.deinit_flags = request.deinit_flags;
            ctx.testing = request.testing;
            ctx.visual_mode = request.visual_mode;
            ctx.optimization = request.optimization;
            ctx.window = request.window;
            ctx.drop_origin = request.drop_origin;
        }
    }

    /// Write the per-call fields of a library init into `ctx`.
    fn stamp_library(ctx: &mut ExecutionContext, request: &LibInitRequest<'_>, thread: OsThreadId) {
        ctx.module_type = ModuleType::Library;
        ctx.module_name = request.module_name.to_string();
        ctx.core_function = CoreFunction::Init;
        ctx.uninit_reason = request.uninit_reason;
        ctx.init_flags = request.init_flags;
        ctx.deinit_flags = request.deinit_flags;
        ctx.symbol = request.symbol.to_string();
        ctx.timeframe = request.timeframe;
        ctx.digits = request.digits;
        ctx.point = request.point;
        ctx.optimization = request.optimization;
        ctx.thread = thread;
    }

    /// Record a failure on the affected context and hand the error back to the caller.
    fn reject(ctx: &mut ExecutionContext, err: Error) -> Error {
        ctx.record_error(err.status(), err.to_string());
        err
    }
}

impl Default for LifecycleResolver {
    fn default() -> Self {
        Self::new()
    }
}
