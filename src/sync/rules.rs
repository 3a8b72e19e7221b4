//! Pure decision rules of the lifecycle resolver.
//!
//! The host's lifecycle signals are ambiguous and version-dependent, and a wrong answer
//! corrupts instance identity for the rest of the run - there is no retry path. The
//! resolver therefore evaluates an explicit, ordered set of guarded rules, and those
//! rules live here as pure functions of context snapshots: no registry access, no locks,
//! fully unit-testable without a live host.
//!
//! Rule order for a main-module initialization (first match wins):
//!
//! 1. [`is_limbo_candidate`] - an instance of the same identity is waiting between
//!    deinitialization and reinitialization; resume it.
//! 2. [`is_partial_chain`] - a chain created ahead of its main module by a reused test
//!    library is waiting for adoption; adopt it.
//! 3. Otherwise the call describes a brand-new instance.

use crate::context::{
    CoreFunction, ExecutionContext, InitReason, OsThreadId, ProgramId, UninitReason, WindowHandle,
};

/// Identity facts of a main-module init call, used to match limbo candidates.
#[derive(Debug, Clone, Copy)]
pub struct LimboProbe<'a> {
    /// Host chart window of the initializing module
    pub window: WindowHandle,
    /// Name of the initializing program
    pub program_name: &'a str,
    /// Uninit reason the host reported for the previous life
    pub uninit_reason: UninitReason,
}

/// Outcome of the main-module identity resolution.
///
/// Produced once per `main_init` call, in the rule order above; the resolver commits the
/// matching protocol without a fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainInitDecision {
    /// Resume the identified instance out of limbo, restoring its master state
    ResumeLimbo(ProgramId),
    /// Adopt the partial chain a reused test library created ahead of this module
    ResumePartialTest(ProgramId),
    /// Allocate a brand-new instance
    Fresh,
}

/// Order the two candidate lookups into the final decision.
#[must_use]
pub(crate) fn decide_main_init(
    limbo: Option<ProgramId>,
    partial: Option<ProgramId>,
) -> MainInitDecision {
    match (limbo, partial) {
        (Some(id), _) => MainInitDecision::ResumeLimbo(id),
        (None, Some(id)) => MainInitDecision::ResumePartialTest(id),
        (None, None) => MainInitDecision::Fresh,
    }
}

/// `true` if a chain's master identifies the instance the probe is initializing.
///
/// A limbo candidate is an indicator-like instance owned by the host's dispatch thread,
/// on the same window, with the same name and the same uninit reason, whose main slot is
/// empty and whose master phase is `None` - i.e. it is between deinit and init. Finished
/// instances never match.
#[must_use]
pub(crate) fn is_limbo_candidate(
    master: &ExecutionContext,
    finished: bool,
    main_empty: bool,
    ui_thread: Option<OsThreadId>,
    probe: &LimboProbe<'_>,
) -> bool {
    !finished
        && main_empty
        && master.core_function == CoreFunction::None
        && master.program_type.is_indicator()
        && ui_thread == Some(master.thread)
        && master.window == probe.window
        && master.program_name == probe.program_name
        && master.uninit_reason == probe.uninit_reason
}

/// `true` if a chain is a partial chain awaiting the main module named `program_name`.
///
/// A partial chain is created by a library call during test-run reuse: its master is a
/// test-mode copy stuck in phase `Init` while the main slot is still empty.
#[must_use]
pub(crate) fn is_partial_chain(
    master: &ExecutionContext,
    main_empty: bool,
    program_name: &str,
) -> bool {
    main_empty
        && master.core_function == CoreFunction::Init
        && master.testing
        && master.program_name == program_name
}

/// Resolve the initialization cause the hosted module will read back.
///
/// `previous` is the master of the resumed instance, if any; it disambiguates a reported
/// chart change into a symbol vs. a timeframe change and detects the
/// test-to-live transition.
#[must_use]
pub(crate) fn derive_init_reason(
    decision: MainInitDecision,
    uninit_reason: UninitReason,
    previous: Option<&ExecutionContext>,
    testing: bool,
    symbol: &str,
) -> InitReason {
    if let MainInitDecision::ResumePartialTest(_) = decision {
        return InitReason::Program;
    }
    if let MainInitDecision::ResumeLimbo(_) = decision {
        if let Some(master) = previous {
            if master.testing && !testing {
                return InitReason::ProgramAfterTest;
            }
        }
    }

    match uninit_reason {
        UninitReason::Parameters => InitReason::Parameters,
        UninitReason::Account => InitReason::AccountChange,
        UninitReason::Recompile => InitReason::Recompile,
        UninitReason::Template => InitReason::Template,
        UninitReason::ChartChange => match previous {
            Some(master) if master.symbol != symbol => InitReason::SymbolChange,
            Some(_) => InitReason::TimeframeChange,
            // No previous identity: the reported chart change belonged to someone else.
            None => InitReason::User,
        },
        UninitReason::Undefined
        | UninitReason::Remove
        | UninitReason::ChartClose
        | UninitReason::InitFailed
        | UninitReason::Close => {
            if testing {
                InitReason::Program
            } else {
                InitReason::User
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ProgramType, UninitReason};

    fn master(program_type: ProgramType, name: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::empty();
        ctx.program_type = program_type;
        ctx.program_name = name.to_string();
        ctx
    }

    #[test]
    fn test_decision_order() {
        let a = ProgramId::new(1);
        let b = ProgramId::new(2);

        assert_eq!(
            decide_main_init(Some(a), Some(b)),
            MainInitDecision::ResumeLimbo(a)
        );
        assert_eq!(
            decide_main_init(None, Some(b)),
            MainInitDecision::ResumePartialTest(b)
        );
        assert_eq!(decide_main_init(None, None), MainInitDecision::Fresh);
    }

    #[test]
    fn test_limbo_candidate_predicate() {
        let ui = OsThreadId::new(1);
        let probe = LimboProbe {
            window: WindowHandle::new(0x20),
            program_name: "Trend",
            uninit_reason: UninitReason::ChartChange,
        };

        let mut candidate = master(ProgramType::Indicator, "Trend");
        candidate.window = WindowHandle::new(0x20);
        candidate.uninit_reason = UninitReason::ChartChange;
        candidate.thread = ui;
        candidate.core_function = CoreFunction::None;

        assert!(is_limbo_candidate(&candidate, false, true, Some(ui), &probe));

        // Each guard is load-bearing.
        assert!(!is_limbo_candidate(&candidate, true, true, Some(ui), &probe));
        assert!(!is_limbo_candidate(&candidate, false, false, Some(ui), &probe));
        assert!(!is_limbo_candidate(&candidate, false, true, None, &probe));
        assert!(!is_limbo_candidate(
            &candidate,
            false,
            true,
            Some(OsThreadId::new(9)),
            &probe
        ));

        let mut wrong = candidate.clone();
        wrong.core_function = CoreFunction::Tick;
        assert!(!is_limbo_candidate(&wrong, false, true, Some(ui), &probe));

        let mut wrong = candidate.clone();
        wrong.program_type = ProgramType::Expert;
        assert!(!is_limbo_candidate(&wrong, false, true, Some(ui), &probe));

        let mut wrong = candidate.clone();
        wrong.window = WindowHandle::new(0x21);
        assert!(!is_limbo_candidate(&wrong, false, true, Some(ui), &probe));

        let mut wrong = candidate.clone();
        wrong.program_name = "Other".to_string();
        assert!(!is_limbo_candidate(&wrong, false, true, Some(ui), &probe));

        let mut wrong = candidate;
        wrong.uninit_reason = UninitReason::Parameters;
        assert!(!is_limbo_candidate(&wrong, false, true, Some(ui), &probe));
    }

    #[test]
    fn test_partial_chain_predicate() {
        let mut partial = master(ProgramType::Expert, "Strategy");
        partial.testing = true;
        partial.core_function = CoreFunction::Init;

        assert!(is_partial_chain(&partial, true, "Strategy"));
        assert!(!is_partial_chain(&partial, false, "Strategy"));
        assert!(!is_partial_chain(&partial, true, "Other"));

        let mut live = partial.clone();
        live.testing = false;
        assert!(!is_partial_chain(&live, true, "Strategy"));

        let mut running = partial;
        running.core_function = CoreFunction::Tick;
        assert!(!is_partial_chain(&running, true, "Strategy"));
    }

    #[test]
    fn test_init_reason_from_uninit_reason() {
        let fresh = MainInitDecision::Fresh;

        assert_eq!(
            derive_init_reason(fresh, UninitReason::Parameters, None, false, "EURUSD"),
            InitReason::Parameters
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::Account, None, false, "EURUSD"),
            InitReason::AccountChange
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::Recompile, None, false, "EURUSD"),
            InitReason::Recompile
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::Template, None, false, "EURUSD"),
            InitReason::Template
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::Undefined, None, false, "EURUSD"),
            InitReason::User
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::Undefined, None, true, "EURUSD"),
            InitReason::Program
        );
        assert_eq!(
            derive_init_reason(fresh, UninitReason::ChartChange, None, false, "EURUSD"),
            InitReason::User
        );
    }

    #[test]
    fn test_chart_change_split_by_market_context() {
        let resumed = MainInitDecision::ResumeLimbo(ProgramId::new(1));
        let mut previous = master(ProgramType::Indicator, "Trend");
        previous.symbol = "EURUSD".to_string();
        previous.timeframe = 60;

        assert_eq!(
            derive_init_reason(
                resumed,
                UninitReason::ChartChange,
                Some(&previous),
                false,
                "GBPUSD"
            ),
            InitReason::SymbolChange
        );
        assert_eq!(
            derive_init_reason(
                resumed,
                UninitReason::ChartChange,
                Some(&previous),
                false,
                "EURUSD"
            ),
            InitReason::TimeframeChange
        );
    }

    #[test]
    fn test_test_transitions() {
        let mut tested = master(ProgramType::Expert, "Strategy");
        tested.testing = true;

        // Resuming a test-mode master on a live chart is the after-test reload.
        assert_eq!(
            derive_init_reason(
                MainInitDecision::ResumeLimbo(ProgramId::new(1)),
                UninitReason::Undefined,
                Some(&tested),
                false,
                "EURUSD"
            ),
            InitReason::ProgramAfterTest
        );

        // Adopting a partial chain is always a programmatic start.
        assert_eq!(
            derive_init_reason(
                MainInitDecision::ResumePartialTest(ProgramId::new(2)),
                UninitReason::ChartChange,
                Some(&tested),
                true,
                "EURUSD"
            ),
            InitReason::Program
        );
    }
}
