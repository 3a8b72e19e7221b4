//! End-to-end lifecycle scenarios driven through the public API.
//!
//! These tests replay the call sequences a real host produces: instances cycling through
//! limbo on chart changes, the tester reusing libraries across consecutive runs, and
//! concurrent host threads attaching libraries to one instance.

use std::sync::{Arc, Mutex};

use hostsync::prelude::*;

fn main_request<'a>(
    program_type: ProgramType,
    name: &'a str,
    symbol: &'a str,
    window: WindowHandle,
    uninit_reason: UninitReason,
    testing: bool,
) -> MainInitRequest<'a> {
    MainInitRequest {
        program_type,
        program_name: name,
        uninit_reason,
        init_flags: InitFlags::empty(),
        deinit_flags: DeinitFlags::empty(),
        symbol,
        timeframe: 60,
        digits: 5,
        point: 0.00001,
        testing,
        visual_mode: false,
        optimization: false,
        super_context: None,
        window,
        drop_origin: None,
    }
}

fn lib_request(name: &str) -> LibInitRequest<'_> {
    LibInitRequest {
        module_name: name,
        uninit_reason: UninitReason::Undefined,
        init_flags: InitFlags::empty(),
        deinit_flags: DeinitFlags::empty(),
        symbol: "EURUSD",
        timeframe: 60,
        digits: 5,
        point: 0.00001,
        optimization: false,
    }
}

fn tick(sequence: u64) -> TickUpdate {
    TickUpdate {
        series: SeriesHandle::new(0x4000),
        bars: 1000,
        changed_bars: 1,
        tick_sequence: sequence,
        server_time: 1_700_000_000 + sequence as i64,
        bid: 1.0850,
        ask: 1.0851,
    }
}

/// Count how many occupied slots across all chains hold a library of the given name.
fn occupied_slots(resolver: &LifecycleResolver, module_name: &str) -> usize {
    let mut found = 0;
    for chain in resolver.registry().iter() {
        for index in 0..chain.library_slots() {
            if let Some(lib) = chain.snapshot_library(index).unwrap() {
                if lib.module_name() == module_name {
                    found += 1;
                }
            }
        }
    }
    found
}

#[test]
fn test_limbo_cycle_preserves_identity_and_tick_counter() {
    let resolver = LifecycleResolver::new();
    let window = WindowHandle::new(0x77);

    let mut ctx = ExecutionContext::empty();
    resolver
        .main_init(
            &mut ctx,
            &main_request(
                ProgramType::Indicator,
                "Trend",
                "EURUSD",
                window,
                UninitReason::Undefined,
                false,
            ),
        )
        .unwrap();
    let id = ctx.program_id();
    assert_eq!(id.value(), 1);

    for sequence in 1..=3 {
        resolver.main_tick(&mut ctx, &tick(sequence)).unwrap();
    }
    assert_eq!(ctx.ticks(), 3);

    // The host switches the chart timeframe: deinit, leave, memory is gone.
    resolver
        .main_deinit(&mut ctx, UninitReason::ChartChange)
        .unwrap();
    resolver.leave_context(&mut ctx).unwrap();

    let chain = resolver.registry().get(id).unwrap();
    assert!(chain.is_in_limbo().unwrap());
    assert_eq!(
        resolver
            .find_limbo_candidate(window, "Trend", UninitReason::ChartChange)
            .unwrap(),
        Some(id)
    );

    // The next init arrives with a brand-new block and no identity.
    let mut fresh = ExecutionContext::empty();
    resolver
        .main_init(
            &mut fresh,
            &main_request(
                ProgramType::Indicator,
                "Trend",
                "EURUSD",
                window,
                UninitReason::ChartChange,
                false,
            ),
        )
        .unwrap();

    assert_eq!(fresh.program_id(), id);
    assert_eq!(fresh.ticks(), 3);
    assert_eq!(fresh.init_reason(), Some(InitReason::TimeframeChange));
    assert!(!chain.is_in_limbo().unwrap());
    assert_eq!(resolver.registry().len(), 1);

    // The counter continues where the previous life stopped.
    resolver.main_tick(&mut fresh, &tick(4)).unwrap();
    assert_eq!(fresh.ticks(), 4);
    assert_eq!(chain.snapshot_master().unwrap().ticks(), 4);
}

#[test]
fn test_program_ids_are_unique_and_strictly_increasing() {
    let resolver = LifecycleResolver::new();
    let mut previous = 0;

    for (index, name) in ["First", "Second", "Third", "Fourth"].iter().enumerate() {
        let mut ctx = ExecutionContext::empty();
        resolver
            .main_init(
                &mut ctx,
                &main_request(
                    ProgramType::Expert,
                    name,
                    "EURUSD",
                    WindowHandle::new(0x10 + index as isize),
                    UninitReason::Undefined,
                    false,
                ),
            )
            .unwrap();
        assert!(ctx.program_id().value() > previous);
        previous = ctx.program_id().value();
    }
    assert_eq!(resolver.registry().len(), 4);
}

#[test]
fn test_double_leave_is_rejected() {
    let resolver = LifecycleResolver::new();
    let mut ctx = ExecutionContext::empty();
    resolver
        .main_init(
            &mut ctx,
            &main_request(
                ProgramType::Expert,
                "Baseline",
                "EURUSD",
                WindowHandle::new(0x11),
                UninitReason::Undefined,
                false,
            ),
        )
        .unwrap();
    resolver.main_tick(&mut ctx, &tick(1)).unwrap();
    resolver.main_deinit(&mut ctx, UninitReason::Remove).unwrap();

    resolver.leave_context(&mut ctx).unwrap();
    let err = resolver.leave_context(&mut ctx).unwrap_err();
    assert_eq!(err.status(), StatusCode::IllegalState);

    // The failure is recorded on the context for the owning module.
    assert_eq!(ctx.last_error().unwrap().0, StatusCode::IllegalState);
}

#[test]
fn test_chart_change_resumes_the_same_program() {
    let resolver = LifecycleResolver::new();
    let window = WindowHandle::new(0x200);

    let mut ctx = ExecutionContext::empty();
    resolver
        .main_init(
            &mut ctx,
            &main_request(
                ProgramType::Indicator,
                "Momentum",
                "EURUSD",
                window,
                UninitReason::Undefined,
                false,
            ),
        )
        .unwrap();
    let id = ctx.program_id();

    resolver.main_tick(&mut ctx, &tick(1)).unwrap();
    resolver
        .main_deinit(&mut ctx, UninitReason::ChartChange)
        .unwrap();
    resolver.leave_context(&mut ctx).unwrap();

    // Same window, same name, same uninit reason, but a different symbol: the chart
    // was switched to another market. Identity must survive, the reason must resolve
    // to a symbol change.
    let mut fresh = ExecutionContext::empty();
    resolver
        .main_init(
            &mut fresh,
            &main_request(
                ProgramType::Indicator,
                "Momentum",
                "GBPUSD",
                window,
                UninitReason::ChartChange,
                false,
            ),
        )
        .unwrap();

    assert_eq!(fresh.program_id(), id);
    assert_eq!(fresh.symbol(), "GBPUSD");
    assert_eq!(fresh.init_reason(), Some(InitReason::SymbolChange));
    assert_eq!(resolver.registry().len(), 1);

    // A mismatched probe never steals the identity.
    let mut other = ExecutionContext::empty();
    resolver
        .main_init(
            &mut other,
            &main_request(
                ProgramType::Indicator,
                "Momentum",
                "GBPUSD",
                WindowHandle::new(0x201),
                UninitReason::ChartChange,
                false,
            ),
        )
        .unwrap();
    assert_ne!(other.program_id(), id);
}

#[test]
fn test_concurrent_threads_attach_libraries_to_one_chain() {
    let resolver = Arc::new(LifecycleResolver::new());

    let main_ctx = Arc::new(Mutex::new(ExecutionContext::empty()));
    resolver
        .main_init(
            &mut main_ctx.lock().unwrap(),
            &main_request(
                ProgramType::Expert,
                "Baseline",
                "EURUSD",
                WindowHandle::new(0x300),
                UninitReason::Undefined,
                false,
            ),
        )
        .unwrap();
    let id = main_ctx.lock().unwrap().program_id();

    let mut handles = Vec::new();
    for (sequence, name) in [(1u64, "liba"), (2u64, "libb")] {
        let resolver = Arc::clone(&resolver);
        let main_ctx = Arc::clone(&main_ctx);
        handles.push(std::thread::spawn(move || {
            // The host runs the main module's tick on this thread first, which links
            // the thread to the instance…
            {
                let mut guard = main_ctx.lock().unwrap();
                resolver.main_tick(&mut guard, &tick(sequence)).unwrap();
            }
            // …then the library's own init arrives on the same thread.
            let mut lib = ExecutionContext::empty();
            resolver.lib_init(&mut lib, &lib_request(name)).unwrap();
            lib
        }));
    }

    let libs: Vec<ExecutionContext> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let chain = resolver.registry().get(id).unwrap();
    assert_eq!(chain.library_count(), 2);
    for lib in &libs {
        assert_eq!(lib.program_id(), id);
        assert!(chain.find_library(lib.module_name()).unwrap().is_some());
    }

    // Neither the master nor the main slot was corrupted by the concurrent appends.
    assert_eq!(chain.snapshot_master().unwrap().program_name(), "Baseline");
    let main = chain.snapshot_main().unwrap().unwrap();
    assert_eq!(main.program_name(), "Baseline");
    assert_eq!(main.ticks(), 2);
}

#[test]
fn test_tester_reuse_migrates_libraries_to_the_new_run() {
    let resolver = LifecycleResolver::new();
    let window = WindowHandle::new(0x400);

    // First test run: strategy B with two attached libraries.
    let mut main = ExecutionContext::empty();
    resolver
        .main_init(
            &mut main,
            &main_request(
                ProgramType::Expert,
                "Strategy",
                "EURUSD",
                window,
                UninitReason::Undefined,
                true,
            ),
        )
        .unwrap();
    let old_id = main.program_id();

    let mut lib_a = ExecutionContext::empty();
    resolver.lib_init(&mut lib_a, &lib_request("signals")).unwrap();
    let mut lib_b = ExecutionContext::empty();
    resolver.lib_init(&mut lib_b, &lib_request("orders")).unwrap();

    resolver.main_tick(&mut main, &tick(1)).unwrap();
    resolver
        .main_deinit(&mut main, UninitReason::Undefined)
        .unwrap();
    resolver.leave_context(&mut main).unwrap();

    let old_chain = resolver.registry().get(old_id).unwrap();
    assert!(old_chain.is_finished());
    assert_eq!(old_chain.library_count(), 2);

    // The next test run starts; the host reuses both library modules, whose contexts
    // still point at the finished instance.
    resolver.lib_init(&mut lib_a, &lib_request("signals")).unwrap();
    let new_id = lib_a.program_id();
    assert_ne!(new_id, old_id);

    resolver.lib_init(&mut lib_b, &lib_request("orders")).unwrap();
    assert_eq!(lib_b.program_id(), new_id);

    // Both libraries live on the new chain now and are gone from the old one.
    let new_chain = resolver.registry().get(new_id).unwrap();
    assert_eq!(new_chain.library_count(), 2);
    assert_eq!(old_chain.library_count(), 0);
    assert_eq!(occupied_slots(&resolver, "signals"), 1);
    assert_eq!(occupied_slots(&resolver, "orders"), 1);

    // The new run's main module arrives with a fresh block and adopts the partial
    // chain the libraries created.
    let mut fresh = ExecutionContext::empty();
    resolver
        .main_init(
            &mut fresh,
            &main_request(
                ProgramType::Expert,
                "Strategy",
                "EURUSD",
                window,
                UninitReason::Undefined,
                true,
            ),
        )
        .unwrap();
    assert_eq!(fresh.program_id(), new_id);
    assert_eq!(fresh.init_reason(), Some(InitReason::Program));
    assert_eq!(fresh.ticks(), 0);
    assert!(!new_chain.main_is_empty().unwrap());

    // The new run ticks from zero.
    resolver.main_tick(&mut fresh, &tick(1)).unwrap();
    assert_eq!(fresh.ticks(), 1);
}

#[test]
fn test_library_leave_detaches_exactly_one_slot() {
    let resolver = LifecycleResolver::new();
    let mut main = ExecutionContext::empty();
    resolver
        .main_init(
            &mut main,
            &main_request(
                ProgramType::Expert,
                "Baseline",
                "EURUSD",
                WindowHandle::new(0x500),
                UninitReason::Undefined,
                false,
            ),
        )
        .unwrap();

    let mut lib = ExecutionContext::empty();
    resolver.lib_init(&mut lib, &lib_request("signals")).unwrap();
    assert_eq!(occupied_slots(&resolver, "signals"), 1);

    resolver.lib_deinit(&mut lib, UninitReason::Remove).unwrap();
    resolver.leave_context(&mut lib).unwrap();
    assert_eq!(occupied_slots(&resolver, "signals"), 0);

    // A second leave of the already detached library is rejected.
    let err = resolver.leave_context(&mut lib).unwrap_err();
    assert_eq!(err.status(), StatusCode::IllegalState);
}
