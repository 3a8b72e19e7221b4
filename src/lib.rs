// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # hostsync
//!
//! The lifecycle-synchronization core of a native extension that tracks the state of many
//! independently loaded hosted program instances inside an external, single-process,
//! multi-threaded host runtime.
//!
//! The host does not give the extension a stable handle to a program's memory across
//! lifecycle transitions - it may deallocate and later reallocate a program's private
//! state at will. `hostsync` is therefore the durable source of truth for each program's
//! identity, its relationships (main module plus attached library modules) and its
//! configuration, and reconciles the host's possibly wrong or ambiguous lifecycle
//! signals into one unambiguous lifecycle event.
//!
//! ## Features
//!
//! - **Durable identity** - Program ids are assigned once, monotonically, and survive
//!   host-side re-allocation of the per-call memory
//! - **Limbo resumption** - Instances whose memory was released between deinit and the
//!   next init are recognized and restored from their master copy
//! - **Test-run library reuse** - Libraries the host's tester carries across
//!   consecutive runs of the same program are migrated to the new instance
//! - **Lock-free reads** - Registry and thread-table lookups never block; only
//!   structural growth and identity resolution take short locks
//! - **Explicit errors** - Every entry point validates before it commits and reports
//!   through a fixed status-code taxonomy
//!
//! ## Quick Start
//!
//! ```rust
//! use hostsync::prelude::*;
//!
//! let resolver = LifecycleResolver::new();
//!
//! // The host hands in a freshly allocated per-call block for an unidentified module.
//! let mut ctx = ExecutionContext::empty();
//! resolver.main_init(
//!     &mut ctx,
//!     &MainInitRequest {
//!         program_type: ProgramType::Expert,
//!         program_name: "Baseline",
//!         uninit_reason: UninitReason::Undefined,
//!         init_flags: InitFlags::empty(),
//!         deinit_flags: DeinitFlags::empty(),
//!         symbol: "EURUSD",
//!         timeframe: 60,
//!         digits: 5,
//!         point: 0.00001,
//!         testing: false,
//!         visual_mode: false,
//!         optimization: false,
//!         super_context: None,
//!         window: WindowHandle::new(0x10),
//!         drop_origin: None,
//!     },
//! )?;
//!
//! // The instance now has a durable identity the registry will recognize again.
//! assert_eq!(ctx.program_id().value(), 1);
//! # Ok::<(), hostsync::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `hostsync` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`context`] - The per-module [`ExecutionContext`] state record and its vocabulary
//! - [`registry`] - The process-wide [`ProgramRegistry`], per-instance
//!   [`ContextChain`]s and the [`ThreadLinkTable`]
//! - [`sync`] - The [`LifecycleResolver`] entry points and the pure decision rules
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### Ownership Model
//!
//! The host owns the memory behind every per-call context; the core owns the program
//! ids and the registry. The relationship is "weak reference by id plus explicit
//! copy-in/copy-out" - the core never holds a long-lived borrow of host memory and
//! never frees it.
//!
//! ### Concurrency
//!
//! Any entry point may be invoked from any host thread at any time. Backing storage is
//! append-only and block-allocated (`boxcar::Vec`, `crossbeam_skiplist::SkipMap`), so
//! references issued earlier remain valid while other threads grow the collections.
//! Structural growth takes one short lock; every identity-resolving search-then-commit
//! step is serialized by a dedicated registry guard, so concurrent resumption of the
//! same candidate is impossible by construction. No entry point performs I/O or blocks
//! beyond these critical sections.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result) and map onto a stable
//! [`StatusCode`] taxonomy for the host glue:
//!
//! ```rust
//! use hostsync::{prelude::*, StatusCode};
//!
//! let resolver = LifecycleResolver::new();
//! let mut ctx = ExecutionContext::empty();
//!
//! // Ticking an unidentified instance violates the phase machine.
//! let err = resolver.main_tick(&mut ctx, &TickUpdate {
//!     series: SeriesHandle::NULL,
//!     bars: 0,
//!     changed_bars: 0,
//!     tick_sequence: 0,
//!     server_time: 0,
//!     bid: 0.0,
//!     ask: 0.0,
//! }).unwrap_err();
//! assert_eq!(err.status(), StatusCode::IllegalState);
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use hostsync::prelude::*;
///
/// let resolver = LifecycleResolver::new();
/// let ctx = ExecutionContext::empty();
/// ```
pub mod prelude;

/// Per-module execution state and the lifecycle vocabulary.
///
/// The [`context::ExecutionContext`] is the state record of one module instance; the
/// accompanying enums and newtypes ([`context::ProgramId`], [`context::CoreFunction`],
/// [`context::UninitReason`], …) are shared by every component of the core.
pub mod context;

/// Process-wide instance bookkeeping.
///
/// The [`registry::ProgramRegistry`] stores one [`registry::ContextChain`] per instance
/// under a stable, never-reused id; the [`registry::ThreadLinkTable`] maps each host
/// thread to the instance it executed last.
pub mod registry;

/// Lifecycle resolution and the per-call synchronization protocol.
///
/// The [`sync::LifecycleResolver`] exposes the entry points the host glue invokes around
/// every module call and decides - with no retry path - why an instance is starting or
/// stopping and whether it continues previous state.
pub mod sync;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::{Error, StatusCode};

pub use context::ExecutionContext;
pub use registry::{ContextChain, ProgramRegistry, ThreadLinkTable};
pub use sync::{
    LibInitRequest, LifecycleResolver, LimboProbe, MainInitDecision, MainInitRequest, TickUpdate,
};

pub use context::{
    CoreFunction, DeinitFlags, InitFlags, InitReason, ModuleType, OsThreadId, ProgramId,
    ProgramType, SeriesHandle, UninitReason, WindowHandle,
};
