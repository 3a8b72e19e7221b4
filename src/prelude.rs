//! # hostsync Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! hostsync library. Import this module to get quick access to the essential types for
//! synchronizing hosted program instances.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hostsync::prelude::*;
//!
//! let resolver = LifecycleResolver::new();
//! let mut ctx = ExecutionContext::empty();
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hostsync operations
pub use crate::Error;

/// The result type used throughout hostsync
pub use crate::Result;

/// Stable numeric result codes shared with the host glue
pub use crate::StatusCode;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The lifecycle resolver driving the per-call synchronization protocol
pub use crate::LifecycleResolver;

/// Request and update records consumed by the entry points
pub use crate::{LibInitRequest, MainInitRequest, TickUpdate};

/// Outcome of the main-module identity resolution
pub use crate::{LimboProbe, MainInitDecision};

// ================================================================================================
// Execution State
// ================================================================================================

/// Per-module state record and its vocabulary
pub use crate::context::{
    CoreFunction, DeinitFlags, ExecutionContext, InitFlags, InitReason, ModuleType, OsThreadId,
    ProgramId, ProgramType, SeriesHandle, UninitReason, WindowHandle,
};

// ================================================================================================
// Registry
// ================================================================================================

/// Process-wide instance bookkeeping
pub use crate::registry::{current_thread_id, ContextChain, ProgramRegistry, ThreadLinkTable};
