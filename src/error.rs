use strum::{Display, FromRepr};
use thiserror::Error;

macro_rules! illegal_state {
    // Single string version
    ($msg:expr) => {
        crate::Error::IllegalState {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::IllegalState {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invalid_parameter {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidParameter {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidParameter {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every synchronization entry point validates its inputs and the structural invariants of the
/// registry before committing any mutation; on violation it returns one of these variants and
/// leaves all shared state untouched (validate-then-commit). The host decides how to react;
/// there is no retry path inside the core.
///
/// # Error Categories
///
/// - [`Error::InvalidParameter`] - Null/empty/out-of-range inputs, rejected before any state change
/// - [`Error::IllegalState`] - A registry, chain, or phase-machine invariant would be violated
/// - [`Error::Runtime`] - A host-environment inconsistency (e.g. an expected window is gone)
/// - [`Error::Lock`] - Thread synchronization failure (poisoned lock)
///
/// # Examples
///
/// ```rust
/// use hostsync::{Error, StatusCode};
///
/// fn report(result: hostsync::Result<()>) -> i32 {
///     match result {
///         Ok(()) => StatusCode::Success as i32,
///         Err(e) => {
///             eprintln!("sync failed: {}", e);
///             e.status() as i32
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied parameter is unusable.
    ///
    /// Raised for empty names/symbols, zero timeframes, and other inputs that can never
    /// describe a valid hosted module. Always rejected before any state mutation. The error
    /// includes the source location where the rejection was raised for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the offending parameter
    /// * `file` - Source file in which the rejection was raised
    /// * `line` - Source line in which the rejection was raised
    #[error("InvalidParameter - {file}:{line}: {message}")]
    InvalidParameter {
        /// The message to be printed for the InvalidParameter error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A structural invariant of the registry, a context chain, or the phase machine would be
    /// violated.
    ///
    /// Raised for unassigned program ids where one is required, chain-slot identity mismatches,
    /// unexpected phases (e.g. a second leave on an already vacated slot), and out-of-range
    /// registry indices. Never silently patched; the current protocol step is aborted.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file in which the violation was detected
    /// * `line` - Source line in which the violation was detected
    #[error("IllegalState - {file}:{line}: {message}")]
    IllegalState {
        /// The message to be printed for the IllegalState error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The host environment is inconsistent with what the call claims.
    ///
    /// Used when the core itself is coherent but the surrounding host state is not, for
    /// example a lifecycle call referring to a window the host no longer knows about.
    #[error("{0}")]
    Runtime(String),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically when a mutex or rwlock
    /// was poisoned by a panicking writer.
    #[error("Failed to lock target")]
    Lock,
}

impl Error {
    /// The stable status code reported to the host for this error.
    ///
    /// The multi-language glue that exposes the entry points returns plain integers; `0`
    /// denotes success and each taxonomy member has a fixed non-zero value.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidParameter { .. } => StatusCode::InvalidParameter,
            Error::IllegalState { .. } => StatusCode::IllegalState,
            Error::Runtime(_) => StatusCode::Runtime,
            Error::Lock => StatusCode::Lock,
        }
    }
}

/// Stable numeric result codes shared with the host glue.
///
/// Every entry point of the core reports one of these values across the language boundary.
/// [`StatusCode::Success`] is `0`; the non-zero members map 1:1 onto the [`Error`] taxonomy.
///
/// # Examples
///
/// ```rust
/// use hostsync::StatusCode;
///
/// assert_eq!(StatusCode::Success as i32, 0);
/// assert_eq!(StatusCode::from_repr(2), Some(StatusCode::IllegalState));
/// ```
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
pub enum StatusCode {
    /// The operation completed and all effects were committed
    Success = 0,
    /// A caller-supplied parameter was rejected before any state change
    InvalidParameter = 1,
    /// A structural invariant would have been violated; the step was aborted
    IllegalState = 2,
    /// The host environment contradicted the call
    Runtime = 3,
    /// A lock was poisoned
    Lock = 4,
}

impl StatusCode {
    /// `true` for [`StatusCode::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }
}
