//! Process subsystem error types

use core::fmt;

/// Errors surfaced by lifecycle and signal operations.
///
/// Every fallible operation in this crate reports failure through this
/// type; nothing panics across a component boundary. The Terminator is
/// the one non-failing path and therefore has no error to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free process-table slot, or address-space duplication failed
    /// mid-fork. Always surfaced whole: no partial PCB stays visible.
    ResourceExhausted,
    /// Signal send with mismatched effective uid and no superuser
    /// privilege. Nothing was mutated.
    PermissionDenied,
    /// Signal number out of range, a handler for the unmaskable
    /// terminate signal, a stale slot handle, or a malformed selector.
    InvalidArgument,
    /// The caller has no child matching the wait selector.
    NoChild,
    /// A blocked wait was woken by a signal other than SIGCHLD.
    Interrupted,
    /// No process with the requested pid.
    NotFound,
    /// User memory was unreadable or unwritable during frame work.
    Fault,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceExhausted => write!(f, "resource exhausted"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::NoChild => write!(f, "no matching child"),
            Error::Interrupted => write!(f, "interrupted"),
            Error::NotFound => write!(f, "no such process"),
            Error::Fault => write!(f, "bad user address"),
        }
    }
}

/// Result type for process-core operations
pub type Result<T> = core::result::Result<T, Error>;
