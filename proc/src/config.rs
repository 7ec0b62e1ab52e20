//! Subsystem configuration constants.
//!
//! Compile-time limits for the process core. Values here bound table
//! sizes and per-process resources; embedders that need different limits
//! construct the table with an explicit capacity instead.

/// Default number of process-table slots.
pub const MAX_TASKS: usize = 64;

/// File-descriptor slots per process.
pub const MAX_FILES: usize = 16;

/// Default scheduling priority assigned to fresh processes.
///
/// The scheduler owns the interpretation; this core only copies and
/// resets the field.
pub const DEFAULT_PRIORITY: i32 = 15;
