//! Tine process lifecycle and signal delivery.
//!
//! The process table, fork/exit/waitpid, and a minimal "unreliable
//! signals" subsystem: 32 signals, one pending bit each, one-shot
//! handlers, user-stack delivery frames. Everything machine- and
//! embedder-specific sits behind the [`Platform`] trait; the core is
//! plain data transformation over the table and is tested as such.
//!
//! # Modules
//!
//! - `table`: PCB arena, pid allocation, slot handles
//! - `fork` / `exit` / `wait`: process lifecycle
//! - `signal`: signal sets, actions, configuration, kill
//! - `deliver`: frame fabrication, do_signal, sigreturn
//! - `jobctl`: sessions, process groups, stop/continue
//! - `syscall`: i64/errno entry points for a trap dispatcher
//!
//! Every operation takes the caller's [`SlotId`] explicitly; there is
//! no ambient "current process". A stale handle (the slot was reaped
//! and reused) fails the lookup instead of touching the wrong process.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod context;
pub mod deliver;
pub mod error;
pub mod exit;
pub mod fork;
pub mod jobctl;
pub mod platform;
pub mod signal;
pub mod syscall;
pub mod table;
pub mod wait;


pub use context::UserContext;
pub use error::{Error, Result};
pub use platform::{AsHandle, FileId, InodeId, Platform};
pub use table::{Pcb, Pid, ProcessState, ProcessTable, SharedTable, SlotId};
