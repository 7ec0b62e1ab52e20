//! Signal numbers, sets, actions, and the kill dispatcher.
//!
//! One pending bit per signal number, no queuing: delivering the same
//! signal twice before the target runs collapses into one delivery.
//! Configuration (`signal`, `sigaction`, `sigprocmask`) and the
//! permission-checked send paths live here; the actual delivery state
//! machine is in [`crate::deliver`].

use alloc::vec::Vec;
use core::fmt;
use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use bitflags::bitflags;
use log::trace;

use crate::error::{Error, Result};
use crate::table::{Pid, ProcessTable, SlotId};

// ─── Signal numbers ─────────────────────────────────────────────────

pub const SIGHUP: u32 = 1;
pub const SIGINT: u32 = 2;
pub const SIGQUIT: u32 = 3;
pub const SIGILL: u32 = 4;
pub const SIGTRAP: u32 = 5;
pub const SIGABRT: u32 = 6;
pub const SIGBUS: u32 = 7;
pub const SIGFPE: u32 = 8;
pub const SIGKILL: u32 = 9;
pub const SIGUSR1: u32 = 10;
pub const SIGSEGV: u32 = 11;
pub const SIGUSR2: u32 = 12;
pub const SIGPIPE: u32 = 13;
pub const SIGALRM: u32 = 14;
pub const SIGTERM: u32 = 15;
pub const SIGCHLD: u32 = 17;
pub const SIGCONT: u32 = 18;
pub const SIGSTOP: u32 = 19;
pub const SIGTSTP: u32 = 20;
pub const SIGTTIN: u32 = 21;
pub const SIGTTOU: u32 = 22;

/// Signals 1..=NSIG are valid; 0 is never a real signal.
pub const NSIG: usize = 32;

/// Check a signal number is in the valid range.
pub const fn is_valid(sig: u32) -> bool {
    sig >= 1 && sig <= NSIG as u32
}

/// Signals that can never be caught, ignored, or blocked.
///
/// SIGKILL is the non-maskable terminate signal; no custom handler is
/// ever permitted for it and no mask may contain it.
pub const fn is_catchable(sig: u32) -> bool {
    is_valid(sig) && sig != SIGKILL
}

/// Human-readable name for diagnostics.
pub fn signal_name(sig: u32) -> &'static str {
    match sig {
        SIGHUP => "SIGHUP",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGILL => "SIGILL",
        SIGTRAP => "SIGTRAP",
        SIGABRT => "SIGABRT",
        SIGBUS => "SIGBUS",
        SIGFPE => "SIGFPE",
        SIGKILL => "SIGKILL",
        SIGUSR1 => "SIGUSR1",
        SIGSEGV => "SIGSEGV",
        SIGUSR2 => "SIGUSR2",
        SIGPIPE => "SIGPIPE",
        SIGALRM => "SIGALRM",
        SIGTERM => "SIGTERM",
        SIGCHLD => "SIGCHLD",
        SIGCONT => "SIGCONT",
        SIGSTOP => "SIGSTOP",
        SIGTSTP => "SIGTSTP",
        SIGTTIN => "SIGTTIN",
        SIGTTOU => "SIGTTOU",
        _ => "SIG?",
    }
}

// ─── Signal sets ────────────────────────────────────────────────────

/// Set of signal numbers; bit `sig - 1` represents signal `sig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigSet(pub u32);

impl SigSet {
    pub const EMPTY: SigSet = SigSet(0);

    /// The set containing only `sig`. `sig` must be valid.
    pub const fn one(sig: u32) -> SigSet {
        SigSet(1 << (sig - 1))
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, sig: u32) -> bool {
        is_valid(sig) && self.0 & (1 << (sig - 1)) != 0
    }

    pub fn insert(&mut self, sig: u32) {
        if is_valid(sig) {
            self.0 |= 1 << (sig - 1);
        }
    }

    pub fn remove(&mut self, sig: u32) {
        if is_valid(sig) {
            self.0 &= !(1 << (sig - 1));
        }
    }

    /// Lowest-numbered signal in the set.
    pub fn lowest(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() + 1)
        }
    }
}

impl BitOr for SigSet {
    type Output = SigSet;
    fn bitor(self, rhs: SigSet) -> SigSet {
        SigSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for SigSet {
    fn bitor_assign(&mut self, rhs: SigSet) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SigSet {
    type Output = SigSet;
    fn bitand(self, rhs: SigSet) -> SigSet {
        SigSet(self.0 & rhs.0)
    }
}

impl BitAndAssign for SigSet {
    fn bitand_assign(&mut self, rhs: SigSet) {
        self.0 &= rhs.0;
    }
}

impl Not for SigSet {
    type Output = SigSet;
    fn not(self) -> SigSet {
        SigSet(!self.0)
    }
}

impl fmt::Display for SigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ─── Signal actions ─────────────────────────────────────────────────

bitflags! {
    /// Per-action behavior flags (historical sigaction values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SaFlags: u32 {
        /// Install with no handler-time mask at all, and save no
        /// blocked-mask word in the delivery frame.
        const NOMASK = 0x4000_0000;
        /// Reset the action to default after one delivery.
        const ONESHOT = 0x8000_0000;
    }
}

/// What to do when a signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigHandler {
    /// Built-in default: discard SIGCHLD, terminate on anything else.
    #[default]
    Default,
    /// Discard silently.
    Ignore,
    /// Jump to a user handler function.
    Catch(u64),
}

/// One entry of the per-process signal action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigAction {
    pub handler: SigHandler,
    /// ORed into the blocked mask while the handler runs.
    pub mask: SigSet,
    pub flags: SaFlags,
    /// User trampoline the handler returns into.
    pub restorer: u64,
}

impl Default for SigAction {
    fn default() -> Self {
        SigAction {
            handler: SigHandler::Default,
            mask: SigSet::EMPTY,
            flags: SaFlags::empty(),
            restorer: 0,
        }
    }
}

/// How `sigprocmask` combines the given set with the blocked mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskHow {
    /// Union the set into the mask.
    Block,
    /// Remove the set from the mask.
    Unblock,
    /// Replace the mask with the set.
    SetMask,
}

// ─── Configuration operations ───────────────────────────────────────

/// Install a V7-style handler: one-shot and no-mask. Returns the
/// previous handler.
///
/// Rejects invalid signal numbers and SIGKILL.
pub fn signal(
    table: &mut ProcessTable,
    current: SlotId,
    sig: u32,
    handler: SigHandler,
    restorer: u64,
) -> Result<SigHandler> {
    if !is_catchable(sig) {
        return Err(Error::InvalidArgument);
    }
    let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
    let action = SigAction {
        handler,
        mask: SigSet::EMPTY,
        flags: SaFlags::ONESHOT | SaFlags::NOMASK,
        restorer,
    };
    let old = core::mem::replace(&mut pcb.actions[(sig - 1) as usize], action);
    Ok(old.handler)
}

/// Install an arbitrary action for `sig`, returning the previous one.
///
/// The signal's own number is folded into the action's handler-time
/// mask. A no-mask action keeps no handler-time mask at all: its
/// delivery frame saves no mask word, so whatever it blocked would
/// survive the handler. SIGKILL can never appear in an installed mask.
pub fn sigaction(
    table: &mut ProcessTable,
    current: SlotId,
    sig: u32,
    mut new: SigAction,
) -> Result<SigAction> {
    if !is_catchable(sig) {
        return Err(Error::InvalidArgument);
    }
    if new.flags.contains(SaFlags::NOMASK) {
        new.mask = SigSet::EMPTY;
    } else {
        new.mask.insert(sig);
    }
    new.mask.remove(SIGKILL);
    let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
    Ok(core::mem::replace(
        &mut pcb.actions[(sig - 1) as usize],
        new,
    ))
}

/// Adjust the blocked-signal mask; returns the previous mask.
///
/// SIGKILL's bit is silently dropped from whatever mask results.
pub fn sigprocmask(
    table: &mut ProcessTable,
    current: SlotId,
    how: MaskHow,
    set: SigSet,
) -> Result<SigSet> {
    let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
    let old = pcb.blocked;
    match how {
        MaskHow::Block => pcb.blocked |= set,
        MaskHow::Unblock => pcb.blocked &= !set,
        MaskHow::SetMask => pcb.blocked = set,
    }
    pcb.blocked.remove(SIGKILL);
    Ok(old)
}

/// The caller's pending-signal set.
pub fn sigpending(table: &ProcessTable, current: SlotId) -> Result<SigSet> {
    let pcb = table.get(current).ok_or(Error::InvalidArgument)?;
    Ok(pcb.pending)
}

// ─── Send paths ─────────────────────────────────────────────────────

/// Raise `sig` on the process in `target`.
///
/// `privileged` marks kernel-internal sends (the Terminator raising
/// SIGCHLD on a parent, session SIGHUP) that bypass the uid check.
/// Unprivileged sends are allowed when the sender's effective uid is 0
/// or matches the target's. On PermissionDenied the target's pending
/// mask is untouched.
pub fn send_sig(
    table: &mut ProcessTable,
    sender: SlotId,
    target: SlotId,
    sig: u32,
    privileged: bool,
) -> Result<()> {
    if !is_valid(sig) {
        return Err(Error::InvalidArgument);
    }
    if !privileged {
        let sender_euid = table.get(sender).ok_or(Error::InvalidArgument)?.euid;
        let target_euid = table.get(target).ok_or(Error::InvalidArgument)?.euid;
        if sender_euid != 0 && sender_euid != target_euid {
            return Err(Error::PermissionDenied);
        }
    }
    let pcb = table.get_mut(target).ok_or(Error::InvalidArgument)?;
    pcb.pending.insert(sig);
    trace!("send {} -> pid {}", signal_name(sig), pcb.pid);
    Ok(())
}

/// Route a signal by selector: an exact pid (`> 0`), the caller's own
/// process group (`0`), every process except the caller and init (`-1`),
/// or an explicit group (`< -1`, group = -pid).
///
/// A broadcast keeps only the last error observed across its targets;
/// matching nobody is a success.
pub fn kill(table: &mut ProcessTable, current: SlotId, pid: i32, sig: u32) -> Result<()> {
    if !is_valid(sig) {
        return Err(Error::InvalidArgument);
    }
    let me = table.get(current).ok_or(Error::InvalidArgument)?;
    let my_pid = me.pid;
    let my_pgrp = me.pgrp;

    let targets: Vec<SlotId> = table
        .iter_live()
        .filter(|(slot, pcb)| match pid {
            0 => pcb.pgrp == my_pgrp,
            -1 => *slot != current && pcb.pid != Pid::INIT,
            p if p > 0 => pcb.pid.0 == p as u32,
            p => pcb.pgrp.0 == -(p as i64) as u32,
        })
        .map(|(slot, _)| slot)
        .collect();

    let mut result = Ok(());
    for target in targets {
        if let Err(e) = send_sig(table, current, target, sig, false) {
            result = Err(e);
        }
    }
    result
}
