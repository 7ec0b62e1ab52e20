//! Syscall-shaped entry points.
//!
//! Thin wrappers that speak the classic i64 convention: non-negative
//! result or a negated errno. Pointer arguments go through the
//! caller's address space via [`Platform`]; nothing here holds state.
//! An embedder wires these to its trap dispatcher and passes the
//! caller's slot and saved context in.

use crate::context::UserContext;
use crate::deliver::sig_return;
use crate::error::Error;
use crate::exit::exit;
use crate::fork::fork;
use crate::jobctl;
use crate::platform::Platform;
use crate::signal::{
    is_catchable, kill, sigaction, signal, sigpending, sigprocmask, MaskHow, SaFlags, SigAction,
    SigHandler, SigSet,
};
use crate::table::{ProcessTable, SlotId};
use crate::wait::{waitpid, WaitOptions};

// ─── Errno values ───────────────────────────────────────────────────

pub const EPERM: i64 = 1;
pub const ESRCH: i64 = 3;
pub const EINTR: i64 = 4;
pub const ECHILD: i64 = 10;
pub const EAGAIN: i64 = 11;
pub const EFAULT: i64 = 14;
pub const EINVAL: i64 = 22;

const fn errno(err: Error) -> i64 {
    match err {
        Error::ResourceExhausted => EAGAIN,
        Error::PermissionDenied => EPERM,
        Error::InvalidArgument => EINVAL,
        Error::NoChild => ECHILD,
        Error::Interrupted => EINTR,
        Error::NotFound => ESRCH,
        Error::Fault => EFAULT,
    }
}

// ─── Handler sentinels ──────────────────────────────────────────────

/// Default action, as a user-supplied handler value.
pub const SIG_DFL: u64 = 0;
/// Ignore, as a user-supplied handler value.
pub const SIG_IGN: u64 = 1;

fn handler_from_user(value: u64) -> SigHandler {
    match value {
        SIG_DFL => SigHandler::Default,
        SIG_IGN => SigHandler::Ignore,
        addr => SigHandler::Catch(addr),
    }
}

fn handler_to_user(handler: SigHandler) -> u64 {
    match handler {
        SigHandler::Default => SIG_DFL,
        SigHandler::Ignore => SIG_IGN,
        SigHandler::Catch(addr) => addr,
    }
}

// ─── Process lifecycle ──────────────────────────────────────────────

/// Create a child process. Returns the child pid to the caller; the
/// child's saved context is already set up to observe 0.
pub fn sys_fork<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    ctx: &UserContext,
) -> i64 {
    match fork(table, platform, current, ctx) {
        Ok(pid) => pid.0 as i64,
        Err(err) => -errno(err),
    }
}

/// Terminate the caller. The caller's context must not be resumed; the
/// return value only satisfies the dispatcher's shape.
pub fn sys_exit<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    code: i64,
) -> i64 {
    exit(table, platform, current, code as i32);
    0
}

/// Wait for a child. Writes the status word through `status_ptr` when
/// it is non-null, low 32 bits significant.
pub fn sys_waitpid<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    pid: i64,
    status_ptr: u64,
    options: u64,
) -> i64 {
    let space = table.get(current).and_then(|p| p.address_space);
    if status_ptr != 0 {
        // Checked up front so a blocked wait never ends in EFAULT
        match space {
            Some(space) if platform.verify_writable(space, status_ptr, 8) => {}
            _ => return -EFAULT,
        }
    }
    let options = WaitOptions::from_bits_truncate(options as u32);
    match waitpid(table, platform, current, pid as i32, options) {
        Ok(Some(report)) => {
            if status_ptr != 0 {
                if let Some(space) = space {
                    platform.write_user(space, status_ptr, &[report.status as u32 as u64]);
                }
            }
            report.pid.0 as i64
        }
        Ok(None) => 0,
        Err(err) => -errno(err),
    }
}

/// Send a signal to the process(es) selected by `pid`.
pub fn sys_kill(table: &mut ProcessTable, current: SlotId, pid: i64, sig: i64) -> i64 {
    match kill(table, current, pid as i32, sig as u32) {
        Ok(()) => 0,
        Err(err) => -errno(err),
    }
}

// ─── Signal configuration ───────────────────────────────────────────

/// Install a V7-style one-shot handler. Returns the previous handler
/// value, or -1 for an invalid or uncatchable signal.
pub fn sys_signal(
    table: &mut ProcessTable,
    current: SlotId,
    sig: u64,
    handler: u64,
    restorer: u64,
) -> i64 {
    match signal(table, current, sig as u32, handler_from_user(handler), restorer) {
        Ok(old) => handler_to_user(old) as i64,
        Err(_) => -1,
    }
}

/// Install a full action from a 4-word user struct
/// {handler, mask, flags, restorer}; copy the previous action out
/// through `old_ptr` when non-null. Returns 0 or -1.
pub fn sys_sigaction<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    sig: u64,
    new_ptr: u64,
    old_ptr: u64,
) -> i64 {
    if !is_catchable(sig as u32) {
        return -1;
    }
    let Some(space) = table.get(current).and_then(|p| p.address_space) else {
        return -1;
    };
    if old_ptr != 0 && !platform.verify_writable(space, old_ptr, 32) {
        return -1;
    }
    let mut words = [0u64; 4];
    if !platform.read_user(space, new_ptr, &mut words) {
        return -1;
    }
    let new = SigAction {
        handler: handler_from_user(words[0]),
        mask: SigSet(words[1] as u32),
        flags: SaFlags::from_bits_truncate(words[2] as u32),
        restorer: words[3],
    };
    match sigaction(table, current, sig as u32, new) {
        Ok(old) => {
            if old_ptr != 0 {
                platform.write_user(
                    space,
                    old_ptr,
                    &[
                        handler_to_user(old.handler),
                        old.mask.0 as u64,
                        old.flags.bits() as u64,
                        old.restorer,
                    ],
                );
            }
            0
        }
        Err(_) => -1,
    }
}

/// Adjust the blocked mask; `how` is 0 = block, 1 = unblock,
/// 2 = replace. Returns the previous mask.
pub fn sys_sigprocmask(table: &mut ProcessTable, current: SlotId, how: u64, set: u64) -> i64 {
    let how = match how {
        0 => MaskHow::Block,
        1 => MaskHow::Unblock,
        2 => MaskHow::SetMask,
        _ => return -EINVAL,
    };
    match sigprocmask(table, current, how, SigSet(set as u32)) {
        Ok(old) => old.0 as i64,
        Err(err) => -errno(err),
    }
}

/// The caller's pending set.
pub fn sys_sigpending(table: &ProcessTable, current: SlotId) -> i64 {
    match sigpending(table, current) {
        Ok(pending) => pending.0 as i64,
        Err(err) => -errno(err),
    }
}

/// Return from a signal handler: restore the context saved in the
/// delivery frame. The result is the restored return register, so the
/// interrupted computation resumes with its original value.
pub fn sys_sigreturn<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    ctx: &mut UserContext,
    with_mask: bool,
) -> i64 {
    match sig_return(table, platform, current, ctx, with_mask) {
        Ok(()) => ctx.ret as i64,
        Err(err) => -errno(err),
    }
}

// ─── Identity and job control ───────────────────────────────────────

pub fn sys_getpid(table: &ProcessTable, current: SlotId) -> i64 {
    match jobctl::getpid(table, current) {
        Ok(pid) => pid.0 as i64,
        Err(err) => -errno(err),
    }
}

pub fn sys_getppid(table: &ProcessTable, current: SlotId) -> i64 {
    match jobctl::getppid(table, current) {
        Ok(pid) => pid.0 as i64,
        Err(err) => -errno(err),
    }
}

pub fn sys_setsid(table: &mut ProcessTable, current: SlotId) -> i64 {
    match jobctl::setsid(table, current) {
        Ok(pgrp) => pgrp.0 as i64,
        Err(err) => -errno(err),
    }
}

pub fn sys_setpgid(table: &mut ProcessTable, current: SlotId, pid: i64, pgid: i64) -> i64 {
    match jobctl::setpgid(table, current, pid as i32, pgid as i32) {
        Ok(()) => 0,
        Err(err) => -errno(err),
    }
}

pub fn sys_getpgid(table: &ProcessTable, current: SlotId, pid: i64) -> i64 {
    match jobctl::getpgid(table, current, pid as i32) {
        Ok(pgrp) => pgrp.0 as i64,
        Err(err) => -errno(err),
    }
}
