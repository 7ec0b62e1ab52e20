//! Parent/child synchronization.
//!
//! `waitpid` scans the table for a child matching the selector, reaps a
//! zombie (folding its accounting into the caller and freeing the slot)
//! or reports a stop, and otherwise blocks until its own SIGCHLD bit is
//! raised. The Terminator sets that bit and the Zombie state in one
//! uninterrupted action, so a waiter woken by SIGCHLD always finds the
//! zombie on its rescan.

use bitflags::bitflags;
use log::debug;

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::signal::SIGCHLD;
use crate::table::{Pid, ProcessState, ProcessTable, SlotId};

bitflags! {
    /// Behavior switches for [`waitpid`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitOptions: u32 {
        /// Return immediately instead of blocking.
        const WNOHANG = 1;
        /// Also report children sitting in a job-control stop.
        const WUNTRACED = 2;
    }
}

/// Status word reported for a stopped child. Stops are reported, never
/// reaped: the child keeps its slot.
pub const STOPPED_STATUS: i32 = 0x7f;

/// A collected child: who, and the status word it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub pid: Pid,
    pub status: i32,
}

enum Scan {
    /// A zombie child matched; reap this slot.
    Reap(SlotId),
    /// A stopped child matched and WUNTRACED asked for it.
    Stop(Pid),
    /// Matching children exist but none is reportable yet.
    Waiting,
    /// No child matches the selector at all.
    Nothing,
}

fn scan(
    table: &ProcessTable,
    current: SlotId,
    my_pid: Pid,
    my_pgrp: Pid,
    selector: i32,
    options: WaitOptions,
) -> Scan {
    let mut waiting = false;
    for (slot, pcb) in table.iter_live() {
        if slot == current || pcb.ppid != my_pid {
            continue;
        }
        let matches = match selector {
            -1 => true,
            0 => pcb.pgrp == my_pgrp,
            s if s > 0 => pcb.pid.0 == s as u32,
            s => pcb.pgrp.0 == -(s as i64) as u32,
        };
        if !matches {
            continue;
        }
        match pcb.state {
            ProcessState::Stopped if options.contains(WaitOptions::WUNTRACED) => {
                return Scan::Stop(pcb.pid);
            }
            ProcessState::Zombie => return Scan::Reap(slot),
            _ => waiting = true,
        }
    }
    if waiting {
        Scan::Waiting
    } else {
        Scan::Nothing
    }
}

/// Wait for a child to change state.
///
/// `selector`: an exact pid (`> 0`), any child in the caller's process
/// group (`0`), any child (`-1`), or any child in group `-selector`
/// (`< -1`).
///
/// Returns `Ok(Some(report))` for a reaped or stopped child,
/// `Ok(None)` when WNOHANG found nothing reportable, `Err(NoChild)`
/// when no child matches, and `Err(Interrupted)` when a blocked wait
/// was woken by anything other than SIGCHLD.
pub fn waitpid<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    selector: i32,
    options: WaitOptions,
) -> Result<Option<WaitReport>> {
    loop {
        let me = table.get(current).ok_or(Error::InvalidArgument)?;
        let my_pid = me.pid;
        let my_pgrp = me.pgrp;

        match scan(table, current, my_pid, my_pgrp, selector, options) {
            Scan::Reap(slot) => {
                if let Some(child) = table.release(slot) {
                    if let Some(me) = table.get_mut(current) {
                        me.cutime += child.utime;
                        me.cstime += child.stime;
                    }
                    debug!(
                        "wait: pid {} reaped pid {}, status {:#x}",
                        my_pid, child.pid, child.exit_status
                    );
                    return Ok(Some(WaitReport {
                        pid: child.pid,
                        status: child.exit_status,
                    }));
                }
            }
            Scan::Stop(pid) => {
                return Ok(Some(WaitReport {
                    pid,
                    status: STOPPED_STATUS,
                }));
            }
            Scan::Nothing => return Err(Error::NoChild),
            Scan::Waiting => {
                if options.contains(WaitOptions::WNOHANG) {
                    return Ok(None);
                }
                if let Some(me) = table.get_mut(current) {
                    me.state = ProcessState::Interruptible;
                }
                platform.yield_now(table);
                let Some(me) = table.get_mut(current) else {
                    return Err(Error::Interrupted);
                };
                me.state = ProcessState::Runnable;
                if me.pending.contains(SIGCHLD) {
                    // Our child changed state; consume the wake and look
                    // again.
                    me.pending.remove(SIGCHLD);
                    continue;
                }
                return Err(Error::Interrupted);
            }
        }
    }
}
