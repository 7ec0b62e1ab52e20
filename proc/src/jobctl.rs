//! Process identity, sessions, and job-control stops.

use log::debug;

use crate::error::{Error, Result};
use crate::signal::{send_sig, SIGCHLD};
use crate::table::{Pid, ProcessState, ProcessTable, SlotId};

/// The caller's pid.
pub fn getpid(table: &ProcessTable, current: SlotId) -> Result<Pid> {
    let pcb = table.get(current).ok_or(Error::InvalidArgument)?;
    Ok(pcb.pid)
}

/// The caller's parent pid.
pub fn getppid(table: &ProcessTable, current: SlotId) -> Result<Pid> {
    let pcb = table.get(current).ok_or(Error::InvalidArgument)?;
    Ok(pcb.ppid)
}

/// Make the caller the leader of a fresh session and process group,
/// detaching it from its controlling terminal.
///
/// An existing session leader may not call this again. Returns the new
/// process group id.
pub fn setsid(table: &mut ProcessTable, current: SlotId) -> Result<Pid> {
    let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
    if pcb.leader {
        return Err(Error::PermissionDenied);
    }
    pcb.leader = true;
    pcb.session = pcb.pid;
    pcb.pgrp = pcb.pid;
    pcb.tty = None;
    debug!("setsid: pid {} leads a new session", pcb.pid);
    Ok(pcb.pgrp)
}

/// Move a process into a process group.
///
/// `pid` 0 names the caller; `pgid` 0 names the target's own pid. The
/// target must be the caller or one of its children, must still share
/// the caller's session, and must not be a session leader.
pub fn setpgid(table: &mut ProcessTable, current: SlotId, pid: i32, pgid: i32) -> Result<()> {
    if pid < 0 || pgid < 0 {
        return Err(Error::InvalidArgument);
    }
    let me = table.get(current).ok_or(Error::InvalidArgument)?;
    let my_pid = me.pid;
    let my_session = me.session;

    let target_pid = if pid == 0 { my_pid } else { Pid(pid as u32) };
    let slot = table.find_pid(target_pid).ok_or(Error::NotFound)?;
    let target = table.get_mut(slot).ok_or(Error::NotFound)?;
    if target.pid != my_pid && target.ppid != my_pid {
        return Err(Error::NotFound);
    }
    if target.leader || target.session != my_session {
        return Err(Error::PermissionDenied);
    }
    target.pgrp = if pgid == 0 {
        target.pid
    } else {
        Pid(pgid as u32)
    };
    Ok(())
}

/// The process group of `pid` (0 names the caller).
pub fn getpgid(table: &ProcessTable, current: SlotId, pid: i32) -> Result<Pid> {
    if pid < 0 {
        return Err(Error::InvalidArgument);
    }
    if pid == 0 {
        let pcb = table.get(current).ok_or(Error::InvalidArgument)?;
        return Ok(pcb.pgrp);
    }
    let slot = table.find_pid(Pid(pid as u32)).ok_or(Error::NotFound)?;
    let pcb = table.get(slot).ok_or(Error::NotFound)?;
    Ok(pcb.pgrp)
}

/// Put a process into a job-control stop and notify its parent.
///
/// The stop is observable through `waitpid` with WUNTRACED; the slot is
/// kept. Zombies cannot be stopped.
pub fn stop(table: &mut ProcessTable, slot: SlotId) -> Result<()> {
    let pcb = table.get_mut(slot).ok_or(Error::InvalidArgument)?;
    if pcb.state == ProcessState::Zombie {
        return Err(Error::InvalidArgument);
    }
    pcb.state = ProcessState::Stopped;
    let pid = pcb.pid;
    let ppid = pcb.ppid;
    debug!("jobctl: pid {} stopped", pid);
    if let Some(parent) = table.find_pid(ppid) {
        let _ = send_sig(table, slot, parent, SIGCHLD, true);
    }
    Ok(())
}

/// Take a process out of a job-control stop. No effect on a process
/// that is not stopped.
pub fn resume(table: &mut ProcessTable, slot: SlotId) -> Result<()> {
    let pcb = table.get_mut(slot).ok_or(Error::InvalidArgument)?;
    if pcb.state == ProcessState::Stopped {
        pcb.state = ProcessState::Runnable;
        debug!("jobctl: pid {} resumed", pcb.pid);
    }
    Ok(())
}
