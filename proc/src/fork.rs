//! Process creation.
//!
//! Fork builds the child as a verbatim copy of the parent PCB, then
//! overrides identity, accounting, and state. The address space is
//! eagerly duplicated (no copy-on-write); descriptor and inode
//! references are shared, not copied, with the platform bumping their
//! refcounts. Failure anywhere rolls the slot back: no partial PCB is
//! ever visible.

use log::debug;

use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::signal::SigSet;
use crate::table::{Pid, ProcessState, ProcessTable, SlotId};

/// Create a child of the process in `current`.
///
/// `ctx` is the parent's execution context captured at the syscall
/// boundary; the child resumes from a copy of it with the return-value
/// register forced to 0. Returns the child's pid for the parent's side
/// of the call.
pub fn fork<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    ctx: &UserContext,
) -> Result<Pid> {
    // Slot capacity decides first, independent of pid availability.
    if table.is_full() {
        return Err(Error::ResourceExhausted);
    }
    let parent = table.get(current).ok_or(Error::InvalidArgument)?;
    let parent_pid = parent.pid;
    let parent_space = parent.address_space;
    let mut child = parent.clone();

    let pid = table.alloc_pid();

    child.pid = pid;
    child.ppid = parent_pid;
    child.state = ProcessState::Creating;
    child.counter = child.priority;
    child.utime = 0;
    child.stime = 0;
    child.cutime = 0;
    child.cstime = 0;
    child.start_time = platform.now();
    child.leader = false;
    // Undelivered parent signals are not inherited; actions and the
    // blocked mask are.
    child.pending = SigSet::EMPTY;
    child.exit_status = 0;
    // The parent's handle must not alias into the child even briefly.
    child.address_space = None;
    child.context = ctx.forked_child();

    let files = child.files;
    let inodes = [child.cwd, child.root, child.executable];

    let slot = table.claim(child).ok_or(Error::ResourceExhausted)?;

    if let Some(space) = parent_space {
        match platform.duplicate_address_space(space) {
            Some(copy) => {
                if let Some(pcb) = table.get_mut(slot) {
                    pcb.address_space = Some(copy);
                }
            }
            None => {
                table.release(slot);
                debug!(
                    "fork: address-space duplication failed for pid {}",
                    parent_pid
                );
                return Err(Error::ResourceExhausted);
            }
        }
    }

    // The child co-owns the parent's open files and inode references.
    for file in files.iter().flatten() {
        platform.retain_file(*file);
    }
    for inode in inodes.iter().flatten() {
        platform.retain_inode(*inode);
    }

    platform.register_task(pid, slot);
    if let Some(pcb) = table.get_mut(slot) {
        pcb.state = ProcessState::Runnable;
    }
    debug!("fork: pid {} -> pid {}", parent_pid, pid);
    Ok(pid)
}
