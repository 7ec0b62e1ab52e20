//! Process termination.
//!
//! The Terminator never fails and never hands control back to the dying
//! process: it walks the teardown sequence (address space, orphan
//! reparenting, files, inodes, FPU marker, session hangup), parks the
//! PCB as a Zombie holding only the status word, notifies the parent,
//! and yields. Because every exiting process first reparents its
//! children to init, the "parent is alive or is init" invariant
//! survives arbitrarily deep exit chains.

use alloc::vec::Vec;
use log::{debug, error};

use crate::config::MAX_FILES;
use crate::platform::Platform;
use crate::signal::{send_sig, SIGCHLD, SIGHUP};
use crate::table::{Pid, ProcessState, ProcessTable, SlotId};

/// Terminate the process in `current` with a pre-encoded status word.
///
/// `exit` is the wrapper applying the user-facing encoding; delivery
/// passes the fatal signal number here directly. After this returns the
/// embedder must not resume the process's user context.
pub fn do_exit<P: Platform>(table: &mut ProcessTable, platform: &mut P, current: SlotId, status: i32) {
    let (my_pid, my_ppid, space, files, inodes, leader, session) = {
        let Some(pcb) = table.get_mut(current) else {
            error!("exit: stale slot {:?}", current);
            return;
        };
        let space = pcb.address_space.take();
        let files = core::mem::replace(&mut pcb.files, [None; MAX_FILES]);
        let inodes = [pcb.cwd.take(), pcb.root.take(), pcb.executable.take()];
        (pcb.pid, pcb.ppid, space, files, inodes, pcb.leader, pcb.session)
    };

    if let Some(space) = space {
        platform.release_address_space(space);
    }

    // Children, zombies included, move to init before this pid vanishes.
    let children: Vec<SlotId> = table
        .iter_live()
        .filter(|(slot, pcb)| *slot != current && pcb.ppid == my_pid)
        .map(|(slot, _)| slot)
        .collect();
    for child in children {
        let was_zombie = match table.get_mut(child) {
            Some(pcb) => {
                pcb.ppid = Pid::INIT;
                pcb.state == ProcessState::Zombie
            }
            None => false,
        };
        // An already-dead orphan would otherwise wait forever for a
        // reaper that no longer exists.
        if was_zombie {
            if let Some(init) = table.find_pid(Pid::INIT) {
                let _ = send_sig(table, current, init, SIGCHLD, true);
            }
        }
    }

    for file in files.iter().flatten() {
        platform.release_file(*file);
    }
    for inode in inodes.iter().flatten() {
        platform.release_inode(*inode);
    }

    table.clear_fpu_owner_if(current);

    if leader {
        let members: Vec<SlotId> = table
            .iter_live()
            .filter(|(slot, pcb)| *slot != current && pcb.session == session)
            .map(|(slot, _)| slot)
            .collect();
        for member in members {
            let _ = send_sig(table, current, member, SIGHUP, true);
        }
    }

    if let Some(pcb) = table.get_mut(current) {
        pcb.state = ProcessState::Zombie;
        pcb.exit_status = status;
    }
    debug!("exit: pid {} -> zombie, status {:#x}", my_pid, status);

    match table.find_pid(my_ppid) {
        Some(parent) => {
            let _ = send_sig(table, current, parent, SIGCHLD, true);
        }
        None => {
            // Bookkeeping defect elsewhere; release the slot ourselves
            // rather than leave a zombie nobody can reap.
            error!(
                "exit: no parent pid {} for dying pid {}, self-releasing slot",
                my_ppid, my_pid
            );
            table.release(current);
        }
    }

    platform.yield_now(table);
}

/// Terminate with a user exit code; waiters observe `(code & 0xff) << 8`.
pub fn exit<P: Platform>(table: &mut ProcessTable, platform: &mut P, current: SlotId, code: i32) {
    do_exit(table, platform, current, (code & 0xff) << 8);
}
