//! Process table
//!
//! Fixed-capacity arena of process control blocks. Slots are addressed
//! by [`SlotId`], a stable index plus a generation tag bumped on every
//! free, so handles to reaped processes go stale instead of silently
//! aliasing a recycled slot. Relations between processes (parent, group,
//! session) are pid-valued lookups, never references, which keeps the
//! parent/child/sibling graph free of ownership cycles.
//!
//! The table assumes one kernel execution at a time: every operation
//! takes `&mut ProcessTable`, making that assumption compiler-checked.
//! Embeddings with real parallelism serialize through [`SharedTable`].

use alloc::vec::Vec;
use core::fmt;

use crate::config::{DEFAULT_PRIORITY, MAX_FILES, MAX_TASKS};
use crate::context::UserContext;
use crate::platform::{AsHandle, FileId, InodeId};
use crate::signal::{SigAction, SigSet, NSIG};

/// Process identifier. Always positive for real processes; pid 0 names
/// the kernel itself in parent fields of bootstrap tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// The designated init process; orphans are reparented to it.
    pub const INIT: Pid = Pid(1);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Mid-fork: slot claimed, never scheduled yet.
    Creating,
    /// Eligible to run.
    Runnable,
    /// Blocked in an interruptible wait (the Reaper).
    Interruptible,
    /// Job-control stop.
    Stopped,
    /// Exited; only the status word remains for the parent to collect.
    Zombie,
}

/// Stable handle to one occupancy of one table slot.
///
/// The generation tag makes handles single-use: once the slot is freed,
/// every outstanding `SlotId` for it stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub index: u32,
    pub generation: u32,
}

/// Process control block.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    /// Parent pid. Alive or init, by the reparenting rule in the
    /// Terminator.
    pub ppid: Pid,
    pub pgrp: Pid,
    pub session: Pid,
    pub state: ProcessState,
    /// Remaining scheduling quantum; owned by the scheduler.
    pub counter: i32,
    /// Static priority; owned by the scheduler.
    pub priority: i32,
    /// Pending signals, one bit each, no queuing.
    pub pending: SigSet,
    /// Signals held back from delivery.
    pub blocked: SigSet,
    /// Per-signal actions, indexed by `sig - 1`.
    pub actions: [SigAction; NSIG],
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
    /// Own user/system time, in ticks.
    pub utime: u64,
    pub stime: u64,
    /// Reaped children's user/system time, folded in by the Reaper.
    pub cutime: u64,
    pub cstime: u64,
    /// Creation timestamp, in ticks.
    pub start_time: u64,
    /// Session-leader flag; never inherited across fork.
    pub leader: bool,
    /// Controlling terminal, if any.
    pub tty: Option<u32>,
    /// Status word stored at the Zombie transition.
    pub exit_status: i32,
    /// Descriptor slots; entries are shared references into the open-file
    /// table, refcounted by the file layer.
    pub files: [Option<FileId>; MAX_FILES],
    pub cwd: Option<InodeId>,
    pub root: Option<InodeId>,
    pub executable: Option<InodeId>,
    /// Private address space; `None` once the Terminator has released it.
    pub address_space: Option<AsHandle>,
    /// Saved resumption context, installed when the scheduler dispatches
    /// this process.
    pub context: UserContext,
}

impl Pcb {
    /// A from-scratch PCB: runnable, root-owned, no resources attached.
    pub fn new(pid: Pid, ppid: Pid, start_time: u64) -> Self {
        Pcb {
            pid,
            ppid,
            pgrp: pid,
            session: pid,
            state: ProcessState::Runnable,
            counter: DEFAULT_PRIORITY,
            priority: DEFAULT_PRIORITY,
            pending: SigSet::EMPTY,
            blocked: SigSet::EMPTY,
            actions: [SigAction::default(); NSIG],
            uid: 0,
            euid: 0,
            gid: 0,
            egid: 0,
            utime: 0,
            stime: 0,
            cutime: 0,
            cstime: 0,
            start_time,
            leader: false,
            tty: None,
            exit_status: 0,
            files: [None; MAX_FILES],
            cwd: None,
            root: None,
            executable: None,
            address_space: None,
            context: UserContext::new(),
        }
    }

    /// Lowest pending signal not currently blocked.
    pub fn next_deliverable(&self) -> Option<u32> {
        (self.pending & !self.blocked).lowest()
    }
}

struct Slot {
    generation: u32,
    pcb: Option<Pcb>,
}

/// The global process table: a fixed arena of PCB slots.
pub struct ProcessTable {
    slots: Vec<Slot>,
    last_pid: u32,
    /// Which process last used the FPU/coprocessor, if any.
    fpu_owner: Option<SlotId>,
}

impl ProcessTable {
    /// Table with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_TASKS)
    }

    /// Table with room for `capacity` concurrent processes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                generation: 0,
                pcb: None,
            });
        }
        ProcessTable {
            slots,
            last_pid: 0,
            fpu_owner: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots (every state, zombies included).
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.pcb.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.pcb.is_some())
    }

    /// Resolve a slot handle. Stale generations return `None`.
    pub fn get(&self, slot: SlotId) -> Option<&Pcb> {
        let s = self.slots.get(slot.index as usize)?;
        if s.generation != slot.generation {
            return None;
        }
        s.pcb.as_ref()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut Pcb> {
        let s = self.slots.get_mut(slot.index as usize)?;
        if s.generation != slot.generation {
            return None;
        }
        s.pcb.as_mut()
    }

    /// Linear scan for the slot holding `pid`.
    pub fn find_pid(&self, pid: Pid) -> Option<SlotId> {
        self.iter_live()
            .find(|(_, pcb)| pcb.pid == pid)
            .map(|(slot, _)| slot)
    }

    /// Claim the first empty slot for `pcb`. `None` when the table is
    /// full.
    pub fn claim(&mut self, pcb: Pcb) -> Option<SlotId> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.pcb.is_none() {
                slot.pcb = Some(pcb);
                return Some(SlotId {
                    index: index as u32,
                    generation: slot.generation,
                });
            }
        }
        None
    }

    /// Free a slot, returning its PCB and invalidating every outstanding
    /// handle to this occupancy.
    pub fn release(&mut self, slot: SlotId) -> Option<Pcb> {
        let s = self.slots.get_mut(slot.index as usize)?;
        if s.generation != slot.generation || s.pcb.is_none() {
            return None;
        }
        s.generation = s.generation.wrapping_add(1);
        if self.fpu_owner == Some(slot) {
            self.fpu_owner = None;
        }
        self.slots[slot.index as usize].pcb.take()
    }

    /// Next unused pid. Monotonic, wrapping to 1 past `i32::MAX`,
    /// retrying over occupied pids. With at least one free slot a free
    /// pid always exists, so the loop terminates.
    pub fn alloc_pid(&mut self) -> Pid {
        loop {
            self.last_pid = if self.last_pid >= i32::MAX as u32 {
                1
            } else {
                self.last_pid + 1
            };
            let candidate = Pid(self.last_pid);
            if !self.pid_in_use(candidate) {
                return candidate;
            }
        }
    }

    pub fn pid_in_use(&self, pid: Pid) -> bool {
        self.iter_live().any(|(_, pcb)| pcb.pid == pid)
    }

    /// Iterate every occupied slot, zombies included.
    pub fn iter_live(&self) -> impl Iterator<Item = (SlotId, &Pcb)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.pcb.as_ref().map(|pcb| {
                (
                    SlotId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    pcb,
                )
            })
        })
    }

    /// Seed the table with the init process (pid 1). Fails if pid 1
    /// already exists.
    pub fn spawn_init(&mut self, start_time: u64) -> Option<SlotId> {
        if self.pid_in_use(Pid::INIT) {
            return None;
        }
        self.claim(Pcb::new(Pid::INIT, Pid(0), start_time))
    }

    pub fn fpu_owner(&self) -> Option<SlotId> {
        self.fpu_owner
    }

    pub fn set_fpu_owner(&mut self, owner: Option<SlotId>) {
        self.fpu_owner = owner;
    }

    /// Drop the FPU-owner marker if `slot` holds it.
    pub fn clear_fpu_owner_if(&mut self, slot: SlotId) {
        if self.fpu_owner == Some(slot) {
            self.fpu_owner = None;
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-table lock for embeddings with real parallelism.
///
/// The core relies on `&mut` exclusivity; a multicore target takes this
/// lock around every entry point so scans and pending-bit sends from
/// other cores serialize through it.
pub struct SharedTable {
    inner: spin::Mutex<ProcessTable>,
}

impl SharedTable {
    pub const fn new(table: ProcessTable) -> Self {
        SharedTable {
            inner: spin::Mutex::new(table),
        }
    }

    /// Run `f` with the table locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut ProcessTable) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}
