//! External collaborator seam.
//!
//! Everything the process core does not own is reached through the
//! [`Platform`] trait: address-space mechanics, file/inode reference
//! counting, the scheduler's dispatch tables and yield, the clock, and
//! user-memory access. The core never touches hardware or global state
//! directly; a host build drives it with a scripted implementation.

use crate::table::{Pid, ProcessTable, SlotId};

/// Opaque address-space handle issued by the memory collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsHandle(pub u64);

/// Opaque open-file-object id. The file layer owns the object and its
/// refcount; PCB descriptor slots hold shared references only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Opaque inode id, used for cwd/root/executable references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeId(pub u32);

/// Services the process core requires from the rest of the kernel.
///
/// All methods take `&mut self`: calls are already serialized by the
/// same exclusivity that guards the table.
pub trait Platform: Send {
    /// Duplicate `parent`'s entire address space into a disjoint region.
    ///
    /// Eager copy, no sharing: the child owns a private replica. Returns
    /// `None` when memory is exhausted; fork rolls back and reports
    /// `ResourceExhausted`.
    fn duplicate_address_space(&mut self, parent: AsHandle) -> Option<AsHandle>;

    /// Release every region of `space`. Called exactly once per handle,
    /// at the Zombie transition or during fork rollback.
    fn release_address_space(&mut self, space: AsHandle);

    /// Increment the refcount of an open file object.
    fn retain_file(&mut self, file: FileId);

    /// Decrement the refcount of an open file object; dropping it at
    /// zero is the file layer's business.
    fn release_file(&mut self, file: FileId);

    /// Increment the refcount of an inode.
    fn retain_inode(&mut self, inode: InodeId);

    /// Decrement the refcount of an inode.
    fn release_inode(&mut self, inode: InodeId);

    /// Enter a newly forked process into the scheduler's dispatch tables.
    fn register_task(&mut self, pid: Pid, slot: SlotId);

    /// Current time in scheduler ticks.
    fn now(&self) -> u64;

    /// Give up the CPU. Returns when the caller is next scheduled.
    ///
    /// The table is handed through so that a scripted implementation can
    /// run other processes' lifecycle operations before returning, the
    /// same interleaving a real scheduler produces by switching away.
    fn yield_now(&mut self, table: &mut ProcessTable);

    /// Check that `len` bytes at `addr` in `space` are writable user
    /// memory.
    fn verify_writable(&mut self, space: AsHandle, addr: u64, len: usize) -> bool;

    /// Copy words into user memory at `addr`. Callers verify
    /// writability first; this does not fail.
    fn write_user(&mut self, space: AsHandle, addr: u64, words: &[u64]);

    /// Copy words out of user memory at `addr` into `out`. Returns
    /// `false` when the range faults.
    fn read_user(&mut self, space: AsHandle, addr: u64, out: &mut [u64]) -> bool;
}
