//! Saved user execution context.
//!
//! A [`UserContext`] is the architecture-neutral snapshot of the register
//! state a process had when it entered the kernel: instruction pointer,
//! stack pointer, flags, the syscall return-value register, and the
//! caller-saved scratch registers a signal handler invocation may clobber.
//! Fork copies it to seed the child's resumption point; signal delivery
//! rewrites it to enter a handler and restores it on return-from-signal.

/// Number of caller-saved scratch registers preserved across a handler.
pub const SCRATCH_REGS: usize = 2;

/// Architecture-neutral saved user execution context.
///
/// `#[repr(C)]` so an architecture shim can overlay this on the low part
/// of its real trap frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    /// Instruction pointer at the kernel entry.
    pub ip: u64,
    /// User stack pointer at the kernel entry.
    pub sp: u64,
    /// Arithmetic/status flags word, restored verbatim on resume.
    pub flags: u64,
    /// Return-value register as the interrupted code will observe it.
    /// A forked child resumes with 0 here.
    pub ret: u64,
    /// Caller-saved scratch registers, restored verbatim on resume.
    pub scratch: [u64; SCRATCH_REGS],
}

impl UserContext {
    /// All-zero context.
    pub const fn new() -> Self {
        UserContext {
            ip: 0,
            sp: 0,
            flags: 0,
            ret: 0,
            scratch: [0; SCRATCH_REGS],
        }
    }

    /// Context resuming at `ip` with user stack at `sp`.
    pub const fn at(ip: u64, sp: u64) -> Self {
        UserContext {
            ip,
            sp,
            flags: 0,
            ret: 0,
            scratch: [0; SCRATCH_REGS],
        }
    }

    /// The context a forked child resumes with: identical to the parent's
    /// except the return-value register reads 0.
    pub fn forked_child(&self) -> Self {
        let mut child = *self;
        child.ret = 0;
        child
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::new()
    }
}
