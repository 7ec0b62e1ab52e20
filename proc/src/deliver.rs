//! Signal delivery at the return-to-user boundary.
//!
//! A pending, unblocked signal is consumed here and either discarded,
//! turned into a process termination, or materialized as a user-mode
//! handler invocation. The last case synthesizes a call frame on the
//! user stack with no cooperation from the interrupted code: the frame
//! is laid out so the handler's plain `ret` lands in the restorer
//! trampoline, which invokes [`sig_return`] to put the original
//! context back. The destination memory is verified writable before
//! anything is stored through it.

use log::{debug, error, trace};

use crate::context::UserContext;
use crate::error::{Error, Result};
use crate::exit::do_exit;
use crate::platform::Platform;
use crate::signal::{
    is_valid, signal_name, SaFlags, SigAction, SigHandler, SigSet, SIGCHLD, SIGKILL, SIGSEGV,
};
use crate::table::{ProcessTable, SlotId};

// ─── Frame fabrication ──────────────────────────────────────────────

/// Frame words when the prior blocked mask is saved.
pub const FRAME_WORDS_MASKED: usize = 8;
/// Frame words for a no-mask action.
pub const FRAME_WORDS_NOMASK: usize = 7;

/// A fabricated handler-invocation frame.
#[derive(Debug, Clone, Copy)]
pub struct SignalFrame {
    /// Context the process resumes with: ip at the handler, sp at the
    /// frame base, everything else carried over live.
    pub ctx: UserContext,
    words: [u64; FRAME_WORDS_MASKED],
    len: usize,
}

impl SignalFrame {
    /// Stack words, ascending from `ctx.sp`.
    pub fn words(&self) -> &[u64] {
        &self.words[..self.len]
    }
}

/// Build the handler-invocation frame for `sig`, purely.
///
/// Ascending from the new stack pointer: restorer, signal number,
/// (unless no-mask) the prior blocked mask, then the saved return
/// register, scratch registers, flags, and instruction pointer. The
/// handler starts with the restorer address on top of its stack and
/// the signal number as its stack argument; its `ret` transfers to the
/// restorer with the rest of the frame still in place.
///
/// The base sits exactly `len * 8` below the interrupted stack
/// pointer, so unwinding the frame restores the original sp with no
/// slack to account for. Returns `None` when the interrupted stack
/// pointer has no room for the frame below it; the base computation
/// never wraps.
pub fn fabricate_frame(
    ctx: &UserContext,
    handler: u64,
    action: &SigAction,
    sig: u32,
    blocked: SigSet,
) -> Option<SignalFrame> {
    let masked = !action.flags.contains(SaFlags::NOMASK);
    let len = if masked {
        FRAME_WORDS_MASKED
    } else {
        FRAME_WORDS_NOMASK
    };
    let base = ctx.sp.checked_sub((len * 8) as u64)?;

    let mut words = [0u64; FRAME_WORDS_MASKED];
    words[0] = action.restorer;
    words[1] = sig as u64;
    let mut i = 2;
    if masked {
        words[i] = blocked.0 as u64;
        i += 1;
    }
    words[i] = ctx.ret;
    words[i + 1] = ctx.scratch[0];
    words[i + 2] = ctx.scratch[1];
    words[i + 3] = ctx.flags;
    words[i + 4] = ctx.ip;

    let mut resumed = *ctx;
    resumed.ip = handler;
    resumed.sp = base;
    Some(SignalFrame {
        ctx: resumed,
        words,
        len,
    })
}

// ─── Delivery ───────────────────────────────────────────────────────

/// What a delivery attempt did to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The signal was discarded; the context is untouched.
    Continue,
    /// The context was redirected into a user handler.
    Handled,
    /// The process is gone; the context must not be resumed.
    Terminated,
}

/// Deliver one signal to the process in `current`.
///
/// The caller has already taken `sig` out of the pending set. `ctx` is
/// the full saved user context and is rewritten in place when a
/// handler is invoked.
///
/// Default actions terminate through the Terminator with the signal
/// number as the status word, except SIGCHLD which is discarded. A
/// one-shot handler is reset before the handler runs, so a second
/// delivery before re-registration takes the default action; that race
/// is the contract, not a defect. An unwritable stack, or one too
/// small to hold the frame, is a fatal fault for the process, never a
/// kernel write through a bad pointer.
pub fn do_signal<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    sig: u32,
    ctx: &mut UserContext,
) -> Result<Disposition> {
    if !is_valid(sig) {
        return Err(Error::InvalidArgument);
    }
    let (action, pid, space, blocked) = {
        let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
        let action = pcb.actions[(sig - 1) as usize];
        if matches!(action.handler, SigHandler::Catch(_))
            && action.flags.contains(SaFlags::ONESHOT)
        {
            pcb.actions[(sig - 1) as usize].handler = SigHandler::Default;
        }
        (action, pcb.pid, pcb.address_space, pcb.blocked)
    };

    match action.handler {
        SigHandler::Ignore => Ok(Disposition::Continue),
        SigHandler::Default => {
            if sig == SIGCHLD {
                return Ok(Disposition::Continue);
            }
            debug!("deliver: pid {} dies on {}", pid, signal_name(sig));
            do_exit(table, platform, current, sig as i32);
            Ok(Disposition::Terminated)
        }
        SigHandler::Catch(handler) => {
            let frame = fabricate_frame(ctx, handler, &action, sig, blocked);
            match (frame, space) {
                (Some(frame), Some(space))
                    if platform.verify_writable(space, frame.ctx.sp, frame.words().len() * 8) =>
                {
                    platform.write_user(space, frame.ctx.sp, frame.words());
                    if let Some(pcb) = table.get_mut(current) {
                        pcb.blocked = pcb.blocked | action.mask;
                    }
                    trace!(
                        "deliver: pid {} handles {} at {:#x}, frame at {:#x}",
                        pid,
                        signal_name(sig),
                        handler,
                        frame.ctx.sp
                    );
                    *ctx = frame.ctx;
                    Ok(Disposition::Handled)
                }
                _ => {
                    error!(
                        "deliver: pid {} cannot take a {} frame below sp {:#x}, killing",
                        pid,
                        signal_name(sig),
                        ctx.sp
                    );
                    do_exit(table, platform, current, SIGSEGV as i32);
                    Ok(Disposition::Terminated)
                }
            }
        }
    }
}

/// Drain deliverable signals for the return-to-user path.
///
/// Delivers lowest-numbered first, consuming discarded signals until
/// one redirects the context into a handler, terminates the process,
/// or nothing deliverable remains.
pub fn deliver_pending<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    ctx: &mut UserContext,
) -> Result<Disposition> {
    loop {
        let pcb = table.get_mut(current).ok_or(Error::InvalidArgument)?;
        let Some(sig) = pcb.next_deliverable() else {
            return Ok(Disposition::Continue);
        };
        pcb.pending.remove(sig);
        match do_signal(table, platform, current, sig, ctx)? {
            Disposition::Continue => continue,
            done => return Ok(done),
        }
    }
}

// ─── Return from signal ─────────────────────────────────────────────

/// Undo a handler invocation after control reached the restorer.
///
/// On entry `ctx.sp` points just past the popped restorer word, at the
/// signal number. Reads the rest of the frame back, restores the
/// blocked mask (frames built for no-mask actions carry none; the
/// restorer for that variant passes `with_mask = false`), and puts the
/// saved registers and the pre-signal stack pointer back into `ctx`.
pub fn sig_return<P: Platform>(
    table: &mut ProcessTable,
    platform: &mut P,
    current: SlotId,
    ctx: &mut UserContext,
    with_mask: bool,
) -> Result<()> {
    let space = table
        .get(current)
        .ok_or(Error::InvalidArgument)?
        .address_space
        .ok_or(Error::Fault)?;

    // signum, (mask), ret, scratch x2, flags, ip
    let len = if with_mask { 7 } else { 6 };
    let mut words = [0u64; 7];
    if !platform.read_user(space, ctx.sp, &mut words[..len]) {
        return Err(Error::Fault);
    }

    let mut i = 1;
    if with_mask {
        let mut restored = SigSet(words[1] as u32);
        restored.remove(SIGKILL);
        if let Some(pcb) = table.get_mut(current) {
            pcb.blocked = restored;
        }
        i = 2;
    }
    ctx.ret = words[i];
    ctx.scratch[0] = words[i + 1];
    ctx.scratch[1] = words[i + 2];
    ctx.flags = words[i + 3];
    ctx.ip = words[i + 4];
    ctx.sp += (len * 8) as u64;
    Ok(())
}
