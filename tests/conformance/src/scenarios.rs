//! End-to-end lifecycle and signal scenarios.
//!
//! Each test drives the public operations the way an embedder's trap
//! dispatcher would, then asserts on observable state: pids, status
//! words, pending bits, user memory.

use std::collections::HashSet;

use tine_proc::deliver::{deliver_pending, Disposition};
use tine_proc::error::Error;
use tine_proc::exit::exit;
use tine_proc::fork::fork;
use tine_proc::jobctl;
use tine_proc::signal::{self, SigSet, SIGCHLD, SIGHUP, SIGINT, SIGUSR1, SIGUSR2};
use tine_proc::syscall;
use tine_proc::wait::{waitpid, WaitOptions};
use tine_proc::{AsHandle, Pid, Platform};

use crate::{Machine, ScriptedPlatform, USER_SP};

#[test]
fn test_fork_fills_table_with_distinct_pids() {
    let mut m = Machine::with_capacity(8);
    let mut pids = HashSet::new();
    pids.insert(Pid::INIT);

    while !m.table.is_full() {
        let (pid, _slot) = m.fork(m.init);
        assert!(pids.insert(pid), "live pid handed out twice");
    }
    assert_eq!(m.table.live_count(), 8);

    let ctx = m.user_context();
    assert_eq!(
        fork(&mut m.table, &mut m.platform, m.init, &ctx),
        Err(Error::ResourceExhausted)
    );
    assert_eq!(m.table.live_count(), 8);
}

#[test]
fn test_fork_exit_wait_round_trip() {
    let mut m = Machine::boot();
    let (pid, child) = m.fork(m.init);

    exit(&mut m.table, &mut m.platform, child, 5);

    let report = waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid.0 as i32,
        WaitOptions::empty(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.pid, pid);
    assert_eq!(report.status >> 8, 5);
    assert!(m.table.find_pid(pid).is_none());
}

#[test]
fn test_wait_without_children_is_echild() {
    let mut m = Machine::boot();
    let pending_before = m.table.get(m.init).unwrap().pending;
    let state_before = m.table.get(m.init).unwrap().state;

    for _ in 0..2 {
        assert_eq!(
            waitpid(&mut m.table, &mut m.platform, m.init, -1, WaitOptions::empty()),
            Err(Error::NoChild)
        );
    }
    let me = m.table.get(m.init).unwrap();
    assert_eq!(me.pending, pending_before);
    assert_eq!(me.state, state_before);
    assert_eq!(m.platform.yields, 0);
}

#[test]
fn test_one_shot_handler_is_unreliable_by_contract() {
    let mut m = Machine::boot();
    let (_pid, child) = m.fork(m.init);
    assert_eq!(
        syscall::sys_signal(&mut m.table, child, SIGUSR1 as u64, 0x600, 0x500),
        syscall::SIG_DFL as i64
    );

    // First delivery runs the handler
    signal::send_sig(&mut m.table, m.init, child, SIGUSR1, true).unwrap();
    let mut ctx = m.user_context();
    let d = deliver_pending(&mut m.table, &mut m.platform, child, &mut ctx).unwrap();
    assert_eq!(d, Disposition::Handled);
    assert_eq!(ctx.ip, 0x600);

    // Second delivery before re-registration takes the default action
    signal::send_sig(&mut m.table, m.init, child, SIGUSR1, true).unwrap();
    let mut ctx = m.user_context();
    let d = deliver_pending(&mut m.table, &mut m.platform, child, &mut ctx).unwrap();
    assert_eq!(d, Disposition::Terminated);

    let report = waitpid(&mut m.table, &mut m.platform, m.init, -1, WaitOptions::empty())
        .unwrap()
        .unwrap();
    assert_eq!(report.status & 0xff, SIGUSR1 as i32);
}

#[test]
fn test_unprivileged_cross_uid_kill_changes_nothing() {
    let mut m = Machine::boot();
    let (victim_pid, victim) = m.fork(m.init);
    let (_, sender) = m.fork(m.init);
    {
        let pcb = m.table.get_mut(sender).unwrap();
        pcb.uid = 7;
        pcb.euid = 7;
    }
    m.table.get_mut(victim).unwrap().pending.insert(SIGHUP);
    let before = m.table.get(victim).unwrap().pending;

    assert_eq!(
        signal::kill(&mut m.table, sender, victim_pid.0 as i32, SIGUSR1),
        Err(Error::PermissionDenied)
    );
    assert_eq!(m.table.get(victim).unwrap().pending.0, before.0);
}

#[test]
fn test_session_leader_exit_sends_hangup_and_reparents() {
    let mut m = Machine::boot();
    let (_pid_a, a) = m.fork(m.init);
    jobctl::setsid(&mut m.table, a).unwrap();
    let (_, b) = m.fork(a);
    let (_, c) = m.fork(a);

    exit(&mut m.table, &mut m.platform, a, 0);

    for slot in [b, c] {
        let pcb = m.table.get(slot).unwrap();
        assert_eq!(pcb.ppid, Pid::INIT);
        assert!(pcb.pending.contains(SIGHUP));
    }
    // init is outside the session and only hears about A's death
    let me = m.table.get(m.init).unwrap();
    assert!(!me.pending.contains(SIGHUP));
    assert!(me.pending.contains(SIGCHLD));
}

#[test]
fn test_orphaned_zombie_is_handed_to_init() {
    let mut m = Machine::boot();
    let (pid_a, a) = m.fork(m.init);
    let (pid_b, b) = m.fork(a);

    exit(&mut m.table, &mut m.platform, b, 3);
    exit(&mut m.table, &mut m.platform, a, 0);

    assert_eq!(m.table.get(b).unwrap().ppid, Pid::INIT);
    assert!(m.table.get(m.init).unwrap().pending.contains(SIGCHLD));

    // init reaps the inherited zombie and its own child
    let report = waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid_b.0 as i32,
        WaitOptions::empty(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.status >> 8, 3);
    let report = waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid_a.0 as i32,
        WaitOptions::empty(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.pid, pid_a);
    assert_eq!(m.table.live_count(), 1);
}

#[test]
fn test_orphan_exit_notifies_init_not_dead_parent() {
    let mut m = Machine::boot();
    let (pid_a, a) = m.fork(m.init);
    let (pid_b, b) = m.fork(a);

    exit(&mut m.table, &mut m.platform, a, 0);
    assert_eq!(m.table.get(b).unwrap().ppid, Pid::INIT);

    let report = waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid_a.0 as i32,
        WaitOptions::empty(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.pid, pid_a);
    m.table.get_mut(m.init).unwrap().pending.remove(SIGCHLD);

    // B's own death now notifies init, its adoptive parent
    exit(&mut m.table, &mut m.platform, b, 7);
    assert!(m.table.get(m.init).unwrap().pending.contains(SIGCHLD));
    let report = waitpid(&mut m.table, &mut m.platform, m.init, -1, WaitOptions::empty())
        .unwrap()
        .unwrap();
    assert_eq!(report.pid, pid_b);
    assert_eq!(report.status >> 8, 7);
}

#[test]
fn test_blocked_wait_reaps_after_wake() {
    let mut m = Machine::boot();
    let (pid, child) = m.fork(m.init);
    m.platform.script_yield(move |table| {
        let mut inner = ScriptedPlatform::new();
        exit(table, &mut inner, child, 2);
    });

    let status_ptr = USER_SP + 0x100;
    let got = syscall::sys_waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid.0 as i64,
        status_ptr,
        0,
    );
    assert_eq!(got, pid.0 as i64);
    assert_eq!(m.platform.read_word(AsHandle(1), status_ptr) >> 8, 2);
    assert_eq!(m.platform.yields, 1);
}

#[test]
fn test_unrelated_signal_interrupts_blocked_wait() {
    let mut m = Machine::boot();
    let (_pid, _child) = m.fork(m.init);
    m.platform.script_yield(|table| {
        let waiter = table.find_pid(Pid::INIT).unwrap();
        table.get_mut(waiter).unwrap().pending.insert(SIGUSR1);
    });

    let got = syscall::sys_waitpid(&mut m.table, &mut m.platform, m.init, -1, 0, 0);
    assert_eq!(got, -syscall::EINTR);
}

#[test]
fn test_stop_report_via_wuntraced() {
    let mut m = Machine::boot();
    let (pid, child) = m.fork(m.init);
    jobctl::stop(&mut m.table, child).unwrap();

    let status_ptr = USER_SP + 0x200;
    let got = syscall::sys_waitpid(&mut m.table, &mut m.platform, m.init, -1, status_ptr, 2);
    assert_eq!(got, pid.0 as i64);
    assert_eq!(m.platform.read_word(AsHandle(1), status_ptr) & 0xff, 0x7f);
    // Reported, not reaped
    assert!(m.table.get(child).is_some());

    jobctl::resume(&mut m.table, child).unwrap();
    assert_eq!(
        syscall::sys_waitpid(&mut m.table, &mut m.platform, m.init, -1, 0, 1),
        0
    );
}

#[test]
fn test_stale_slot_handles_fail_after_reuse() {
    let mut m = Machine::with_capacity(2);
    let (pid, child) = m.fork(m.init);
    exit(&mut m.table, &mut m.platform, child, 0);
    waitpid(
        &mut m.table,
        &mut m.platform,
        m.init,
        pid.0 as i32,
        WaitOptions::empty(),
    )
    .unwrap();

    // The next fork reuses the slot under a fresh generation
    let (pid2, child2) = m.fork(m.init);
    assert_eq!(child2.index, child.index);
    assert_ne!(child2.generation, child.generation);
    assert_ne!(pid2, pid);

    // The stale handle reaches nothing, not the new occupant
    assert!(m.table.get(child).is_none());
    assert_eq!(jobctl::getpid(&m.table, child), Err(Error::InvalidArgument));
    assert_eq!(
        signal::sigpending(&m.table, child),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn test_handler_delivery_and_sigreturn_round_trip() {
    let mut m = Machine::boot();
    let (pid, child) = m.fork(m.init);
    let space = m.table.get(child).unwrap().address_space.unwrap();

    // sigaction user struct: {handler, mask, flags, restorer}
    let new_ptr = USER_SP + 0x300;
    m.platform
        .write_user(space, new_ptr, &[0x600, SigSet::one(SIGHUP).0 as u64, 0, 0x500]);
    assert_eq!(
        syscall::sys_sigaction(
            &mut m.table,
            &mut m.platform,
            child,
            SIGUSR1 as u64,
            new_ptr,
            0
        ),
        0
    );

    assert_eq!(
        syscall::sys_kill(&mut m.table, m.init, pid.0 as i64, SIGUSR1 as i64),
        0
    );

    let entry = {
        let mut ctx = m.table.get(child).unwrap().context;
        ctx.ret = 42;
        ctx
    };
    let mut ctx = entry;
    let d = deliver_pending(&mut m.table, &mut m.platform, child, &mut ctx).unwrap();
    assert_eq!(d, Disposition::Handled);
    assert_eq!(ctx.ip, 0x600);
    let during = m.table.get(child).unwrap().blocked;
    assert!(during.contains(SIGUSR1));
    assert!(during.contains(SIGHUP));

    // The handler's ret lands in the restorer, which calls sigreturn
    ctx.sp += 8;
    let ret = syscall::sys_sigreturn(&mut m.table, &mut m.platform, child, &mut ctx, true);
    assert_eq!(ret, 42);
    assert_eq!(ctx, entry);
    assert!(m.table.get(child).unwrap().blocked.is_empty());
}

#[test]
fn test_kill_selector_modes_and_aggregation() {
    let mut m = Machine::boot();
    let (_, a) = m.fork(m.init);
    let (_, b) = m.fork(m.init);
    let (_, c) = m.fork(m.init);
    m.table.get_mut(a).unwrap().pgrp = Pid(50);
    m.table.get_mut(b).unwrap().pgrp = Pid(50);

    // Explicit group hits exactly that group
    assert_eq!(signal::kill(&mut m.table, m.init, -50, SIGUSR1), Ok(()));
    assert!(m.table.get(a).unwrap().pending.contains(SIGUSR1));
    assert!(m.table.get(b).unwrap().pending.contains(SIGUSR1));
    assert!(!m.table.get(c).unwrap().pending.contains(SIGUSR1));

    // pid 0: the caller's own group, caller included
    assert_eq!(signal::kill(&mut m.table, m.init, 0, SIGHUP), Ok(()));
    assert!(m.table.get(c).unwrap().pending.contains(SIGHUP));
    assert!(m.table.get(m.init).unwrap().pending.contains(SIGHUP));
    assert!(!m.table.get(a).unwrap().pending.contains(SIGHUP));

    // pid -1: everything but the caller and init
    assert_eq!(signal::kill(&mut m.table, m.init, -1, SIGINT), Ok(()));
    for slot in [a, b, c] {
        assert!(m.table.get(slot).unwrap().pending.contains(SIGINT));
    }
    assert!(!m.table.get(m.init).unwrap().pending.contains(SIGINT));

    // Matching nobody is a success
    assert_eq!(signal::kill(&mut m.table, m.init, -999, SIGUSR1), Ok(()));

    // A broadcast reports the last failure but still delivers elsewhere
    let (_, sender) = m.fork(m.init);
    {
        let pcb = m.table.get_mut(sender).unwrap();
        pcb.uid = 9;
        pcb.euid = 9;
        pcb.pgrp = Pid(60);
    }
    {
        let pcb = m.table.get_mut(a).unwrap();
        pcb.euid = 9;
        pcb.pgrp = Pid(60);
    }
    m.table.get_mut(b).unwrap().pgrp = Pid(60); // still euid 0
    assert_eq!(
        signal::kill(&mut m.table, sender, -60, SIGUSR2),
        Err(Error::PermissionDenied)
    );
    assert!(m.table.get(a).unwrap().pending.contains(SIGUSR2));
    assert!(!m.table.get(b).unwrap().pending.contains(SIGUSR2));
}
