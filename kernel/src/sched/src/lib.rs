// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! A cooperative, round-robin thread scheduler for a single virtual
//! CPU.
//!
//! There is one run queue, holding every live thread whether or not
//! it is currently runnable; [`schedule`] scans it, latches elapsed
//! sleep timeouts, and rotates the next runnable thread to the tail
//! before switching to it. Mutual exclusion over the run queue, the
//! exited list, and the join wait-list comes from masking event
//! delivery ([`gate::InterruptGuard`]), which is sufficient because
//! there is only one CPU to hold it.
//!
//! This crate implements none of its external collaborators: the
//! guest kernel registers a [`hostcalls::Clock`], a
//! [`hostcalls::EventChannel`], and an [`Arch`] with [`set_clock`],
//! [`set_event_channel`], and [`set_arch`] before calling
//! [`init_sched`].

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(deprecated_in_future)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(missing_abi)]

extern crate alloc;

mod gate;
mod hooks;
mod queue;
mod scheduler;
mod thread;

#[cfg(target_arch = "x86_64")]
pub mod arch_x86_64;

use alloc::sync::Arc;

pub use gate::InterruptGuard;
pub use hooks::{set_arch, set_clock, set_event_channel};
pub use thread::{Arch, Thread, ThreadEntry, ThreadFlags, ThreadId};

use scheduler::SCHEDULER;

/// Creates the idle thread and marks the scheduler ready. Idempotent:
/// calls after the first are ignored.
pub fn init_sched() {
    SCHEDULER.init_sched();
}

/// Creates a new thread, runnable immediately.
///
/// `stack`, if supplied, is used as-is and never freed by this crate
/// (the caller retains ownership); otherwise a stack is allocated
/// through the registered [`Arch`]. `must_join` marks the thread so
/// that [`exit_thread`] parks it for [`join_thread`] instead of
/// reaping it immediately.
pub fn create_thread(
    name: &str,
    cookie: usize,
    entry: ThreadEntry,
    arg: usize,
    stack: Option<(usize, usize)>,
    must_join: bool,
) -> Arc<Thread> {
    SCHEDULER.create_thread(name, cookie, entry, arg, stack, must_join)
}

/// Returns the currently running thread, or `None` before
/// [`init_sched`] has run.
pub fn current_thread() -> Option<Arc<Thread>> {
    SCHEDULER.current()
}

/// Reads the registered [`hostcalls::Clock`] directly, in nanoseconds
/// since an arbitrary epoch. Exposed so that a guest kernel's
/// `clock_gettime` can read the same clock `schedule` uses internally
/// without needing its own handle on it.
pub fn now_ns() -> u64 {
    hooks::clock().now_ns()
}

/// Installs a callback invoked with `(prev.cookie(), next.cookie())`
/// immediately before every context switch.
pub fn set_sched_hook<F>(hook: F)
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    SCHEDULER.set_sched_hook(hook)
}

/// Runs the main dispatch loop: picks the next runnable thread,
/// switching to it if it differs from the caller, then reaps any
/// threads that exited while this thread was away.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] (which panics) if the interrupt gate is
/// already held at entry, or if called from callback context (see
/// [`set_in_callback`]).
pub fn schedule() {
    SCHEDULER.schedule()
}

/// Clears `t`'s wake-up time and `RUNNABLE` flag. Does not itself
/// call `schedule`.
pub fn block(t: &Thread) {
    SCHEDULER.block(t)
}

/// Clears `t`'s wake-up time and sets `RUNNABLE`. Idempotent.
pub fn wake(t: &Thread) {
    SCHEDULER.wake(t)
}

/// Sleeps the current thread for `ms` milliseconds, relative to now.
/// Returns `true` if the sleep elapsed via timer, `false` if an
/// explicit [`wake`] arrived first.
pub fn msleep(ms: u64) -> bool {
    SCHEDULER.msleep(ms)
}

/// Sleeps the current thread until `ms` milliseconds since an
/// absolute epoch of zero. Returns `true` if the sleep elapsed via
/// timer, `false` if an explicit [`wake`] arrived first.
pub fn absmsleep(ms: u64) -> bool {
    SCHEDULER.absmsleep(ms)
}

/// Exits the current thread. Never returns.
///
/// If the thread was created with `must_join = true`, parks it
/// (repeatedly, to guard against spurious wakes) until a matching
/// [`join_thread`] call observes it. Either way, the descriptor is
/// then moved to the exited list, where the next `schedule` call made
/// by some other thread will reap it.
pub fn exit_thread() -> ! {
    SCHEDULER.exit_thread()
}

/// Blocks the current thread until `target` exits.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] if `target` was not created with
/// `must_join = true`.
pub fn join_thread(target: &Arc<Thread>) {
    SCHEDULER.join_thread(target)
}

/// Returns whether the caller is currently executing in callback
/// context, i.e. directly from the hypervisor event-delivery path
/// rather than from ordinary thread context. `schedule` refuses to
/// run in this state.
pub fn in_callback() -> bool {
    SCHEDULER.in_callback()
}

/// Sets or clears callback-context state. Called by the hypervisor
/// event layer around upcalls; this crate never sets it itself.
pub fn set_in_callback(value: bool) {
    SCHEDULER.set_in_callback(value)
}
