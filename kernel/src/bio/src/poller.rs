// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The dedicated poller thread and the completion hook drivers call
//! into.

use alloc::boxed::Box;

use hostcalls::{Errno, KernelLock};
use sched::InterruptGuard;

use crate::bridge;
use crate::request::Request;

const POLLER_COOKIE: usize = 0;

/// Spawns the poller thread. Called exactly once, from
/// [`crate::submit::submit`]'s double-checked spawn.
pub(crate) fn spawn() {
    sched::create_thread("bio-poller", POLLER_COOKIE, poller_entry, 0, None, false);
}

extern "C" fn poller_entry(_arg: usize) -> ! {
    run()
}

fn run() -> ! {
    loop {
        while bridge::outstanding_total() == 0 {
            bridge::CONDVAR.wait();
        }

        loop {
            let guard = InterruptGuard::acquire();
            let did = bridge::poll_all_slots();
            if did > 0 {
                drop(guard);
                break;
            }
            bridge::register_completion_waiters();
            drop(guard);
            sched::schedule();
        }
    }
}

/// Invoked by a driver, from the poller thread's own context, once
/// per completed request.
///
/// Reconstructs the boxed [`Request`] leaked by `submit`, invokes its
/// callback with either `(arg, nbytes, 0)` or `(arg, 0, Errno::Eio)`,
/// then drops the request and decrements the outstanding counters.
///
/// # Safety
///
/// `request` must be a pointer previously produced by `Box::into_raw`
/// inside [`crate::submit::submit`], not yet passed to `biocomp`.
pub unsafe fn biocomp(request: *mut Request, result: Result<usize, ()>, kernel_lock: &dyn KernelLock) {
    let request = Box::from_raw(request);

    // "Reacquire the kernel lock": the poller thread does not itself
    // hold it, so this is an acquire, paired with the release below.
    kernel_lock.sched(1);
    match result {
        Ok(nbytes) => (request.callback)(request.arg, nbytes, 0),
        Err(()) => (request.callback)(request.arg, 0, Errno::Eio.as_i32()),
    }
    kernel_lock.unsched();

    let slot = request.slot;
    drop(request);
    bridge::decrement_outstanding(slot);
}
