// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The submit path: builds a [`Request`], dispatches it to the
//! device, and wakes the poller.

use alloc::boxed::Box;

use hostcalls::{BioOp, Errno, KernelLock};

use crate::bridge;
use crate::request::{BioCallback, Request};

/// Submits an asynchronous block I/O request.
///
/// Returns as soon as the request has been handed to the driver;
/// completion is reported later, exactly once, through `callback`.
/// The only way this can fail is an invalid `fd` — once the `Request`
/// allocation itself succeeds, submission cannot fail, matching the
/// system this core is modelled on: an allocation failure here is
/// fatal, not recoverable, and is reported via [`hostcalls::bug`]
/// rather than this function's `Result`.
#[allow(clippy::too_many_arguments)]
pub fn submit(
    fd: i32,
    op: BioOp,
    buf: *mut u8,
    len: usize,
    offset: u64,
    callback: BioCallback,
    arg: usize,
    kernel_lock: &dyn KernelLock,
) -> Result<(), Errno> {
    let slot = hostcalls::slot_from_fd(fd).ok_or(Errno::Ebadf)?;

    let held = kernel_lock.unsched();

    bridge::ensure_poller_spawned();

    let request = Box::new(Request {
        slot,
        buf,
        len,
        offset,
        op,
        callback,
        arg,
    });
    let request_ptr = Box::into_raw(request);

    let dispatched = bridge::dispatch(slot, request_ptr, op.is_read());
    if dispatched.is_err() {
        // SAFETY: `request_ptr` has not been handed to any driver,
        // so reclaiming it here is the only outstanding reference.
        drop(unsafe { Box::from_raw(request_ptr) });
        kernel_lock.sched(held);
        hostcalls::bug("block device slot disappeared between slot_from_fd and dispatch");
    }

    bridge::increment_outstanding(slot);

    kernel_lock.sched(held);
    Ok(())
}
