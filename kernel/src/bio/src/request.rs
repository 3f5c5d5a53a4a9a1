// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The per-I/O request record handed across the boundary to a
//! [`crate::device::BlockDevice`] driver.

use hostcalls::BioOp;

/// Invoked exactly once per submitted request, by [`crate::poller::biocomp`].
///
/// `nbytes` is the transfer size on success; `errno` is
/// [`hostcalls::Errno::Eio`] as a raw `i32` on failure, `0` on
/// success. Never both nonzero.
pub type BioCallback = extern "C" fn(arg: usize, nbytes: usize, errno: i32);

/// A single asynchronous block I/O request.
///
/// Allocated in [`crate::submit::submit`], leaked into a raw pointer
/// so a driver can hold it across its own FFI-style completion
/// boundary, and reconstructed and dropped by
/// [`crate::poller::biocomp`] once the driver reports completion.
pub struct Request {
    pub slot: usize,
    pub buf: *mut u8,
    pub len: usize,
    pub offset: u64,
    pub op: BioOp,
    pub callback: BioCallback,
    pub arg: usize,
}
