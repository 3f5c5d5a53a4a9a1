// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The block-front driver contract this crate dispatches requests
//! to, and reads completions from.

use crate::request::Request;

/// Static facts about a block device, fixed for its lifetime in a
/// slot.
#[derive(Clone, Copy, Debug)]
pub struct BlockInfo {
    pub sector_size: u32,
    pub sector_count: u64,
    pub read_only: bool,
}

impl BlockInfo {
    pub fn capacity_bytes(&self) -> u64 {
        self.sector_count * self.sector_size as u64
    }
}

/// A paravirtual block-front driver.
///
/// None of this crate implements the wire protocol to the
/// hypervisor's block backend; a guest kernel supplies this trait and
/// [`crate::register_device`]s it. Every method may be called from
/// either the submitting thread or the dedicated poller thread
/// (never concurrently, since there is one virtual CPU), so the only
/// contract beyond ordinary `Send + Sync` is: a slot is never closed
/// while its outstanding count is nonzero (the client's
/// responsibility, not this crate's).
pub trait BlockDevice: Send + Sync {
    /// Static geometry and capability.
    fn info(&self) -> BlockInfo;

    /// Dispatches a read. The driver owns `request` until it calls
    /// [`crate::poller::biocomp`] with the same pointer.
    ///
    /// # Safety
    ///
    /// `request` must be a pointer previously produced by
    /// `Box::into_raw` inside this crate, not yet passed to
    /// `biocomp`.
    fn submit_read(&self, request: *mut Request);

    /// Dispatches a write. Same ownership contract as `submit_read`.
    fn submit_write(&self, request: *mut Request);

    /// Drains completed requests, invoking [`crate::poller::biocomp`]
    /// for each. Returns how many were drained.
    fn poll(&self) -> usize;

    /// Registers the poller as wanting to be woken the next time this
    /// device reports a completion, for drivers whose completion
    /// delivery is itself interrupt/event driven rather than purely
    /// poll driven.
    fn register_completion_waiter(&self);
}
