// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Registration points for this crate's external collaborators.
//!
//! `sched` does not implement a clock, an event channel, or a stack
//! swap; it calls through to whatever the guest kernel registers here
//! at startup, once, before [`crate::init_sched`] is called.

use hostcalls::{Clock, EventChannel};
use spin::Once;

use crate::thread::Arch;

static CLOCK: Once<&'static dyn Clock> = Once::new();
static EVENT_CHANNEL: Once<&'static dyn EventChannel> = Once::new();
static ARCH: Once<&'static dyn Arch> = Once::new();

/// Registers the hypervisor's monotonic clock.
///
/// Only the first call has any effect; later calls are ignored, so
/// that re-initialisation attempts cannot silently swap the clock out
/// from under a running scheduler.
pub fn set_clock(clock: &'static dyn Clock) {
    CLOCK.call_once(|| clock);
}

/// Registers the hypervisor's event-channel machinery.
pub fn set_event_channel(channel: &'static dyn EventChannel) {
    EVENT_CHANNEL.call_once(|| channel);
}

/// Registers the architecture-specific stack swap.
pub fn set_arch(arch: &'static dyn Arch) {
    ARCH.call_once(|| arch);
}

pub(crate) fn clock() -> &'static dyn Clock {
    *CLOCK
        .get()
        .unwrap_or_else(|| hostcalls::bug("sched::set_clock was never called"))
}

pub(crate) fn event_channel() -> &'static dyn EventChannel {
    *EVENT_CHANNEL
        .get()
        .unwrap_or_else(|| hostcalls::bug("sched::set_event_channel was never called"))
}

pub(crate) fn arch() -> &'static dyn Arch {
    *ARCH
        .get()
        .unwrap_or_else(|| hostcalls::bug("sched::set_arch was never called"))
}
