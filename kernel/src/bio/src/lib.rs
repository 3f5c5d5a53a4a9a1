// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! An asynchronous block I/O bridge for a single-virtual-CPU guest.
//!
//! A submit call ([`submit`]) builds a [`Request`], hands it to a
//! registered [`BlockDevice`], and returns once the driver has
//! accepted it; completion is reported later, exactly once, through
//! the caller's callback, by [`biocomp`] running on a dedicated
//! poller thread spawned the first time `submit` is called. The
//! poller and the submitting thread coordinate through a condition
//! variable built entirely on [`sched`]'s own block/wake primitives,
//! since there is no host thread/condvar to borrow.

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

mod bridge;
mod condvar;
mod device;
mod poller;
mod request;
mod submit;

pub use bridge::{getfileinfo, register_device, DeviceKind};
pub use device::{BlockDevice, BlockInfo};
pub use poller::biocomp;
pub use request::{BioCallback, Request};
pub use submit::submit;

use hostcalls::{Errno, OpenMode};

/// Opens a device by name, incrementing its reference count.
pub fn open(name: &str, mode: OpenMode) -> Result<i32, Errno> {
    bridge::open(name, mode)
}

/// Closes a descriptor previously returned by [`open`].
pub fn close(fd: i32) -> Result<(), Errno> {
    bridge::close(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::cell::Cell;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use sched::InterruptGuard;

    struct NullChannel;
    impl hostcalls::EventChannel for NullChannel {
        fn mask(&self) {}
        fn unmask(&self) {}
        fn block_domain(&self, _until_ns: u64) {}
        fn process_pending(&self) {}
    }
    static CHANNEL: NullChannel = NullChannel;

    fn ensure_hooks() {
        sched::set_event_channel(&CHANNEL);
    }

    struct MockDevice {
        info: BlockInfo,
        polled: AtomicUsize,
    }

    impl BlockDevice for MockDevice {
        fn info(&self) -> BlockInfo {
            self.info
        }
        fn submit_read(&self, _request: *mut Request) {}
        fn submit_write(&self, _request: *mut Request) {}
        fn poll(&self) -> usize {
            self.polled.fetch_add(1, Ordering::SeqCst)
        }
        fn register_completion_waiter(&self) {}
    }

    fn mock(read_only: bool) -> Arc<dyn BlockDevice> {
        Arc::new(MockDevice {
            info: BlockInfo {
                sector_size: 512,
                sector_count: 2048,
                read_only,
            },
            polled: AtomicUsize::new(0),
        })
    }

    #[test]
    fn open_close_round_trips_the_reference_count() {
        ensure_hooks();
        bridge::test_support::reset();
        bridge::register_device(3, mock(false)).unwrap();

        let fd = open("blk3", OpenMode::BLOCK).unwrap();
        assert_eq!(fd, hostcalls::BLKFDOFF + 3);
        let fd2 = open("blk3", OpenMode::BLOCK).unwrap();
        assert_eq!(fd, fd2);

        close(fd).unwrap();
        let (bytes, kind) = getfileinfo("blk3").unwrap();
        assert_eq!(bytes, 512 * 2048);
        assert_eq!(kind, DeviceKind::Block);

        close(fd2).unwrap();
        assert_eq!(getfileinfo("blk3"), Err(Errno::Enxio));
    }

    #[test]
    fn write_mode_against_read_only_device_is_rejected() {
        ensure_hooks();
        bridge::test_support::reset();
        bridge::register_device(1, mock(true)).unwrap();

        let result = open("blk1", OpenMode::BLOCK | OpenMode::WRONLY);
        assert_eq!(result, Err(Errno::Erofs));

        let ok = open("blk1", OpenMode::BLOCK);
        assert!(ok.is_ok());
        close(ok.unwrap()).unwrap();
    }

    #[test]
    fn unknown_name_and_bad_descriptor_are_rejected() {
        ensure_hooks();
        bridge::test_support::reset();
        assert_eq!(open("blk4", OpenMode::BLOCK), Err(Errno::Enxio));
        assert_eq!(open("disk0", OpenMode::BLOCK), Err(Errno::Enoent));
        assert_eq!(close(5), Err(Errno::Ebadf));
    }

    #[test]
    fn outstanding_counters_track_increments_and_decrements() {
        ensure_hooks();
        bridge::test_support::reset();
        bridge::register_device(2, mock(false)).unwrap();

        assert_eq!(bridge::outstanding_total(), 0);
        bridge::increment_outstanding(2);
        bridge::increment_outstanding(2);
        assert_eq!(bridge::outstanding_total(), 2);
        bridge::decrement_outstanding(2);
        assert_eq!(bridge::outstanding_total(), 1);
        bridge::decrement_outstanding(2);
        assert_eq!(bridge::outstanding_total(), 0);
    }

    #[test]
    fn poll_all_slots_only_visits_slots_with_outstanding_work() {
        ensure_hooks();
        bridge::test_support::reset();
        bridge::register_device(0, mock(false)).unwrap();
        bridge::register_device(1, mock(false)).unwrap();

        assert_eq!(bridge::poll_all_slots(), 0);
        bridge::increment_outstanding(0);
        assert_eq!(bridge::poll_all_slots(), 1);
    }

    #[test]
    fn gate_is_reentrant_across_condvar_signal() {
        ensure_hooks();
        let _outer = InterruptGuard::acquire();
        bridge::test_support::reset();
        bridge::register_device(0, mock(false)).unwrap();
        bridge::increment_outstanding(0);
    }
}
