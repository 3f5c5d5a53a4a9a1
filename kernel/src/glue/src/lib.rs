// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The thin glue surface an external guest kernel links against.
//!
//! Everything a guest needs from this support layer — thread
//! creation and the scheduler, asynchronous block I/O, environment
//! parameters, the monotonic clock, and page-aware `malloc`/`free` —
//! is re-exported or adapted here. This crate owns none of the hard
//! logic itself; [`sched`] and [`bio`] do. What lives here is purely
//! the one-time wiring ([`init`]) and the handful of calls
//! ([`getparam`], `clock_gettime`/`clock_sleep`, `malloc`/`free`)
//! that don't belong in either of those crates because they touch
//! collaborators neither one owns: the environment table, the page
//! allocator, and the kernel lock dance.

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

mod clock;
mod hooks;
mod memalloc;
mod params;

pub use bio::{biocomp, submit, BioCallback, DeviceKind, Request};
pub use hostcalls::{AccessMode, BioOp, Errno, OpenMode};
pub use sched::{Arch, ThreadEntry};

use hostcalls::{Clock, EventChannel, KernelLock, PageAllocator};

/// The version this core implements. [`init`] requires an exact
/// match; a mismatch is a configuration error, not something this
/// crate tries to paper over with compatibility shims.
pub const VERSION: u32 = 1;

/// Every external collaborator a guest kernel must supply before
/// calling [`init`].
pub struct Hooks {
    pub clock: &'static dyn Clock,
    pub event_channel: &'static dyn EventChannel,
    pub page_allocator: &'static dyn PageAllocator,
    pub kernel_lock: &'static dyn KernelLock,
    pub arch: &'static dyn Arch,
}

/// Validates `version`, wires up `hooks`, and starts the scheduler.
///
/// Exactly one successful call is expected. A version mismatch or a
/// second call both return [`Errno::Enxio`] rather than panicking or
/// silently re-wiring an already-running core out from under itself
/// — both are configuration errors, and this crate's error taxonomy
/// has no dedicated variant for "already initialised", so the two
/// share the nearest fit.
pub fn init(version: u32, hooks: Hooks) -> Result<(), Errno> {
    if version != VERSION {
        return Err(Errno::Enxio);
    }
    if !self::hooks::register(hooks.page_allocator, hooks.kernel_lock) {
        return Err(Errno::Enxio);
    }
    sched::set_clock(hooks.clock);
    sched::set_event_channel(hooks.event_channel);
    sched::set_arch(hooks.arch);
    sched::init_sched();
    Ok(())
}

/// Looks up a fixed environment parameter (`_RUMPUSER_NCPU`,
/// `_RUMPUSER_HOSTNAME`, `RUMP_VERBOSE`, `RUMP_MEMLIMIT`), copying its
/// value plus a NUL terminator into `buf`. Returns the number of
/// bytes written.
pub fn getparam(name: &str, buf: &mut [u8]) -> Result<usize, Errno> {
    params::get(name, buf)
}

/// The hypervisor's monotonic clock, in nanoseconds since an
/// arbitrary epoch.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] if [`init`] has never run.
pub fn clock_gettime() -> u64 {
    clock::gettime()
}

/// Sleeps the caller for `ms` milliseconds, relative to now, dropping
/// and reacquiring the caller's kernel locks around the suspend.
/// Returns `true` if the sleep elapsed via timer, `false` if an
/// explicit wake arrived first.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] if [`init`] has never run, or under the
/// same conditions as `sched::schedule` (already-masked or
/// callback-context re-entry).
pub fn clock_sleep_relative(ms: u64) -> bool {
    clock::sleep_relative(ms)
}

/// Sleeps the caller until `ms` milliseconds since an absolute epoch
/// of zero, with the same kernel-lock dance as
/// [`clock_sleep_relative`].
///
/// # Panics
///
/// See [`clock_sleep_relative`].
pub fn clock_sleep_absolute(ms: u64) -> bool {
    clock::sleep_absolute(ms)
}

/// Allocates `len` bytes aligned to `align`. Exactly-page-sized,
/// page-aligned requests are served by the registered
/// [`hostcalls::PageAllocator`]; everything else goes through the
/// global allocator.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] if [`init`] has never run and `len`/`align`
/// describe a page-sized request.
pub fn malloc(len: usize, align: usize) -> Result<*mut u8, Errno> {
    memalloc::malloc(len, align)
}

/// Frees a pointer previously returned by [`malloc`].
///
/// # Safety
///
/// `ptr`, `len`, and `align` must be exactly the allocation and
/// arguments a prior successful `malloc` call returned, not already
/// freed.
///
/// # Panics
///
/// Calls [`hostcalls::bug`] if [`init`] has never run and `len`/`align`
/// describe a page-sized request.
pub unsafe fn free(ptr: *mut u8, len: usize, align: usize) {
    memalloc::free(ptr, len, align)
}

/// Opens a block device by name (`blk0`..`blk9`), incrementing its
/// open reference count. Returns a descriptor in `[64, 74)`.
pub fn open(name: &str, mode: OpenMode) -> Result<i32, Errno> {
    bio::open(name, mode)
}

/// Closes a descriptor previously returned by [`open`]. At a zero
/// reference count the underlying device is shut down.
pub fn close(fd: i32) -> Result<(), Errno> {
    bio::close(fd)
}

/// Reports a device's capacity and kind without holding it open.
pub fn getfileinfo(name: &str) -> Result<(u64, DeviceKind), Errno> {
    bio::getfileinfo(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_rejects_a_version_mismatch_without_touching_hooks() {
        use crate::hooks::test_support::{CountingPageAllocator, NullKernelLock};
        use core::sync::atomic::AtomicUsize;

        struct UnusedClock;
        impl Clock for UnusedClock {
            fn now_ns(&self) -> u64 {
                0
            }
        }
        struct UnusedChannel;
        impl EventChannel for UnusedChannel {
            fn mask(&self) {}
            fn unmask(&self) {}
            fn block_domain(&self, _until_ns: u64) {}
            fn process_pending(&self) {}
        }
        struct UnusedArch;
        impl Arch for UnusedArch {
            fn alloc_stack(&self, _size: usize) -> Option<(usize, usize)> {
                None
            }
            unsafe fn free_stack(&self, _base: usize, _len: usize) {}
            unsafe fn prepare_stack(
                &self,
                _base: usize,
                _len: usize,
                _entry: ThreadEntry,
                _arg: usize,
            ) -> usize {
                0
            }
            unsafe fn switch(&self, _prev_sp: *mut usize, _next_sp: usize) {}
        }

        static CLOCK: UnusedClock = UnusedClock;
        static CHANNEL: UnusedChannel = UnusedChannel;
        static ARCH: UnusedArch = UnusedArch;
        static PAGE_ALLOC: CountingPageAllocator = CountingPageAllocator {
            allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        };
        static KERNEL_LOCK: NullKernelLock = NullKernelLock;

        let result = init(
            VERSION + 1,
            Hooks {
                clock: &CLOCK,
                event_channel: &CHANNEL,
                page_allocator: &PAGE_ALLOC,
                kernel_lock: &KERNEL_LOCK,
                arch: &ARCH,
            },
        );
        assert_eq!(result, Err(Errno::Enxio));
    }
}
