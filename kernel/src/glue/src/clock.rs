// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! `clock_gettime`/`clock_sleep`: thin wrappers over `sched`'s own
//! sleep primitives that additionally perform the kernel lock dance
//! around the suspend, since a guest kernel calling in here is
//! expected to be holding its own lock.

use crate::hooks;

/// The hypervisor's monotonic clock, in nanoseconds.
pub(crate) fn gettime() -> u64 {
    sched::now_ns()
}

/// Runs `suspend` with every kernel lock the caller holds dropped,
/// reacquiring the same count afterwards regardless of what `suspend`
/// returns. Every call in this crate that may block outside `sched`'s
/// own state goes through this.
fn with_kernel_lock_dropped<T>(suspend: impl FnOnce() -> T) -> T {
    let kernel_lock = hooks::kernel_lock();
    let held = kernel_lock.unsched();
    let result = suspend();
    kernel_lock.sched(held);
    result
}

/// Sleeps the caller for `ms` milliseconds, relative to now.
///
/// Drops every kernel lock the caller holds before suspending and
/// reacquires the same count before returning. Returns `true` if the
/// sleep elapsed via timer, `false` if an explicit wake arrived
/// first.
pub(crate) fn sleep_relative(ms: u64) -> bool {
    with_kernel_lock_dropped(|| sched::msleep(ms))
}

/// Sleeps the caller until `ms` milliseconds since an absolute epoch
/// of zero, with the same lock dance as [`sleep_relative`].
pub(crate) fn sleep_absolute(ms: u64) -> bool {
    with_kernel_lock_dropped(|| sched::absmsleep(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};
    use hostcalls::{Clock, KernelLock};

    struct FixedClock;
    impl Clock for FixedClock {
        fn now_ns(&self) -> u64 {
            1_000
        }
    }
    static CLOCK: FixedClock = FixedClock;

    static UNSCHED_CALLS: AtomicU64 = AtomicU64::new(0);
    static SCHED_CALLS: AtomicU64 = AtomicU64::new(0);

    struct CountingKernelLock;
    impl KernelLock for CountingKernelLock {
        fn unsched(&self) -> usize {
            UNSCHED_CALLS.fetch_add(1, Ordering::SeqCst);
            3
        }
        fn sched(&self, held: usize) {
            assert_eq!(held, 3, "sched must reacquire exactly what unsched reported");
            SCHED_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }
    static KERNEL_LOCK: CountingKernelLock = CountingKernelLock;

    #[test]
    fn gettime_reads_the_registered_clock() {
        sched::set_clock(&CLOCK);
        assert_eq!(gettime(), 1_000);
    }

    #[test]
    fn lock_dance_wraps_suspend_with_matching_unsched_and_sched() {
        let before_unsched = UNSCHED_CALLS.load(Ordering::SeqCst);
        let before_sched = SCHED_CALLS.load(Ordering::SeqCst);

        let held = KERNEL_LOCK.unsched();
        let result = with_kernel_lock_dropped_for_test(&KERNEL_LOCK, || 42);
        KERNEL_LOCK.sched(held);

        assert_eq!(result, 42);
        assert_eq!(UNSCHED_CALLS.load(Ordering::SeqCst), before_unsched + 2);
        assert_eq!(SCHED_CALLS.load(Ordering::SeqCst), before_sched + 2);
    }

    /// A test-only mirror of [`with_kernel_lock_dropped`] that takes
    /// an explicit lock instead of reading the registered one, so the
    /// dance can be exercised without going through `crate::init`.
    fn with_kernel_lock_dropped_for_test<T>(kernel_lock: &dyn KernelLock, suspend: impl FnOnce() -> T) -> T {
        let held = kernel_lock.unsched();
        let result = suspend();
        kernel_lock.sched(held);
        result
    }
}
