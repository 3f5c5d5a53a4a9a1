// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Registration of the two hooks this crate needs that `sched`
//! doesn't already own: the page allocator and the kernel-lock dance.
//! `Clock`, `EventChannel`, and `Arch` are forwarded straight to
//! `sched` by [`crate::init`] instead of being kept here.

use hostcalls::{KernelLock, PageAllocator};
use spin::Once;

static PAGE_ALLOCATOR: Once<&'static dyn PageAllocator> = Once::new();
static KERNEL_LOCK: Once<&'static dyn KernelLock> = Once::new();
static INITIALIZED: Once<()> = Once::new();

/// Records that `init` has run, registering the page allocator and
/// kernel lock. Returns `false` if this is a second or later call:
/// the caller (`crate::init`) turns that into a configuration error
/// rather than silently swapping the hooks out from under a running
/// bridge.
pub(crate) fn register(page_allocator: &'static dyn PageAllocator, kernel_lock: &'static dyn KernelLock) -> bool {
    let mut first = false;
    INITIALIZED.call_once(|| {
        first = true;
        PAGE_ALLOCATOR.call_once(|| page_allocator);
        KERNEL_LOCK.call_once(|| kernel_lock);
    });
    first
}

pub(crate) fn page_allocator() -> &'static dyn PageAllocator {
    *PAGE_ALLOCATOR
        .get()
        .unwrap_or_else(|| hostcalls::bug("glue::init was never called"))
}

pub(crate) fn kernel_lock() -> &'static dyn KernelLock {
    *KERNEL_LOCK
        .get()
        .unwrap_or_else(|| hostcalls::bug("glue::init was never called"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct CountingPageAllocator {
        pub allocs: AtomicUsize,
        pub frees: AtomicUsize,
    }

    impl PageAllocator for CountingPageAllocator {
        fn alloc_page(&self) -> Option<core::ptr::NonNull<u8>> {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            // A fixed, non-null, page-aligned sentinel: no real
            // memory backs it, which is fine since these tests never
            // dereference it.
            core::ptr::NonNull::new(hostcalls::PAGE_SIZE as *mut u8)
        }
        unsafe fn free_page(&self, _ptr: core::ptr::NonNull<u8>) {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct NullKernelLock;
    impl KernelLock for NullKernelLock {
        fn unsched(&self) -> usize {
            0
        }
        fn sched(&self, _held: usize) {}
    }

    static PAGE_ALLOC: CountingPageAllocator = CountingPageAllocator {
        allocs: AtomicUsize::new(0),
        frees: AtomicUsize::new(0),
    };
    static KERNEL_LOCK: NullKernelLock = NullKernelLock;

    /// Registers the mock hooks exactly once across this crate's
    /// whole test binary, mirroring the `ensure_hooks` pattern used
    /// by `bio`'s own tests: `spin::Once` only ever accepts the first
    /// registration, so later tests reuse the same statics.
    pub(crate) fn ensure_registered() {
        register(&PAGE_ALLOC, &KERNEL_LOCK);
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ensure_registered;
    use super::*;
    use crate::hooks::test_support::{CountingPageAllocator, NullKernelLock};
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn only_the_first_registration_reports_success() {
        ensure_registered();

        static OTHER_PAGE_ALLOC: CountingPageAllocator = CountingPageAllocator {
            allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        };
        static OTHER_KERNEL_LOCK: NullKernelLock = NullKernelLock;

        assert!(!register(&OTHER_PAGE_ALLOC, &OTHER_KERNEL_LOCK));
    }
}
