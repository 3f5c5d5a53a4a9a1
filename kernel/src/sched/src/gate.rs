// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The interrupt gate: a scoped, nestable guard over event delivery.
//!
//! There is exactly one virtual CPU, so masking event delivery while a
//! guard is held is sufficient mutual exclusion for every shared
//! structure the scheduler and the block I/O bridge touch. Nested
//! acquisitions are common (a caller holding a guard may call into code
//! that itself acquires one), so only the outermost acquire and the
//! matching release actually touch the underlying [`EventChannel`].

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::hooks;

static DEPTH: AtomicUsize = AtomicUsize::new(0);

/// A held interrupt gate. Dropping it releases one level of nesting.
#[must_use = "the gate is released when this guard is dropped"]
pub struct InterruptGuard {
    _private: (),
}

impl InterruptGuard {
    /// Acquires the gate, masking event delivery if this is the
    /// outermost acquisition.
    pub fn acquire() -> Self {
        if DEPTH.fetch_add(1, Ordering::SeqCst) == 0 {
            hooks::event_channel().mask();
        }
        InterruptGuard { _private: () }
    }

    /// Returns whether the gate is currently held, by any nesting
    /// depth. Used by `schedule` to detect the bug of being called
    /// with the gate already held at entry.
    pub fn held() -> bool {
        DEPTH.load(Ordering::SeqCst) > 0
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if DEPTH.fetch_sub(1, Ordering::SeqCst) == 1 {
            hooks::event_channel().unmask();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize as Counter;
    use hostcalls::EventChannel;

    struct CountingChannel {
        masks: Counter,
        unmasks: Counter,
    }

    impl EventChannel for CountingChannel {
        fn mask(&self) {
            self.masks.fetch_add(1, Ordering::SeqCst);
        }
        fn unmask(&self) {
            self.unmasks.fetch_add(1, Ordering::SeqCst);
        }
        fn block_domain(&self, _until_ns: u64) {}
        fn process_pending(&self) {}
    }

    static CHANNEL: CountingChannel = CountingChannel {
        masks: Counter::new(0),
        unmasks: Counter::new(0),
    };

    fn ensure_registered() {
        hooks::set_event_channel(&CHANNEL);
    }

    #[test]
    fn nested_acquisitions_mask_and_unmask_exactly_once() {
        ensure_registered();
        let before_masks = CHANNEL.masks.load(Ordering::SeqCst);
        let before_unmasks = CHANNEL.unmasks.load(Ordering::SeqCst);

        assert!(!InterruptGuard::held());
        let outer = InterruptGuard::acquire();
        assert!(InterruptGuard::held());
        {
            let _inner = InterruptGuard::acquire();
            assert!(InterruptGuard::held());
        }
        assert!(InterruptGuard::held());
        drop(outer);
        assert!(!InterruptGuard::held());

        assert_eq!(CHANNEL.masks.load(Ordering::SeqCst), before_masks + 1);
        assert_eq!(CHANNEL.unmasks.load(Ordering::SeqCst), before_unmasks + 1);
    }
}
