// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! A condition variable with no OS underneath it.
//!
//! There is no thread/condvar primitive to borrow from a host
//! environment here; this is built the same way `sched` models
//! everything else, as a wait queue of thread handles mutated only
//! while `sched`'s own interrupt gate is held.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use sched::{InterruptGuard, Thread};
use spin::Mutex;

pub(crate) struct CondVar {
    waiters: Mutex<VecDeque<Arc<Thread>>>,
}

impl CondVar {
    pub const fn new() -> Self {
        CondVar {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Parks the calling thread until a matching `signal`.
    ///
    /// Callers are expected to have already released whatever data
    /// this wait is conditioned on (the bridge mutex); this mirrors a
    /// textbook condvar wait releasing its mutex, except the release
    /// happens in the caller just before this call rather than inside
    /// it, since the lock in question is a plain `spin::Mutex` with
    /// no notion of a condvar pairing.
    pub fn wait(&self) {
        let current = sched::current_thread()
            .unwrap_or_else(|| hostcalls::bug("condvar wait called with no current thread"));
        {
            let _guard = InterruptGuard::acquire();
            self.waiters.lock().push_back(Arc::clone(&current));
            sched::block(&current);
        }
        sched::schedule();
    }

    /// Wakes every thread currently parked in `wait`.
    ///
    /// Edge triggered: a signal with no one waiting is simply
    /// dropped. Callers that need "wake whoever eventually checks the
    /// condition" re-check their condition in a loop around `wait`,
    /// exactly as the poller's outer loop does.
    pub fn signal(&self) {
        let _guard = InterruptGuard::acquire();
        let mut waiters = self.waiters.lock();
        while let Some(thread) = waiters.pop_front() {
            sched::wake(&thread);
        }
    }
}
