// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The run queue scan, pulled out of `Scheduler::schedule` so it can
//! be unit tested without an `Arch` or an interrupt gate: it is a
//! plain function over a `VecDeque` and a timestamp.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use crate::thread::{Thread, ThreadFlags};

/// How far out `schedule` parks the virtual CPU when every live
/// thread is either blocked with no timeout or blocked with a
/// timeout further out than this.
pub(crate) const DEFAULT_HORIZON_NS: u64 = 10_000_000_000;

/// A join waiter record: `waiter` is parked until `target` exits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct JoinWaiter {
    pub waiter: crate::thread::ThreadId,
    pub target: crate::thread::ThreadId,
}

/// Scans `queue` for timed-out sleepers and the next runnable thread
/// in one pass.
///
/// Every thread that is not runnable but carries a nonzero wake-up
/// time at or before `now` is latched `TIMED_OUT` and made runnable
/// in place. The first runnable thread found (including one just
/// latched by this same scan) is rotated to the tail of the queue and
/// returned as `next`. If no thread is runnable, `next` is `None` and
/// the second element is the earliest upcoming wake-up time, seeded
/// at `now + DEFAULT_HORIZON_NS` if nothing is sleeping with a
/// timeout sooner than that.
pub(crate) fn scan_and_rotate(
    queue: &mut VecDeque<Arc<Thread>>,
    now: u64,
) -> (Option<Arc<Thread>>, u64) {
    let mut min_wakeup = now.saturating_add(DEFAULT_HORIZON_NS);
    let mut next_pos = None;

    for (index, thread) in queue.iter().enumerate() {
        if thread.is_runnable() {
            if next_pos.is_none() {
                next_pos = Some(index);
            }
            continue;
        }
        let wakeup_time = thread.wakeup_time();
        if wakeup_time == 0 {
            continue;
        }
        if wakeup_time <= now {
            thread.insert_flags(ThreadFlags::TIMED_OUT | ThreadFlags::RUNNABLE);
            if next_pos.is_none() {
                next_pos = Some(index);
            }
        } else if wakeup_time < min_wakeup {
            min_wakeup = wakeup_time;
        }
    }

    let next = next_pos.map(|index| {
        let thread = queue.remove(index).expect("scanned index must be present");
        queue.push_back(Arc::clone(&thread));
        thread
    });

    (next, min_wakeup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;
    use alloc::vec;

    fn runnable(name: &str) -> Arc<Thread> {
        let t = Arc::new(Thread::new_for_test(name, 0));
        t.insert_flags(ThreadFlags::RUNNABLE);
        t
    }

    fn blocked(name: &str) -> Arc<Thread> {
        Arc::new(Thread::new_for_test(name, 0))
    }

    #[test]
    fn picks_first_runnable_and_rotates_it_to_tail() {
        let a = blocked("a");
        let b = runnable("b");
        let c = runnable("c");
        let mut queue: VecDeque<Arc<Thread>> = vec![a.clone(), b.clone(), c.clone()].into();

        let (next, _) = scan_and_rotate(&mut queue, 0);
        assert_eq!(next.unwrap().id(), b.id());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.back().unwrap().id(), b.id());
    }

    #[test]
    fn round_robin_cycles_every_runnable_thread() {
        let a = runnable("a");
        let b = runnable("b");
        let c = runnable("c");
        let mut queue: VecDeque<Arc<Thread>> = vec![a.clone(), b.clone(), c.clone()].into();

        let mut seen = alloc::collections::BTreeSet::new();
        for _ in 0..3 {
            let (next, _) = scan_and_rotate(&mut queue, 0);
            seen.insert(next.unwrap().id());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn elapsed_sleep_latches_timed_out_and_becomes_runnable() {
        let sleeper = blocked("sleeper");
        sleeper.set_wakeup_time(100);
        let mut queue: VecDeque<Arc<Thread>> = vec![sleeper.clone()].into();

        let (next, _) = scan_and_rotate(&mut queue, 200);
        let picked = next.expect("elapsed sleeper should become runnable");
        assert_eq!(picked.id(), sleeper.id());
        assert!(picked.flags().contains(ThreadFlags::TIMED_OUT));
        assert!(picked.is_runnable());
    }

    #[test]
    fn future_sleep_contributes_to_min_wakeup_without_running() {
        let sleeper = blocked("sleeper");
        sleeper.set_wakeup_time(500);
        let mut queue: VecDeque<Arc<Thread>> = vec![sleeper].into();

        let (next, min_wakeup) = scan_and_rotate(&mut queue, 100);
        assert!(next.is_none());
        assert_eq!(min_wakeup, 500);
    }

    #[test]
    fn empty_runnable_set_seeds_default_horizon() {
        let sleeper = blocked("sleeper");
        let mut queue: VecDeque<Arc<Thread>> = vec![sleeper].into();

        let (next, min_wakeup) = scan_and_rotate(&mut queue, 1_000);
        assert!(next.is_none());
        assert_eq!(min_wakeup, 1_000 + DEFAULT_HORIZON_NS);
    }
}
