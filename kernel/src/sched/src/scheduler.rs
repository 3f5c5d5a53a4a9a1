// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Thread creation, blocking, waking, timed sleep, join, reaping, and
//! dispatch.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::gate::InterruptGuard;
use crate::hooks;
use crate::queue::{self, JoinWaiter};
use crate::thread::{Thread, ThreadEntry, ThreadFlags, ThreadId};

const DEFAULT_STACK_SIZE: usize = 64 * 1024;

type SchedHook = dyn Fn(usize, usize) + Send + Sync;

pub(crate) struct Scheduler {
    run_queue: Mutex<VecDeque<Arc<Thread>>>,
    exited: Mutex<VecDeque<Arc<Thread>>>,
    joiners: Mutex<Vec<JoinWaiter>>,
    current: Mutex<Option<Arc<Thread>>>,
    hook: Mutex<Option<Box<SchedHook>>>,
    in_callback: AtomicBool,
    started: AtomicBool,
}

lazy_static! {
    pub(crate) static ref SCHEDULER: Scheduler = Scheduler::new();
}

impl Scheduler {
    fn new() -> Self {
        Scheduler {
            run_queue: Mutex::new(VecDeque::new()),
            exited: Mutex::new(VecDeque::new()),
            joiners: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            hook: Mutex::new(None),
            in_callback: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn create_thread(
        &self,
        name: &str,
        cookie: usize,
        entry: ThreadEntry,
        arg: usize,
        stack: Option<(usize, usize)>,
        must_join: bool,
    ) -> Arc<Thread> {
        let (base, len, ext_stack) = match stack {
            Some((base, len)) => (base, len, true),
            None => {
                let (base, len) = hooks::arch()
                    .alloc_stack(DEFAULT_STACK_SIZE)
                    .unwrap_or_else(|| hostcalls::bug("out of memory allocating a thread stack"));
                (base, len, false)
            }
        };
        let initial_sp = unsafe { hooks::arch().prepare_stack(base, len, entry, arg) };
        let thread = Arc::new(Thread::new(String::from(name), cookie, base, len, initial_sp, ext_stack));
        thread.insert_flags(ThreadFlags::RUNNABLE);
        if must_join {
            thread.insert_flags(ThreadFlags::MUST_JOIN);
        }

        let _guard = InterruptGuard::acquire();
        self.run_queue.lock().push_back(Arc::clone(&thread));
        thread
    }

    pub(crate) fn current(&self) -> Option<Arc<Thread>> {
        self.current.lock().clone()
    }

    pub(crate) fn set_sched_hook<F>(&self, hook: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub(crate) fn in_callback(&self) -> bool {
        self.in_callback.load(Ordering::SeqCst)
    }

    pub(crate) fn set_in_callback(&self, value: bool) {
        self.in_callback.store(value, Ordering::SeqCst);
    }

    /// The main dispatch loop.
    pub(crate) fn schedule(&self) {
        if InterruptGuard::held() {
            hostcalls::bug("schedule called with the interrupt gate already held");
        }
        if self.in_callback() {
            hostcalls::bug("schedule called from callback context");
        }

        let (next, prev) = loop {
            let guard = InterruptGuard::acquire();
            let now = hooks::clock().now_ns();
            let (picked, min_wakeup) = {
                let mut run_queue = self.run_queue.lock();
                queue::scan_and_rotate(&mut run_queue, now)
            };
            if let Some(thread) = picked {
                let prev = self.current.lock().clone();
                break (thread, prev);
            }
            drop(guard);
            hooks::event_channel().block_domain(min_wakeup);
            hooks::event_channel().process_pending();
        };

        if let Some(prev_thread) = prev.as_ref() {
            if Arc::ptr_eq(prev_thread, &next) {
                self.reap_exited(Some(prev_thread.id()));
                return;
            }
        }

        if let Some(hook) = self.hook.lock().as_ref() {
            hook(prev.as_ref().map_or(0, |t| t.cookie()), next.cookie());
        }

        *self.current.lock() = Some(Arc::clone(&next));

        let prev_sp = prev
            .as_ref()
            .map_or(core::ptr::null_mut(), |t| t.stack_pointer_ptr());
        let next_sp = next.stack_pointer();

        // SAFETY: `next_sp` was produced by this crate's own
        // `Arch::prepare_stack` (fresh thread) or by a previous
        // `switch` call that parked this same thread (resumed
        // thread). `prev_sp`, when non-null, points at a live
        // thread's own stack-pointer cell.
        unsafe {
            hooks::arch().switch(prev_sp, next_sp);
        }

        // Control resumes here only once some later `schedule` call
        // switches back into the thread that made *this* call.
        self.reap_exited(prev.as_ref().map(|t| t.id()));
    }

    fn reap_exited(&self, exclude: Option<ThreadId>) {
        let mut exited = self.exited.lock();
        exited.retain(|t| Some(t.id()) == exclude);
    }

    pub(crate) fn block(&self, t: &Thread) {
        let _guard = InterruptGuard::acquire();
        t.set_wakeup_time(0);
        t.remove_flags(ThreadFlags::RUNNABLE);
    }

    pub(crate) fn wake(&self, t: &Thread) {
        let _guard = InterruptGuard::acquire();
        t.set_wakeup_time(0);
        t.insert_flags(ThreadFlags::RUNNABLE);
    }

    pub(crate) fn msleep(&self, ms: u64) -> bool {
        let now = hooks::clock().now_ns();
        let until = now.saturating_add(ms.saturating_mul(1_000_000));
        self.sleep_until(until)
    }

    pub(crate) fn absmsleep(&self, ms: u64) -> bool {
        self.sleep_until(ms.saturating_mul(1_000_000))
    }

    fn sleep_until(&self, until_ns: u64) -> bool {
        let current = self
            .current()
            .unwrap_or_else(|| hostcalls::bug("msleep called with no current thread"));

        {
            let _guard = InterruptGuard::acquire();
            current.set_wakeup_time(until_ns);
            current.remove_flags(ThreadFlags::RUNNABLE | ThreadFlags::TIMED_OUT);
        }

        self.schedule();

        let _guard = InterruptGuard::acquire();
        let timed_out = current.flags().contains(ThreadFlags::TIMED_OUT);
        current.remove_flags(ThreadFlags::TIMED_OUT);
        timed_out
    }

    pub(crate) fn exit_thread(&self) -> ! {
        let current = self
            .current()
            .unwrap_or_else(|| hostcalls::bug("exit_thread called with no current thread"));

        if current.flags().contains(ThreadFlags::MUST_JOIN) {
            loop {
                {
                    let _guard = InterruptGuard::acquire();
                    current.insert_flags(ThreadFlags::JOINED);
                }
                self.wake_join_waiter(current.id());
                {
                    let _guard = InterruptGuard::acquire();
                    current.remove_flags(ThreadFlags::RUNNABLE);
                }
                self.schedule();
                if !current.flags().contains(ThreadFlags::MUST_JOIN) {
                    break;
                }
            }
        }

        {
            let _guard = InterruptGuard::acquire();
            let mut run_queue = self.run_queue.lock();
            if let Some(pos) = run_queue.iter().position(|t| Arc::ptr_eq(t, &current)) {
                run_queue.remove(pos);
            }
            drop(run_queue);
            current.remove_flags(ThreadFlags::RUNNABLE);
            self.exited.lock().push_front(Arc::clone(&current));
        }

        loop {
            self.schedule();
            log::error!("schedule() returned control to exited thread {:?}", current.id());
        }
    }

    fn wake_join_waiter(&self, target: ThreadId) {
        let waiter_id = {
            let _guard = InterruptGuard::acquire();
            let joiners = self.joiners.lock();
            joiners
                .iter()
                .find(|w| w.target == target)
                .map(|w| w.waiter)
        };
        if let Some(waiter_id) = waiter_id {
            if let Some(waiter) = self.find_thread(waiter_id) {
                self.wake(&waiter);
            }
        }
    }

    fn find_thread(&self, id: ThreadId) -> Option<Arc<Thread>> {
        let run_queue = self.run_queue.lock();
        run_queue.iter().find(|t| t.id() == id).cloned()
    }

    pub(crate) fn join_thread(&self, target: &Arc<Thread>) {
        if !target.flags().contains(ThreadFlags::MUST_JOIN) {
            hostcalls::bug("join_thread called on a thread that was never marked joinable");
        }
        let current = self
            .current()
            .unwrap_or_else(|| hostcalls::bug("join_thread called with no current thread"));

        while !target.flags().contains(ThreadFlags::JOINED) {
            {
                let _guard = InterruptGuard::acquire();
                self.joiners.lock().push(JoinWaiter {
                    waiter: current.id(),
                    target: target.id(),
                });
                current.remove_flags(ThreadFlags::RUNNABLE);
            }
            self.schedule();
            {
                let _guard = InterruptGuard::acquire();
                let mut joiners = self.joiners.lock();
                if let Some(pos) = joiners
                    .iter()
                    .position(|w| w.waiter == current.id() && w.target == target.id())
                {
                    joiners.remove(pos);
                }
            }
        }

        {
            let _guard = InterruptGuard::acquire();
            target.remove_flags(ThreadFlags::MUST_JOIN);
        }
        self.wake(target);
    }

    pub(crate) fn init_sched(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let idle = self.create_thread("idle", 0, idle_entry, 0, None, false);
        *self.current.lock() = Some(idle);
    }
}

extern "C" fn idle_entry(_arg: usize) -> ! {
    loop {
        let current = SCHEDULER
            .current()
            .unwrap_or_else(|| hostcalls::bug("idle thread has no current handle"));
        SCHEDULER.block(&current);
        SCHEDULER.schedule();
    }
}
