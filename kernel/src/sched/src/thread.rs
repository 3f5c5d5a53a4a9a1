// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The thread descriptor and the one genuinely architecture-specific
//! hook: the stack swap.

use alloc::string::String;
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Per-thread state bits. Mutated only while the interrupt gate
    /// is held.
    pub struct ThreadFlags: u32 {
        /// The thread is eligible to be picked by `schedule`.
        const RUNNABLE = 1 << 0;

        /// `exit_thread` must wait for a joiner before this thread's
        /// descriptor may be reaped.
        const MUST_JOIN = 1 << 1;

        /// Set by `exit_thread` once it has parked itself waiting to
        /// be joined; cleared by the joiner once it has observed it.
        const JOINED = 1 << 2;

        /// The thread's stack was supplied by the caller of
        /// `create_thread` rather than allocated by this crate; it is
        /// not freed when the descriptor is dropped.
        const EXT_STACK = 1 << 3;

        /// Set by `schedule` when a sleep's wake-up time elapsed
        /// before an explicit `wake` arrived. Cleared on the next
        /// sleep (a one-shot latch).
        const TIMED_OUT = 1 << 4;
    }
}

/// A thread's entry point, called with the `arg` passed to
/// `create_thread`. Entered with the architecture's calling
/// convention for a plain C function; never expected to return.
pub type ThreadEntry = extern "C" fn(usize) -> !;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// A stable, process-unique identifier for a [`Thread`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A thread descriptor.
///
/// Every field but `id` and `name` is mutated only while the
/// interrupt gate is held, which is why interior mutability (`Cell`)
/// is sufficient despite `Thread` being shared behind an `Arc` and
/// touched from both the submitting thread and the scheduler: on a
/// single virtual CPU, the gate *is* the mutual exclusion.
pub struct Thread {
    id: ThreadId,
    name: String,
    flags: Cell<ThreadFlags>,
    wakeup_time: Cell<u64>,
    cookie: usize,
    lwp: Cell<usize>,
    error: Cell<i32>,
    stack_base: usize,
    stack_len: usize,
    ext_stack: bool,
    stack_pointer: Cell<usize>,
}

// SAFETY: every field that is not `Sync` on its own (the `Cell`s) is
// touched exclusively while the interrupt gate is held, and there is
// only one virtual CPU to hold it.
unsafe impl Sync for Thread {}

impl Thread {
    pub(crate) fn new(
        name: String,
        cookie: usize,
        stack_base: usize,
        stack_len: usize,
        initial_sp: usize,
        ext_stack: bool,
    ) -> Self {
        let mut flags = ThreadFlags::empty();
        if ext_stack {
            flags |= ThreadFlags::EXT_STACK;
        }
        Thread {
            id: ThreadId::next(),
            name,
            flags: Cell::new(flags),
            wakeup_time: Cell::new(0),
            cookie,
            lwp: Cell::new(0),
            error: Cell::new(0),
            stack_base,
            stack_len,
            ext_stack,
            stack_pointer: Cell::new(initial_sp),
        }
    }

    /// A descriptor with no backing stack at all, for exercising the
    /// scheduler's queue logic without going through `Arch`.
    #[cfg(test)]
    pub(crate) fn new_for_test(name: &str, cookie: usize) -> Self {
        Thread::new(String::from(name), cookie, 0, 0, 0, true)
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cookie(&self) -> usize {
        self.cookie
    }

    pub fn lwp(&self) -> usize {
        self.lwp.get()
    }

    pub fn set_lwp(&self, lwp: usize) {
        self.lwp.set(lwp);
    }

    pub fn error(&self) -> i32 {
        self.error.get()
    }

    pub fn set_error(&self, errno: i32) {
        self.error.set(errno);
    }

    pub(crate) fn flags(&self) -> ThreadFlags {
        self.flags.get()
    }

    pub(crate) fn insert_flags(&self, flags: ThreadFlags) {
        self.flags.set(self.flags.get() | flags);
    }

    pub(crate) fn remove_flags(&self, flags: ThreadFlags) {
        self.flags.set(self.flags.get() - flags);
    }

    pub(crate) fn is_runnable(&self) -> bool {
        self.flags.get().contains(ThreadFlags::RUNNABLE)
    }

    pub(crate) fn wakeup_time(&self) -> u64 {
        self.wakeup_time.get()
    }

    pub(crate) fn set_wakeup_time(&self, time: u64) {
        self.wakeup_time.set(time);
    }

    pub(crate) fn stack_pointer(&self) -> usize {
        self.stack_pointer.get()
    }

    pub(crate) fn stack_pointer_ptr(&self) -> *mut usize {
        self.stack_pointer.as_ptr()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if !self.ext_stack && self.stack_len != 0 {
            unsafe {
                crate::hooks::arch().free_stack(self.stack_base, self.stack_len);
            }
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags.get())
            .finish()
    }
}

/// The architecture-specific stack swap.
///
/// This is the one hook this crate provides a reference
/// implementation for rather than leaving entirely to the guest
/// kernel, since the stack swap is the same for every guest running
/// on a given architecture. A `cfg(target_arch = "x86_64")`
/// implementation lives in [`crate::arch_x86_64`].
pub trait Arch: Send + Sync {
    /// Allocates a stack of at least `size` bytes, returning its base
    /// address and actual length. Returns `None` if the allocator is
    /// exhausted.
    fn alloc_stack(&self, size: usize) -> Option<(usize, usize)>;

    /// Frees a stack previously returned by `alloc_stack`.
    ///
    /// # Safety
    ///
    /// `base`/`len` must be exactly the pair returned by a prior
    /// `alloc_stack` call on this allocator, not currently in use by
    /// any thread, and not already freed.
    unsafe fn free_stack(&self, base: usize, len: usize);

    /// Prepares a fresh stack so that switching to the returned stack
    /// pointer enters `entry(arg)`. Returns the initial stack
    /// pointer to pass to `create_thread`'s descriptor.
    ///
    /// # Safety
    ///
    /// `base`/`len` must describe writable memory of at least `len`
    /// bytes, not otherwise in use.
    unsafe fn prepare_stack(&self, base: usize, len: usize, entry: ThreadEntry, arg: usize) -> usize;

    /// Saves the current register state to `*prev_sp` (a pointer into
    /// the outgoing thread's descriptor; null if there is no outgoing
    /// thread) and restores it from `next_sp`. Does not return until
    /// some later call switches back to this exact point.
    ///
    /// # Safety
    ///
    /// `next_sp` must be a stack pointer previously produced by this
    /// `Arch`'s own `prepare_stack`, or saved by a previous `switch`
    /// call on the same thread. `prev_sp`, if non-null, must be valid
    /// to write a `usize` through.
    unsafe fn switch(&self, prev_sp: *mut usize, next_sp: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip_through_insert_and_remove() {
        let t = Thread::new_for_test("t", 0);
        assert!(!t.is_runnable());
        t.insert_flags(ThreadFlags::RUNNABLE);
        assert!(t.is_runnable());
        t.insert_flags(ThreadFlags::MUST_JOIN);
        assert!(t.flags().contains(ThreadFlags::MUST_JOIN));
        t.remove_flags(ThreadFlags::RUNNABLE);
        assert!(!t.is_runnable());
        assert!(t.flags().contains(ThreadFlags::MUST_JOIN));
    }

    #[test]
    fn distinct_threads_get_distinct_ids() {
        let a = Thread::new_for_test("a", 0);
        let b = Thread::new_for_test("b", 0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn wakeup_time_defaults_to_zero() {
        let t = Thread::new_for_test("t", 0);
        assert_eq!(t.wakeup_time(), 0);
        t.set_wakeup_time(42);
        assert_eq!(t.wakeup_time(), 42);
    }
}
