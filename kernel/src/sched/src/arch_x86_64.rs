// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The reference `x86_64` implementation of [`crate::thread::Arch`].
//!
//! Register state across a cooperative switch lives entirely on the
//! stack: `switch_stack` pushes the System V callee-saved registers,
//! swaps `rsp`, and pops the incoming thread's. A freshly prepared
//! stack looks exactly like one that `switch_stack` has just pushed
//! callee-saved registers onto, with a return address pointing at
//! `thread_start` instead of back into `switch_stack`'s caller.

use core::arch::global_asm;

use alloc::alloc::{alloc, dealloc, Layout};

use crate::thread::{Arch, ThreadEntry};

const STACK_ALIGN: usize = 16;

extern "sysv64" {
    fn switch_stack(prev_sp: *mut usize, next_sp: usize);
}

global_asm!(
    ".global switch_stack",
    "switch_stack:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

global_asm!(
    ".global thread_start",
    "thread_start:",
    "pop rdi",
    "pop rax",
    "call rax",
    "ud2",
);

extern "sysv64" {
    fn thread_start();
}

/// The default `x86_64` `Arch`. Stateless: every method is a pure
/// function of its arguments plus the global allocator.
pub struct X86_64Arch;

/// The crate-wide instance handed to [`crate::set_arch`] by a guest
/// kernel that has no reason to supply its own.
pub static X86_64: X86_64Arch = X86_64Arch;

impl Arch for X86_64Arch {
    fn alloc_stack(&self, size: usize) -> Option<(usize, usize)> {
        let layout = Layout::from_size_align(size, STACK_ALIGN).ok()?;
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return None;
        }
        Some((ptr as usize, size))
    }

    unsafe fn free_stack(&self, base: usize, len: usize) {
        let layout = Layout::from_size_align(len, STACK_ALIGN)
            .unwrap_or_else(|_| hostcalls::bug("corrupt stack layout passed to free_stack"));
        dealloc(base as *mut u8, layout);
    }

    unsafe fn prepare_stack(&self, base: usize, len: usize, entry: ThreadEntry, arg: usize) -> usize {
        let top = (base + len) & !(STACK_ALIGN - 1);

        // Layout, lowest to highest address, matching what
        // `switch_stack`'s six pops and `ret` expect to find:
        // six zeroed callee-saved slots, `thread_start`'s address,
        // then `arg` and `entry`, which `thread_start` pops itself.
        let frame = top - 9 * core::mem::size_of::<usize>();
        let slots = frame as *mut usize;

        slots.add(0).write(0); // r15
        slots.add(1).write(0); // r14
        slots.add(2).write(0); // r13
        slots.add(3).write(0); // r12
        slots.add(4).write(0); // rbx
        slots.add(5).write(0); // rbp
        slots.add(6).write(thread_start as usize);
        slots.add(7).write(arg);
        slots.add(8).write(entry as usize);

        frame
    }

    unsafe fn switch(&self, prev_sp: *mut usize, next_sp: usize) {
        let mut discard: usize = 0;
        let target = if prev_sp.is_null() {
            &mut discard as *mut usize
        } else {
            prev_sp
        };
        switch_stack(target, next_sp);
    }
}
