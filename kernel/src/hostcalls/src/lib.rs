// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Shared types and hook traits for the paravirtualised guest support layer.
//!
//! This crate owns nothing that runs by itself. It exists so that [`sched`](../sched/index.html)
//! and [`bio`](../bio/index.html) can agree on the error codes, flag types, and
//! device-descriptor conventions they both need, and so that both crates (and the
//! `kernel` glue crate that ties them together) can depend on the same set of hook
//! traits for the external collaborators this core does not implement: the
//! hypervisor's clock and event channels, its page allocator, the caller's kernel
//! lock, and the architecture-specific stack swap.

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

mod errno;
mod flags;
mod hooks;

pub use errno::Errno;
pub use flags::{AccessMode, BioOp, OpenMode};
pub use hooks::{Clock, EventChannel, KernelLock, PageAllocator};

/// The number of block device slots the core manages.
///
/// This is a fixed, compile-time constant rather than something
/// negotiated at runtime: the core was designed around a small,
/// bounded number of paravirtual block devices.
///
pub const N_BLOCK_DEVICES: usize = 10;

/// The file descriptor offset applied to block device slots.
///
/// A slot index `i` is exposed to callers as file descriptor
/// `BLKFDOFF + i`. Descriptors outside `[BLKFDOFF, BLKFDOFF + N_BLOCK_DEVICES)`
/// never refer to a block device this core manages.
///
pub const BLKFDOFF: i32 = 64;

/// The size, in bytes, of the page-sized allocations that route
/// through [`PageAllocator`] instead of the general allocator.
///
pub const PAGE_SIZE: usize = 4096;

/// Converts a device name to its slot index, or `None` if the
/// name is not of the form `blk<digit>` with the digit in
/// `[0, N_BLOCK_DEVICES)`.
///
/// This is shared between the `open` and `getfileinfo` glue
/// calls, both of which accept a device name in this exact form.
///
pub fn device_slot_from_name(name: &str) -> Option<usize> {
    let digit = name.strip_prefix("blk")?;
    if digit.len() != 1 {
        return None;
    }
    let digit = digit.as_bytes()[0];
    if !digit.is_ascii_digit() {
        return None;
    }
    let slot = (digit - b'0') as usize;
    if slot < N_BLOCK_DEVICES {
        Some(slot)
    } else {
        None
    }
}

/// Converts a file descriptor to its block device slot index, or
/// `None` if the descriptor is out of range.
///
pub fn slot_from_fd(fd: i32) -> Option<usize> {
    let slot = fd.checked_sub(BLKFDOFF)?;
    if (0..N_BLOCK_DEVICES as i32).contains(&slot) {
        Some(slot as usize)
    } else {
        None
    }
}

/// Logs a fatal, unrecoverable condition and halts the domain.
///
/// `bug` is used for every programmer-error condition this core
/// detects: calling [`sched`](../sched/index.html)'s `schedule` with
/// interrupts already masked or from a callback context, joining a
/// thread that never set `MUST_JOIN`, and the handful of allocation
/// failures the core treats as fatal rather than recoverable.
///
/// # Panics
///
/// Always. `bug` never returns.
///
#[track_caller]
pub fn bug(message: &str) -> ! {
    log::error!("BUG: {}", message);
    panic!("BUG: {}", message);
}
