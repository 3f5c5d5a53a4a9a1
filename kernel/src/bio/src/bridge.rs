// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Per-device slots, outstanding-request counters, and the one-shot
//! poller spawn.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hostcalls::{Errno, OpenMode, N_BLOCK_DEVICES};
use spin::{Mutex, Once};

use crate::condvar::CondVar;
use crate::device::{BlockDevice, BlockInfo};
use crate::request::Request;

struct Slot {
    device: Arc<dyn BlockDevice>,
    info: BlockInfo,
    open_count: usize,
    outstanding: usize,
}

struct Counters {
    outstanding_total: usize,
}

const NO_SLOT: Option<Slot> = None;
static SLOTS: Mutex<[Option<Slot>; N_BLOCK_DEVICES]> = Mutex::new([NO_SLOT; N_BLOCK_DEVICES]);
static COUNTERS: Mutex<Counters> = Mutex::new(Counters { outstanding_total: 0 });
static POLLER_SPAWNED: Once<()> = Once::new();

pub(crate) static CONDVAR: CondVar = CondVar::new();

/// What kind of file [`crate::getfileinfo`] describes. This core only
/// ever reports `Block`; the variant exists so the glue surface's
/// return type reads as what it is rather than a bare bool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceKind {
    Block,
}

/// Plugs a driver into a slot.
///
/// Called once per device by the guest kernel's driver bring-up,
/// before any `open` call can reach it. Returns
/// [`Errno::Enxio`] if `slot` is out of range or already registered.
pub fn register_device(slot: usize, device: Arc<dyn BlockDevice>) -> Result<(), Errno> {
    if slot >= N_BLOCK_DEVICES {
        return Err(Errno::Enxio);
    }
    let info = device.info();
    let mut slots = SLOTS.lock();
    if slots[slot].is_some() {
        return Err(Errno::Enxio);
    }
    slots[slot] = Some(Slot {
        device,
        info,
        open_count: 0,
        outstanding: 0,
    });
    Ok(())
}

/// Opens `name`, bumping its reference count. See
/// [the glue surface's `open`](../kernel/fn.open.html) for the
/// descriptor convention.
pub fn open(name: &str, mode: OpenMode) -> Result<i32, Errno> {
    let slot_idx = hostcalls::device_slot_from_name(name).ok_or(Errno::Enoent)?;
    let mut slots = SLOTS.lock();
    let slot = slots[slot_idx].as_mut().ok_or(Errno::Enxio)?;
    if mode.needs_write() && slot.info.read_only {
        return Err(Errno::Erofs);
    }
    slot.open_count += 1;
    Ok(hostcalls::BLKFDOFF + slot_idx as i32)
}

/// Closes a descriptor previously returned by `open`. At a zero
/// reference count the slot is cleared and the driver dropped.
///
/// Does not wait for outstanding requests to drain first: a
/// well-behaved client never closes a descriptor with requests still
/// in flight against it, and this crate does not enforce that
/// contract.
pub fn close(fd: i32) -> Result<(), Errno> {
    let slot_idx = hostcalls::slot_from_fd(fd).ok_or(Errno::Ebadf)?;
    let mut slots = SLOTS.lock();
    let slot = slots[slot_idx].as_mut().ok_or(Errno::Ebadf)?;
    slot.open_count = slot.open_count.saturating_sub(1);
    if slot.open_count == 0 {
        slots[slot_idx] = None;
    }
    Ok(())
}

/// Reports a device's capacity without opening it.
pub fn getfileinfo(name: &str) -> Result<(u64, DeviceKind), Errno> {
    let slot_idx = hostcalls::device_slot_from_name(name).ok_or(Errno::Enoent)?;
    let slots = SLOTS.lock();
    let slot = slots[slot_idx].as_ref().ok_or(Errno::Enxio)?;
    Ok((slot.info.capacity_bytes(), DeviceKind::Block))
}

pub(crate) fn ensure_poller_spawned() {
    POLLER_SPAWNED.call_once(|| {
        crate::poller::spawn();
    });
}

pub(crate) fn dispatch(slot_idx: usize, request: *mut Request, is_read: bool) -> Result<(), Errno> {
    let slots = SLOTS.lock();
    let slot = slots[slot_idx].as_ref().ok_or(Errno::Enxio)?;
    if is_read {
        slot.device.submit_read(request);
    } else {
        slot.device.submit_write(request);
    }
    Ok(())
}

pub(crate) fn increment_outstanding(slot_idx: usize) {
    COUNTERS.lock().outstanding_total += 1;
    if let Some(slot) = SLOTS.lock()[slot_idx].as_mut() {
        slot.outstanding += 1;
    }
    CONDVAR.signal();
}

pub(crate) fn decrement_outstanding(slot_idx: usize) {
    let mut counters = COUNTERS.lock();
    counters.outstanding_total = counters.outstanding_total.saturating_sub(1);
    drop(counters);
    if let Some(slot) = SLOTS.lock()[slot_idx].as_mut() {
        slot.outstanding = slot.outstanding.saturating_sub(1);
    }
}

pub(crate) fn outstanding_total() -> usize {
    COUNTERS.lock().outstanding_total
}

/// Reads `outstanding[i]` for every slot, then polls each device with
/// a nonzero count outside the slot lock, matching the documented
/// contract that a slot is never closed while its count is nonzero.
pub(crate) fn poll_all_slots() -> usize {
    let due: Vec<Arc<dyn BlockDevice>> = {
        let slots = SLOTS.lock();
        slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|slot| slot.outstanding > 0)
            .map(|slot| Arc::clone(&slot.device))
            .collect()
    };
    due.iter().map(|device| device.poll()).sum()
}

pub(crate) fn register_completion_waiters() {
    let due: Vec<Arc<dyn BlockDevice>> = {
        let slots = SLOTS.lock();
        slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter(|slot| slot.outstanding > 0)
            .map(|slot| Arc::clone(&slot.device))
            .collect()
    };
    for device in due {
        device.register_completion_waiter();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Clears every slot. Tests run in the same process and share
    /// these statics, so each test that touches device registration
    /// starts from a known-empty registry.
    pub(crate) fn reset() {
        let mut slots = SLOTS.lock();
        for slot in slots.iter_mut() {
            *slot = None;
        }
        COUNTERS.lock().outstanding_total = 0;
    }
}
