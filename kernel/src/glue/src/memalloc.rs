// Copyright 2022 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! `malloc`/`free`: page-sized, page-aligned requests route through
//! the hypervisor's own page allocator; everything else goes through
//! the ordinary global allocator.

use alloc::alloc::{alloc, dealloc};
use core::alloc::Layout;
use core::ptr::NonNull;

use hostcalls::{Errno, PAGE_SIZE};

use crate::hooks;

fn is_page_request(len: usize, align: usize) -> bool {
    len == PAGE_SIZE && align <= PAGE_SIZE
}

/// Allocates `len` bytes aligned to `align`.
///
/// A request for exactly one page, aligned to at most a page, is
/// served by the registered [`hostcalls::PageAllocator`] instead of
/// the general allocator — the one deliberate memory-use
/// optimisation this layer makes, matching the system it is modelled
/// on. `free` must be called with the same `len`/`align` so it can
/// select the matching path back.
pub(crate) fn malloc(len: usize, align: usize) -> Result<*mut u8, Errno> {
    if is_page_request(len, align) {
        return hooks::page_allocator()
            .alloc_page()
            .map(|ptr| ptr.as_ptr())
            .ok_or(Errno::Enomem);
    }

    let layout = Layout::from_size_align(len, align).map_err(|_| Errno::E2big)?;
    // SAFETY: `layout` has a nonzero size whenever `len > 0`; callers
    // requesting zero bytes get a null-ish allocation from the global
    // allocator, which is the same behaviour `alloc::alloc::alloc`
    // documents for a zero-sized layout.
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        return Err(Errno::Enomem);
    }
    Ok(ptr)
}

/// Frees a pointer previously returned by [`malloc`].
///
/// # Safety
///
/// `ptr`, `len`, and `align` must be exactly the allocation and
/// arguments returned by a prior successful `malloc` call, not
/// already freed.
pub(crate) unsafe fn free(ptr: *mut u8, len: usize, align: usize) {
    if is_page_request(len, align) {
        if let Some(non_null) = NonNull::new(ptr) {
            hooks::page_allocator().free_page(non_null);
        }
        return;
    }
    let layout = Layout::from_size_align_unchecked(len, align);
    dealloc(ptr, layout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::test_support::ensure_registered;

    #[test]
    fn general_sizes_round_trip_through_the_global_allocator() {
        let ptr = malloc(64, 8).expect("allocation should succeed");
        assert!(!ptr.is_null());
        unsafe { free(ptr, 64, 8) };
    }

    #[test]
    fn page_sized_requests_route_through_the_page_allocator() {
        ensure_registered();
        let ptr = malloc(PAGE_SIZE, PAGE_SIZE).expect("page allocation should succeed");
        assert_eq!(ptr as usize, PAGE_SIZE);
        unsafe { free(ptr, PAGE_SIZE, PAGE_SIZE) };
    }

    #[test]
    fn oversized_alignment_is_rejected_as_too_large() {
        assert_eq!(malloc(8, 3), Err(Errno::E2big));
    }
}
