// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The kernel heap.
//!
//! Allocations come from the host allocator, but are accounted against `configTOTAL_HEAP_SIZE` so
//! that exhausting the heap behaves as it does on a target.

use std::alloc::{alloc, dealloc, Layout};
use std::ffi::c_void;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{count, take_allocation_failure};
use crate::config::configTOTAL_HEAP_SIZE;

/// Each block starts with its size.  The header keeps the returned pointer 16 byte aligned.
const HEADER: usize = 16;

static USED: AtomicUsize = AtomicUsize::new(0);

fn reserve(total: usize) -> bool {
    USED.fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
        let next = used.checked_add(total)?;
        (next <= configTOTAL_HEAP_SIZE as usize).then_some(next)
    })
    .is_ok()
}

pub unsafe extern "C" fn pvPortMalloc(xWantedSize: usize) -> *mut c_void {
    if xWantedSize == 0 || take_allocation_failure() {
        return null_mut();
    }
    let Some(total) = xWantedSize.checked_add(HEADER) else {
        return null_mut();
    };
    let Ok(layout) = Layout::from_size_align(total, HEADER) else {
        return null_mut();
    };
    if !reserve(total) {
        return null_mut();
    }

    let base = alloc(layout);
    if base.is_null() {
        USED.fetch_sub(total, Ordering::AcqRel);
        return null_mut();
    }
    (base as *mut usize).write(total);
    count(|s| s.allocations += 1);
    base.add(HEADER) as *mut c_void
}

pub unsafe extern "C" fn vPortFree(pv: *mut c_void) {
    if pv.is_null() {
        return;
    }
    let base = (pv as *mut u8).sub(HEADER);
    let total = (base as *mut usize).read();
    USED.fetch_sub(total, Ordering::AcqRel);
    dealloc(base, Layout::from_size_align_unchecked(total, HEADER));
    count(|s| s.frees += 1);
}

pub unsafe extern "C" fn xPortGetFreeHeapSize() -> usize {
    (configTOTAL_HEAP_SIZE as usize).saturating_sub(USED.load(Ordering::Acquire))
}

/// Allocate room for a `T` from the kernel heap, and move `value` into it.
pub(super) unsafe fn kernel_box<T>(value: T) -> *mut T {
    debug_assert!(std::mem::align_of::<T>() <= HEADER);
    let p = pvPortMalloc(std::mem::size_of::<T>()) as *mut T;
    if !p.is_null() {
        p.write(value);
    }
    p
}

/// Where an object's control block lives, which decides how it is released.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Placement {
    /// Allocated with `pvPortMalloc`.
    Heap,
    /// Provided by the caller.
    Static,
}

/// Drop the object at `p`, and free it if it came from the kernel heap.
pub(super) unsafe fn release<T>(p: *mut T, placement: Placement) {
    std::ptr::drop_in_place(p);
    if placement == Placement::Heap {
        vPortFree(p as *mut c_void);
    }
}
