// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! A Rust global allocator over the kernel heap
//!
//! With the `global-allocator` feature, the `alloc` crate is backed by `pvPortMalloc` and
//! `vPortFree`, so Rust allocations and kernel objects share one heap, and
//! [`heap::free_size`](crate::heap::free_size) accounts for both.
//!
//! The kernel heap only aligns to `portBYTE_ALIGNMENT`.  A layout needing more is given a larger
//! block, with the start moved up to the alignment, and the block the kernel returned is kept in
//! the word just before it.

use core::alloc::{GlobalAlloc, Layout};
use core::ffi::c_void;
use core::mem::size_of;
use core::ptr::null_mut;

use crate::raw::{portBYTE_ALIGNMENT, pvPortMalloc, vPortFree};

/// Room below an over-aligned block for the kernel's pointer.
const SLOT: usize = size_of::<*mut c_void>();

/// An allocator using the kernel heap.
///
/// Exported for documentation, this module also installs an instance of it.
pub struct FreeRtosAllocator;

unsafe impl GlobalAlloc for FreeRtosAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() <= portBYTE_ALIGNMENT {
            return pvPortMalloc(layout.size()) as *mut u8;
        }

        let Some(size) = layout
            .size()
            .checked_add(layout.align())
            .and_then(|size| size.checked_add(SLOT))
        else {
            return null_mut();
        };
        let raw = pvPortMalloc(size) as *mut u8;
        if raw.is_null() {
            return raw;
        }
        let offset = raw.add(SLOT).align_offset(layout.align());
        if offset >= layout.align() {
            vPortFree(raw as *mut c_void);
            return null_mut();
        }
        let block = raw.add(SLOT + offset);
        (block.sub(SLOT) as *mut *mut u8).write_unaligned(raw);
        block
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let raw = if layout.align() <= portBYTE_ALIGNMENT {
            ptr
        } else {
            (ptr.sub(SLOT) as *mut *mut u8).read_unaligned()
        };
        vPortFree(raw as *mut c_void)
    }
}

/// The global allocator, over the kernel heap.
#[cfg(not(feature = "sim"))]
#[global_allocator]
pub static FREERTOS_ALLOCATOR: FreeRtosAllocator = FreeRtosAllocator;

