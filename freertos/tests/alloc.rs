// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The kernel heap allocator, on the simulated kernel.

use std::alloc::{GlobalAlloc, Layout};

use freertos::alloc_impl::FreeRtosAllocator;
use freertos::raw::portBYTE_ALIGNMENT;
use freertos_sys::sim::{fail_next_allocations, stats};

#[test]
fn over_aligned_blocks() {
    let layout = Layout::from_size_align(24, 64).unwrap();
    let before = stats();
    let blocks: Vec<*mut u8> = (0..4)
        .map(|_| unsafe { FreeRtosAllocator.alloc(layout) })
        .collect();
    for &block in &blocks {
        assert!(!block.is_null());
        assert_eq!(block as usize % 64, 0);
        unsafe { block.write_bytes(0xa5, 24) };
    }
    for block in blocks {
        unsafe { FreeRtosAllocator.dealloc(block, layout) };
    }
    let after = stats().since(&before);
    assert_eq!(after.allocations, 4);
    assert_eq!(after.frees, 4);
}

#[test]
fn port_aligned_blocks() {
    let layout = Layout::from_size_align(10, portBYTE_ALIGNMENT).unwrap();
    let block = unsafe { FreeRtosAllocator.alloc(layout) };
    assert!(!block.is_null());
    assert_eq!(block as usize % portBYTE_ALIGNMENT, 0);
    unsafe { FreeRtosAllocator.dealloc(block, layout) };
}

#[test]
fn failures_are_null() {
    let layout = Layout::from_size_align(isize::MAX as usize - 128, 64).unwrap();
    assert!(unsafe { FreeRtosAllocator.alloc(layout) }.is_null());

    fail_next_allocations(1);
    let layout = Layout::from_size_align(16, 32).unwrap();
    assert!(unsafe { FreeRtosAllocator.alloc(layout) }.is_null());
}
