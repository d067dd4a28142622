// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # The kernel heap
//!
//! Objects created with the [`Dynamic`] strategy come out of the kernel heap, as do the contexts
//! this crate keeps for dynamically created tasks and timers.  Nothing here uses a Rust allocator.
//!
//! The heap only aligns to `portBYTE_ALIGNMENT`.  A task routine or timer callback that needs more
//! is refused when the program is built:
//!
//! ```compile_fail
//! use freertos::task::TaskBuilder;
//!
//! #[repr(align(64))]
//! struct Wide([u8; 64]);
//!
//! let wide = Wide([0; 64]);
//! let _task = TaskBuilder::new().spawn(move || {
//!     let _ = &wide;
//! });
//! ```
//!
//! [`Dynamic`]: crate::object::Dynamic

use core::ffi::c_void;
use core::mem::{align_of, size_of};
use core::ops::Deref;
use core::ptr::NonNull;

use crate::error::{Error, Result};
use crate::raw::{portBYTE_ALIGNMENT, pvPortMalloc, vPortFree, xPortGetFreeHeapSize};

/// The number of bytes currently free in the kernel heap.
pub fn free_size() -> usize {
    unsafe { xPortGetFreeHeapSize() }
}

/// An owned value placed in the kernel heap.
pub(crate) struct KernelBox<T> {
    ptr: NonNull<T>,
}

impl<T> KernelBox<T> {
    // The kernel heap only guarantees the port alignment.
    const ALIGN_OK: () = assert!(
        align_of::<T>() <= portBYTE_ALIGNMENT,
        "the kernel heap can't place a type aligned past portBYTE_ALIGNMENT"
    );

    /// Move a value into the kernel heap.
    pub(crate) fn new(value: T) -> Result<KernelBox<T>> {
        #[allow(clippy::let_unit_value)]
        let () = Self::ALIGN_OK;
        let raw = unsafe { pvPortMalloc(size_of::<T>().max(1)) } as *mut T;
        let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory)?;
        unsafe { ptr.as_ptr().write(value) };
        Ok(KernelBox { ptr })
    }

    /// Give up ownership, to be handed to the kernel.
    pub(crate) fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        ptr
    }

    /// Take back ownership of a pointer from [`into_raw`].
    ///
    /// # Safety
    ///
    /// The pointer must have come from `into_raw`, and must not be used by anything else.
    ///
    /// [`into_raw`]: KernelBox::into_raw
    pub(crate) unsafe fn from_raw(ptr: *mut T) -> KernelBox<T> {
        KernelBox {
            ptr: NonNull::new_unchecked(ptr),
        }
    }
}

impl<T> Deref for KernelBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for KernelBox<T> {
    fn drop(&mut self) {
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            vPortFree(self.ptr.as_ptr() as *mut c_void);
        }
    }
}
