// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Kernel object storage
//!
//! Every wrapper in this crate is generic over where its kernel object lives.  The choice is made
//! once, as a type, at the point where the object is constructed:
//!
//! - [`Dynamic`] has the kernel allocate the control block (and any buffers) from its heap.  The
//!   memory goes back to the heap when the wrapper is dropped.
//! - `&'static StaticStorage<S>` hands the kernel a block of memory set aside at build time.  The
//!   heap is never touched.
//!
//! ```ignore
//! use freertos::object::StaticStorage;
//! use freertos::raw::StaticSemaphore_t;
//! use freertos::semaphore::BinarySemaphore;
//!
//! static SIGNAL: StaticStorage<StaticSemaphore_t> = StaticStorage::new();
//!
//! let signal = BinarySemaphore::new_in(&SIGNAL)?;
//! ```
//!
//! The kernel keeps pointers into a static control block for as long as the object exists, so a
//! [`StaticStorage`] can only back one object at a time.  It is claimed when the object is
//! created, and released again when the wrapper drops.  Trying to create a second object in the
//! same storage fails with [`Error::InUse`].
//!
//! The per-kind creation traits ([`SemaphoreAllocator`], [`QueueAllocator`] and friends) live
//! next to the wrappers that use them.  They are implemented only for these two strategies.
//!
//! [`SemaphoreAllocator`]: crate::semaphore::SemaphoreAllocator
//! [`QueueAllocator`]: crate::queue::QueueAllocator

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::MaybeUninit;

use portable_atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Allocate kernel objects from the kernel heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dynamic;

/// Storage, reserved at build time, for one kernel object.
///
/// `S` is the kernel's static control block type (`StaticSemaphore_t`, `StaticQueue_t`, ...), or
/// one of the storage structs in this crate that pair a control block with its buffers.
pub struct StaticStorage<S> {
    claimed: AtomicBool,
    value: UnsafeCell<MaybeUninit<S>>,
}

// The storage is only reachable through the kernel object after a successful claim.
unsafe impl<S> Sync for StaticStorage<S> {}

impl<S> StaticStorage<S> {
    /// An unclaimed storage slot, for use in a `static`.
    pub const fn new() -> StaticStorage<S> {
        StaticStorage {
            claimed: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Is this storage currently backing a kernel object?
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Take exclusive use of the storage.
    pub(crate) fn claim(&'static self) -> Result<*mut S> {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InUse);
        }
        Ok(self.value.get() as *mut S)
    }

    /// Give the storage back.
    ///
    /// # Safety
    ///
    /// The kernel must no longer reference anything inside the storage.
    pub(crate) unsafe fn unclaim(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

impl<S> Default for StaticStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for StaticStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticStorage {{ claimed: {} }}", self.is_claimed())
    }
}

mod private {
    pub trait Sealed {}
}

impl private::Sealed for Dynamic {}
impl<S> private::Sealed for &'static StaticStorage<S> {}

/// An allocation strategy for kernel objects.
///
/// This is sealed.  It is implemented for [`Dynamic`] and for `&'static StaticStorage<S>`.
pub trait Allocation: private::Sealed {
    /// Hand the memory back, after the kernel object has been deleted.
    ///
    /// # Safety
    ///
    /// The kernel must be done with the object created through this allocation.
    #[doc(hidden)]
    unsafe fn release(&self);
}

impl Allocation for Dynamic {
    // Freed by the kernel as part of the delete.
    unsafe fn release(&self) {}
}

impl<S> Allocation for &'static StaticStorage<S> {
    unsafe fn release(&self) {
        self.unclaim();
    }
}

/// Claim static storage and build a kernel object in it.  If the kernel refuses the object, the
/// storage is given back, and the failure reported as an invalid argument.
#[cfg(configSUPPORT_STATIC_ALLOCATION)]
pub(crate) fn create_static<S, H>(
    storage: &'static StaticStorage<S>,
    create: impl FnOnce(*mut S) -> *mut H,
) -> Result<*mut H> {
    let ptr = storage.claim()?;
    let handle = create(ptr);
    if handle.is_null() {
        unsafe { storage.unclaim() };
        return Err(Error::InvalidArgument);
    }
    Ok(handle)
}
