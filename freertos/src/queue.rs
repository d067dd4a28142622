// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Queues
//!
//! A FreeRTOS queue holds a fixed number of fixed size items, and copies them in and out by
//! value.  Nothing in the queue is ever referenced by pointer from outside it, which is why
//! [`Queue`] requires its items to be `Copy`.
//!
//! The depth is part of the type, so that static storage can be sized at build time:
//!
//! ```ignore
//! use freertos::object::StaticStorage;
//! use freertos::queue::{Queue, QueueStorage};
//!
//! static SAMPLES: StaticStorage<QueueStorage<u16, 8>> = StaticStorage::new();
//!
//! let samples = Queue::new_in(&SAMPLES)?;
//! samples.send(42u16, NoWait)?;
//! ```
//!
//! A full queue and an empty one are reported as errors the caller can act on, not as failures of
//! the queue itself.  Sending with [`NoWait`] to a full queue gives [`Error::Full`], while a send
//! that waited and still found no room gives [`Error::Timeout`].  Receiving is the same, with
//! [`Error::Empty`].
//!
//! [`NoWait`]: crate::time::NoWait

use core::ffi::{c_void, CStr};
use core::fmt;
use core::marker::PhantomData;
use core::mem::{size_of, MaybeUninit};

use log::trace;

use crate::error::{check_handle, to_result, Error, Result};
use crate::isr::TaskWoken;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    pdFALSE, uxQueueMessagesWaiting, uxQueueMessagesWaitingFromISR, uxQueueSpacesAvailable,
    vQueueDelete, xQueueIsQueueEmptyFromISR, xQueueIsQueueFullFromISR, xQueueOverwrite,
    xQueueOverwriteFromISR, xQueuePeek, xQueuePeekFromISR, xQueueReceive, xQueueReceiveFromISR,
    xQueueReset, xQueueSendToBack, xQueueSendToBackFromISR, xQueueSendToFront,
    xQueueSendToFrontFromISR, QueueHandle_t, StaticQueue_t, UBaseType_t,
};
use crate::time::{ticks, Timeout};

/// Static storage for a queue: the control block, and room for `N` items.
#[repr(C)]
pub struct QueueStorage<T, const N: usize> {
    control: StaticQueue_t,
    items: [MaybeUninit<T>; N],
}

/// An allocation strategy that can create a queue of `N` items of type `T`.
pub trait QueueAllocator<T, const N: usize>: Allocation {
    #[doc(hidden)]
    fn create_queue(&self) -> Result<QueueHandle_t>;
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<T, const N: usize> QueueAllocator<T, N> for Dynamic {
    fn create_queue(&self) -> Result<QueueHandle_t> {
        let handle =
            unsafe { crate::raw::xQueueCreate(N as UBaseType_t, size_of::<T>() as UBaseType_t) };
        check_handle(handle)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<T, const N: usize> QueueAllocator<T, N> for &'static StaticStorage<QueueStorage<T, N>> {
    fn create_queue(&self) -> Result<QueueHandle_t> {
        crate::object::create_static(*self, |storage| unsafe {
            crate::raw::xQueueCreateStatic(
                N as UBaseType_t,
                size_of::<T>() as UBaseType_t,
                core::ptr::addr_of_mut!((*storage).items) as *mut u8,
                core::ptr::addr_of_mut!((*storage).control),
            )
        })
    }
}

/// A queue of up to `N` items of type `T`.
pub struct Queue<T, const N: usize, A: Allocation = Dynamic> {
    handle: QueueHandle_t,
    alloc: A,
    named: bool,
    _items: PhantomData<T>,
}

// Items are copied through the kernel, which does its own locking.
unsafe impl<T: Send, const N: usize, A: Allocation + Send> Send for Queue<T, N, A> {}
unsafe impl<T: Send, const N: usize, A: Allocation + Sync> Sync for Queue<T, N, A> {}

impl<T: Copy + Send, const N: usize, A: QueueAllocator<T, N>> Queue<T, N, A> {
    const VALID: () = assert!(
        N > 0 && size_of::<T>() > 0,
        "a queue needs a non-zero length and item size"
    );

    /// Create a queue in the given allocation.
    pub fn new_with(alloc: A) -> Result<Queue<T, N, A>> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID;
        if N > UBaseType_t::MAX as usize {
            return Err(Error::InvalidArgument);
        }
        let handle = alloc.create_queue()?;
        trace!("queue {:?} created: {} x {} bytes", handle, N, size_of::<T>());
        Ok(Queue {
            handle,
            alloc,
            named: false,
            _items: PhantomData,
        })
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<T: Copy + Send, const N: usize> Queue<T, N, Dynamic> {
    /// Create a queue from the kernel heap.
    pub fn new() -> Result<Queue<T, N, Dynamic>> {
        Self::new_with(Dynamic)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<T: Copy + Send, const N: usize> Queue<T, N, &'static StaticStorage<QueueStorage<T, N>>> {
    /// Create a queue in static storage.
    pub fn new_in(storage: &'static StaticStorage<QueueStorage<T, N>>) -> Result<Self> {
        Self::new_with(storage)
    }
}

/// The error for a send that found the queue full.
fn full(timeout: Timeout) -> Error {
    if timeout.is_no_wait() {
        Error::Full
    } else {
        Error::Timeout
    }
}

/// The error for a receive that found the queue empty.
fn empty(timeout: Timeout) -> Error {
    if timeout.is_no_wait() {
        Error::Empty
    } else {
        Error::Timeout
    }
}

impl<T: Copy + Send, const N: usize, A: Allocation> Queue<T, N, A> {
    const MAILBOX: () = assert!(N == 1, "overwrite is only for queues of length 1");

    /// Copy an item to the back of the queue, waiting up to `timeout` for room.
    pub fn send<W>(&self, item: T, timeout: W) -> Result<()>
    where
        W: Into<Timeout>,
    {
        let timeout = timeout.into();
        let sent = unsafe { xQueueSendToBack(self.handle, as_void(&item), timeout.0) };
        to_result(sent, full(timeout))
    }

    /// The same as [`send`](Self::send).
    pub fn send_to_back<W>(&self, item: T, timeout: W) -> Result<()>
    where
        W: Into<Timeout>,
    {
        self.send(item, timeout)
    }

    /// Copy an item to the front of the queue, so it is the next one received.
    pub fn send_to_front<W>(&self, item: T, timeout: W) -> Result<()>
    where
        W: Into<Timeout>,
    {
        let timeout = timeout.into();
        let sent = unsafe { xQueueSendToFront(self.handle, as_void(&item), timeout.0) };
        to_result(sent, full(timeout))
    }

    /// Copy an item to the back of the queue from an interrupt handler.
    pub fn send_isr(&self, item: T, woken: &mut TaskWoken) -> Result<()> {
        let sent = unsafe { xQueueSendToBackFromISR(self.handle, as_void(&item), woken.as_ptr()) };
        to_result(sent, Error::Full)
    }

    /// Copy an item to the front of the queue from an interrupt handler.
    pub fn send_to_front_isr(&self, item: T, woken: &mut TaskWoken) -> Result<()> {
        let sent =
            unsafe { xQueueSendToFrontFromISR(self.handle, as_void(&item), woken.as_ptr()) };
        to_result(sent, Error::Full)
    }

    /// Replace the single item in a mailbox queue, or send it if the queue is empty.
    ///
    /// Only available on queues of length one, which is checked when this is compiled.
    pub fn overwrite(&self, item: T) {
        #[allow(clippy::let_unit_value)]
        let () = Self::MAILBOX;
        // Overwrite cannot fail.
        let _ = unsafe { xQueueOverwrite(self.handle, as_void(&item)) };
    }

    /// Overwrite from an interrupt handler.
    pub fn overwrite_isr(&self, item: T, woken: &mut TaskWoken) {
        #[allow(clippy::let_unit_value)]
        let () = Self::MAILBOX;
        let _ = unsafe { xQueueOverwriteFromISR(self.handle, as_void(&item), woken.as_ptr()) };
    }

    /// Take the item at the front of the queue, waiting up to `timeout` for one.
    pub fn receive<W>(&self, timeout: W) -> Result<T>
    where
        W: Into<Timeout>,
    {
        let timeout = timeout.into();
        let mut item = MaybeUninit::<T>::uninit();
        let got = unsafe { xQueueReceive(self.handle, item.as_mut_ptr() as *mut c_void, timeout.0) };
        to_result(got, empty(timeout))?;
        Ok(unsafe { item.assume_init() })
    }

    /// Take the item at the front of the queue from an interrupt handler.
    pub fn receive_isr(&self, woken: &mut TaskWoken) -> Result<T> {
        let mut item = MaybeUninit::<T>::uninit();
        let got = unsafe {
            xQueueReceiveFromISR(self.handle, item.as_mut_ptr() as *mut c_void, woken.as_ptr())
        };
        to_result(got, Error::Empty)?;
        Ok(unsafe { item.assume_init() })
    }

    /// Copy the item at the front of the queue, leaving it there.
    pub fn peek<W>(&self, timeout: W) -> Result<T>
    where
        W: Into<Timeout>,
    {
        let timeout = timeout.into();
        let mut item = MaybeUninit::<T>::uninit();
        let got = unsafe { xQueuePeek(self.handle, item.as_mut_ptr() as *mut c_void, timeout.0) };
        to_result(got, empty(timeout))?;
        Ok(unsafe { item.assume_init() })
    }

    /// Peek from an interrupt handler.
    pub fn peek_isr(&self) -> Result<T> {
        let mut item = MaybeUninit::<T>::uninit();
        let got = unsafe { xQueuePeekFromISR(self.handle, item.as_mut_ptr() as *mut c_void) };
        to_result(got, Error::Empty)?;
        Ok(unsafe { item.assume_init() })
    }

    /// The number of items in the queue.
    pub fn len(&self) -> usize {
        unsafe { uxQueueMessagesWaiting(self.handle) as usize }
    }

    /// Is the queue empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of items that can be sent before the queue is full.
    pub fn spaces(&self) -> usize {
        unsafe { uxQueueSpacesAvailable(self.handle) as usize }
    }

    /// The number of items in the queue, from an interrupt handler.
    pub fn len_isr(&self) -> usize {
        unsafe { uxQueueMessagesWaitingFromISR(self.handle) as usize }
    }

    /// Is the queue full?  For interrupt handlers.
    pub fn is_full_isr(&self) -> bool {
        unsafe { xQueueIsQueueFullFromISR(self.handle) != pdFALSE }
    }

    /// Is the queue empty?  For interrupt handlers.
    pub fn is_empty_isr(&self) -> bool {
        unsafe { xQueueIsQueueEmptyFromISR(self.handle) != pdFALSE }
    }

    /// The length the queue was created with.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Discard everything in the queue.
    pub fn reset(&self) {
        // Always passes in current kernels.
        let _ = unsafe { xQueueReset(self.handle) };
    }

    /// Add the queue to the kernel's queue registry, for kernel aware debuggers.
    ///
    /// The registry only holds a reference to the name.  The entry is removed when the queue is
    /// dropped.
    #[cfg(configQUEUE_REGISTRY_SIZE)]
    pub fn set_name(&mut self, name: &'static CStr) {
        unsafe { crate::raw::vQueueAddToRegistry(self.handle, name.as_ptr()) };
        self.named = true;
    }

    /// The name the queue was registered with, if it is in the registry.
    #[cfg(configQUEUE_REGISTRY_SIZE)]
    pub fn name(&self) -> Option<&CStr> {
        let name = unsafe { crate::raw::pcQueueGetName(self.handle) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(name) })
        }
    }
}

fn as_void<T>(item: &T) -> *const c_void {
    item as *const T as *const c_void
}

impl<T, const N: usize, A: Allocation> Drop for Queue<T, N, A> {
    fn drop(&mut self) {
        trace!("queue {:?} deleted", self.handle);
        unsafe {
            #[cfg(configQUEUE_REGISTRY_SIZE)]
            {
                if self.named {
                    crate::raw::vQueueUnregisterQueue(self.handle);
                }
            }
            vQueueDelete(self.handle);
            self.alloc.release();
        }
    }
}

impl<T, const N: usize, A: Allocation> fmt::Debug for Queue<T, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue<{}> {:?}", N, self.handle)
    }
}
