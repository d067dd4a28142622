// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Stream and message buffers
//!
//! A [`StreamBuffer`] moves a stream of bytes from one writer to one reader.  Writes may be
//! partial, and a reader gets whatever bytes are there, once at least the trigger level have
//! arrived.  A [`MessageBuffer`] moves whole messages of varying length instead.  Each message is
//! stored after a `usize` holding its length, and is either sent or received complete.
//!
//! Both hold `N` bytes, whichever way they are allocated.  For a message buffer, the `N` bytes
//! include the length word of every message in it.
//!
//! The kernel assumes a single writer and a single reader.  Where there are more tasks (or
//! interrupt handlers) on one side, they need to take turns, for instance by sending while holding
//! a [`Mutex`](crate::semaphore::Mutex).
//!
//! ```ignore
//! static LOG: StaticStorage<StreamStorage<256>> = StaticStorage::new();
//!
//! let log = StreamBuffer::new_in(&LOG, 1)?;
//! log.send(b"hello", Forever)?;
//! ```

use core::ffi::c_void;
use core::fmt;
use core::mem::size_of;
use core::ptr::addr_of_mut;

use log::trace;

use crate::error::{check_handle, Error, Result};
use crate::isr::TaskWoken;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    pdFALSE, vStreamBufferDelete, xStreamBufferBytesAvailable, xStreamBufferIsEmpty,
    xStreamBufferIsFull, xStreamBufferNextMessageLengthBytes, xStreamBufferReceive,
    xStreamBufferReceiveFromISR, xStreamBufferReset, xStreamBufferSend, xStreamBufferSendFromISR,
    xStreamBufferSetTriggerLevel, xStreamBufferSpacesAvailable, StaticStreamBuffer_t,
    StreamBufferHandle_t,
};
use crate::time::Timeout;

/// The bytes a message buffer spends on the length of each message.
pub const MESSAGE_LENGTH_BYTES: usize = size_of::<usize>();

/// Static storage for a stream or message buffer of `N` bytes.
#[repr(C)]
pub struct StreamStorage<const N: usize> {
    control: StaticStreamBuffer_t,
    // The kernel uses one byte of the storage it is given to tell empty from full.
    data: [u8; N],
    #[allow(dead_code)]
    spare: u8,
}

/// An allocation strategy that can create stream and message buffers of `N` bytes.
pub trait StreamAllocator<const N: usize>: Allocation {
    #[doc(hidden)]
    fn create_stream(&self, trigger: usize, is_message: bool) -> Result<StreamBufferHandle_t>;
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<const N: usize> StreamAllocator<N> for Dynamic {
    fn create_stream(&self, trigger: usize, is_message: bool) -> Result<StreamBufferHandle_t> {
        let handle = unsafe {
            if is_message {
                crate::raw::xMessageBufferCreate(N)
            } else {
                crate::raw::xStreamBufferCreate(N, trigger)
            }
        };
        check_handle(handle)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<const N: usize> StreamAllocator<N> for &'static StaticStorage<StreamStorage<N>> {
    fn create_stream(&self, trigger: usize, is_message: bool) -> Result<StreamBufferHandle_t> {
        crate::object::create_static(*self, |storage| unsafe {
            let data = addr_of_mut!((*storage).data) as *mut u8;
            let control = addr_of_mut!((*storage).control);
            if is_message {
                crate::raw::xMessageBufferCreateStatic(N + 1, data, control)
            } else {
                crate::raw::xStreamBufferCreateStatic(N + 1, trigger, data, control)
            }
        })
    }
}

/// The error for a transfer that moved nothing.
fn nothing(timeout: Timeout, idle: Error) -> Error {
    if timeout.is_no_wait() {
        idle
    } else {
        Error::Timeout
    }
}

/// What stream and message buffers share.
struct RawStream<A: Allocation> {
    handle: StreamBufferHandle_t,
    alloc: A,
}

impl<A: Allocation> RawStream<A> {
    fn new<const N: usize>(alloc: A, trigger: usize, is_message: bool) -> Result<RawStream<A>>
    where
        A: StreamAllocator<N>,
    {
        let handle = alloc.create_stream(trigger, is_message)?;
        trace!("stream buffer {:?} created: {} bytes", handle, N);
        Ok(RawStream { handle, alloc })
    }

    fn send(&self, data: &[u8], timeout: Timeout) -> usize {
        unsafe {
            xStreamBufferSend(
                self.handle,
                data.as_ptr() as *const c_void,
                data.len(),
                timeout.0,
            )
        }
    }

    fn send_isr(&self, data: &[u8], woken: &mut TaskWoken) -> usize {
        unsafe {
            xStreamBufferSendFromISR(
                self.handle,
                data.as_ptr() as *const c_void,
                data.len(),
                woken.as_ptr(),
            )
        }
    }

    fn receive(&self, buf: &mut [u8], timeout: Timeout) -> usize {
        unsafe {
            xStreamBufferReceive(
                self.handle,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                timeout.0,
            )
        }
    }

    fn receive_isr(&self, buf: &mut [u8], woken: &mut TaskWoken) -> usize {
        unsafe {
            xStreamBufferReceiveFromISR(
                self.handle,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                woken.as_ptr(),
            )
        }
    }

    fn bytes_available(&self) -> usize {
        unsafe { xStreamBufferBytesAvailable(self.handle) }
    }

    fn spaces_available(&self) -> usize {
        unsafe { xStreamBufferSpacesAvailable(self.handle) }
    }

    fn is_empty(&self) -> bool {
        unsafe { xStreamBufferIsEmpty(self.handle) != pdFALSE }
    }

    fn is_full(&self) -> bool {
        unsafe { xStreamBufferIsFull(self.handle) != pdFALSE }
    }

    fn reset(&self) -> Result<()> {
        crate::error::to_result(unsafe { xStreamBufferReset(self.handle) }, Error::InUse)
    }
}

impl<A: Allocation> Drop for RawStream<A> {
    fn drop(&mut self) {
        trace!("stream buffer {:?} deleted", self.handle);
        unsafe {
            vStreamBufferDelete(self.handle);
            self.alloc.release();
        }
    }
}

/// A byte stream of up to `N` bytes.
pub struct StreamBuffer<const N: usize, A: Allocation = Dynamic> {
    inner: RawStream<A>,
}

// The kernel does its own locking on the handle.
unsafe impl<const N: usize, A: Allocation + Send> Send for StreamBuffer<N, A> {}
unsafe impl<const N: usize, A: Allocation + Sync> Sync for StreamBuffer<N, A> {}

impl<const N: usize, A: StreamAllocator<N>> StreamBuffer<N, A> {
    const VALID: () = assert!(N > 0, "a stream buffer needs a non-zero size");

    /// Create a stream buffer in the given allocation.
    ///
    /// A blocked reader wakes once `trigger` bytes are available.  A trigger of 0 is the same as 1.
    pub fn new_with(alloc: A, trigger: usize) -> Result<StreamBuffer<N, A>> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID;
        if trigger > N {
            return Err(Error::InvalidArgument);
        }
        Ok(StreamBuffer {
            inner: RawStream::new::<N>(alloc, trigger, false)?,
        })
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<const N: usize> StreamBuffer<N, Dynamic> {
    /// Create a stream buffer from the kernel heap.
    pub fn new(trigger: usize) -> Result<StreamBuffer<N, Dynamic>> {
        Self::new_with(Dynamic, trigger)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<const N: usize> StreamBuffer<N, &'static StaticStorage<StreamStorage<N>>> {
    /// Create a stream buffer in static storage.
    pub fn new_in(storage: &'static StaticStorage<StreamStorage<N>>, trigger: usize) -> Result<Self> {
        Self::new_with(storage, trigger)
    }
}

impl<const N: usize, A: Allocation> StreamBuffer<N, A> {
    /// Write as much of `data` as fits, waiting up to `timeout` for any room.  Returns the number
    /// of bytes written.
    pub fn send<T: Into<Timeout>>(&self, data: &[u8], timeout: T) -> Result<usize> {
        let timeout = timeout.into();
        match self.inner.send(data, timeout) {
            0 if !data.is_empty() => Err(nothing(timeout, Error::Full)),
            sent => Ok(sent),
        }
    }

    /// Write as much of `data` as fits, from an interrupt handler.
    pub fn send_isr(&self, data: &[u8], woken: &mut TaskWoken) -> Result<usize> {
        match self.inner.send_isr(data, woken) {
            0 if !data.is_empty() => Err(Error::Full),
            sent => Ok(sent),
        }
    }

    /// Read up to `buf.len()` bytes, waiting up to `timeout` for the trigger level to be reached.
    /// On a timeout, any bytes that did arrive are still returned.
    pub fn receive<T: Into<Timeout>>(&self, buf: &mut [u8], timeout: T) -> Result<usize> {
        let timeout = timeout.into();
        match self.inner.receive(buf, timeout) {
            0 if !buf.is_empty() => Err(nothing(timeout, Error::Empty)),
            received => Ok(received),
        }
    }

    /// Read up to `buf.len()` bytes, from an interrupt handler.
    pub fn receive_isr(&self, buf: &mut [u8], woken: &mut TaskWoken) -> Result<usize> {
        match self.inner.receive_isr(buf, woken) {
            0 if !buf.is_empty() => Err(Error::Empty),
            received => Ok(received),
        }
    }

    /// The bytes waiting to be read.
    pub fn bytes_available(&self) -> usize {
        self.inner.bytes_available()
    }

    /// The room left for writing.
    pub fn spaces_available(&self) -> usize {
        self.inner.spaces_available()
    }

    /// Is there nothing to read?
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Is there no room to write?
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// The size of the buffer.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Discard the contents.  Fails with [`Error::InUse`] while a task is blocked on the buffer.
    pub fn reset(&self) -> Result<()> {
        self.inner.reset()
    }

    /// Change how many bytes must be available before a blocked reader wakes.
    pub fn set_trigger_level(&self, trigger: usize) -> Result<()> {
        let set = unsafe { xStreamBufferSetTriggerLevel(self.inner.handle, trigger) };
        crate::error::to_result(set, Error::InvalidArgument)
    }
}

impl<const N: usize, A: Allocation> fmt::Debug for StreamBuffer<N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamBuffer {:?} {}/{} bytes",
            self.inner.handle,
            self.bytes_available(),
            N
        )
    }
}

/// A buffer of whole messages, holding up to `N` bytes including each message's length.
pub struct MessageBuffer<const N: usize, A: Allocation = Dynamic> {
    inner: RawStream<A>,
}

// The kernel does its own locking on the handle.
unsafe impl<const N: usize, A: Allocation + Send> Send for MessageBuffer<N, A> {}
unsafe impl<const N: usize, A: Allocation + Sync> Sync for MessageBuffer<N, A> {}

impl<const N: usize, A: StreamAllocator<N>> MessageBuffer<N, A> {
    const VALID: () = assert!(
        N > MESSAGE_LENGTH_BYTES,
        "a message buffer must have room for a message length"
    );

    /// Create a message buffer in the given allocation.
    pub fn new_with(alloc: A) -> Result<MessageBuffer<N, A>> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID;
        Ok(MessageBuffer {
            inner: RawStream::new::<N>(alloc, 0, true)?,
        })
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<const N: usize> MessageBuffer<N, Dynamic> {
    /// Create a message buffer from the kernel heap.
    pub fn new() -> Result<MessageBuffer<N, Dynamic>> {
        Self::new_with(Dynamic)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<const N: usize> MessageBuffer<N, &'static StaticStorage<StreamStorage<N>>> {
    /// Create a message buffer in static storage.
    pub fn new_in(storage: &'static StaticStorage<StreamStorage<N>>) -> Result<Self> {
        Self::new_with(storage)
    }
}

impl<const N: usize, A: Allocation> MessageBuffer<N, A> {
    /// The longest message that can ever fit.
    pub const MAX_MESSAGE: usize = N - MESSAGE_LENGTH_BYTES;

    /// Send a message, waiting up to `timeout` for room for all of it.
    ///
    /// A message longer than [`MAX_MESSAGE`](Self::MAX_MESSAGE) can never be sent, and fails with
    /// [`Error::InvalidArgument`].
    pub fn send<T: Into<Timeout>>(&self, message: &[u8], timeout: T) -> Result<()> {
        if message.len() > Self::MAX_MESSAGE {
            return Err(Error::InvalidArgument);
        }
        let timeout = timeout.into();
        match self.inner.send(message, timeout) {
            0 => Err(nothing(timeout, Error::Full)),
            _ => Ok(()),
        }
    }

    /// Send a message from an interrupt handler.
    pub fn send_isr(&self, message: &[u8], woken: &mut TaskWoken) -> Result<()> {
        if message.len() > Self::MAX_MESSAGE {
            return Err(Error::InvalidArgument);
        }
        match self.inner.send_isr(message, woken) {
            0 => Err(Error::Full),
            _ => Ok(()),
        }
    }

    /// Receive the next message into `buf`, waiting up to `timeout` for one.  Returns its length.
    ///
    /// If the next message is longer than `buf`, it is left in the buffer and this fails with
    /// [`Error::Full`].
    pub fn receive<T: Into<Timeout>>(&self, buf: &mut [u8], timeout: T) -> Result<usize> {
        let timeout = timeout.into();
        match self.inner.receive(buf, timeout) {
            0 => Err(self.receive_error(buf, nothing(timeout, Error::Empty))),
            received => Ok(received),
        }
    }

    /// Receive the next message from an interrupt handler.
    pub fn receive_isr(&self, buf: &mut [u8], woken: &mut TaskWoken) -> Result<usize> {
        match self.inner.receive_isr(buf, woken) {
            0 => Err(self.receive_error(buf, Error::Empty)),
            received => Ok(received),
        }
    }

    fn receive_error(&self, buf: &[u8], otherwise: Error) -> Error {
        match self.next_len() {
            Some(len) if len > buf.len() => Error::Full,
            _ => otherwise,
        }
    }

    /// The length of the next message, if there is one.
    pub fn next_len(&self) -> Option<usize> {
        if self.inner.is_empty() {
            return None;
        }
        Some(unsafe { xStreamBufferNextMessageLengthBytes(self.inner.handle) })
    }

    /// The bytes in use, including message lengths.
    pub fn bytes_available(&self) -> usize {
        self.inner.bytes_available()
    }

    /// The free bytes.  The longest message that fits now is this, less
    /// [`MESSAGE_LENGTH_BYTES`].
    pub fn spaces_available(&self) -> usize {
        self.inner.spaces_available()
    }

    /// Are there no messages?
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Is there no room for even an empty message?
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// The size of the buffer.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Discard every message.  Fails with [`Error::InUse`] while a task is blocked on the buffer.
    pub fn reset(&self) -> Result<()> {
        self.inner.reset()
    }
}

impl<const N: usize, A: Allocation> fmt::Debug for MessageBuffer<N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessageBuffer {:?} {}/{} bytes",
            self.inner.handle,
            self.bytes_available(),
            N
        )
    }
}
