// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Stream and message buffers.
//!
//! A message buffer is a stream buffer where each message is preceded by its length, stored as a
//! `usize`.  As in the kernel, a dynamically created buffer holds `size` bytes, and a static one
//! `size - 1` bytes of the storage it is given.

use std::ffi::c_void;
use std::mem::{size_of, MaybeUninit};
use std::ptr::null_mut;
use std::sync::{Condvar, Mutex};

use super::heap::{pvPortMalloc, release, Placement};
use super::{count, lock, wait_on, WaitList, Waiters};
use crate::{pdFAIL, pdFALSE, pdPASS, pdTRUE, BaseType_t, StreamBufferHandle_t, TickType_t};

const LENGTH_BYTES: usize = size_of::<usize>();

struct StreamState {
    storage: *mut u8,
    capacity: usize,
    head: usize,
    used: usize,
    trigger: usize,
    is_message: bool,
    rx: WaitList,
    tx: WaitList,
}

impl StreamState {
    fn space(&self) -> usize {
        self.capacity - self.used
    }

    fn prefix(&self) -> usize {
        if self.is_message {
            LENGTH_BYTES
        } else {
            0
        }
    }

    unsafe fn push(&mut self, data: *const u8, len: usize) {
        for i in 0..len {
            let at = (self.head + self.used + i) % self.capacity;
            *self.storage.add(at) = *data.add(i);
        }
        self.used += len;
    }

    unsafe fn copy_out(&self, offset: usize, out: *mut u8, len: usize) {
        for i in 0..len {
            let at = (self.head + offset + i) % self.capacity;
            *out.add(i) = *self.storage.add(at);
        }
    }

    fn discard(&mut self, len: usize) {
        self.head = (self.head + len) % self.capacity;
        self.used -= len;
    }

    fn next_message_len(&self) -> usize {
        if !self.is_message || self.used < LENGTH_BYTES {
            return 0;
        }
        let mut bytes = [0u8; LENGTH_BYTES];
        unsafe { self.copy_out(0, bytes.as_mut_ptr(), LENGTH_BYTES) };
        usize::from_ne_bytes(bytes)
    }

    /// Room needed before a send of `len` bytes can proceed.
    fn required(&self, len: usize) -> usize {
        if self.is_message {
            len + LENGTH_BYTES
        } else {
            len.min(self.capacity)
        }
    }

    unsafe fn write(&mut self, data: *const u8, len: usize) -> usize {
        if self.is_message {
            if self.space() < len + LENGTH_BYTES {
                return 0;
            }
            let prefix = len.to_ne_bytes();
            self.push(prefix.as_ptr(), LENGTH_BYTES);
            self.push(data, len);
            len
        } else {
            let n = len.min(self.space());
            self.push(data, n);
            n
        }
    }

    unsafe fn read(&mut self, out: *mut u8, len: usize) -> usize {
        if self.is_message {
            let size = self.next_message_len();
            if self.used < LENGTH_BYTES || size > len {
                return 0;
            }
            self.discard(LENGTH_BYTES);
            self.copy_out(0, out, size);
            self.discard(size);
            size
        } else {
            let n = len.min(self.used);
            self.copy_out(0, out, n);
            self.discard(n);
            n
        }
    }
}

fn rx(s: &mut StreamState) -> &mut WaitList {
    &mut s.rx
}

fn tx(s: &mut StreamState) -> &mut WaitList {
    &mut s.tx
}

/// What a `StreamBufferHandle_t` points at.
pub struct StreamBuffer {
    state: Mutex<StreamState>,
    cv: Condvar,
    placement: Placement,
}

/// Storage for a statically allocated stream or message buffer.
#[repr(transparent)]
pub struct StaticStreamBuffer_t {
    _slot: MaybeUninit<StreamBuffer>,
}

unsafe fn buffer<'a>(handle: StreamBufferHandle_t) -> &'a StreamBuffer {
    &*(handle as *const StreamBuffer)
}

const fn header_size() -> usize {
    (size_of::<StreamBuffer>() + 15) & !15
}

/// Check the trigger level, returning the effective one.
fn trigger_level(trigger: usize, capacity: usize, is_message: bool) -> Option<usize> {
    if is_message {
        return Some(1);
    }
    let trigger = trigger.max(1);
    (trigger <= capacity).then_some(trigger)
}

fn new_buffer(
    storage: *mut u8,
    capacity: usize,
    trigger: usize,
    is_message: bool,
    placement: Placement,
) -> StreamBuffer {
    StreamBuffer {
        state: Mutex::new(StreamState {
            storage,
            capacity,
            head: 0,
            used: 0,
            trigger,
            is_message,
            rx: WaitList::default(),
            tx: WaitList::default(),
        }),
        cv: Condvar::new(),
        placement,
    }
}

pub unsafe extern "C" fn rust_freertos_stream_buffer_create(
    size: usize,
    trigger: usize,
    is_message: BaseType_t,
) -> StreamBufferHandle_t {
    let is_message = is_message != pdFALSE;
    if size == 0 || (is_message && size <= LENGTH_BYTES) {
        return null_mut();
    }
    let Some(trigger) = trigger_level(trigger, size, is_message) else {
        return null_mut();
    };
    let Some(total) = size.checked_add(1 + header_size()) else {
        return null_mut();
    };
    let base = pvPortMalloc(total) as *mut u8;
    if base.is_null() {
        return null_mut();
    }
    let sb = base as *mut StreamBuffer;
    sb.write(new_buffer(
        base.add(header_size()),
        size,
        trigger,
        is_message,
        Placement::Heap,
    ));
    count(|s| s.creates += 1);
    sb as StreamBufferHandle_t
}

pub unsafe extern "C" fn rust_freertos_stream_buffer_create_static(
    size: usize,
    trigger: usize,
    is_message: BaseType_t,
    storage: *mut u8,
    buffer: *mut StaticStreamBuffer_t,
) -> StreamBufferHandle_t {
    let is_message = is_message != pdFALSE;
    if storage.is_null() || buffer.is_null() || size < 2 || (is_message && size <= LENGTH_BYTES + 1) {
        return null_mut();
    }
    let capacity = size - 1;
    let Some(trigger) = trigger_level(trigger, capacity, is_message) else {
        return null_mut();
    };
    let sb = buffer as *mut StreamBuffer;
    sb.write(new_buffer(storage, capacity, trigger, is_message, Placement::Static));
    count(|s| s.creates += 1);
    sb as StreamBufferHandle_t
}

pub unsafe extern "C" fn xStreamBufferSend(
    xStreamBuffer: StreamBufferHandle_t,
    pvTxData: *const c_void,
    xDataLengthBytes: usize,
    xTicksToWait: TickType_t,
) -> usize {
    let sb = buffer(xStreamBuffer);
    let required = {
        let state = lock(&sb.state);
        let required = state.required(xDataLengthBytes);
        if required > state.capacity {
            return 0;
        }
        required
    };
    let (mut state, _) = wait_on(
        &sb.state,
        &sb.cv,
        xTicksToWait,
        Some(tx as Waiters<StreamState>),
        |s| s.space() >= required,
    );
    let sent = state.write(pvTxData as *const u8, xDataLengthBytes);
    if sent > 0 {
        sb.cv.notify_all();
    }
    sent
}

fn set_woken(woken: *mut BaseType_t, wakes: bool) {
    if wakes && !woken.is_null() {
        unsafe { *woken = pdTRUE };
    }
}

pub unsafe extern "C" fn xStreamBufferSendFromISR(
    xStreamBuffer: StreamBufferHandle_t,
    pvTxData: *const c_void,
    xDataLengthBytes: usize,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> usize {
    let sb = buffer(xStreamBuffer);
    let mut state = lock(&sb.state);
    let sent = state.write(pvTxData as *const u8, xDataLengthBytes);
    if sent > 0 {
        let ready = state.is_message || state.used >= state.trigger;
        set_woken(pxHigherPriorityTaskWoken, ready && state.rx.wakes_higher());
        sb.cv.notify_all();
    }
    sent
}

pub unsafe extern "C" fn xStreamBufferReceive(
    xStreamBuffer: StreamBufferHandle_t,
    pvRxData: *mut c_void,
    xBufferLengthBytes: usize,
    xTicksToWait: TickType_t,
) -> usize {
    let sb = buffer(xStreamBuffer);
    let (mut state, _) = {
        let state = lock(&sb.state);
        if state.used > state.prefix() {
            (state, true)
        } else {
            drop(state);
            wait_on(
                &sb.state,
                &sb.cv,
                xTicksToWait,
                Some(rx as Waiters<StreamState>),
                |s| s.used > s.prefix() && s.used >= s.trigger,
            )
        }
    };
    // After a timeout, whatever did arrive is returned.
    if state.used <= state.prefix() {
        return 0;
    }
    let received = state.read(pvRxData as *mut u8, xBufferLengthBytes);
    if received > 0 {
        sb.cv.notify_all();
    }
    received
}

pub unsafe extern "C" fn xStreamBufferReceiveFromISR(
    xStreamBuffer: StreamBufferHandle_t,
    pvRxData: *mut c_void,
    xBufferLengthBytes: usize,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> usize {
    let sb = buffer(xStreamBuffer);
    let mut state = lock(&sb.state);
    let received = state.read(pvRxData as *mut u8, xBufferLengthBytes);
    if received > 0 {
        set_woken(pxHigherPriorityTaskWoken, state.tx.wakes_higher());
        sb.cv.notify_all();
    }
    received
}

pub unsafe extern "C" fn vStreamBufferDelete(xStreamBuffer: StreamBufferHandle_t) {
    if xStreamBuffer.is_null() {
        return;
    }
    let sb = xStreamBuffer as *mut StreamBuffer;
    release(sb, (*sb).placement);
    count(|s| s.deletes += 1);
}

pub unsafe extern "C" fn xStreamBufferBytesAvailable(xStreamBuffer: StreamBufferHandle_t) -> usize {
    lock(&buffer(xStreamBuffer).state).used
}

pub unsafe extern "C" fn xStreamBufferSpacesAvailable(xStreamBuffer: StreamBufferHandle_t) -> usize {
    lock(&buffer(xStreamBuffer).state).space()
}

/// Only succeeds when no task is blocked on the buffer.
pub unsafe extern "C" fn xStreamBufferReset(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t {
    let sb = buffer(xStreamBuffer);
    let mut state = lock(&sb.state);
    if !state.rx.is_empty() || !state.tx.is_empty() {
        return pdFAIL;
    }
    state.head = 0;
    state.used = 0;
    pdPASS
}

pub unsafe extern "C" fn xStreamBufferSetTriggerLevel(
    xStreamBuffer: StreamBufferHandle_t,
    xTriggerLevel: usize,
) -> BaseType_t {
    let mut state = lock(&buffer(xStreamBuffer).state);
    match trigger_level(xTriggerLevel, state.capacity, state.is_message) {
        Some(trigger) if !state.is_message => {
            state.trigger = trigger;
            pdTRUE
        }
        _ => pdFALSE,
    }
}

pub unsafe extern "C" fn xStreamBufferIsEmpty(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t {
    if lock(&buffer(xStreamBuffer).state).used == 0 {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn xStreamBufferIsFull(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t {
    let state = lock(&buffer(xStreamBuffer).state);
    if state.space() <= state.prefix() {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn xStreamBufferNextMessageLengthBytes(
    xStreamBuffer: StreamBufferHandle_t,
) -> usize {
    lock(&buffer(xStreamBuffer).state).next_message_len()
}
