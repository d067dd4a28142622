// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Queues, and the semaphores and mutexes built on them.
//!
//! As in the kernel, a semaphore is a queue with zero sized items, where the message count is the
//! semaphore count.  Mutexes additionally track their holder.

use std::ffi::{c_char, c_void};
use std::mem::{size_of, MaybeUninit};
use std::ptr::{self, null, null_mut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use super::heap::{pvPortMalloc, release, Placement};
use super::task::current;
use super::{count, lock, wait_on, WaitList, Waiters};
use crate::config::configQUEUE_REGISTRY_SIZE;
use crate::{
    errQUEUE_EMPTY, errQUEUE_FULL, pdFAIL, pdFALSE, pdPASS, pdTRUE, queueOVERWRITE,
    queueQUEUE_TYPE_COUNTING_SEMAPHORE, queueQUEUE_TYPE_MUTEX, queueQUEUE_TYPE_RECURSIVE_MUTEX,
    queueSEND_TO_FRONT, BaseType_t, QueueHandle_t, TaskHandle_t, TickType_t, UBaseType_t,
};

struct QueueState {
    kind: u8,
    length: usize,
    item_size: usize,
    storage: *mut u8,
    head: usize,
    count: usize,
    holder: TaskHandle_t,
    recursion: usize,
    rx: WaitList,
    tx: WaitList,
    name: *const c_char,
}

impl QueueState {
    fn is_mutex(&self) -> bool {
        self.kind == queueQUEUE_TYPE_MUTEX || self.kind == queueQUEUE_TYPE_RECURSIVE_MUTEX
    }

    fn is_full(&self) -> bool {
        self.count >= self.length
    }

    unsafe fn slot(&self, index: usize) -> *mut u8 {
        self.storage.add((index % self.length) * self.item_size)
    }

    unsafe fn write(&mut self, item: *const c_void, position: BaseType_t) {
        if position == queueOVERWRITE && self.count > 0 {
            // Overwrite is only for queues of length one.
            self.copy_in(self.head, item);
            return;
        }
        if position == queueSEND_TO_FRONT {
            self.head = (self.head + self.length - 1) % self.length;
            self.copy_in(self.head, item);
        } else {
            self.copy_in(self.head + self.count, item);
        }
        self.count += 1;
    }

    unsafe fn copy_in(&mut self, index: usize, item: *const c_void) {
        if self.item_size > 0 && !item.is_null() {
            ptr::copy_nonoverlapping(item as *const u8, self.slot(index), self.item_size);
        }
    }

    unsafe fn peek(&self, buffer: *mut c_void) {
        if self.item_size > 0 && !buffer.is_null() {
            ptr::copy_nonoverlapping(self.slot(self.head), buffer as *mut u8, self.item_size);
        }
    }

    unsafe fn read(&mut self, buffer: *mut c_void) {
        self.peek(buffer);
        self.head = (self.head + 1) % self.length;
        self.count -= 1;
    }

    /// A token left a mutex: record who now holds it.
    fn took(&mut self, me: TaskHandle_t) {
        if self.is_mutex() {
            self.holder = me;
            self.recursion = 1;
        }
    }
}

fn rx(s: &mut QueueState) -> &mut WaitList {
    &mut s.rx
}

fn tx(s: &mut QueueState) -> &mut WaitList {
    &mut s.tx
}

/// What a `QueueHandle_t` points at.
pub struct Queue {
    state: Mutex<QueueState>,
    cv: Condvar,
    placement: Placement,
}

/// Storage for a statically allocated queue or semaphore.
#[repr(transparent)]
pub struct StaticQueue_t {
    _slot: MaybeUninit<Queue>,
}

static REGISTERED: AtomicUsize = AtomicUsize::new(0);

unsafe fn queue<'a>(handle: QueueHandle_t) -> &'a Queue {
    &*(handle as *const Queue)
}

/// Control block room at the start of a dynamic allocation, keeping the storage aligned.
const fn header_size() -> usize {
    (size_of::<Queue>() + 15) & !15
}

fn new_queue(
    kind: u8,
    length: usize,
    item_size: usize,
    storage: *mut u8,
    initial: usize,
    placement: Placement,
) -> Queue {
    Queue {
        state: Mutex::new(QueueState {
            kind,
            length,
            item_size,
            storage,
            head: 0,
            count: initial,
            holder: null_mut(),
            recursion: 0,
            rx: WaitList::default(),
            tx: WaitList::default(),
            name: null(),
        }),
        cv: Condvar::new(),
        placement,
    }
}

unsafe fn create(kind: u8, length: UBaseType_t, item_size: UBaseType_t, initial: usize) -> QueueHandle_t {
    let (length, item_size) = (length as usize, item_size as usize);
    if length == 0 {
        return null_mut();
    }
    let Some(total) = length
        .checked_mul(item_size)
        .and_then(|s| s.checked_add(header_size()))
    else {
        return null_mut();
    };
    let base = pvPortMalloc(total) as *mut u8;
    if base.is_null() {
        return null_mut();
    }
    let storage = base.add(header_size());
    let q = base as *mut Queue;
    q.write(new_queue(kind, length, item_size, storage, initial, Placement::Heap));
    count(|s| s.creates += 1);
    q as QueueHandle_t
}

unsafe fn create_static(
    kind: u8,
    length: UBaseType_t,
    item_size: UBaseType_t,
    storage: *mut u8,
    buffer: *mut StaticQueue_t,
    initial: usize,
) -> QueueHandle_t {
    if length == 0 || buffer.is_null() || (item_size > 0 && storage.is_null()) {
        return null_mut();
    }
    let q = buffer as *mut Queue;
    q.write(new_queue(
        kind,
        length as usize,
        item_size as usize,
        storage,
        initial,
        Placement::Static,
    ));
    count(|s| s.creates += 1);
    q as QueueHandle_t
}

fn initial_count(kind: u8) -> usize {
    match kind {
        queueQUEUE_TYPE_MUTEX | queueQUEUE_TYPE_RECURSIVE_MUTEX => 1,
        _ => 0,
    }
}

pub unsafe extern "C" fn xQueueGenericCreate(
    uxQueueLength: UBaseType_t,
    uxItemSize: UBaseType_t,
    ucQueueType: u8,
) -> QueueHandle_t {
    create(ucQueueType, uxQueueLength, uxItemSize, initial_count(ucQueueType))
}

pub unsafe extern "C" fn xQueueGenericCreateStatic(
    uxQueueLength: UBaseType_t,
    uxItemSize: UBaseType_t,
    pucQueueStorage: *mut u8,
    pxStaticQueue: *mut StaticQueue_t,
    ucQueueType: u8,
) -> QueueHandle_t {
    create_static(
        ucQueueType,
        uxQueueLength,
        uxItemSize,
        pucQueueStorage,
        pxStaticQueue,
        initial_count(ucQueueType),
    )
}

pub unsafe extern "C" fn xQueueCreateMutex(ucQueueType: u8) -> QueueHandle_t {
    create(ucQueueType, 1, 0, 1)
}

pub unsafe extern "C" fn xQueueCreateMutexStatic(
    ucQueueType: u8,
    pxStaticQueue: *mut StaticQueue_t,
) -> QueueHandle_t {
    create_static(ucQueueType, 1, 0, null_mut(), pxStaticQueue, 1)
}

pub unsafe extern "C" fn xQueueCreateCountingSemaphore(
    uxMaxCount: UBaseType_t,
    uxInitialCount: UBaseType_t,
) -> QueueHandle_t {
    if uxInitialCount > uxMaxCount {
        return null_mut();
    }
    create(
        queueQUEUE_TYPE_COUNTING_SEMAPHORE,
        uxMaxCount,
        0,
        uxInitialCount as usize,
    )
}

pub unsafe extern "C" fn xQueueCreateCountingSemaphoreStatic(
    uxMaxCount: UBaseType_t,
    uxInitialCount: UBaseType_t,
    pxStaticQueue: *mut StaticQueue_t,
) -> QueueHandle_t {
    if uxInitialCount > uxMaxCount {
        return null_mut();
    }
    create_static(
        queueQUEUE_TYPE_COUNTING_SEMAPHORE,
        uxMaxCount,
        0,
        null_mut(),
        pxStaticQueue,
        uxInitialCount as usize,
    )
}

pub unsafe extern "C" fn xQueueGenericSend(
    xQueue: QueueHandle_t,
    pvItemToQueue: *const c_void,
    xTicksToWait: TickType_t,
    xCopyPosition: BaseType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let overwrite = xCopyPosition == queueOVERWRITE;

    {
        let mut state = lock(&q.state);
        if state.is_mutex() {
            // A give of a mutex: only the holder may give it back.
            let (me, _) = current();
            if state.holder != me || state.kind == queueQUEUE_TYPE_RECURSIVE_MUTEX {
                return pdFAIL;
            }
            state.holder = null_mut();
            state.recursion = 0;
            state.count = 1;
            q.cv.notify_all();
            return pdPASS;
        }
    }

    let (mut state, ok) = wait_on(
        &q.state,
        &q.cv,
        xTicksToWait,
        Some(tx as Waiters<QueueState>),
        |s| overwrite || !s.is_full(),
    );
    if !ok {
        return errQUEUE_FULL;
    }
    state.write(pvItemToQueue, xCopyPosition);
    q.cv.notify_all();
    pdPASS
}

fn set_woken(woken: *mut BaseType_t, wakes: bool) {
    if wakes && !woken.is_null() {
        unsafe { *woken = pdTRUE };
    }
}

pub unsafe extern "C" fn xQueueGenericSendFromISR(
    xQueue: QueueHandle_t,
    pvItemToQueue: *const c_void,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
    xCopyPosition: BaseType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let mut state = lock(&q.state);
    if state.is_full() && xCopyPosition != queueOVERWRITE {
        return errQUEUE_FULL;
    }
    state.write(pvItemToQueue, xCopyPosition);
    set_woken(pxHigherPriorityTaskWoken, state.rx.wakes_higher());
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn xQueueGiveFromISR(
    xQueue: QueueHandle_t,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let mut state = lock(&q.state);
    if state.is_mutex() || state.is_full() {
        return errQUEUE_FULL;
    }
    state.count += 1;
    set_woken(pxHigherPriorityTaskWoken, state.rx.wakes_higher());
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn xQueueReceive(
    xQueue: QueueHandle_t,
    pvBuffer: *mut c_void,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let (mut state, ok) = wait_on(
        &q.state,
        &q.cv,
        xTicksToWait,
        Some(rx as Waiters<QueueState>),
        |s| s.count > 0,
    );
    if !ok {
        return errQUEUE_EMPTY;
    }
    state.read(pvBuffer);
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn xQueueReceiveFromISR(
    xQueue: QueueHandle_t,
    pvBuffer: *mut c_void,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let mut state = lock(&q.state);
    if state.count == 0 || state.is_mutex() {
        return pdFAIL;
    }
    state.read(pvBuffer);
    set_woken(pxHigherPriorityTaskWoken, state.tx.wakes_higher());
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn xQueuePeek(
    xQueue: QueueHandle_t,
    pvBuffer: *mut c_void,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    let q = queue(xQueue);
    let (state, ok) = wait_on(
        &q.state,
        &q.cv,
        xTicksToWait,
        Some(rx as Waiters<QueueState>),
        |s| s.count > 0,
    );
    if !ok {
        return errQUEUE_EMPTY;
    }
    state.peek(pvBuffer);
    // Other readers may be waiting on the same item.
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn xQueuePeekFromISR(xQueue: QueueHandle_t, pvBuffer: *mut c_void) -> BaseType_t {
    let q = queue(xQueue);
    let state = lock(&q.state);
    if state.count == 0 {
        return pdFAIL;
    }
    state.peek(pvBuffer);
    pdPASS
}

pub unsafe extern "C" fn xQueueSemaphoreTake(xQueue: QueueHandle_t, xTicksToWait: TickType_t) -> BaseType_t {
    let q = queue(xQueue);
    let (me, _) = current();
    let (mut state, ok) = wait_on(
        &q.state,
        &q.cv,
        xTicksToWait,
        Some(rx as Waiters<QueueState>),
        |s| s.count > 0,
    );
    if !ok {
        return pdFAIL;
    }
    state.count -= 1;
    state.took(me);
    pdPASS
}

pub unsafe extern "C" fn xQueueTakeMutexRecursive(
    xMutex: QueueHandle_t,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    let q = queue(xMutex);
    let (me, _) = current();
    {
        let mut state = lock(&q.state);
        if state.holder == me {
            state.recursion += 1;
            return pdPASS;
        }
    }
    xQueueSemaphoreTake(xMutex, xTicksToWait)
}

pub unsafe extern "C" fn xQueueGiveMutexRecursive(xMutex: QueueHandle_t) -> BaseType_t {
    let q = queue(xMutex);
    let (me, _) = current();
    let mut state = lock(&q.state);
    if state.holder != me || state.recursion == 0 {
        return pdFAIL;
    }
    state.recursion -= 1;
    if state.recursion == 0 {
        state.holder = null_mut();
        state.count = 1;
        q.cv.notify_all();
    }
    pdPASS
}

pub unsafe extern "C" fn xQueueGetMutexHolder(xSemaphore: QueueHandle_t) -> TaskHandle_t {
    let state = lock(&queue(xSemaphore).state);
    if state.is_mutex() {
        state.holder
    } else {
        null_mut()
    }
}

pub unsafe extern "C" fn uxQueueMessagesWaiting(xQueue: QueueHandle_t) -> UBaseType_t {
    lock(&queue(xQueue).state).count as UBaseType_t
}

pub unsafe extern "C" fn uxQueueMessagesWaitingFromISR(xQueue: QueueHandle_t) -> UBaseType_t {
    uxQueueMessagesWaiting(xQueue)
}

pub unsafe extern "C" fn uxQueueSpacesAvailable(xQueue: QueueHandle_t) -> UBaseType_t {
    let state = lock(&queue(xQueue).state);
    (state.length - state.count) as UBaseType_t
}

pub unsafe extern "C" fn xQueueIsQueueFullFromISR(xQueue: QueueHandle_t) -> BaseType_t {
    if lock(&queue(xQueue).state).is_full() {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn xQueueIsQueueEmptyFromISR(xQueue: QueueHandle_t) -> BaseType_t {
    if lock(&queue(xQueue).state).count == 0 {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn xQueueGenericReset(xQueue: QueueHandle_t, _xNewQueue: BaseType_t) -> BaseType_t {
    let q = queue(xQueue);
    let mut state = lock(&q.state);
    state.head = 0;
    state.count = 0;
    q.cv.notify_all();
    pdPASS
}

pub unsafe extern "C" fn vQueueDelete(xQueue: QueueHandle_t) {
    if xQueue.is_null() {
        return;
    }
    vQueueUnregisterQueue(xQueue);
    {
        let state = lock(&queue(xQueue).state);
        if !state.rx.is_empty() || !state.tx.is_empty() {
            log::error!("queue deleted while tasks are blocked on it");
        }
    }
    let q = xQueue as *mut Queue;
    release(q, (*q).placement);
    count(|s| s.deletes += 1);
}

pub unsafe extern "C" fn vQueueAddToRegistry(xQueue: QueueHandle_t, pcQueueName: *const c_char) {
    let mut state = lock(&queue(xQueue).state);
    if state.name.is_null() {
        // The registry has a fixed number of slots, and a full registry ignores the request.
        let claimed = REGISTERED.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < configQUEUE_REGISTRY_SIZE as usize).then_some(n + 1)
        });
        if claimed.is_err() {
            return;
        }
    }
    state.name = pcQueueName;
}

pub unsafe extern "C" fn vQueueUnregisterQueue(xQueue: QueueHandle_t) {
    let mut state = lock(&queue(xQueue).state);
    if !state.name.is_null() {
        state.name = null();
        REGISTERED.fetch_sub(1, Ordering::AcqRel);
    }
}

pub unsafe extern "C" fn pcQueueGetName(xQueue: QueueHandle_t) -> *const c_char {
    lock(&queue(xQueue).state).name
}
