// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The function-like macros from the FreeRTOS headers.
//!
//! These expand exactly as the C macros do, which keeps the wrappers in the `freertos` crate
//! readable in the kernel's own vocabulary.

use core::ffi::{c_char, c_void};
use core::ptr::null_mut;

use crate::*;

// semphr.h

#[inline(always)]
pub unsafe fn xSemaphoreCreateBinary() -> SemaphoreHandle_t {
    xQueueGenericCreate(1, semSEMAPHORE_QUEUE_ITEM_LENGTH, queueQUEUE_TYPE_BINARY_SEMAPHORE)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateBinaryStatic(buffer: *mut StaticSemaphore_t) -> SemaphoreHandle_t {
    xQueueGenericCreateStatic(
        1,
        semSEMAPHORE_QUEUE_ITEM_LENGTH,
        null_mut(),
        buffer,
        queueQUEUE_TYPE_BINARY_SEMAPHORE,
    )
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateCounting(max: UBaseType_t, initial: UBaseType_t) -> SemaphoreHandle_t {
    xQueueCreateCountingSemaphore(max, initial)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateCountingStatic(
    max: UBaseType_t,
    initial: UBaseType_t,
    buffer: *mut StaticSemaphore_t,
) -> SemaphoreHandle_t {
    xQueueCreateCountingSemaphoreStatic(max, initial, buffer)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateMutex() -> SemaphoreHandle_t {
    xQueueCreateMutex(queueQUEUE_TYPE_MUTEX)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateMutexStatic(buffer: *mut StaticSemaphore_t) -> SemaphoreHandle_t {
    xQueueCreateMutexStatic(queueQUEUE_TYPE_MUTEX, buffer)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateRecursiveMutex() -> SemaphoreHandle_t {
    xQueueCreateMutex(queueQUEUE_TYPE_RECURSIVE_MUTEX)
}

#[inline(always)]
pub unsafe fn xSemaphoreCreateRecursiveMutexStatic(
    buffer: *mut StaticSemaphore_t,
) -> SemaphoreHandle_t {
    xQueueCreateMutexStatic(queueQUEUE_TYPE_RECURSIVE_MUTEX, buffer)
}

#[inline(always)]
pub unsafe fn xSemaphoreTake(sem: SemaphoreHandle_t, ticks: TickType_t) -> BaseType_t {
    xQueueSemaphoreTake(sem, ticks)
}

#[inline(always)]
pub unsafe fn xSemaphoreGive(sem: SemaphoreHandle_t) -> BaseType_t {
    xQueueGenericSend(sem, core::ptr::null(), semGIVE_BLOCK_TIME, queueSEND_TO_BACK)
}

#[inline(always)]
pub unsafe fn xSemaphoreTakeFromISR(sem: SemaphoreHandle_t, woken: *mut BaseType_t) -> BaseType_t {
    xQueueReceiveFromISR(sem, null_mut(), woken)
}

#[inline(always)]
pub unsafe fn xSemaphoreGiveFromISR(sem: SemaphoreHandle_t, woken: *mut BaseType_t) -> BaseType_t {
    xQueueGiveFromISR(sem, woken)
}

#[inline(always)]
pub unsafe fn xSemaphoreTakeRecursive(sem: SemaphoreHandle_t, ticks: TickType_t) -> BaseType_t {
    xQueueTakeMutexRecursive(sem, ticks)
}

#[inline(always)]
pub unsafe fn xSemaphoreGiveRecursive(sem: SemaphoreHandle_t) -> BaseType_t {
    xQueueGiveMutexRecursive(sem)
}

#[inline(always)]
pub unsafe fn xSemaphoreGetMutexHolder(sem: SemaphoreHandle_t) -> TaskHandle_t {
    xQueueGetMutexHolder(sem)
}

#[inline(always)]
pub unsafe fn uxSemaphoreGetCount(sem: SemaphoreHandle_t) -> UBaseType_t {
    uxQueueMessagesWaiting(sem)
}

#[inline(always)]
pub unsafe fn uxSemaphoreGetCountFromISR(sem: SemaphoreHandle_t) -> UBaseType_t {
    uxQueueMessagesWaitingFromISR(sem)
}

#[inline(always)]
pub unsafe fn vSemaphoreDelete(sem: SemaphoreHandle_t) {
    vQueueDelete(sem)
}

// queue.h

#[inline(always)]
pub unsafe fn xQueueCreate(len: UBaseType_t, item_size: UBaseType_t) -> QueueHandle_t {
    xQueueGenericCreate(len, item_size, queueQUEUE_TYPE_BASE)
}

#[inline(always)]
pub unsafe fn xQueueCreateStatic(
    len: UBaseType_t,
    item_size: UBaseType_t,
    storage: *mut u8,
    buffer: *mut StaticQueue_t,
) -> QueueHandle_t {
    xQueueGenericCreateStatic(len, item_size, storage, buffer, queueQUEUE_TYPE_BASE)
}

#[inline(always)]
pub unsafe fn xQueueSendToBack(q: QueueHandle_t, item: *const c_void, ticks: TickType_t) -> BaseType_t {
    xQueueGenericSend(q, item, ticks, queueSEND_TO_BACK)
}

#[inline(always)]
pub unsafe fn xQueueSendToFront(q: QueueHandle_t, item: *const c_void, ticks: TickType_t) -> BaseType_t {
    xQueueGenericSend(q, item, ticks, queueSEND_TO_FRONT)
}

#[inline(always)]
pub unsafe fn xQueueOverwrite(q: QueueHandle_t, item: *const c_void) -> BaseType_t {
    xQueueGenericSend(q, item, 0, queueOVERWRITE)
}

#[inline(always)]
pub unsafe fn xQueueSendToBackFromISR(
    q: QueueHandle_t,
    item: *const c_void,
    woken: *mut BaseType_t,
) -> BaseType_t {
    xQueueGenericSendFromISR(q, item, woken, queueSEND_TO_BACK)
}

#[inline(always)]
pub unsafe fn xQueueSendToFrontFromISR(
    q: QueueHandle_t,
    item: *const c_void,
    woken: *mut BaseType_t,
) -> BaseType_t {
    xQueueGenericSendFromISR(q, item, woken, queueSEND_TO_FRONT)
}

#[inline(always)]
pub unsafe fn xQueueOverwriteFromISR(
    q: QueueHandle_t,
    item: *const c_void,
    woken: *mut BaseType_t,
) -> BaseType_t {
    xQueueGenericSendFromISR(q, item, woken, queueOVERWRITE)
}

#[inline(always)]
pub unsafe fn xQueueReset(q: QueueHandle_t) -> BaseType_t {
    xQueueGenericReset(q, pdFALSE)
}

// event_groups.h

#[inline(always)]
pub unsafe fn xEventGroupGetBits(eg: EventGroupHandle_t) -> EventBits_t {
    xEventGroupClearBits(eg, 0)
}

#[inline(always)]
pub unsafe fn xEventGroupSetBitsFromISR(
    eg: EventGroupHandle_t,
    bits: EventBits_t,
    woken: *mut BaseType_t,
) -> BaseType_t {
    xTimerPendFunctionCallFromISR(Some(vEventGroupSetBitsCallback), eg as *mut c_void, bits, woken)
}

#[inline(always)]
pub unsafe fn xEventGroupClearBitsFromISR(eg: EventGroupHandle_t, bits: EventBits_t) -> BaseType_t {
    xTimerPendFunctionCallFromISR(
        Some(vEventGroupClearBitsCallback),
        eg as *mut c_void,
        bits,
        null_mut(),
    )
}

// task.h

#[inline(always)]
pub unsafe fn taskENTER_CRITICAL() {
    rust_freertos_enter_critical()
}

#[inline(always)]
pub unsafe fn taskEXIT_CRITICAL() {
    rust_freertos_exit_critical()
}

#[inline(always)]
pub unsafe fn taskENTER_CRITICAL_FROM_ISR() -> UBaseType_t {
    rust_freertos_enter_critical_from_isr()
}

#[inline(always)]
pub unsafe fn taskEXIT_CRITICAL_FROM_ISR(saved: UBaseType_t) {
    rust_freertos_exit_critical_from_isr(saved)
}

#[inline(always)]
pub unsafe fn taskDISABLE_INTERRUPTS() {
    rust_freertos_disable_interrupts()
}

#[inline(always)]
pub unsafe fn taskENABLE_INTERRUPTS() {
    rust_freertos_enable_interrupts()
}

#[inline(always)]
pub unsafe fn taskYIELD() {
    rust_freertos_yield()
}

#[inline(always)]
pub unsafe fn portYIELD_FROM_ISR(woken: BaseType_t) {
    rust_freertos_yield_from_isr(woken)
}

// timers.h

#[inline(always)]
pub unsafe fn xTimerStart(t: TimerHandle_t, ticks: TickType_t) -> BaseType_t {
    xTimerGenericCommandFromTask(t, tmrCOMMAND_START, xTaskGetTickCount(), null_mut(), ticks)
}

#[inline(always)]
pub unsafe fn xTimerStop(t: TimerHandle_t, ticks: TickType_t) -> BaseType_t {
    xTimerGenericCommandFromTask(t, tmrCOMMAND_STOP, 0, null_mut(), ticks)
}

#[inline(always)]
pub unsafe fn xTimerReset(t: TimerHandle_t, ticks: TickType_t) -> BaseType_t {
    xTimerGenericCommandFromTask(t, tmrCOMMAND_RESET, xTaskGetTickCount(), null_mut(), ticks)
}

#[inline(always)]
pub unsafe fn xTimerChangePeriod(t: TimerHandle_t, period: TickType_t, ticks: TickType_t) -> BaseType_t {
    xTimerGenericCommandFromTask(t, tmrCOMMAND_CHANGE_PERIOD, period, null_mut(), ticks)
}

#[inline(always)]
pub unsafe fn xTimerDelete(t: TimerHandle_t, ticks: TickType_t) -> BaseType_t {
    xTimerGenericCommandFromTask(t, tmrCOMMAND_DELETE, 0, null_mut(), ticks)
}

#[inline(always)]
pub unsafe fn xTimerStartFromISR(t: TimerHandle_t, woken: *mut BaseType_t) -> BaseType_t {
    xTimerGenericCommandFromISR(t, tmrCOMMAND_START_FROM_ISR, xTaskGetTickCountFromISR(), woken, 0)
}

#[inline(always)]
pub unsafe fn xTimerStopFromISR(t: TimerHandle_t, woken: *mut BaseType_t) -> BaseType_t {
    xTimerGenericCommandFromISR(t, tmrCOMMAND_STOP_FROM_ISR, 0, woken, 0)
}

#[inline(always)]
pub unsafe fn xTimerResetFromISR(t: TimerHandle_t, woken: *mut BaseType_t) -> BaseType_t {
    xTimerGenericCommandFromISR(t, tmrCOMMAND_RESET_FROM_ISR, xTaskGetTickCountFromISR(), woken, 0)
}

#[inline(always)]
pub unsafe fn xTimerChangePeriodFromISR(
    t: TimerHandle_t,
    period: TickType_t,
    woken: *mut BaseType_t,
) -> BaseType_t {
    xTimerGenericCommandFromISR(t, tmrCOMMAND_CHANGE_PERIOD_FROM_ISR, period, woken, 0)
}

// stream_buffer.h and message_buffer.h

#[inline(always)]
pub unsafe fn xStreamBufferCreate(size: usize, trigger: usize) -> StreamBufferHandle_t {
    rust_freertos_stream_buffer_create(size, trigger, pdFALSE)
}

#[inline(always)]
pub unsafe fn xStreamBufferCreateStatic(
    size: usize,
    trigger: usize,
    storage: *mut u8,
    buffer: *mut StaticStreamBuffer_t,
) -> StreamBufferHandle_t {
    rust_freertos_stream_buffer_create_static(size, trigger, pdFALSE, storage, buffer)
}

#[inline(always)]
pub unsafe fn xMessageBufferCreate(size: usize) -> MessageBufferHandle_t {
    rust_freertos_stream_buffer_create(size, 0, pdTRUE)
}

#[inline(always)]
pub unsafe fn xMessageBufferCreateStatic(
    size: usize,
    storage: *mut u8,
    buffer: *mut StaticMessageBuffer_t,
) -> MessageBufferHandle_t {
    rust_freertos_stream_buffer_create_static(size, 0, pdTRUE, storage, buffer)
}

/// Hand bytes to the port's console.  Returns how many it took.
#[inline(always)]
pub unsafe fn console_write(data: &[u8]) -> usize {
    rust_freertos_console_write(data.as_ptr() as *const c_char, data.len())
}
