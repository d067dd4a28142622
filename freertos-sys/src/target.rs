// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Declarations of the C kernel.
//!
//! The static control blocks are opaque to Rust: they are byte arrays of the size reported by the
//! build script, which the C shim checks against the real structure sizes.

use core::ffi::{c_char, c_void};

use crate::{
    configRUN_TIME_COUNTER_TYPE, configSTACK_DEPTH_TYPE, eNotifyAction, eTaskState, BaseType_t,
    EventBits_t, EventGroupHandle_t, PendedFunction_t, QueueHandle_t, StackType_t,
    StreamBufferHandle_t, TaskFunction_t, TaskHandle_t, TaskHookFunction_t, TaskStatus_t,
    TickType_t, TimerCallbackFunction_t, TimerHandle_t, UBaseType_t,
    RUST_SIZEOF_STATIC_EVENT_GROUP, RUST_SIZEOF_STATIC_QUEUE, RUST_SIZEOF_STATIC_STREAM_BUFFER,
    RUST_SIZEOF_STATIC_TASK, RUST_SIZEOF_STATIC_TIMER,
};

macro_rules! opaque_static {
    ($($name:ident: $size:ident),+ $(,)?) => {
        $(
            #[repr(C, align(8))]
            pub struct $name {
                _data: [u8; $size],
            }
        )+
    };
}

opaque_static! {
    StaticQueue_t: RUST_SIZEOF_STATIC_QUEUE,
    StaticEventGroup_t: RUST_SIZEOF_STATIC_EVENT_GROUP,
    StaticTask_t: RUST_SIZEOF_STATIC_TASK,
    StaticTimer_t: RUST_SIZEOF_STATIC_TIMER,
    StaticStreamBuffer_t: RUST_SIZEOF_STATIC_STREAM_BUFFER,
}

extern "C" {
    // queue.c
    pub fn xQueueGenericCreate(
        uxQueueLength: UBaseType_t,
        uxItemSize: UBaseType_t,
        ucQueueType: u8,
    ) -> QueueHandle_t;
    pub fn xQueueGenericCreateStatic(
        uxQueueLength: UBaseType_t,
        uxItemSize: UBaseType_t,
        pucQueueStorage: *mut u8,
        pxStaticQueue: *mut StaticQueue_t,
        ucQueueType: u8,
    ) -> QueueHandle_t;
    pub fn xQueueCreateMutex(ucQueueType: u8) -> QueueHandle_t;
    pub fn xQueueCreateMutexStatic(ucQueueType: u8, pxStaticQueue: *mut StaticQueue_t)
        -> QueueHandle_t;
    pub fn xQueueCreateCountingSemaphore(
        uxMaxCount: UBaseType_t,
        uxInitialCount: UBaseType_t,
    ) -> QueueHandle_t;
    pub fn xQueueCreateCountingSemaphoreStatic(
        uxMaxCount: UBaseType_t,
        uxInitialCount: UBaseType_t,
        pxStaticQueue: *mut StaticQueue_t,
    ) -> QueueHandle_t;
    pub fn xQueueGenericSend(
        xQueue: QueueHandle_t,
        pvItemToQueue: *const c_void,
        xTicksToWait: TickType_t,
        xCopyPosition: BaseType_t,
    ) -> BaseType_t;
    pub fn xQueueGenericSendFromISR(
        xQueue: QueueHandle_t,
        pvItemToQueue: *const c_void,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
        xCopyPosition: BaseType_t,
    ) -> BaseType_t;
    pub fn xQueueGiveFromISR(
        xQueue: QueueHandle_t,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> BaseType_t;
    pub fn xQueueReceive(
        xQueue: QueueHandle_t,
        pvBuffer: *mut c_void,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn xQueueReceiveFromISR(
        xQueue: QueueHandle_t,
        pvBuffer: *mut c_void,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> BaseType_t;
    pub fn xQueuePeek(
        xQueue: QueueHandle_t,
        pvBuffer: *mut c_void,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn xQueuePeekFromISR(xQueue: QueueHandle_t, pvBuffer: *mut c_void) -> BaseType_t;
    pub fn xQueueSemaphoreTake(xQueue: QueueHandle_t, xTicksToWait: TickType_t) -> BaseType_t;
    pub fn xQueueTakeMutexRecursive(xMutex: QueueHandle_t, xTicksToWait: TickType_t)
        -> BaseType_t;
    pub fn xQueueGiveMutexRecursive(xMutex: QueueHandle_t) -> BaseType_t;
    pub fn xQueueGetMutexHolder(xSemaphore: QueueHandle_t) -> TaskHandle_t;
    pub fn uxQueueMessagesWaiting(xQueue: QueueHandle_t) -> UBaseType_t;
    pub fn uxQueueMessagesWaitingFromISR(xQueue: QueueHandle_t) -> UBaseType_t;
    pub fn uxQueueSpacesAvailable(xQueue: QueueHandle_t) -> UBaseType_t;
    pub fn xQueueIsQueueFullFromISR(xQueue: QueueHandle_t) -> BaseType_t;
    pub fn xQueueIsQueueEmptyFromISR(xQueue: QueueHandle_t) -> BaseType_t;
    pub fn xQueueGenericReset(xQueue: QueueHandle_t, xNewQueue: BaseType_t) -> BaseType_t;
    pub fn vQueueDelete(xQueue: QueueHandle_t);
    pub fn vQueueAddToRegistry(xQueue: QueueHandle_t, pcQueueName: *const c_char);
    pub fn vQueueUnregisterQueue(xQueue: QueueHandle_t);
    pub fn pcQueueGetName(xQueue: QueueHandle_t) -> *const c_char;

    // event_groups.c
    pub fn xEventGroupCreate() -> EventGroupHandle_t;
    pub fn xEventGroupCreateStatic(pxEventGroupBuffer: *mut StaticEventGroup_t)
        -> EventGroupHandle_t;
    pub fn xEventGroupSetBits(xEventGroup: EventGroupHandle_t, uxBitsToSet: EventBits_t)
        -> EventBits_t;
    pub fn xEventGroupClearBits(xEventGroup: EventGroupHandle_t, uxBitsToClear: EventBits_t)
        -> EventBits_t;
    pub fn xEventGroupWaitBits(
        xEventGroup: EventGroupHandle_t,
        uxBitsToWaitFor: EventBits_t,
        xClearOnExit: BaseType_t,
        xWaitForAllBits: BaseType_t,
        xTicksToWait: TickType_t,
    ) -> EventBits_t;
    pub fn xEventGroupSync(
        xEventGroup: EventGroupHandle_t,
        uxBitsToSet: EventBits_t,
        uxBitsToWaitFor: EventBits_t,
        xTicksToWait: TickType_t,
    ) -> EventBits_t;
    pub fn xEventGroupGetBitsFromISR(xEventGroup: EventGroupHandle_t) -> EventBits_t;
    pub fn vEventGroupSetBitsCallback(pvEventGroup: *mut c_void, ulBitsToSet: u32);
    pub fn vEventGroupClearBitsCallback(pvEventGroup: *mut c_void, ulBitsToClear: u32);
    pub fn vEventGroupDelete(xEventGroup: EventGroupHandle_t);

    // tasks.c
    pub fn xTaskCreate(
        pxTaskCode: TaskFunction_t,
        pcName: *const c_char,
        uxStackDepth: configSTACK_DEPTH_TYPE,
        pvParameters: *mut c_void,
        uxPriority: UBaseType_t,
        pxCreatedTask: *mut TaskHandle_t,
    ) -> BaseType_t;
    pub fn xTaskCreateStatic(
        pxTaskCode: TaskFunction_t,
        pcName: *const c_char,
        uxStackDepth: configSTACK_DEPTH_TYPE,
        pvParameters: *mut c_void,
        uxPriority: UBaseType_t,
        puxStackBuffer: *mut StackType_t,
        pxTaskBuffer: *mut StaticTask_t,
    ) -> TaskHandle_t;
    pub fn vTaskDelete(xTaskToDelete: TaskHandle_t);
    pub fn vTaskSuspend(xTaskToSuspend: TaskHandle_t);
    pub fn vTaskResume(xTaskToResume: TaskHandle_t);
    pub fn xTaskResumeFromISR(xTaskToResume: TaskHandle_t) -> BaseType_t;
    pub fn uxTaskPriorityGet(xTask: TaskHandle_t) -> UBaseType_t;
    pub fn uxTaskPriorityGetFromISR(xTask: TaskHandle_t) -> UBaseType_t;
    pub fn vTaskPrioritySet(xTask: TaskHandle_t, uxNewPriority: UBaseType_t);
    pub fn eTaskGetState(xTask: TaskHandle_t) -> eTaskState;
    pub fn pcTaskGetName(xTaskToQuery: TaskHandle_t) -> *mut c_char;
    pub fn uxTaskGetStackHighWaterMark(xTask: TaskHandle_t) -> UBaseType_t;
    pub fn uxTaskGetStackHighWaterMark2(xTask: TaskHandle_t) -> configSTACK_DEPTH_TYPE;
    pub fn vTaskGetInfo(
        xTask: TaskHandle_t,
        pxTaskStatus: *mut TaskStatus_t,
        xGetFreeStackSpace: BaseType_t,
        eState: eTaskState,
    );
    pub fn uxTaskGetSystemState(
        pxTaskStatusArray: *mut TaskStatus_t,
        uxArraySize: UBaseType_t,
        pulTotalRunTime: *mut configRUN_TIME_COUNTER_TYPE,
    ) -> UBaseType_t;
    pub fn xTaskGetIdleTaskHandle() -> TaskHandle_t;
    pub fn vTaskSetApplicationTaskTag(xTask: TaskHandle_t, pxHookFunction: TaskHookFunction_t);
    pub fn xTaskGetApplicationTaskTag(xTask: TaskHandle_t) -> TaskHookFunction_t;
    pub fn xTaskGetApplicationTaskTagFromISR(xTask: TaskHandle_t) -> TaskHookFunction_t;
    pub fn xTaskAbortDelay(xTask: TaskHandle_t) -> BaseType_t;
    pub fn xTaskGetCurrentTaskHandle() -> TaskHandle_t;
    pub fn xTaskGetTickCount() -> TickType_t;
    pub fn xTaskGetTickCountFromISR() -> TickType_t;
    pub fn uxTaskGetNumberOfTasks() -> UBaseType_t;
    pub fn vTaskDelay(xTicksToDelay: TickType_t);
    pub fn xTaskDelayUntil(
        pxPreviousWakeTime: *mut TickType_t,
        xTimeIncrement: TickType_t,
    ) -> BaseType_t;
    pub fn vTaskSuspendAll();
    pub fn xTaskResumeAll() -> BaseType_t;
    pub fn xTaskGetSchedulerState() -> BaseType_t;
    pub fn vTaskStartScheduler();
    pub fn xTaskGenericNotify(
        xTaskToNotify: TaskHandle_t,
        uxIndexToNotify: UBaseType_t,
        ulValue: u32,
        eAction: eNotifyAction,
        pulPreviousNotificationValue: *mut u32,
    ) -> BaseType_t;
    pub fn xTaskGenericNotifyFromISR(
        xTaskToNotify: TaskHandle_t,
        uxIndexToNotify: UBaseType_t,
        ulValue: u32,
        eAction: eNotifyAction,
        pulPreviousNotificationValue: *mut u32,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> BaseType_t;
    pub fn vTaskGenericNotifyGiveFromISR(
        xTaskToNotify: TaskHandle_t,
        uxIndexToNotify: UBaseType_t,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    );
    pub fn ulTaskGenericNotifyTake(
        uxIndexToWaitOn: UBaseType_t,
        xClearCountOnExit: BaseType_t,
        xTicksToWait: TickType_t,
    ) -> u32;
    pub fn xTaskGenericNotifyWait(
        uxIndexToWaitOn: UBaseType_t,
        ulBitsToClearOnEntry: u32,
        ulBitsToClearOnExit: u32,
        pulNotificationValue: *mut u32,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn xTaskGenericNotifyStateClear(xTask: TaskHandle_t, uxIndexToClear: UBaseType_t)
        -> BaseType_t;
    pub fn ulTaskGenericNotifyValueClear(
        xTask: TaskHandle_t,
        uxIndexToClear: UBaseType_t,
        ulBitsToClear: u32,
    ) -> u32;

    // timers.c
    pub fn xTimerCreate(
        pcTimerName: *const c_char,
        xTimerPeriodInTicks: TickType_t,
        xAutoReload: BaseType_t,
        pvTimerID: *mut c_void,
        pxCallbackFunction: TimerCallbackFunction_t,
    ) -> TimerHandle_t;
    pub fn xTimerCreateStatic(
        pcTimerName: *const c_char,
        xTimerPeriodInTicks: TickType_t,
        xAutoReload: BaseType_t,
        pvTimerID: *mut c_void,
        pxCallbackFunction: TimerCallbackFunction_t,
        pxTimerBuffer: *mut StaticTimer_t,
    ) -> TimerHandle_t;
    pub fn xTimerGenericCommandFromTask(
        xTimer: TimerHandle_t,
        xCommandID: BaseType_t,
        xOptionalValue: TickType_t,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn xTimerGenericCommandFromISR(
        xTimer: TimerHandle_t,
        xCommandID: BaseType_t,
        xOptionalValue: TickType_t,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn pvTimerGetTimerID(xTimer: TimerHandle_t) -> *mut c_void;
    pub fn xTimerGetPeriod(xTimer: TimerHandle_t) -> TickType_t;
    pub fn xTimerGetExpiryTime(xTimer: TimerHandle_t) -> TickType_t;
    pub fn xTimerIsTimerActive(xTimer: TimerHandle_t) -> BaseType_t;
    pub fn pcTimerGetName(xTimer: TimerHandle_t) -> *const c_char;
    pub fn xTimerPendFunctionCall(
        xFunctionToPend: PendedFunction_t,
        pvParameter1: *mut c_void,
        ulParameter2: u32,
        xTicksToWait: TickType_t,
    ) -> BaseType_t;
    pub fn xTimerPendFunctionCallFromISR(
        xFunctionToPend: PendedFunction_t,
        pvParameter1: *mut c_void,
        ulParameter2: u32,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> BaseType_t;
    pub fn xTimerGetTimerDaemonTaskHandle() -> TaskHandle_t;

    // stream_buffer.c
    pub fn xStreamBufferSend(
        xStreamBuffer: StreamBufferHandle_t,
        pvTxData: *const c_void,
        xDataLengthBytes: usize,
        xTicksToWait: TickType_t,
    ) -> usize;
    pub fn xStreamBufferSendFromISR(
        xStreamBuffer: StreamBufferHandle_t,
        pvTxData: *const c_void,
        xDataLengthBytes: usize,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> usize;
    pub fn xStreamBufferReceive(
        xStreamBuffer: StreamBufferHandle_t,
        pvRxData: *mut c_void,
        xBufferLengthBytes: usize,
        xTicksToWait: TickType_t,
    ) -> usize;
    pub fn xStreamBufferReceiveFromISR(
        xStreamBuffer: StreamBufferHandle_t,
        pvRxData: *mut c_void,
        xBufferLengthBytes: usize,
        pxHigherPriorityTaskWoken: *mut BaseType_t,
    ) -> usize;
    pub fn vStreamBufferDelete(xStreamBuffer: StreamBufferHandle_t);
    pub fn xStreamBufferBytesAvailable(xStreamBuffer: StreamBufferHandle_t) -> usize;
    pub fn xStreamBufferSpacesAvailable(xStreamBuffer: StreamBufferHandle_t) -> usize;
    pub fn xStreamBufferReset(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t;
    pub fn xStreamBufferSetTriggerLevel(
        xStreamBuffer: StreamBufferHandle_t,
        xTriggerLevel: usize,
    ) -> BaseType_t;
    pub fn xStreamBufferIsEmpty(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t;
    pub fn xStreamBufferIsFull(xStreamBuffer: StreamBufferHandle_t) -> BaseType_t;
    pub fn xStreamBufferNextMessageLengthBytes(xStreamBuffer: StreamBufferHandle_t) -> usize;

    // heap_*.c
    pub fn pvPortMalloc(xWantedSize: usize) -> *mut c_void;
    pub fn vPortFree(pv: *mut c_void);
    pub fn xPortGetFreeHeapSize() -> usize;

    // rust_shim.c
    pub fn rust_freertos_enter_critical();
    pub fn rust_freertos_exit_critical();
    pub fn rust_freertos_enter_critical_from_isr() -> UBaseType_t;
    pub fn rust_freertos_exit_critical_from_isr(saved: UBaseType_t);
    pub fn rust_freertos_disable_interrupts();
    pub fn rust_freertos_enable_interrupts();
    pub fn rust_freertos_yield();
    pub fn rust_freertos_yield_from_isr(woken: BaseType_t);
    pub fn rust_freertos_stream_buffer_create(
        size: usize,
        trigger: usize,
        is_message: BaseType_t,
    ) -> StreamBufferHandle_t;
    pub fn rust_freertos_stream_buffer_create_static(
        size: usize,
        trigger: usize,
        is_message: BaseType_t,
        storage: *mut u8,
        buffer: *mut StaticStreamBuffer_t,
    ) -> StreamBufferHandle_t;
    pub fn rust_freertos_console_write(data: *const c_char, len: usize) -> usize;
    pub fn rust_freertos_halt() -> !;
}
