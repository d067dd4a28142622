// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! FreeRTOS bindings for Rust
//!
//! Raw declarations of the FreeRTOS kernel API.  Everything here is unsafe, and uses the kernel's
//! own names.  Macros from the C headers that Rust code needs are provided as inline functions in
//! terms of the real kernel entry points, or through the small C shim built alongside this crate.
//!
//! With the `sim` feature, the C kernel is replaced with a simulation built on host threads.  It
//! implements the same entry points, so code above this crate is unchanged.

#![cfg_attr(not(feature = "sim"), no_std)]
// Allow C naming convention.
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use core::ffi::{c_char, c_long, c_uint, c_ulong, c_void};

pub mod config {
    //! Integer values from `FreeRTOSConfig.h`, generated at build time.
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

mod sizes {
    include!(concat!(env!("OUT_DIR"), "/sizes.rs"));
}
pub use sizes::*;

mod macros;
pub use macros::*;

#[cfg(not(feature = "sim"))]
mod target;
#[cfg(not(feature = "sim"))]
pub use target::*;

#[cfg(feature = "sim")]
pub mod sim;
#[cfg(feature = "sim")]
pub use sim::api::*;

pub type BaseType_t = c_long;
pub type UBaseType_t = c_ulong;
pub type TickType_t = u32;
pub type EventBits_t = TickType_t;
pub type StackType_t = usize;
pub type configSTACK_DEPTH_TYPE = u32;
pub type configRUN_TIME_COUNTER_TYPE = u32;

pub const pdFALSE: BaseType_t = 0;
pub const pdTRUE: BaseType_t = 1;
pub const pdPASS: BaseType_t = pdTRUE;
pub const pdFAIL: BaseType_t = pdFALSE;
pub const errQUEUE_EMPTY: BaseType_t = 0;
pub const errQUEUE_FULL: BaseType_t = 0;
pub const errCOULD_NOT_ALLOCATE_REQUIRED_MEMORY: BaseType_t = -1;

pub const portMAX_DELAY: TickType_t = TickType_t::MAX;
pub const portBYTE_ALIGNMENT: usize = 8;

pub const queueSEND_TO_BACK: BaseType_t = 0;
pub const queueSEND_TO_FRONT: BaseType_t = 1;
pub const queueOVERWRITE: BaseType_t = 2;

pub const queueQUEUE_TYPE_BASE: u8 = 0;
pub const queueQUEUE_TYPE_MUTEX: u8 = 1;
pub const queueQUEUE_TYPE_COUNTING_SEMAPHORE: u8 = 2;
pub const queueQUEUE_TYPE_BINARY_SEMAPHORE: u8 = 3;
pub const queueQUEUE_TYPE_RECURSIVE_MUTEX: u8 = 4;

pub const semGIVE_BLOCK_TIME: TickType_t = 0;
pub const semSEMAPHORE_QUEUE_ITEM_LENGTH: UBaseType_t = 0;

pub const tskIDLE_PRIORITY: UBaseType_t = 0;
pub const tskDEFAULT_INDEX_TO_NOTIFY: UBaseType_t = 0;

pub const taskSCHEDULER_SUSPENDED: BaseType_t = 0;
pub const taskSCHEDULER_NOT_STARTED: BaseType_t = 1;
pub const taskSCHEDULER_RUNNING: BaseType_t = 2;

/// The top byte of an event group is used by the kernel (32-bit ticks).
pub const eventEVENT_BITS_CONTROL_BYTES: EventBits_t = 0xff00_0000;

pub const tmrCOMMAND_START: BaseType_t = 1;
pub const tmrCOMMAND_RESET: BaseType_t = 2;
pub const tmrCOMMAND_STOP: BaseType_t = 3;
pub const tmrCOMMAND_CHANGE_PERIOD: BaseType_t = 4;
pub const tmrCOMMAND_DELETE: BaseType_t = 5;
pub const tmrFIRST_FROM_ISR_COMMAND: BaseType_t = 6;
pub const tmrCOMMAND_START_FROM_ISR: BaseType_t = 6;
pub const tmrCOMMAND_RESET_FROM_ISR: BaseType_t = 7;
pub const tmrCOMMAND_STOP_FROM_ISR: BaseType_t = 8;
pub const tmrCOMMAND_CHANGE_PERIOD_FROM_ISR: BaseType_t = 9;

pub type eNotifyAction = c_uint;
pub const eNoAction: eNotifyAction = 0;
pub const eSetBits: eNotifyAction = 1;
pub const eIncrement: eNotifyAction = 2;
pub const eSetValueWithOverwrite: eNotifyAction = 3;
pub const eSetValueWithoutOverwrite: eNotifyAction = 4;

pub type eTaskState = c_uint;
pub const eRunning: eTaskState = 0;
pub const eReady: eTaskState = 1;
pub const eBlocked: eTaskState = 2;
pub const eSuspended: eTaskState = 3;
pub const eDeleted: eTaskState = 4;
pub const eInvalid: eTaskState = 5;

// Handles are pointers to structures private to the kernel.
#[repr(C)]
pub struct QueueDefinition {
    _private: [u8; 0],
}
#[repr(C)]
pub struct EventGroupDef_t {
    _private: [u8; 0],
}
#[repr(C)]
pub struct tskTaskControlBlock {
    _private: [u8; 0],
}
#[repr(C)]
pub struct tmrTimerControl {
    _private: [u8; 0],
}
#[repr(C)]
pub struct StreamBufferDef_t {
    _private: [u8; 0],
}

pub type QueueHandle_t = *mut QueueDefinition;
pub type SemaphoreHandle_t = QueueHandle_t;
pub type EventGroupHandle_t = *mut EventGroupDef_t;
pub type TaskHandle_t = *mut tskTaskControlBlock;
pub type TimerHandle_t = *mut tmrTimerControl;
pub type StreamBufferHandle_t = *mut StreamBufferDef_t;
pub type MessageBufferHandle_t = StreamBufferHandle_t;

pub type StaticSemaphore_t = StaticQueue_t;
pub type StaticMessageBuffer_t = StaticStreamBuffer_t;

pub type TaskFunction_t = Option<unsafe extern "C" fn(arg: *mut c_void)>;
pub type TimerCallbackFunction_t = Option<unsafe extern "C" fn(timer: TimerHandle_t)>;
pub type PendedFunction_t = Option<unsafe extern "C" fn(arg1: *mut c_void, arg2: u32)>;
pub type TaskHookFunction_t = Option<unsafe extern "C" fn(arg: *mut c_void) -> BaseType_t>;

/// What `vTaskGetInfo` and `uxTaskGetSystemState` report for a task.
///
/// This is the single core layout, for a stack that grows down without
/// `configRECORD_STACK_HIGH_ADDRESS`.  The shim checks the size against the kernel's.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TaskStatus_t {
    pub xHandle: TaskHandle_t,
    pub pcTaskName: *const c_char,
    pub xTaskNumber: UBaseType_t,
    pub eCurrentState: eTaskState,
    pub uxCurrentPriority: UBaseType_t,
    pub uxBasePriority: UBaseType_t,
    pub ulRunTimeCounter: configRUN_TIME_COUNTER_TYPE,
    pub pxStackBase: *mut StackType_t,
    pub usStackHighWaterMark: configSTACK_DEPTH_TYPE,
}
