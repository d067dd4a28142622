// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! FreeRTOS application support for Rust
//!
//! This crate provides safe wrappers around the FreeRTOS kernel objects: semaphores, mutexes,
//! event groups, queues, tasks, software timers and stream buffers.  Each wrapper owns exactly one
//! kernel object, creating it on construction and deleting it on drop.
//!
//! Where the storage for an object comes from is chosen with a type parameter.  [`Dynamic`] asks
//! the kernel to allocate from its heap.  A `&'static` [`StaticStorage`] hands the kernel memory
//! that was reserved at build time, and no heap is used at all.
//!
//! Operations that are safe to call from an interrupt handler have an `_isr` suffix.  These never
//! block, and take a [`TaskWoken`] that collects whether a context switch should be requested on
//! the way out of the handler.
//!
//! [`Dynamic`]: object::Dynamic
//! [`StaticStorage`]: object::StaticStorage

#![no_std]
#![allow(unexpected_cfgs)]
#![deny(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod console;
pub mod critical;
pub mod error;
pub mod event_group;
pub mod heap;
pub mod isr;
pub mod logging;
pub mod object;
pub mod queue;
pub mod semaphore;
pub mod stream;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(all(configUSE_TIMERS, INCLUDE_xTimerPendFunctionCall))]
pub mod timer;

pub use error::{Error, Result};
pub use isr::TaskWoken;
pub use logging::set_logger;

// Bring in the generated config module
pub mod config {
    //! FreeRTOS config values.
    //!
    //! The integer defines from `FreeRTOSConfig.h`, generated during the build.
    //!
    //! **Note**: Unless you are viewing docs generated for a specific build, the values below are
    //! unlikely to directly correspond to those in a given build.

    pub use freertos_sys::config::*;
}

// Tasks hold a context that must be freed after the kernel task is gone, which needs delete.
#[cfg(not(INCLUDE_vTaskDelete))]
compile_error!("INCLUDE_vTaskDelete must be set to build the Rust wrappers");

#[cfg(not(any(configSUPPORT_STATIC_ALLOCATION, configSUPPORT_DYNAMIC_ALLOCATION)))]
compile_error!("At least one of static or dynamic allocation must be supported by the kernel");

#[cfg(all(configUSE_MUTEXES, not(INCLUDE_xSemaphoreGetMutexHolder)))]
compile_error!("INCLUDE_xSemaphoreGetMutexHolder must be set for Mutex to check its owner on give");

/// Report a panic over the console, and halt.
///
/// On the simulator, std provides the handler.
#[cfg(all(feature = "panic-handler", not(feature = "sim")))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    consoleln!("panic: {}", info);
    unsafe { freertos_sys::rust_freertos_halt() }
}

/// Re-export of freertos-sys as `freertos::raw`.
pub mod raw {
    pub use freertos_sys::*;
}

// If allocation has been requested, provide the allocator.  On the simulator, the kernel heap is
// built on the host allocator, so the allocator is there for tests but not installed.
#[cfg(any(feature = "global-allocator", feature = "sim"))]
pub mod alloc_impl;
