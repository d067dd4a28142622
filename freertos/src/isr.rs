// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Interrupt context
//!
//! The `FromISR` kernel calls never block.  Instead, they report through an out parameter whether
//! they readied a task of higher priority than the one that was interrupted.  If so, the handler
//! should request a context switch as it exits, so that task runs immediately rather than at the
//! next tick.
//!
//! [`TaskWoken`] collects that flag across any number of `_isr` calls, and makes the request when
//! it is dropped:
//!
//! ```ignore
//! fn uart_rx_handler() {
//!     let mut woken = TaskWoken::new();
//!     let _ = SIGNAL.give_isr(&mut woken);
//!     let _ = EVENTS.set_isr(RX_READY, &mut woken);
//!     // The context switch, if any, is requested here.
//! }
//! ```
//!
//! Call [`TaskWoken::forget`] instead to discard the request.

use core::marker::PhantomData;

use crate::raw::{pdFALSE, pdTRUE, portYIELD_FROM_ISR, BaseType_t};

/// Whether an interrupt handler should request a context switch on exit.
pub struct TaskWoken {
    woken: BaseType_t,
    // Belongs to one invocation of one handler.
    _nosend: PhantomData<*const ()>,
}

impl TaskWoken {
    /// Start collecting, with no switch needed.
    pub const fn new() -> TaskWoken {
        TaskWoken {
            woken: pdFALSE,
            _nosend: PhantomData,
        }
    }

    /// Has any call so far woken a higher priority task?
    pub fn is_woken(&self) -> bool {
        self.woken != pdFALSE
    }

    /// Drop without requesting a context switch.  Returns whether one was needed.
    pub fn forget(self) -> bool {
        let woken = self.is_woken();
        core::mem::forget(self);
        woken
    }

    /// Record that a higher priority task was woken, for calls that report it as a return value.
    pub(crate) fn wake(&mut self) {
        self.woken = pdTRUE;
    }

    /// The out parameter for a `FromISR` call.  The kernel only ever sets it.
    pub(crate) fn as_ptr(&mut self) -> *mut BaseType_t {
        &mut self.woken
    }
}

impl Default for TaskWoken {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskWoken {
    fn drop(&mut self) {
        if self.is_woken() {
            unsafe { portYIELD_FROM_ISR(self.woken) };
        }
    }
}
