// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Critical sections
//!
//! Scoped guards over the kernel's ways of keeping other code out:
//!
//! - [`CriticalSection`]: `taskENTER_CRITICAL`, from a task.  These nest, and the kernel keeps the
//!   count.
//! - [`IsrCriticalSection`]: `taskENTER_CRITICAL_FROM_ISR`, from an interrupt handler.  The
//!   previous interrupt mask is saved in the guard itself, and restored exactly.
//! - [`SchedulerLock`]: `vTaskSuspendAll`.  Interrupts still run, but no other task does.
//! - [`InterruptMask`]: `taskDISABLE_INTERRUPTS`, with no nesting count at all.
//!
//! The guards are neither `Send` nor `Clone`: each releases exactly once, on the task or interrupt
//! that acquired it.  A guard must not be held across a call that blocks.

use core::marker::PhantomData;

use crate::raw::{
    taskDISABLE_INTERRUPTS, taskENABLE_INTERRUPTS, taskENTER_CRITICAL, taskENTER_CRITICAL_FROM_ISR,
    taskEXIT_CRITICAL, taskEXIT_CRITICAL_FROM_ISR, vTaskSuspendAll, xTaskResumeAll, UBaseType_t,
};

/// A critical section entered from task context.
pub struct CriticalSection {
    _nosend: PhantomData<*const ()>,
}

impl CriticalSection {
    /// Enter the critical section, until the guard is dropped.
    pub fn enter() -> CriticalSection {
        unsafe { taskENTER_CRITICAL() };
        CriticalSection {
            _nosend: PhantomData,
        }
    }

    /// Run `f` inside a critical section.
    pub fn with<R>(f: impl FnOnce() -> R) -> R {
        let _guard = CriticalSection::enter();
        f()
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unsafe { taskEXIT_CRITICAL() };
    }
}

/// A critical section entered from an interrupt handler.
pub struct IsrCriticalSection {
    saved: UBaseType_t,
    _nosend: PhantomData<*const ()>,
}

impl IsrCriticalSection {
    /// Mask interrupts, remembering the previous mask.
    pub fn enter() -> IsrCriticalSection {
        let saved = unsafe { taskENTER_CRITICAL_FROM_ISR() };
        IsrCriticalSection {
            saved,
            _nosend: PhantomData,
        }
    }

    /// Run `f` inside an ISR critical section.
    pub fn with<R>(f: impl FnOnce() -> R) -> R {
        let _guard = IsrCriticalSection::enter();
        f()
    }
}

impl Drop for IsrCriticalSection {
    fn drop(&mut self) {
        unsafe { taskEXIT_CRITICAL_FROM_ISR(self.saved) };
    }
}

/// The scheduler, suspended.
///
/// While this is held, the current task will not be switched out.  Kernel calls that could block
/// must not be made.
pub struct SchedulerLock {
    _nosend: PhantomData<*const ()>,
}

impl SchedulerLock {
    /// Suspend the scheduler until the guard is dropped.  These nest.
    pub fn lock() -> SchedulerLock {
        unsafe { vTaskSuspendAll() };
        SchedulerLock {
            _nosend: PhantomData,
        }
    }
}

impl Drop for SchedulerLock {
    fn drop(&mut self) {
        // Whether resuming caused a switch is of no interest here.
        let _ = unsafe { xTaskResumeAll() };
    }
}

/// Interrupts, disabled.
///
/// Unlike [`CriticalSection`] this does not nest: dropping any guard enables interrupts again.
/// It is meant for short sequences in code that knows interrupts were enabled on entry.
pub struct InterruptMask {
    _nosend: PhantomData<*const ()>,
}

impl InterruptMask {
    /// Disable interrupts until the guard is dropped.
    pub fn disable() -> InterruptMask {
        unsafe { taskDISABLE_INTERRUPTS() };
        InterruptMask {
            _nosend: PhantomData,
        }
    }
}

impl Drop for InterruptMask {
    fn drop(&mut self) {
        unsafe { taskENABLE_INTERRUPTS() };
    }
}

#[cfg(feature = "critical-section")]
mod cs_impl {
    use critical_section::RawRestoreState;

    use crate::raw::{taskENTER_CRITICAL_FROM_ISR, taskEXIT_CRITICAL_FROM_ISR, UBaseType_t};

    // The ISR form works from both tasks and interrupts, and restores the exact mask it found.
    struct FreeRtosCriticalSection;
    critical_section::set_impl!(FreeRtosCriticalSection);

    unsafe impl critical_section::Impl for FreeRtosCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            taskENTER_CRITICAL_FROM_ISR() as RawRestoreState
        }

        unsafe fn release(token: RawRestoreState) {
            taskEXIT_CRITICAL_FROM_ISR(token as UBaseType_t);
        }
    }
}
