// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Time types.
//!
//! FreeRTOS measures time in ticks of `configTICK_RATE_HZ`, in a `TickType_t` that wraps around.
//! The [`fugit`] crate gives compile-time-checked conversion between ticks and human units, at the
//! kernel's tick rate, with no runtime cost.
//!
//! Blocking calls take anything that converts into a [`Timeout`]: a [`Duration`], [`Forever`] or
//! [`NoWait`].  Since `portMAX_DELAY` means "forever" to the kernel, a duration is clamped to one
//! tick below it.

use crate::raw::{
    pdFALSE, portMAX_DELAY, vTaskDelay, xTaskDelayUntil, xTaskGetTickCount, xTaskGetTickCountFromISR,
    TickType_t,
};

/// The kernel tick rate, in Hz.
pub const TICK_HZ: u32 = crate::config::configTICK_RATE_HZ;

/// The underlying representation of a tick count.
pub type Tick = TickType_t;

/// A length of time, in kernel ticks.
pub type Duration = fugit::Duration<Tick, 1, TICK_HZ>;

/// A point in time, as a kernel tick count.  Comparisons account for wraparound.
pub type Instant = fugit::Instant<Tick, 1, TICK_HZ>;

/// How long a blocking call may wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout(pub TickType_t);

impl Timeout {
    /// Does this timeout refuse to block at all?
    pub fn is_no_wait(&self) -> bool {
        self.0 == 0
    }
}

/// Wait as long as it takes.
#[derive(Clone, Copy, Debug)]
pub struct Forever;

/// Don't wait.
#[derive(Clone, Copy, Debug)]
pub struct NoWait;

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Timeout {
        Timeout(value.ticks().min(portMAX_DELAY - 1))
    }
}

impl From<Forever> for Timeout {
    fn from(_value: Forever) -> Timeout {
        Timeout(portMAX_DELAY)
    }
}

impl From<NoWait> for Timeout {
    fn from(_value: NoWait) -> Timeout {
        Timeout(0)
    }
}

/// The ticks to pass to the kernel.
#[inline(always)]
pub(crate) fn ticks<T: Into<Timeout>>(timeout: T) -> TickType_t {
    timeout.into().0
}

/// The current tick count.
pub fn tick_count() -> Instant {
    Instant::from_ticks(unsafe { xTaskGetTickCount() })
}

/// The current tick count, from an interrupt handler.
pub fn tick_count_isr() -> Instant {
    Instant::from_ticks(unsafe { xTaskGetTickCountFromISR() })
}

/// How long the scheduler has been running.  It wraps with the tick count.
pub fn uptime() -> Duration {
    tick_count().duration_since_epoch()
}

/// [`uptime`], from an interrupt handler.
pub fn uptime_isr() -> Duration {
    tick_count_isr().duration_since_epoch()
}

/// Put the current task to sleep for at least `duration`.
///
/// A zero duration yields to other ready tasks of the same priority.
#[cfg(INCLUDE_vTaskDelay)]
pub fn sleep(duration: Duration) {
    unsafe { vTaskDelay(duration.ticks()) }
}

/// Sleep until `period` after `wake`, then advance `wake` by `period`.
///
/// This gives a fixed rate, regardless of how long the caller spent between calls.  Returns false
/// if the next wake time had already passed, in which case the task did not sleep.
#[cfg(INCLUDE_xTaskDelayUntil)]
pub fn delay_until(wake: &mut Instant, period: Duration) -> bool {
    let mut previous = wake.ticks();
    let slept = unsafe { xTaskDelayUntil(&mut previous, period.ticks()) };
    *wake = Instant::from_ticks(previous);
    slept != pdFALSE
}
