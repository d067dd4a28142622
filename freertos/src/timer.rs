// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Software timers
//!
//! Timers run their callback on the kernel's timer daemon task, either once or on every period.
//! All timer commands (start, stop, and so on) are messages to the daemon, sent through its command
//! queue.  The `timeout` of a command from a task is how long to wait for room in that queue.  The
//! `_isr` forms never wait, and fail with [`Error::Full`] when the queue has no room.
//!
//! The callback is owned by the [`Timer`].  Dropping the timer sends the daemon a delete, then
//! waits until the daemon has gotten past it, so that the callback is never freed while the daemon
//! might still call it.  A timer dropped from its own callback (or anywhere else on the daemon)
//! can't do that wait.  In that case the callback and its storage are leaked, with a warning.
//!
//! [`pend_function_call`] runs a plain function on the daemon: a way to push work out of an
//! interrupt handler.

use core::cell::UnsafeCell;
use core::ffi::{c_void, CStr};
use core::fmt;
use core::ptr::addr_of_mut;

use log::{trace, warn};
use portable_atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::isr::TaskWoken;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    pdFALSE, pdTRUE, portMAX_DELAY, pvTimerGetTimerID, xTimerChangePeriod,
    xTimerChangePeriodFromISR, xTimerDelete, xTimerGetExpiryTime, xTimerGetPeriod,
    xTimerIsTimerActive, xTimerPendFunctionCall, xTimerPendFunctionCallFromISR, xTimerReset,
    xTimerResetFromISR, xTimerStart, xTimerStartFromISR, xTimerStop, xTimerStopFromISR,
    BaseType_t, StaticTimer_t, TickType_t, TimerHandle_t,
};
use crate::task::SchedulerState;
use crate::time::{Duration, Instant, Timeout};

/// The callback of a timer, for as long as the daemon may call it.
#[doc(hidden)]
pub struct TimerContext<C> {
    callback: UnsafeCell<C>,
}

/// Called by the daemon when a timer running `C` expires.
unsafe extern "C" fn timer_entry<C: FnMut() + Send + 'static>(timer: TimerHandle_t) {
    let context = pvTimerGetTimerID(timer) as *const TimerContext<C>;
    // Only the daemon calls the callback, and it calls one at a time.
    (*(*context).callback.get())();
}

/// Static storage for a timer: the control block and the callback.
///
/// As with tasks, the callback type of a `static` must be nameable, such as `fn()`.
#[repr(C)]
pub struct TimerStorage<C> {
    control: StaticTimer_t,
    context: TimerContext<C>,
}

/// The settings of a new timer.
#[doc(hidden)]
pub struct TimerConfig {
    name: &'static CStr,
    period: TickType_t,
    auto_reload: BaseType_t,
}

/// An allocation strategy that can create a timer calling `C`.
pub trait TimerAllocator<C: FnMut() + Send + 'static>: Allocation {
    /// Create the timer, returning it and the context holding the callback.
    ///
    /// # Safety
    ///
    /// On success, the context must be released with [`free_context`](Self::free_context) after
    /// the daemon has deleted the timer.
    #[doc(hidden)]
    unsafe fn create_timer(
        &self,
        config: &TimerConfig,
        callback: C,
    ) -> Result<(TimerHandle_t, *mut TimerContext<C>)>;

    /// Drop the callback, and free its memory if it was allocated.
    ///
    /// # Safety
    ///
    /// The daemon must be done with the timer.
    #[doc(hidden)]
    unsafe fn free_context(&self, context: *mut TimerContext<C>);
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<C: FnMut() + Send + 'static> TimerAllocator<C> for Dynamic {
    unsafe fn create_timer(
        &self,
        config: &TimerConfig,
        callback: C,
    ) -> Result<(TimerHandle_t, *mut TimerContext<C>)> {
        use crate::heap::KernelBox;

        let context = KernelBox::new(TimerContext {
            callback: UnsafeCell::new(callback),
        })?
        .into_raw();
        let handle = crate::raw::xTimerCreate(
            config.name.as_ptr(),
            config.period,
            config.auto_reload,
            context as *mut c_void,
            Some(timer_entry::<C>),
        );
        if handle.is_null() {
            drop(KernelBox::from_raw(context));
            return Err(Error::OutOfMemory);
        }
        Ok((handle, context))
    }

    unsafe fn free_context(&self, context: *mut TimerContext<C>) {
        drop(crate::heap::KernelBox::from_raw(context));
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<C: FnMut() + Send + 'static> TimerAllocator<C> for &'static StaticStorage<TimerStorage<C>> {
    unsafe fn create_timer(
        &self,
        config: &TimerConfig,
        callback: C,
    ) -> Result<(TimerHandle_t, *mut TimerContext<C>)> {
        let storage = self.claim()?;
        let context = addr_of_mut!((*storage).context);
        context.write(TimerContext {
            callback: UnsafeCell::new(callback),
        });
        let handle = crate::raw::xTimerCreateStatic(
            config.name.as_ptr(),
            config.period,
            config.auto_reload,
            context as *mut c_void,
            Some(timer_entry::<C>),
            addr_of_mut!((*storage).control),
        );
        if handle.is_null() {
            core::ptr::drop_in_place(context);
            self.unclaim();
            return Err(Error::InvalidArgument);
        }
        Ok((handle, context))
    }

    unsafe fn free_context(&self, context: *mut TimerContext<C>) {
        core::ptr::drop_in_place(context);
    }
}

/// Map the result of a timer command sent from a task.
fn command(code: BaseType_t, timeout: Timeout) -> Result<()> {
    if code != pdFALSE {
        Ok(())
    } else if timeout.is_no_wait() {
        Err(Error::Full)
    } else {
        Err(Error::Timeout)
    }
}

fn isr_command(code: BaseType_t) -> Result<()> {
    crate::error::to_result(code, Error::Full)
}

fn period_ticks(period: Duration) -> Result<TickType_t> {
    match period.ticks() {
        0 => Err(Error::InvalidArgument),
        ticks => Ok(ticks),
    }
}

/// A software timer, and the callback it runs.
///
/// The timer is created dormant.  Nothing happens until it is started.
pub struct Timer<C: FnMut() + Send + 'static, A: TimerAllocator<C> = Dynamic> {
    handle: TimerHandle_t,
    context: *mut TimerContext<C>,
    alloc: A,
}

// The callback is only touched by the daemon, and commands are queued to it.
unsafe impl<C: FnMut() + Send + 'static, A: TimerAllocator<C> + Send> Send for Timer<C, A> {}
unsafe impl<C: FnMut() + Send + 'static, A: TimerAllocator<C> + Sync> Sync for Timer<C, A> {}

impl<C: FnMut() + Send + 'static, A: TimerAllocator<C>> Timer<C, A> {
    /// Create a timer in the given allocation.
    ///
    /// The kernel keeps the name pointer, so it must be `'static`.  With `auto_reload`, the timer
    /// restarts itself every time it expires.  A zero period is rejected.
    pub fn new_with(
        alloc: A,
        name: &'static CStr,
        period: Duration,
        auto_reload: bool,
        callback: C,
    ) -> Result<Timer<C, A>> {
        let config = TimerConfig {
            name,
            period: period_ticks(period)?,
            auto_reload: if auto_reload { pdTRUE } else { pdFALSE },
        };
        let (handle, context) = unsafe { alloc.create_timer(&config, callback)? };
        trace!("timer {:?} created", handle);
        Ok(Timer {
            handle,
            context,
            alloc,
        })
    }

    /// Start the timer.  It expires one period from now.  Starting an active timer restarts it.
    pub fn start<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let timeout = timeout.into();
        command(unsafe { xTimerStart(self.handle, timeout.0) }, timeout)
    }

    /// Stop the timer.
    pub fn stop<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let timeout = timeout.into();
        command(unsafe { xTimerStop(self.handle, timeout.0) }, timeout)
    }

    /// Restart the timer, so it expires one period from now.
    pub fn reset<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let timeout = timeout.into();
        command(unsafe { xTimerReset(self.handle, timeout.0) }, timeout)
    }

    /// Change the period.  This also starts the timer, counting the new period from now.
    pub fn change_period<T: Into<Timeout>>(&self, period: Duration, timeout: T) -> Result<()> {
        let period = period_ticks(period)?;
        let timeout = timeout.into();
        command(
            unsafe { xTimerChangePeriod(self.handle, period, timeout.0) },
            timeout,
        )
    }

    /// Start the timer from an interrupt handler.
    pub fn start_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        isr_command(unsafe { xTimerStartFromISR(self.handle, woken.as_ptr()) })
    }

    /// Stop the timer from an interrupt handler.
    pub fn stop_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        isr_command(unsafe { xTimerStopFromISR(self.handle, woken.as_ptr()) })
    }

    /// Restart the timer from an interrupt handler.
    pub fn reset_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        isr_command(unsafe { xTimerResetFromISR(self.handle, woken.as_ptr()) })
    }

    /// Change the period from an interrupt handler.
    pub fn change_period_isr(&self, period: Duration, woken: &mut TaskWoken) -> Result<()> {
        let period = period_ticks(period)?;
        isr_command(unsafe { xTimerChangePeriodFromISR(self.handle, period, woken.as_ptr()) })
    }

    /// Is the timer running?  A one-shot timer stops being active once it has fired.
    pub fn is_active(&self) -> bool {
        unsafe { xTimerIsTimerActive(self.handle) != pdFALSE }
    }

    /// The timer's period.
    pub fn period(&self) -> Duration {
        Duration::from_ticks(unsafe { xTimerGetPeriod(self.handle) })
    }

    /// When an active timer will next expire.
    pub fn expiry_time(&self) -> Instant {
        Instant::from_ticks(unsafe { xTimerGetExpiryTime(self.handle) })
    }

    /// The name given at creation.
    pub fn name(&self) -> &CStr {
        unsafe { CStr::from_ptr(crate::raw::pcTimerGetName(self.handle)) }
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<C: FnMut() + Send + 'static> Timer<C, Dynamic> {
    /// Create a timer from the kernel heap.
    pub fn new(
        name: &'static CStr,
        period: Duration,
        auto_reload: bool,
        callback: C,
    ) -> Result<Timer<C, Dynamic>> {
        Self::new_with(Dynamic, name, period, auto_reload, callback)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<C: FnMut() + Send + 'static> Timer<C, &'static StaticStorage<TimerStorage<C>>> {
    /// Create a timer in static storage.
    pub fn new_in(
        storage: &'static StaticStorage<TimerStorage<C>>,
        name: &'static CStr,
        period: Duration,
        auto_reload: bool,
        callback: C,
    ) -> Result<Self> {
        Self::new_with(storage, name, period, auto_reload, callback)
    }
}

impl<C: FnMut() + Send + 'static, A: TimerAllocator<C>> Drop for Timer<C, A> {
    fn drop(&mut self) {
        trace!("timer {:?} deleted", self.handle);
        // Nothing may block before the scheduler runs.
        let wait = if scheduler_running() { portMAX_DELAY } else { 0 };
        if unsafe { xTimerDelete(self.handle, wait) } == pdFALSE {
            warn!("timer {:?}: delete not queued, leaking callback", self.handle);
            return;
        }
        if !flush_daemon() {
            warn!("timer {:?}: daemon not flushed, leaking callback", self.handle);
            return;
        }
        unsafe {
            self.alloc.free_context(self.context);
            self.alloc.release();
        }
    }
}

impl<C: FnMut() + Send + 'static, A: TimerAllocator<C>> fmt::Debug for Timer<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer {:?} {:?}", self.handle, self.name())
    }
}

/// A timer whose callback is boxed, so timers with different closures have one type.
#[cfg(all(feature = "alloc", configSUPPORT_DYNAMIC_ALLOCATION))]
pub type BoxedTimer = Timer<alloc::boxed::Box<dyn FnMut() + Send>, Dynamic>;

/// Is the caller the timer daemon?
#[cfg(INCLUDE_xTimerGetTimerDaemonTaskHandle)]
fn on_daemon() -> bool {
    unsafe {
        crate::raw::xTimerGetTimerDaemonTaskHandle() == crate::raw::xTaskGetCurrentTaskHandle()
    }
}

#[cfg(not(INCLUDE_xTimerGetTimerDaemonTaskHandle))]
fn on_daemon() -> bool {
    false
}

unsafe extern "C" fn set_flag(flag: *mut c_void, _unused: u32) {
    (*(flag as *const AtomicBool)).store(true, Ordering::Release);
}

fn scheduler_running() -> bool {
    crate::task::scheduler_state() == SchedulerState::Running
}

/// Wait until the daemon has processed every command queued so far.
///
/// Returns false, without waiting, when called on the daemon itself, when the scheduler is not
/// running, or if the marker could not be queued.  The daemon can't run in the first two cases.
pub(crate) fn flush_daemon() -> bool {
    if on_daemon() || !scheduler_running() {
        return false;
    }
    let done = AtomicBool::new(false);
    let queued = unsafe {
        xTimerPendFunctionCall(
            Some(set_flag),
            &done as *const AtomicBool as *mut c_void,
            0,
            portMAX_DELAY,
        )
    };
    if queued == pdFALSE {
        return false;
    }
    while !done.load(Ordering::Acquire) {
        unsafe { crate::raw::vTaskDelay(1) };
    }
    true
}

unsafe extern "C" fn call_pended(function: *mut c_void, arg: u32) {
    let function: fn(u32) = core::mem::transmute(function);
    function(arg);
}

/// Run `function(arg)` on the timer daemon.
///
/// `timeout` is how long to wait for room in the daemon's command queue.
pub fn pend_function_call<T: Into<Timeout>>(function: fn(u32), arg: u32, timeout: T) -> Result<()> {
    let timeout = timeout.into();
    let queued = unsafe {
        xTimerPendFunctionCall(Some(call_pended), function as *mut c_void, arg, timeout.0)
    };
    command(queued, timeout)
}

/// Run `function(arg)` on the timer daemon, from an interrupt handler.
///
/// `woken` is set if the daemon outranks the interrupted task.
pub fn pend_function_call_isr(function: fn(u32), arg: u32, woken: &mut TaskWoken) -> Result<()> {
    let queued = unsafe {
        xTimerPendFunctionCallFromISR(
            Some(call_pended),
            function as *mut c_void,
            arg,
            woken.as_ptr(),
        )
    };
    isr_command(queued)
}
