// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Software timers, and the daemon task that runs them.
//!
//! The daemon is a host thread adopted as the "Tmr Svc" task, started the first time anything
//! needs it.  Commands reach it through a queue of `configTIMER_QUEUE_LENGTH` entries.  A command
//! sent from a task returns once the daemon has processed it, so the timer's state is settled when
//! the call returns.

use std::collections::VecDeque;
use std::ffi::{c_char, c_void};
use std::mem::MaybeUninit;
use std::ptr::null_mut;
use std::sync::{mpsc, Condvar, Mutex};
use std::thread;

use once_cell::sync::{Lazy, OnceCell};

use super::heap::{kernel_box, release, Placement};
use super::task::{adopt_as, current, current_priority};
use super::{count, lock, now_ticks, tick_duration, wait_on, SendPtr, SLICE};
use crate::config::{configTIMER_QUEUE_LENGTH, configTIMER_TASK_PRIORITY};
use crate::{
    pdFAIL, pdFALSE, pdPASS, pdTRUE, tmrCOMMAND_CHANGE_PERIOD, tmrCOMMAND_CHANGE_PERIOD_FROM_ISR,
    tmrCOMMAND_DELETE, tmrCOMMAND_RESET, tmrCOMMAND_RESET_FROM_ISR, tmrCOMMAND_START,
    tmrCOMMAND_START_FROM_ISR, tmrCOMMAND_STOP, tmrCOMMAND_STOP_FROM_ISR,
    tmrFIRST_FROM_ISR_COMMAND, BaseType_t, PendedFunction_t, TaskHandle_t, TickType_t,
    TimerCallbackFunction_t, TimerHandle_t, UBaseType_t,
};

struct TimerState {
    period: TickType_t,
    active: bool,
    expiry: TickType_t,
}

/// What a `TimerHandle_t` points at.
pub struct Timer {
    name: *const c_char,
    auto_reload: bool,
    id: *mut c_void,
    callback: TimerCallbackFunction_t,
    state: Mutex<TimerState>,
    placement: Placement,
}

/// Storage for a statically allocated timer.
#[repr(transparent)]
pub struct StaticTimer_t {
    _slot: MaybeUninit<Timer>,
}

enum Command {
    Timer {
        timer: SendPtr<Timer>,
        id: BaseType_t,
        value: TickType_t,
    },
    Pend {
        function: unsafe extern "C" fn(*mut c_void, u32),
        arg1: SendPtr<c_void>,
        arg2: u32,
    },
}

#[derive(Default)]
struct Daemon {
    commands: VecDeque<Command>,
    active: Vec<SendPtr<Timer>>,
    submitted: u64,
    processed: u64,
}

static DAEMON: Lazy<(Mutex<Daemon>, Condvar)> = Lazy::new(Default::default);
static DAEMON_TASK: OnceCell<usize> = OnceCell::new();

const QUEUE_LENGTH: usize = configTIMER_QUEUE_LENGTH as usize;

/// Start the daemon if it isn't running, returning its task handle.
pub(super) fn ensure_daemon() -> TaskHandle_t {
    *DAEMON_TASK.get_or_init(|| {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("Tmr Svc".into())
            .spawn(move || {
                let handle = adopt_as("Tmr Svc", configTIMER_TASK_PRIORITY as UBaseType_t);
                let _ = tx.send(handle as usize);
                daemon_main();
            });
        match spawned {
            Ok(_) => rx.recv().unwrap_or(0),
            Err(e) => {
                log::error!("unable to start timer daemon: {}", e);
                0
            }
        }
    }) as TaskHandle_t
}

fn is_daemon() -> bool {
    DAEMON_TASK.get().copied() == Some(current().0 as usize)
}

/// Has the wrapping tick count reached `expiry`?
fn expired(expiry: TickType_t, now: TickType_t) -> bool {
    (expiry.wrapping_sub(now) as i32) <= 0
}

fn daemon_main() -> ! {
    let (mutex, cv) = &*DAEMON;
    let mut daemon = lock(mutex);
    loop {
        if let Some(command) = daemon.commands.pop_front() {
            cv.notify_all();
            match command {
                Command::Pend {
                    function,
                    arg1,
                    arg2,
                } => {
                    drop(daemon);
                    unsafe { function(arg1.0, arg2) };
                    daemon = lock(mutex);
                }
                Command::Timer { timer, id, value } => unsafe {
                    apply(&mut daemon, timer, id, value);
                },
            }
            daemon.processed += 1;
            cv.notify_all();
            continue;
        }

        let now = now_ticks();
        let mut next: Option<TickType_t> = None;
        let mut fire = None;
        for (pos, timer) in daemon.active.iter().enumerate() {
            let state = lock(unsafe { &(*timer.0).state });
            if expired(state.expiry, now) {
                fire = Some(pos);
                break;
            }
            let left = state.expiry.wrapping_sub(now);
            next = Some(next.map_or(left, |n| n.min(left)));
        }

        if let Some(pos) = fire {
            let timer = daemon.active[pos];
            let t = unsafe { &*timer.0 };
            {
                let mut state = lock(&t.state);
                if t.auto_reload {
                    state.expiry = state.expiry.wrapping_add(state.period);
                } else {
                    state.active = false;
                    daemon.active.remove(pos);
                }
            }
            drop(daemon);
            if let Some(callback) = t.callback {
                unsafe { callback(timer.0 as TimerHandle_t) };
            }
            daemon = lock(mutex);
            continue;
        }

        let wait = next.map_or(SLICE * 20, |n| tick_duration(n).max(SLICE / 5));
        daemon = match cv.wait_timeout(daemon, wait) {
            Ok((g, _)) => g,
            Err(e) => e.into_inner().0,
        };
    }
}

unsafe fn apply(daemon: &mut Daemon, timer: SendPtr<Timer>, id: BaseType_t, value: TickType_t) {
    let t = &*timer.0;
    let listed = daemon.active.iter().position(|p| p.0 == timer.0);
    let now = now_ticks();

    let activate = {
        let mut state = lock(&t.state);
        match id {
            tmrCOMMAND_START | tmrCOMMAND_RESET | tmrCOMMAND_START_FROM_ISR
            | tmrCOMMAND_RESET_FROM_ISR => {
                state.expiry = value.wrapping_add(state.period);
                state.active = true;
                true
            }
            tmrCOMMAND_CHANGE_PERIOD | tmrCOMMAND_CHANGE_PERIOD_FROM_ISR => {
                if value == 0 {
                    log::error!("timer period can't be zero");
                    return;
                }
                state.period = value;
                state.expiry = now.wrapping_add(value);
                state.active = true;
                true
            }
            tmrCOMMAND_STOP | tmrCOMMAND_STOP_FROM_ISR | tmrCOMMAND_DELETE => {
                state.active = false;
                false
            }
            _ => return,
        }
    };

    match (activate, listed) {
        (true, None) => daemon.active.push(timer),
        (false, Some(pos)) => {
            daemon.active.remove(pos);
        }
        _ => (),
    }

    if id == tmrCOMMAND_DELETE {
        release(timer.0, t.placement);
        count(|s| s.deletes += 1);
    }
}

fn new_timer(
    name: *const c_char,
    period: TickType_t,
    auto_reload: BaseType_t,
    id: *mut c_void,
    callback: TimerCallbackFunction_t,
    placement: Placement,
) -> Timer {
    Timer {
        name,
        auto_reload: auto_reload != pdFALSE,
        id,
        callback,
        state: Mutex::new(TimerState {
            period,
            active: false,
            expiry: 0,
        }),
        placement,
    }
}

pub unsafe extern "C" fn xTimerCreate(
    pcTimerName: *const c_char,
    xTimerPeriodInTicks: TickType_t,
    xAutoReload: BaseType_t,
    pvTimerID: *mut c_void,
    pxCallbackFunction: TimerCallbackFunction_t,
) -> TimerHandle_t {
    if xTimerPeriodInTicks == 0 {
        return null_mut();
    }
    ensure_daemon();
    let t = kernel_box(new_timer(
        pcTimerName,
        xTimerPeriodInTicks,
        xAutoReload,
        pvTimerID,
        pxCallbackFunction,
        Placement::Heap,
    ));
    if !t.is_null() {
        count(|s| s.creates += 1);
    }
    t as TimerHandle_t
}

pub unsafe extern "C" fn xTimerCreateStatic(
    pcTimerName: *const c_char,
    xTimerPeriodInTicks: TickType_t,
    xAutoReload: BaseType_t,
    pvTimerID: *mut c_void,
    pxCallbackFunction: TimerCallbackFunction_t,
    pxTimerBuffer: *mut StaticTimer_t,
) -> TimerHandle_t {
    if xTimerPeriodInTicks == 0 || pxTimerBuffer.is_null() {
        return null_mut();
    }
    ensure_daemon();
    let t = pxTimerBuffer as *mut Timer;
    t.write(new_timer(
        pcTimerName,
        xTimerPeriodInTicks,
        xAutoReload,
        pvTimerID,
        pxCallbackFunction,
        Placement::Static,
    ));
    count(|s| s.creates += 1);
    t as TimerHandle_t
}

/// Queue a command from a task, waiting up to `ticks` for room.  Unless the caller is the daemon
/// itself, this then waits for the daemon to process it.
fn send_from_task(command: Command, ticks: TickType_t) -> BaseType_t {
    ensure_daemon();
    let (mutex, cv) = &*DAEMON;
    let from_daemon = is_daemon();
    let ticks = if from_daemon { 0 } else { ticks };

    let (mut daemon, ok) = wait_on(mutex, cv, ticks, None, |d| d.commands.len() < QUEUE_LENGTH);
    if !ok {
        return pdFAIL;
    }
    daemon.commands.push_back(command);
    daemon.submitted += 1;
    let seq = daemon.submitted;
    cv.notify_all();

    if !from_daemon {
        while daemon.processed < seq {
            daemon = match cv.wait_timeout(daemon, SLICE) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }
    pdPASS
}

/// Queue a command without blocking, reporting whether the daemon outranks the caller.
fn send_from_isr(command: Command, woken: *mut BaseType_t) -> BaseType_t {
    let handle = ensure_daemon();
    let (mutex, cv) = &*DAEMON;
    let mut daemon = lock(mutex);
    if daemon.commands.len() >= QUEUE_LENGTH {
        return pdFAIL;
    }
    daemon.commands.push_back(command);
    daemon.submitted += 1;
    cv.notify_all();
    drop(daemon);

    if !woken.is_null() && !handle.is_null() {
        let daemon_priority = unsafe { super::task::uxTaskPriorityGet(handle) };
        if daemon_priority > current_priority() {
            unsafe { *woken = pdTRUE };
        }
    }
    pdPASS
}

pub unsafe extern "C" fn xTimerGenericCommandFromTask(
    xTimer: TimerHandle_t,
    xCommandID: BaseType_t,
    xOptionalValue: TickType_t,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    if xTimer.is_null() {
        return pdFAIL;
    }
    let command = Command::Timer {
        timer: SendPtr(xTimer as *mut Timer),
        id: xCommandID,
        value: xOptionalValue,
    };
    if xCommandID >= tmrFIRST_FROM_ISR_COMMAND {
        send_from_isr(command, pxHigherPriorityTaskWoken)
    } else {
        send_from_task(command, xTicksToWait)
    }
}

pub unsafe extern "C" fn xTimerGenericCommandFromISR(
    xTimer: TimerHandle_t,
    xCommandID: BaseType_t,
    xOptionalValue: TickType_t,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    xTimerGenericCommandFromTask(
        xTimer,
        xCommandID,
        xOptionalValue,
        pxHigherPriorityTaskWoken,
        xTicksToWait,
    )
}

unsafe fn timer<'a>(handle: TimerHandle_t) -> &'a Timer {
    &*(handle as *const Timer)
}

pub unsafe extern "C" fn pvTimerGetTimerID(xTimer: TimerHandle_t) -> *mut c_void {
    timer(xTimer).id
}

pub unsafe extern "C" fn xTimerGetPeriod(xTimer: TimerHandle_t) -> TickType_t {
    lock(&timer(xTimer).state).period
}

pub unsafe extern "C" fn xTimerGetExpiryTime(xTimer: TimerHandle_t) -> TickType_t {
    lock(&timer(xTimer).state).expiry
}

pub unsafe extern "C" fn xTimerIsTimerActive(xTimer: TimerHandle_t) -> BaseType_t {
    if lock(&timer(xTimer).state).active {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn pcTimerGetName(xTimer: TimerHandle_t) -> *const c_char {
    timer(xTimer).name
}

pub unsafe extern "C" fn xTimerPendFunctionCall(
    xFunctionToPend: PendedFunction_t,
    pvParameter1: *mut c_void,
    ulParameter2: u32,
    xTicksToWait: TickType_t,
) -> BaseType_t {
    let Some(function) = xFunctionToPend else {
        return pdFAIL;
    };
    send_from_task(
        Command::Pend {
            function,
            arg1: SendPtr(pvParameter1),
            arg2: ulParameter2,
        },
        xTicksToWait,
    )
}

pub unsafe extern "C" fn xTimerPendFunctionCallFromISR(
    xFunctionToPend: PendedFunction_t,
    pvParameter1: *mut c_void,
    ulParameter2: u32,
    pxHigherPriorityTaskWoken: *mut BaseType_t,
) -> BaseType_t {
    let Some(function) = xFunctionToPend else {
        return pdFAIL;
    };
    send_from_isr(
        Command::Pend {
            function,
            arg1: SendPtr(pvParameter1),
            arg2: ulParameter2,
        },
        pxHigherPriorityTaskWoken,
    )
}

pub unsafe extern "C" fn xTimerGetTimerDaemonTaskHandle() -> TaskHandle_t {
    ensure_daemon()
}
