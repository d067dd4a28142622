// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The port layer: critical sections, yields and the console.
//!
//! A critical section is a single process-wide lock, reentrant for the thread holding it, which
//! matches the nesting behavior of `taskENTER_CRITICAL` on a single core.

use std::ffi::c_char;
use std::io::Write;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;

use super::{console_output, count, in_isr, lock};
use crate::{BaseType_t, UBaseType_t, pdFALSE, pdTRUE};

#[derive(Default)]
struct Critical {
    owner: Option<ThreadId>,
    depth: usize,
}

static CRITICAL: Lazy<(Mutex<Critical>, Condvar)> = Lazy::new(Default::default);

fn enter() {
    let me = thread::current().id();
    let (mutex, cv) = &*CRITICAL;
    let mut state = lock(mutex);
    loop {
        match state.owner {
            Some(owner) if owner == me => break,
            None => {
                state.owner = Some(me);
                break;
            }
            Some(_) => {
                state = match cv.wait(state) {
                    Ok(g) => g,
                    Err(e) => e.into_inner(),
                };
            }
        }
    }
    state.depth += 1;
}

fn exit() {
    let me = thread::current().id();
    let (mutex, cv) = &*CRITICAL;
    let mut state = lock(mutex);
    if state.owner != Some(me) || state.depth == 0 {
        log::error!("critical section exit without matching enter");
        return;
    }
    state.depth -= 1;
    if state.depth == 0 {
        state.owner = None;
        cv.notify_one();
    }
}

pub(super) fn nesting() -> usize {
    let me = thread::current().id();
    let state = lock(&CRITICAL.0);
    if state.owner == Some(me) {
        state.depth
    } else {
        0
    }
}

pub unsafe extern "C" fn rust_freertos_enter_critical() {
    enter();
}

pub unsafe extern "C" fn rust_freertos_exit_critical() {
    exit();
}

/// Returns the nesting depth found on entry, which is the "interrupt status" to restore.
pub unsafe extern "C" fn rust_freertos_enter_critical_from_isr() -> UBaseType_t {
    let saved = nesting();
    enter();
    saved as UBaseType_t
}

pub unsafe extern "C" fn rust_freertos_exit_critical_from_isr(saved: UBaseType_t) {
    exit();
    let now = nesting();
    if now != saved as usize {
        log::error!("ISR critical section restored depth {} but expected {}", now, saved);
    }
}

// Masking interrupts is modeled as a critical section, which is what it achieves on a single
// core target.
pub unsafe extern "C" fn rust_freertos_disable_interrupts() {
    enter();
}

pub unsafe extern "C" fn rust_freertos_enable_interrupts() {
    exit();
}

pub unsafe extern "C" fn rust_freertos_yield() {
    thread::yield_now();
}

pub unsafe extern "C" fn rust_freertos_yield_from_isr(woken: BaseType_t) {
    if woken != pdFALSE {
        count(|s| s.context_switch_requests += 1);
        thread::yield_now();
    }
}

pub unsafe extern "C" fn xPortIsInsideInterrupt() -> BaseType_t {
    if in_isr() {
        pdTRUE
    } else {
        pdFALSE
    }
}

pub unsafe extern "C" fn rust_freertos_console_write(data: *const c_char, len: usize) -> usize {
    let bytes = std::slice::from_raw_parts(data as *const u8, len);
    console_output(bytes, |out| std::io::stderr().write_all(out).is_ok())
}

pub unsafe extern "C" fn rust_freertos_halt() -> ! {
    log::error!("kernel halted");
    std::process::abort()
}
