// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Event groups.

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use super::heap::{kernel_box, release, Placement};
use super::{count, lock, wait_on};
use crate::{
    eventEVENT_BITS_CONTROL_BYTES, pdFALSE, BaseType_t, EventBits_t, EventGroupHandle_t,
    TickType_t,
};

struct Waiter {
    id: usize,
    mask: EventBits_t,
    all: bool,
    clear: bool,
    /// The bits at the moment the wait was satisfied, filled in by the setter.
    result: Option<EventBits_t>,
}

impl Waiter {
    fn satisfied_by(&self, bits: EventBits_t) -> bool {
        if self.all {
            bits & self.mask == self.mask
        } else {
            bits & self.mask != 0
        }
    }
}

struct EventState {
    bits: EventBits_t,
    waiters: Vec<Waiter>,
}

impl EventState {
    /// Set bits, release every waiter this satisfies, then apply their clear on exit requests.
    fn set(&mut self, bits: EventBits_t) -> EventBits_t {
        self.bits |= bits & !eventEVENT_BITS_CONTROL_BYTES;
        let mut clear = 0;
        let current = self.bits;
        for w in self.waiters.iter_mut().filter(|w| w.result.is_none()) {
            if w.satisfied_by(current) {
                w.result = Some(current);
                if w.clear {
                    clear |= w.mask;
                }
            }
        }
        self.bits &= !clear;
        self.bits
    }

    fn result_of(&self, id: usize) -> Option<EventBits_t> {
        self.waiters.iter().find(|w| w.id == id).and_then(|w| w.result)
    }
}

/// What an `EventGroupHandle_t` points at.
pub struct EventGroup {
    state: Mutex<EventState>,
    cv: Condvar,
    placement: Placement,
}

/// Storage for a statically allocated event group.
#[repr(transparent)]
pub struct StaticEventGroup_t {
    _slot: MaybeUninit<EventGroup>,
}

static NEXT_WAITER: AtomicUsize = AtomicUsize::new(1);

fn new_group(placement: Placement) -> EventGroup {
    EventGroup {
        state: Mutex::new(EventState {
            bits: 0,
            waiters: Vec::new(),
        }),
        cv: Condvar::new(),
        placement,
    }
}

unsafe fn group<'a>(handle: EventGroupHandle_t) -> &'a EventGroup {
    &*(handle as *const EventGroup)
}

/// Wait as a registered waiter.  Returns the bits that satisfied the wait, or the current bits on
/// timeout.
fn block(
    eg: &EventGroup,
    mask: EventBits_t,
    all: bool,
    clear: bool,
    ticks: TickType_t,
) -> EventBits_t {
    let id = NEXT_WAITER.fetch_add(1, Ordering::Relaxed);
    lock(&eg.state).waiters.push(Waiter {
        id,
        mask,
        all,
        clear,
        result: None,
    });

    let (mut state, _) = wait_on(&eg.state, &eg.cv, ticks, None, |s| s.result_of(id).is_some());
    let result = state
        .waiters
        .iter()
        .position(|w| w.id == id)
        .and_then(|pos| state.waiters.remove(pos).result);
    result.unwrap_or(state.bits)
}

pub unsafe extern "C" fn xEventGroupCreate() -> EventGroupHandle_t {
    let eg = kernel_box(new_group(Placement::Heap));
    if !eg.is_null() {
        count(|s| s.creates += 1);
    }
    eg as EventGroupHandle_t
}

pub unsafe extern "C" fn xEventGroupCreateStatic(
    pxEventGroupBuffer: *mut StaticEventGroup_t,
) -> EventGroupHandle_t {
    if pxEventGroupBuffer.is_null() {
        return null_mut();
    }
    let eg = pxEventGroupBuffer as *mut EventGroup;
    eg.write(new_group(Placement::Static));
    count(|s| s.creates += 1);
    eg as EventGroupHandle_t
}

pub unsafe extern "C" fn xEventGroupSetBits(
    xEventGroup: EventGroupHandle_t,
    uxBitsToSet: EventBits_t,
) -> EventBits_t {
    let eg = group(xEventGroup);
    let mut state = lock(&eg.state);
    let bits = state.set(uxBitsToSet);
    eg.cv.notify_all();
    bits
}

pub unsafe extern "C" fn xEventGroupClearBits(
    xEventGroup: EventGroupHandle_t,
    uxBitsToClear: EventBits_t,
) -> EventBits_t {
    let mut state = lock(&group(xEventGroup).state);
    let before = state.bits;
    state.bits &= !uxBitsToClear;
    before
}

pub unsafe extern "C" fn xEventGroupWaitBits(
    xEventGroup: EventGroupHandle_t,
    uxBitsToWaitFor: EventBits_t,
    xClearOnExit: BaseType_t,
    xWaitForAllBits: BaseType_t,
    xTicksToWait: TickType_t,
) -> EventBits_t {
    let eg = group(xEventGroup);
    let all = xWaitForAllBits != pdFALSE;
    let clear = xClearOnExit != pdFALSE;
    {
        let mut state = lock(&eg.state);
        let bits = state.bits;
        let met = if all {
            bits & uxBitsToWaitFor == uxBitsToWaitFor
        } else {
            bits & uxBitsToWaitFor != 0
        };
        if met {
            if clear {
                state.bits &= !uxBitsToWaitFor;
            }
            return bits;
        }
        if xTicksToWait == 0 {
            return bits;
        }
    }
    block(eg, uxBitsToWaitFor, all, clear, xTicksToWait)
}

pub unsafe extern "C" fn xEventGroupSync(
    xEventGroup: EventGroupHandle_t,
    uxBitsToSet: EventBits_t,
    uxBitsToWaitFor: EventBits_t,
    xTicksToWait: TickType_t,
) -> EventBits_t {
    let eg = group(xEventGroup);
    {
        let mut state = lock(&eg.state);
        let original = state.bits;
        state.set(uxBitsToSet);
        eg.cv.notify_all();

        // Judged on the bits before other waiters consumed any of ours.
        let seen = original | uxBitsToSet;
        if seen & uxBitsToWaitFor == uxBitsToWaitFor {
            state.bits &= !uxBitsToWaitFor;
            return seen;
        }
        if xTicksToWait == 0 {
            return state.bits;
        }
    }
    block(eg, uxBitsToWaitFor, true, true, xTicksToWait)
}

pub unsafe extern "C" fn xEventGroupGetBitsFromISR(xEventGroup: EventGroupHandle_t) -> EventBits_t {
    lock(&group(xEventGroup).state).bits
}

pub unsafe extern "C" fn vEventGroupSetBitsCallback(pvEventGroup: *mut c_void, ulBitsToSet: u32) {
    xEventGroupSetBits(pvEventGroup as EventGroupHandle_t, ulBitsToSet);
}

pub unsafe extern "C" fn vEventGroupClearBitsCallback(pvEventGroup: *mut c_void, ulBitsToClear: u32) {
    xEventGroupClearBits(pvEventGroup as EventGroupHandle_t, ulBitsToClear);
}

pub unsafe extern "C" fn vEventGroupDelete(xEventGroup: EventGroupHandle_t) {
    if xEventGroup.is_null() {
        return;
    }
    if !lock(&group(xEventGroup).state).waiters.is_empty() {
        log::error!("event group deleted while tasks are blocked on it");
    }
    let eg = xEventGroup as *mut EventGroup;
    release(eg, (*eg).placement);
    count(|s| s.deletes += 1);
}
