// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Host simulation of the FreeRTOS API.
//!
//! Each kernel task runs on its own host thread, and each kernel object is a host mutex and
//! condition variable around the object's state.  Host threads that call into the kernel without
//! having been created as tasks (such as the test harness threads) are adopted as tasks the first
//! time they need an identity.
//!
//! The simulation models the API contract: blocking with timeouts, counts, mutex ownership,
//! notification state, deferred work through the timer daemon, and ISR variants that never block.
//! It does not model priority scheduling; the host schedules the threads.  Suspension, deletion and
//! aborted delays of another task take effect the next time that task is inside a kernel call, or
//! within a few milliseconds if it is already blocked in one.
//!
//! A few counters are kept per host thread so tests can observe kernel heap use, object
//! lifetimes, and context switch requests.  See [`stats`].

use std::cell::{Cell, RefCell};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::{config, TickType_t, UBaseType_t, portMAX_DELAY};

mod event_group;
mod heap;
mod port;
mod queue;
mod stream;
mod task;
mod timer;

/// The entry points, re-exported at the crate root under the `sim` feature.
pub mod api {
    pub use super::event_group::*;
    pub use super::heap::*;
    pub use super::port::*;
    pub use super::queue::*;
    pub use super::stream::*;
    pub use super::task::*;
    pub use super::timer::*;
}

/// Counters of kernel activity on the calling host thread.
///
/// These are per thread so that tests running in parallel don't see each other's activity.  Work
/// performed by the timer daemon (such as freeing a deleted timer) is counted on the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Successful `pvPortMalloc` calls.
    pub allocations: usize,
    /// `vPortFree` calls with a non-null pointer.
    pub frees: usize,
    /// Kernel objects (including tasks) successfully created.
    pub creates: usize,
    /// Kernel objects (including tasks) deleted.
    pub deletes: usize,
    /// Context switch requests made from ISR context.
    pub context_switch_requests: usize,
}

impl Stats {
    /// The activity between an earlier snapshot and this one.
    pub fn since(&self, earlier: &Stats) -> Stats {
        Stats {
            allocations: self.allocations - earlier.allocations,
            frees: self.frees - earlier.frees,
            creates: self.creates - earlier.creates,
            deletes: self.deletes - earlier.deletes,
            context_switch_requests: self.context_switch_requests - earlier.context_switch_requests,
        }
    }
}

thread_local! {
    static STATS: Cell<Stats> = Cell::new(Stats::default());
    static FAIL_ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static IN_ISR: Cell<bool> = const { Cell::new(false) };
}

/// A snapshot of the counters for the calling thread.
pub fn stats() -> Stats {
    STATS.with(|s| s.get())
}

pub(crate) fn count(update: impl FnOnce(&mut Stats)) {
    STATS.with(|s| {
        let mut v = s.get();
        update(&mut v);
        s.set(v);
    });
}

/// Make the next `n` kernel heap allocations on this thread fail.
pub fn fail_next_allocations(n: usize) {
    FAIL_ALLOCATIONS.with(|f| f.set(n));
}

pub(crate) fn take_allocation_failure() -> bool {
    FAIL_ALLOCATIONS.with(|f| {
        let n = f.get();
        if n > 0 {
            f.set(n - 1);
            true
        } else {
            false
        }
    })
}

/// Run `f` as if it were an interrupt handler preempting the calling task.
///
/// The simulator does not police which API subset is used here, but yields requested through
/// `portYIELD_FROM_ISR` are counted, and `xPortIsInsideInterrupt` reports true.
pub fn run_as_isr<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            IN_ISR.with(|i| i.set(self.0));
        }
    }
    let _restore = Restore(IN_ISR.with(|i| i.replace(true)));
    f()
}

/// Is the calling thread inside [`run_as_isr`]?
pub fn in_isr() -> bool {
    IN_ISR.with(|i| i.get())
}

thread_local! {
    static CONSOLE_CAPTURE: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
    static CONSOLE_ROOM: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Run `f`, gathering what it writes to the console on this thread instead of printing it.
pub fn capture_console<R>(f: impl FnOnce() -> R) -> (R, Vec<u8>) {
    let outer = CONSOLE_CAPTURE.with(|c| c.replace(Some(Vec::new())));
    let result = f();
    let captured = CONSOLE_CAPTURE.with(|c| c.replace(outer));
    (result, captured.unwrap_or_default())
}

/// Let the console take only `room` more bytes from this thread, and refuse the rest.  `None`
/// lifts the limit.
pub fn limit_console(room: Option<usize>) {
    CONSOLE_ROOM.with(|r| r.set(room));
}

/// Pass console bytes to the capture buffer, or to `print`.  Returns how many were taken.
pub(crate) fn console_output(bytes: &[u8], print: impl FnOnce(&[u8]) -> bool) -> usize {
    let taken = match CONSOLE_ROOM.with(|r| r.get()) {
        Some(room) => {
            let taken = room.min(bytes.len());
            CONSOLE_ROOM.with(|r| r.set(Some(room - taken)));
            taken
        }
        None => bytes.len(),
    };
    let bytes = &bytes[..taken];
    let captured = CONSOLE_CAPTURE.with(|c| match c.borrow_mut().as_mut() {
        Some(buf) => {
            buf.extend_from_slice(bytes);
            true
        }
        None => false,
    });
    if captured || print(bytes) {
        taken
    } else {
        0
    }
}

/// Critical section nesting held by the calling thread.
pub fn critical_nesting() -> usize {
    port::nesting()
}

/// Lock, ignoring poison.  Kernel state stays consistent even if a task panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

pub(crate) fn tick_duration(ticks: TickType_t) -> Duration {
    Duration::from_nanos(ticks as u64 * 1_000_000_000 / config::configTICK_RATE_HZ as u64)
}

/// The current tick count.
pub(crate) fn now_ticks() -> TickType_t {
    let ns = EPOCH.elapsed().as_nanos();
    (ns * config::configTICK_RATE_HZ as u128 / 1_000_000_000) as TickType_t
}

/// How long a blocked thread sleeps before rechecking for suspension and deletion requests.
pub(crate) const SLICE: Duration = Duration::from_millis(5);

/// The end of a wait expressed in ticks.  `portMAX_DELAY` waits forever.
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(ticks: TickType_t) -> Deadline {
        if ticks == portMAX_DELAY {
            Deadline(None)
        } else {
            Deadline(Some(Instant::now() + tick_duration(ticks)))
        }
    }

    /// The next amount of time to sleep, or None if the deadline has passed.
    pub(crate) fn slice(&self) -> Option<Duration> {
        match self.0 {
            None => Some(SLICE),
            Some(end) => {
                let left = end.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    None
                } else {
                    Some(left.min(SLICE))
                }
            }
        }
    }
}

/// Tasks blocked on one side of an object, with their priorities.  Used to decide whether an ISR
/// operation woke a task that should preempt the interrupted one.
#[derive(Default)]
pub(crate) struct WaitList(Vec<(usize, UBaseType_t)>);

impl WaitList {
    fn add(&mut self, id: usize, priority: UBaseType_t) {
        if !self.0.iter().any(|&(i, _)| i == id) {
            self.0.push((id, priority));
        }
    }

    fn remove(&mut self, id: usize) {
        self.0.retain(|&(i, _)| i != id);
    }

    /// Would waking one of these tasks preempt the current one?
    pub(crate) fn wakes_higher(&self) -> bool {
        let current = task::current_priority();
        self.0.iter().any(|&(_, p)| p > current)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Selects the wait list in an object's state that a blocked caller registers on.
pub(crate) type Waiters<T> = fn(&mut T) -> &mut WaitList;

/// Block the current task until `ready` holds for the object state, or the timeout expires.
///
/// Returns the locked state, and whether `ready` held.  A zero timeout never blocks.  While
/// blocked, the task honors requests to suspend, delete or abort its delay.  An aborted delay
/// behaves as a timeout, after one final check of the condition.
pub(crate) fn wait_on<'a, T>(
    mutex: &'a Mutex<T>,
    cv: &Condvar,
    ticks: TickType_t,
    waiters: Option<Waiters<T>>,
    ready: impl Fn(&T) -> bool,
) -> (MutexGuard<'a, T>, bool) {
    let mut guard = lock(mutex);
    if ready(&guard) {
        return (guard, true);
    }
    if ticks == 0 {
        return (guard, false);
    }

    let me = task::current_tcb();
    let deadline = Deadline::after(ticks);
    me.set_blocked(true);

    let ok = loop {
        if let Some(w) = waiters {
            w(&mut guard).add(me.id(), me.priority());
        }
        if ready(&guard) {
            break true;
        }
        let Some(slice) = deadline.slice() else {
            break false;
        };
        if me.has_request() {
            if let Some(w) = waiters {
                w(&mut guard).remove(me.id());
            }
            drop(guard);
            let aborted = task::checkpoint(&me);
            guard = lock(mutex);
            if aborted {
                break ready(&guard);
            }
            continue;
        }
        guard = match cv.wait_timeout(guard, slice) {
            Ok((g, _)) => g,
            Err(e) => e.into_inner().0,
        };
    };

    if let Some(w) = waiters {
        w(&mut guard).remove(me.id());
    }
    me.set_blocked(false);
    (guard, ok)
}

/// A raw pointer that may cross to another host thread.
pub(crate) struct SendPtr<T>(pub(crate) *mut T);

unsafe impl<T> Send for SendPtr<T> {}

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}
