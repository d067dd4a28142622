// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Tasks that run on a fixed period, until asked to stop.
//!
//! Between runs the task waits for a notification on [`STOP_INDEX`], timing out at the next
//! wake.  The wake times are fixed, so the period does not drift with the time the body takes.
//! A body that overruns its period is run again straight away, and the schedule catches up.
//!
//! Stopping is cooperative.  The body is never cut off part way, so locks it takes are always
//! given back, and `on_stop` runs in the task before it is deleted.

use log::warn;

use crate::config::configTASK_NOTIFICATION_ARRAY_ENTRIES;
use crate::object::Dynamic;
use crate::raw::portMAX_DELAY;
use crate::time::{self, tick_count, Duration, Forever, Timeout};

use super::{notify_wait, Error, Notify, Result, Task, TaskAllocator, TaskBuilder, TaskRef, TaskRoutine};

/// The notification index a periodic task waits for its stop on.  The body must not use it.
pub const STOP_INDEX: usize = configTASK_NOTIFICATION_ARRAY_ENTRIES as usize - 1;

fn nothing() {}

/// A routine that calls `body` once per `period`, between `on_start` and `on_stop`.
pub struct Periodic<F, S = fn(), E = fn()> {
    period: Duration,
    body: F,
    on_start: S,
    on_stop: E,
}

impl<F: FnMut() + Send + 'static> Periodic<F> {
    /// Call `body` every `period`, starting one period after the task starts.
    pub fn new(period: Duration, body: F) -> Periodic<F> {
        Periodic {
            period,
            body,
            on_start: nothing,
            on_stop: nothing,
        }
    }
}

impl<F, S, E> Periodic<F, S, E> {
    /// Run `f` in the task before the first period.
    pub fn on_start<S2: FnOnce() + Send + 'static>(self, f: S2) -> Periodic<F, S2, E> {
        Periodic {
            period: self.period,
            body: self.body,
            on_start: f,
            on_stop: self.on_stop,
        }
    }

    /// Run `f` in the task once it has been told to stop.
    pub fn on_stop<E2: FnOnce() + Send + 'static>(self, f: E2) -> Periodic<F, S, E2> {
        Periodic {
            period: self.period,
            body: self.body,
            on_start: self.on_start,
            on_stop: f,
        }
    }
}

impl<F, S, E> TaskRoutine for Periodic<F, S, E>
where
    F: FnMut() + Send + 'static,
    S: FnOnce() + Send + 'static,
    E: FnOnce() + Send + 'static,
{
    fn run(mut self) {
        (self.on_start)();
        let mut wake = tick_count();
        loop {
            wake += self.period;
            let left = wake
                .checked_duration_since(tick_count())
                .unwrap_or(Duration::from_ticks(0));
            match notify_wait(STOP_INDEX, 0, u32::MAX, left) {
                Ok(_) => break,
                Err(_) => (self.body)(),
            }
        }
        (self.on_stop)();
    }
}

/// A task running a [`Periodic`] routine.
///
/// Dropping this stops the task, waiting for the body to finish, and then deletes it.
pub struct PeriodicTask<F, S = fn(), E = fn(), A = Dynamic>
where
    F: FnMut() + Send + 'static,
    S: FnOnce() + Send + 'static,
    E: FnOnce() + Send + 'static,
    A: TaskAllocator<Periodic<F, S, E>>,
{
    task: Task<Periodic<F, S, E>, A>,
}

impl<F, S, E, A> PeriodicTask<F, S, E, A>
where
    F: FnMut() + Send + 'static,
    S: FnOnce() + Send + 'static,
    E: FnOnce() + Send + 'static,
    A: TaskAllocator<Periodic<F, S, E>>,
{
    /// A reference to the task, valid while this is.
    pub fn task_ref(&self) -> TaskRef<'_> {
        self.task.task_ref()
    }

    /// Is the routine still going?  False once `on_stop` has returned.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Tell the task to stop, and wait for it to finish.
    ///
    /// A body blocked in a delay is woken early.  Gives [`Error::Timeout`] if the task has not
    /// finished in time, and it will still stop once the body returns.
    pub fn stop<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let limit = time::ticks(timeout);
        let task = self.task.task_ref();
        if self.task.is_finished() {
            return Ok(());
        }
        // A suspended task would never see the notification.
        #[cfg(INCLUDE_vTaskSuspend)]
        task.resume();
        task.notify_indexed(STOP_INDEX, Notify::Increment)?;
        #[cfg(INCLUDE_xTaskAbortDelay)]
        task.abort_delay();

        let start = tick_count().ticks();
        while !self.task.is_finished() {
            if limit != portMAX_DELAY && tick_count().ticks().wrapping_sub(start) >= limit {
                return Err(Error::Timeout);
            }
            time::sleep(Duration::from_ticks(1));
        }
        Ok(())
    }
}

impl<F, S, E, A> Drop for PeriodicTask<F, S, E, A>
where
    F: FnMut() + Send + 'static,
    S: FnOnce() + Send + 'static,
    E: FnOnce() + Send + 'static,
    A: TaskAllocator<Periodic<F, S, E>>,
{
    fn drop(&mut self) {
        if let Err(e) = self.stop(Forever) {
            warn!("periodic task {:?} not stopped: {}", self.task.id(), e);
        }
    }
}

impl TaskBuilder {
    /// Create a task from the kernel heap that calls `body` every `period`.
    #[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
    pub fn spawn_periodic<F>(self, period: Duration, body: F) -> Result<PeriodicTask<F>>
    where
        F: FnMut() + Send + 'static,
    {
        self.spawn_periodic_with(Dynamic, Periodic::new(period, body))
    }

    /// Create a task running `routine`, in the given allocation.
    pub fn spawn_periodic_with<F, S, E, A>(
        self,
        alloc: A,
        routine: Periodic<F, S, E>,
    ) -> Result<PeriodicTask<F, S, E, A>>
    where
        F: FnMut() + Send + 'static,
        S: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
        A: TaskAllocator<Periodic<F, S, E>>,
    {
        Ok(PeriodicTask {
            task: self.spawn_with(alloc, routine)?,
        })
    }
}
