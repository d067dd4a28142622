// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Tasks and notifications, on the simulated kernel.
//!
//! A panic on a kernel task halts the whole simulation, so the tasks here never assert.  They
//! report back over queues, and the test thread checks what they sent.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use freertos::config::configMAX_PRIORITIES;
use freertos::critical::SchedulerLock;
use freertos::object::{Dynamic, StaticStorage};
use freertos::queue::Queue;
use freertos::raw::BaseType_t;
use freertos::task::{
    self, current, current_id, notify_take, notify_wait, Notify, Periodic, SchedulerState,
    TaskBuilder, TaskId, TaskState, TaskStorage, NAME_LEN,
};
use freertos::time::{sleep, uptime, uptime_isr, Duration, Forever, NoWait};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{fail_next_allocations, run_as_isr, stats};
use static_assertions::{assert_impl_all, assert_not_impl_any};

assert_not_impl_any!(task::CurrentTask: Send, Sync);
assert_not_impl_any!(task::Task<fn()>: Clone);
assert_impl_all!(task::Task<fn()>: Send, Sync);
assert_impl_all!(task::TaskRef<'static>: Send, Sync, Copy);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll until `cond` holds, for up to a second.
fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::millis(5));
    }
    cond()
}

#[test]
fn spawned_task_runs() {
    init();
    let result = Arc::new(Queue::<TaskId, 1>::new().unwrap());
    let task = {
        let result = result.clone();
        TaskBuilder::new()
            .name("worker")
            .spawn(move || {
                let _ = result.send(current_id(), Forever);
            })
            .unwrap()
    };
    assert_eq!(result.receive(Duration::millis(1000)), Ok(task.id()));
    assert_ne!(task.id(), current_id());
    assert_eq!(task.task_ref().name().as_str(), "worker");

    // The routine is done, and the task parks itself.
    assert!(eventually(|| task.task_ref().state() == TaskState::Suspended));
}

#[test]
fn dynamic_task_create_and_delete_once() {
    init();
    let before = stats();
    let task = TaskBuilder::new().name("short").spawn(|| {}).unwrap();
    let during = stats().since(&before);
    assert_eq!(during.creates, 1);
    assert!(during.allocations >= 2);

    task.delete();
    let after = stats().since(&before);
    assert_eq!(after.deletes, 1);
    assert_eq!(after.frees, after.allocations);
}

#[test]
fn failed_spawn_deletes_nothing() {
    init();
    let before = stats();
    fail_next_allocations(1);
    let spawned = TaskBuilder::new().spawn(|| {});
    assert_eq!(spawned.err(), Some(Error::OutOfMemory));
    let after = stats().since(&before);
    assert_eq!(after.creates, 0);
    assert_eq!(after.deletes, 0);
    assert_eq!(after.allocations, after.frees);
}

#[test]
fn routine_dropped_with_task() {
    init();
    struct Flag(Arc<AtomicUsize>);
    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let flag = Flag(drops.clone());
    // Suspended, so the routine never runs, and is dropped along with the context.
    let task = TaskBuilder::new()
        .start_suspended(true)
        .spawn(move || {
            let _flag = &flag;
        })
        .unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(task);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn builder_rejects_bad_settings() {
    init();
    let top = configMAX_PRIORITIES as usize;
    assert_eq!(
        TaskBuilder::new().priority(top).spawn(|| {}).err(),
        Some(Error::InvalidArgument)
    );
    assert_eq!(
        TaskBuilder::new().stack_depth(0).spawn(|| {}).err(),
        Some(Error::InvalidArgument)
    );
}

#[test]
#[cfg(target_pointer_width = "64")]
fn oversized_stack_is_not_truncated() {
    init();
    let before = stats();
    // Cut down to 32 bits this would be a 16 word stack.
    let spawned = TaskBuilder::new().stack_depth((1 << 32) + 16).spawn(|| {});
    assert_eq!(spawned.err(), Some(Error::InvalidArgument));
    assert_eq!(stats().since(&before).creates, 0);
}

#[test]
fn long_names_are_truncated() {
    init();
    let task = TaskBuilder::new()
        .name("a-name-much-longer-than-the-kernel-keeps")
        .start_suspended(true)
        .spawn(|| {})
        .unwrap();
    let name = task.task_ref().name();
    assert_eq!(name.as_str().len(), NAME_LEN - 1);
    assert!("a-name-much-longer-than-the-kernel-keeps".starts_with(name.as_str()));
}

#[test]
fn stack_and_priority() {
    init();
    let task = TaskBuilder::new()
        .stack_depth(512)
        .priority(2)
        .start_suspended(true)
        .spawn(|| {})
        .unwrap();
    let task_ref = task.task_ref();
    assert_eq!(task_ref.stack_high_water_mark(), 512);
    assert_eq!(task_ref.priority(), 2);

    task_ref.set_priority(4).unwrap();
    assert_eq!(task_ref.priority(), 4);
    assert_eq!(run_as_isr(|| task_ref.priority_isr()), 4);
    assert_eq!(
        task_ref.set_priority(configMAX_PRIORITIES as usize),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn suspend_and_resume() {
    init();
    let ticks = Arc::new(AtomicUsize::new(0));
    let task = {
        let ticks = ticks.clone();
        TaskBuilder::new()
            .name("ticker")
            .spawn(move || loop {
                ticks.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::millis(1));
            })
            .unwrap()
    };
    let task_ref = task.task_ref();
    assert!(eventually(|| ticks.load(Ordering::SeqCst) > 0));

    task_ref.suspend();
    assert_eq!(task_ref.state(), TaskState::Suspended);
    sleep(Duration::millis(20));
    let frozen = ticks.load(Ordering::SeqCst);
    sleep(Duration::millis(20));
    assert_eq!(ticks.load(Ordering::SeqCst), frozen);

    task_ref.resume();
    assert!(eventually(|| ticks.load(Ordering::SeqCst) > frozen));
}

#[test]
fn start_suspended_waits_for_resume() {
    init();
    let ran = Arc::new(AtomicUsize::new(0));
    let task = {
        let ran = ran.clone();
        TaskBuilder::new()
            .start_suspended(true)
            .spawn(move || {
                ran.store(1, Ordering::SeqCst);
            })
            .unwrap()
    };
    sleep(Duration::millis(20));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(task.task_ref().state(), TaskState::Suspended);

    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        task.task_ref().resume_isr(&mut woken);
        // Same priority as the interrupted task.
        assert!(!woken.forget());
    });
    assert!(eventually(|| ran.load(Ordering::SeqCst) == 1));
}

#[test]
fn abort_delay_wakes_sleeper() {
    init();
    let result = Arc::new(Queue::<u8, 1>::new().unwrap());
    let task = {
        let result = result.clone();
        TaskBuilder::new()
            .name("sleeper")
            .spawn(move || {
                sleep(Duration::secs(60));
                let _ = result.send(1, Forever);
            })
            .unwrap()
    };
    let task_ref = task.task_ref();
    assert!(eventually(|| task_ref.state() == TaskState::Blocked));
    assert!(task_ref.abort_delay());
    assert_eq!(result.receive(Duration::millis(1000)), Ok(1));

    // Nothing to abort any more.
    assert!(eventually(|| task_ref.state() == TaskState::Suspended));
    assert!(!task_ref.abort_delay());
}

#[test]
fn notify_bits_to_waiting_task() {
    init();
    let result = Arc::new(Queue::<Result<u32, Error>, 1>::new().unwrap());
    let task = {
        let result = result.clone();
        TaskBuilder::new()
            .name("listener")
            .spawn(move || {
                let value = notify_wait(0, 0, u32::MAX, Duration::millis(2000));
                let _ = result.send(value, Forever);
            })
            .unwrap()
    };
    let task_ref = task.task_ref();
    assert!(eventually(|| task_ref.state() == TaskState::Blocked));
    task_ref.notify(Notify::SetBits(0b0001)).unwrap();
    assert_eq!(result.receive(Duration::millis(1000)), Ok(Ok(0b0001)));
}

#[test]
fn notify_as_counting_semaphore() {
    init();
    let result = Arc::new(Queue::<u32, 4>::new().unwrap());
    let task = {
        let result = result.clone();
        TaskBuilder::new()
            .name("counter")
            .start_suspended(true)
            .spawn(move || {
                // Each take decrements, and reports the count before.
                while let Ok(count) = notify_take(0, false, Duration::millis(100)) {
                    if result.send(count, Forever).is_err() {
                        break;
                    }
                }
            })
            .unwrap()
    };
    let task_ref = task.task_ref();
    task_ref.notify_give();
    task_ref.notify_give();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        task_ref.notify_give_isr(&mut woken);
        woken.forget();
    });
    task_ref.resume();

    for expected in [3, 2, 1] {
        assert_eq!(result.receive(Duration::millis(1000)), Ok(expected));
    }
}

#[test]
fn notify_own_task() {
    init();
    let me = current();
    let me = me.task_ref();

    assert_eq!(notify_take(0, true, NoWait), Err(Error::Empty));
    assert_eq!(notify_take(1, true, Duration::millis(5)), Err(Error::Timeout));

    me.notify(Notify::Increment).unwrap();
    me.notify(Notify::Increment).unwrap();
    assert_eq!(notify_take(0, true, NoWait), Ok(2));

    me.notify_indexed(1, Notify::SetValueWithoutOverwrite(7)).unwrap();
    assert_eq!(
        me.notify_indexed(1, Notify::SetValueWithoutOverwrite(8)),
        Err(Error::Full)
    );
    me.notify_indexed(1, Notify::SetValueWithOverwrite(9)).unwrap();
    assert_eq!(notify_wait(1, 0, 0, NoWait), Ok(9));

    me.notify_indexed(2, Notify::SetBits(0b110)).unwrap();
    assert_eq!(task::notify_value_clear(2, 0b010), Ok(0b110));
    assert_eq!(task::notify_state_clear(2), Ok(true));
    assert_eq!(task::notify_state_clear(2), Ok(false));
    assert_eq!(me.notify_value_clear(2, u32::MAX), Ok(0b100));
    assert_eq!(me.notify_state_clear(0), Ok(false));
}

#[test]
fn notify_index_out_of_range() {
    init();
    let entries = freertos::config::configTASK_NOTIFICATION_ARRAY_ENTRIES as usize;
    let me = current();
    let me = me.task_ref();
    assert_eq!(
        me.notify_indexed(entries, Notify::NoAction),
        Err(Error::InvalidArgument)
    );
    assert_eq!(notify_take(entries, true, NoWait), Err(Error::InvalidArgument));
    assert_eq!(notify_wait(entries, 0, 0, NoWait), Err(Error::InvalidArgument));
    assert_eq!(me.notify_state_clear(entries), Err(Error::InvalidArgument));
}

#[test]
fn current_task_state() {
    init();
    let me = current();
    assert_eq!(me.task_ref().state(), TaskState::Running);
    assert_eq!(me.id(), current_id());
    assert!(task::task_count() >= 1);
}

#[test]
fn scheduler_lock_suspends_scheduling() {
    init();
    let lock = SchedulerLock::lock();
    assert_eq!(task::scheduler_state(), SchedulerState::Suspended);
    drop(lock);
}

static WORKER_RAN: AtomicUsize = AtomicUsize::new(0);
static WORKER_STORAGE: StaticStorage<TaskStorage<fn(), 256>> = StaticStorage::new();

fn worker_main() {
    WORKER_RAN.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn static_task_uses_no_heap() {
    init();
    let before = stats();
    let task = TaskBuilder::new()
        .name("static")
        .spawn_in(&WORKER_STORAGE, worker_main as fn())
        .unwrap();
    assert!(WORKER_STORAGE.is_claimed());
    assert_eq!(
        TaskBuilder::new()
            .spawn_in(&WORKER_STORAGE, worker_main as fn())
            .err(),
        Some(Error::InUse)
    );
    assert!(eventually(|| WORKER_RAN.load(Ordering::SeqCst) == 1));
    drop(task);

    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.creates, 1);
    assert_eq!(after.deletes, 1);
    assert!(!WORKER_STORAGE.is_claimed());
}

#[test]
fn periodic_task_runs_until_dropped() {
    init();
    let runs = Arc::new(AtomicUsize::new(0));
    let task = {
        let runs = runs.clone();
        TaskBuilder::new()
            .name("periodic")
            .spawn_periodic(Duration::millis(5), move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
    };
    assert!(eventually(|| runs.load(Ordering::SeqCst) >= 5));
    drop(task);

    let stopped = runs.load(Ordering::SeqCst);
    sleep(Duration::millis(30));
    assert_eq!(runs.load(Ordering::SeqCst), stopped);
}

#[test]
fn detached_task_outlives_handle() {
    init();
    let result = Arc::new(Queue::<u32, 1>::new().unwrap());
    let task_ref = {
        let result = result.clone();
        TaskBuilder::new()
            .name("detached")
            .spawn(move || {
                if let Ok(value) = notify_wait(0, 0, u32::MAX, Forever) {
                    let _ = result.send(value, Forever);
                }
            })
            .unwrap()
            .detach()
    };
    assert!(eventually(|| task_ref.state() == TaskState::Blocked));
    task_ref.notify(Notify::SetValueWithOverwrite(42)).unwrap();
    assert_eq!(result.receive(Duration::millis(1000)), Ok(42));
}

#[test]
fn finished_routine_is_reported() {
    init();
    let task = TaskBuilder::new().name("brief").spawn(|| {}).unwrap();
    assert!(eventually(|| task.is_finished()));

    let waiting = TaskBuilder::new()
        .name("waiting")
        .spawn(|| {
            let _ = notify_wait(0, 0, u32::MAX, Forever);
        })
        .unwrap();
    assert!(eventually(|| waiting.task_ref().state() == TaskState::Blocked));
    assert!(!waiting.is_finished());
    waiting.task_ref().notify(Notify::NoAction).unwrap();
    assert!(eventually(|| waiting.is_finished()));
}

#[test]
fn notify_and_query_returns_previous_value() {
    init();
    let this = current();
    let me = this.task_ref();
    assert_eq!(me.notify_and_query(1, Notify::SetValueWithOverwrite(7)), Ok(0));
    assert_eq!(me.notify_and_query(1, Notify::Increment), Ok(7));
    // Still pending, so the value is kept.
    assert_eq!(
        me.notify_and_query(1, Notify::SetValueWithoutOverwrite(1)),
        Err(Error::Full)
    );
    assert_eq!(notify_wait(1, 0, u32::MAX, NoWait), Ok(8));

    assert_eq!(me.notify_and_query(1, Notify::SetBits(0b100)), Ok(0));
    let previous = run_as_isr(|| {
        let mut woken = TaskWoken::new();
        me.notify_and_query_isr(1, Notify::Increment, &mut woken)
    });
    assert_eq!(previous, Ok(0b100));
    assert_eq!(notify_wait(1, 0, u32::MAX, NoWait), Ok(0b101));

    let entries = freertos::config::configTASK_NOTIFICATION_ARRAY_ENTRIES as usize;
    assert_eq!(
        me.notify_and_query(entries, Notify::NoAction),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn task_status_report() {
    init();
    let task = TaskBuilder::new()
        .name("reported")
        .stack_depth(300)
        .priority(3)
        .spawn(|| {
            let _ = notify_wait(0, 0, u32::MAX, Forever);
        })
        .unwrap();
    let task_ref = task.task_ref();
    assert!(eventually(|| task_ref.state() == TaskState::Blocked));

    let status = task_ref.status(true);
    assert_eq!(status.id, task.id());
    assert_eq!(status.name.as_str(), "reported");
    assert_eq!(status.state, TaskState::Blocked);
    assert_eq!(status.priority, 3);
    assert_eq!(status.base_priority, 3);
    assert_eq!(status.stack_high_water_mark, Some(300));
    assert_eq!(task_ref.status(false).stack_high_water_mark, None);
    assert_eq!(task_ref.stack_high_water_mark(), 300);

    let state = task::system_state::<256>().unwrap();
    assert!(state.count() >= 3);
    let listed = state.tasks().find(|t| t.id == task.id()).map(|t| t.name);
    assert_eq!(listed.map(|name| name.as_str() == "reported"), Some(true));
    assert!(state.tasks().any(|t| t.id == current_id()));
    assert!(state.tasks().any(|t| t.id == task::idle_task().id()));

    // The kernel reports nothing when the array is too short.
    assert_eq!(task::system_state::<1>().err(), Some(Error::InvalidArgument));
    task_ref.notify(Notify::NoAction).unwrap();
}

#[test]
fn idle_task_is_lowest_priority() {
    init();
    let idle = task::idle_task();
    assert_eq!(idle.name().as_str(), "IDLE");
    assert_eq!(idle.priority(), 0);
    assert_eq!(idle.id(), task::idle_task().id());
    assert_ne!(idle.id(), current_id());
}

unsafe extern "C" fn seven(_arg: *mut c_void) -> BaseType_t {
    7
}

#[test]
fn application_tags() {
    init();
    let task = TaskBuilder::new()
        .name("tagged")
        .start_suspended(true)
        .spawn(|| {})
        .unwrap();
    let task_ref = task.task_ref();
    assert!(task_ref.tag().is_none());

    task_ref.set_tag(Some(seven));
    let hook = task_ref.tag().unwrap();
    assert_eq!(unsafe { hook(std::ptr::null_mut()) }, 7);
    let from_isr = run_as_isr(|| task_ref.tag_isr());
    assert_eq!(from_isr.map(|f| f as usize), Some(seven as usize));

    task_ref.set_tag(None);
    assert!(task_ref.tag().is_none());
}

#[test]
fn uptime_follows_ticks() {
    init();
    let start = uptime();
    sleep(Duration::millis(10));
    let later = uptime();
    assert!(later >= start + Duration::millis(10));
    assert!(run_as_isr(uptime_isr) >= later);
}

#[test]
fn periodic_stop_lets_body_release_lock() {
    init();
    let shared = Arc::new(freertos::sync::Mutex::new(0u32).unwrap());
    let inside = Arc::new(Queue::<bool, 1>::new().unwrap());
    let task = {
        let shared = shared.clone();
        let inside = inside.clone();
        TaskBuilder::new()
            .name("holder")
            .spawn_periodic(Duration::millis(1), move || {
                if let Ok(mut n) = shared.lock() {
                    *n += 1;
                    let _ = inside.send(true, NoWait);
                    // Woken early by the stop.
                    sleep(Duration::millis(500));
                    *n += 1;
                }
            })
            .unwrap()
    };
    assert_eq!(inside.receive(Duration::millis(1000)), Ok(true));
    assert!(shared.try_lock().is_err());

    // The body is part way through, with the lock held.
    drop(task);
    let n = *shared.try_lock().unwrap();
    assert!(n >= 2);
    assert_eq!(n % 2, 0);
}

#[test]
fn periodic_hooks_and_stop() {
    init();
    let runs = Arc::new(AtomicUsize::new(0));
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let routine = {
        let (runs, starts, stops) = (runs.clone(), starts.clone(), stops.clone());
        Periodic::new(Duration::millis(2), move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .on_start(move || {
            starts.fetch_add(1, Ordering::SeqCst);
        })
        .on_stop(move || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
    };
    let task = TaskBuilder::new()
        .name("hooks")
        .spawn_periodic_with(Dynamic, routine)
        .unwrap();

    assert!(eventually(|| runs.load(Ordering::SeqCst) >= 3));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 0);
    assert!(task.is_running());

    task.stop(Duration::millis(1000)).unwrap();
    assert!(!task.is_running());
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    let stopped = runs.load(Ordering::SeqCst);
    sleep(Duration::millis(20));
    assert_eq!(runs.load(Ordering::SeqCst), stopped);

    // Stopping again, and the drop, are no-ops.
    assert_eq!(task.stop(NoWait), Ok(()));
    drop(task);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[test]
fn suspended_periodic_task_still_stops() {
    init();
    let stops = Arc::new(AtomicUsize::new(0));
    let routine = {
        let stops = stops.clone();
        Periodic::new(Duration::millis(2), || {}).on_stop(move || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
    };
    let task = TaskBuilder::new()
        .name("paused")
        .spawn_periodic_with(Dynamic, routine)
        .unwrap();
    sleep(Duration::millis(5));
    task.task_ref().suspend();
    sleep(Duration::millis(10));
    drop(task);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}
