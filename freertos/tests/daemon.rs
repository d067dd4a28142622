// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Dropping objects the timer daemon still refers to, while the daemon can't run.
//!
//! Holding the scheduler lock stops every task in the process, so this is kept apart from the
//! other timer and event group tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant as HostInstant;

use freertos::critical::SchedulerLock;
use freertos::event_group::EventGroup;
use freertos::task::{scheduler_state, SchedulerState};
use freertos::time::{sleep, Duration, NoWait};
use freertos::timer::Timer;
use freertos::TaskWoken;
use freertos_sys::sim::{run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn drops_with_scheduler_suspended_do_not_wait() {
    init();
    let fired = Arc::new(AtomicUsize::new(0));
    let timer = {
        let fired = fired.clone();
        Timer::new(c"held", Duration::millis(1000), false, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
    };
    let group = EventGroup::new().unwrap();

    let lock = SchedulerLock::lock();
    assert_eq!(scheduler_state(), SchedulerState::Suspended);
    timer.start(NoWait).unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        group.set_isr(1, &mut woken).unwrap();
    });

    let before = stats();
    let start = HostInstant::now();
    drop(group);
    drop(timer);
    assert!(start.elapsed() < std::time::Duration::from_millis(500));
    // Neither could be freed without the daemon, so both are left alone.
    assert_eq!(stats().since(&before).deletes, 0);
    drop(lock);

    // The daemon catches up on its own, and deletes the timer before it fires.
    sleep(Duration::millis(20));
    assert_eq!(scheduler_state(), SchedulerState::Running);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
