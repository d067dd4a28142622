// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Event groups, on the simulated kernel.

use std::sync::Arc;

use freertos::event_group::{EventGroup, EventWait, VALID_BITS};
use freertos::object::StaticStorage;
use freertos::queue::Queue;
use freertos::raw::StaticEventGroup_t;
use freertos::task::TaskBuilder;
use freertos::time::{Duration, Forever, NoWait};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const BIT0: u32 = 1 << 0;
const BIT1: u32 = 1 << 1;
const BIT2: u32 = 1 << 2;

#[test]
fn wait_all_on_set_bits() {
    init();
    let group = EventGroup::new().unwrap();
    group.set(BIT0 | BIT1).unwrap();

    let seen = group.wait(BIT0 | BIT1, true, false, NoWait).unwrap();
    assert_eq!(seen, EventWait::Satisfied(BIT0 | BIT1));

    let seen = group.wait(BIT0 | BIT2, true, false, Duration::millis(10)).unwrap();
    assert_eq!(seen, EventWait::TimedOut(BIT0 | BIT1));
    assert_eq!(
        group.wait_all(BIT0 | BIT2, false, NoWait),
        Err(Error::Timeout)
    );
}

#[test]
fn wait_any_and_clear_on_exit() {
    init();
    let group = EventGroup::new().unwrap();
    group.set(BIT1).unwrap();

    assert_eq!(group.wait_any(BIT0 | BIT1, true, NoWait), Ok(BIT1));
    assert_eq!(group.get(), 0);

    // A timeout leaves the bits alone.
    group.set(BIT2).unwrap();
    assert!(!group.wait(BIT0, false, true, NoWait).unwrap().is_satisfied());
    assert_eq!(group.get(), BIT2);
}

#[test]
fn clear_reports_previous_bits() {
    init();
    let group = EventGroup::new().unwrap();
    assert_eq!(group.set(BIT0 | BIT2), Ok(BIT0 | BIT2));
    assert_eq!(group.clear(BIT0), Ok(BIT0 | BIT2));
    assert_eq!(group.get(), BIT2);
}

#[test]
fn bad_masks_rejected() {
    init();
    let group = EventGroup::new().unwrap();
    let reserved = !VALID_BITS;

    assert_eq!(group.wait(0, true, false, Forever), Err(Error::InvalidArgument));
    assert_eq!(group.wait(reserved, false, false, NoWait), Err(Error::InvalidArgument));
    assert_eq!(group.set(0), Err(Error::InvalidArgument));
    assert_eq!(group.set(reserved), Err(Error::InvalidArgument));
    assert_eq!(group.clear(reserved), Err(Error::InvalidArgument));
    assert_eq!(group.sync(reserved, BIT0, NoWait), Err(Error::InvalidArgument));
    assert_eq!(group.sync(BIT0, 0, NoWait), Err(Error::InvalidArgument));
}

#[test]
fn set_wakes_waiting_task() {
    init();
    let group = Arc::new(EventGroup::new().unwrap());
    let result = Arc::new(Queue::<u32, 1>::new().unwrap());

    let task = {
        let group = group.clone();
        let result = result.clone();
        TaskBuilder::new()
            .name("waiter")
            .spawn(move || {
                let bits = group.wait_all(BIT0 | BIT1, true, Forever).unwrap_or(0);
                let _ = result.send(bits, Forever);
            })
            .unwrap()
    };

    group.set(BIT0).unwrap();
    freertos::time::sleep(Duration::millis(10));
    assert!(result.is_empty());

    group.set(BIT1).unwrap();
    assert_eq!(result.receive(Duration::millis(1000)), Ok(BIT0 | BIT1));
    drop(task);
}

#[test]
fn sync_rendezvous() {
    init();
    let group = Arc::new(EventGroup::new().unwrap());
    let result = Arc::new(Queue::<bool, 1>::new().unwrap());

    let task = {
        let group = group.clone();
        let result = result.clone();
        TaskBuilder::new()
            .name("partner")
            .spawn(move || {
                let met = group
                    .sync(BIT1, BIT0 | BIT1, Duration::millis(1000))
                    .map(|w| w.is_satisfied())
                    .unwrap_or(false);
                let _ = result.send(met, Forever);
            })
            .unwrap()
    };

    let seen = group.sync(BIT0, BIT0 | BIT1, Duration::millis(1000)).unwrap();
    assert!(seen.is_satisfied());
    assert_eq!(seen.bits() & (BIT0 | BIT1), BIT0 | BIT1);
    assert_eq!(result.receive(Duration::millis(1000)), Ok(true));
    drop(task);
}

#[test]
fn isr_set_is_deferred_to_daemon() {
    init();
    let group = EventGroup::new().unwrap();

    let before = stats();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        group.set_isr(BIT2, &mut woken).unwrap();
        // The daemon outranks the interrupted task.
        assert!(woken.is_woken());
    });
    assert_eq!(stats().since(&before).context_switch_requests, 1);

    assert_eq!(group.wait_any(BIT2, false, Duration::millis(1000)), Ok(BIT2));

    run_as_isr(|| group.clear_isr(BIT2)).unwrap();
    let mut cleared = false;
    for _ in 0..100 {
        if group.get() & BIT2 == 0 {
            cleared = true;
            break;
        }
        freertos::time::sleep(Duration::millis(1));
    }
    assert!(cleared);
}

#[test]
fn drop_after_isr_set_waits_for_daemon() {
    init();
    let group = EventGroup::new().unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        group.set_isr(BIT0, &mut woken).unwrap();
        group.set_isr(BIT1, &mut woken).unwrap();
    });
    let before = stats();
    drop(group);
    assert_eq!(stats().since(&before).deletes, 1);
}

#[test]
fn isr_set_rejects_bad_mask() {
    init();
    let group = EventGroup::new().unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        assert_eq!(group.set_isr(0, &mut woken), Err(Error::InvalidArgument));
        assert_eq!(group.clear_isr(!VALID_BITS), Err(Error::InvalidArgument));
        woken.forget();
    });
}

#[test]
fn static_group_uses_no_heap() {
    init();
    static STORAGE: StaticStorage<StaticEventGroup_t> = StaticStorage::new();

    let before = stats();
    let group = EventGroup::new_in(&STORAGE).unwrap();
    group.set(BIT0).unwrap();
    assert_eq!(group.wait_any(BIT0, true, NoWait), Ok(BIT0));
    drop(group);

    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.creates, 1);
    assert_eq!(after.deletes, 1);
}
