// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Semaphores and mutexes, on the simulated kernel.

use std::sync::Arc;
use std::time::Instant as HostInstant;

use freertos::object::StaticStorage;
use freertos::raw::StaticSemaphore_t;
use freertos::semaphore::{BinarySemaphore, CountingSemaphore, Mutex, RecursiveMutex};
use freertos::task::TaskBuilder;
use freertos::time::{Duration, Forever, NoWait};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{fail_next_allocations, run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn binary_take_on_empty_times_out() {
    init();
    let sem = BinarySemaphore::new().unwrap();

    let start = HostInstant::now();
    assert_eq!(sem.take(NoWait), Err(Error::Timeout));
    assert!(start.elapsed() < std::time::Duration::from_millis(50));

    let start = HostInstant::now();
    assert_eq!(sem.take(Duration::millis(20)), Err(Error::Timeout));
    assert!(start.elapsed() >= std::time::Duration::from_millis(15));
}

#[test]
fn binary_take_once_per_give() {
    init();
    let sem = BinarySemaphore::new().unwrap();
    assert!(!sem.is_available());

    sem.give().unwrap();
    assert_eq!(sem.give(), Err(Error::Full));
    assert!(sem.is_available());

    sem.take(NoWait).unwrap();
    assert_eq!(sem.take(NoWait), Err(Error::Timeout));

    let given = BinarySemaphore::new_given().unwrap();
    given.take(NoWait).unwrap();
}

#[test]
fn counting_to_max() {
    init();
    let sem = CountingSemaphore::new(3, 3).unwrap();
    assert_eq!(sem.count(), 3);
    assert_eq!(sem.max(), 3);

    for _ in 0..3 {
        sem.take(NoWait).unwrap();
    }
    assert_eq!(sem.take(Duration::millis(5)), Err(Error::Timeout));
    assert_eq!(sem.count(), 0);

    for _ in 0..3 {
        sem.give().unwrap();
    }
    assert_eq!(sem.give(), Err(Error::Full));
    assert_eq!(sem.count(), 3);
}

#[test]
fn counting_rejects_bad_counts() {
    init();
    assert_eq!(CountingSemaphore::new(0, 0).err(), Some(Error::InvalidArgument));
    assert_eq!(CountingSemaphore::new(2, 3).err(), Some(Error::InvalidArgument));
}

#[test]
fn isr_variants_never_block() {
    init();
    let sem = CountingSemaphore::new(1, 0).unwrap();

    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        assert_eq!(sem.take_isr(&mut woken), Err(Error::Empty));
        sem.give_isr(&mut woken).unwrap();
        assert_eq!(sem.give_isr(&mut woken), Err(Error::Full));
        assert_eq!(sem.count_isr(), 1);
        // Nothing was waiting, so nothing to switch to.
        assert!(!woken.forget());
    });
    sem.take(NoWait).unwrap();
}

#[test]
fn isr_give_wakes_higher_priority_waiter() {
    init();
    let sem = Arc::new(BinarySemaphore::new().unwrap());
    let done = Arc::new(BinarySemaphore::new().unwrap());

    let task = {
        let sem = sem.clone();
        let done = done.clone();
        TaskBuilder::new()
            .name("waiter")
            .priority(3)
            .spawn(move || {
                if sem.take(Forever).is_ok() {
                    let _ = done.give();
                }
            })
            .unwrap()
    };

    // Let the waiter block.
    freertos::time::sleep(Duration::millis(20));

    let before = stats();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        sem.give_isr(&mut woken).unwrap();
        assert!(woken.is_woken());
    });
    assert_eq!(stats().since(&before).context_switch_requests, 1);

    done.take(Duration::millis(1000)).unwrap();
    drop(task);
}

#[test]
fn mutex_give_by_non_owner() {
    init();
    let mutex = Arc::new(Mutex::new().unwrap());
    assert_eq!(mutex.give(), Err(Error::NotOwner));
    assert_eq!(mutex.holder(), None);

    mutex.take(NoWait).unwrap();
    assert_eq!(mutex.holder(), Some(freertos::task::current_id()));

    let result = Arc::new(freertos::queue::Queue::<Result<(), Error>, 1>::new().unwrap());
    let task = {
        let mutex = mutex.clone();
        let result = result.clone();
        TaskBuilder::new()
            .name("intruder")
            .spawn(move || {
                let _ = result.send(mutex.give(), Forever);
            })
            .unwrap()
    };
    assert_eq!(
        result.receive(Duration::millis(1000)).unwrap(),
        Err(Error::NotOwner)
    );
    drop(task);
    // The refused give left the mutex with its holder.
    assert!(mutex.is_locked());
    assert_eq!(mutex.holder(), Some(freertos::task::current_id()));

    mutex.give().unwrap();
    assert_eq!(mutex.holder(), None);
}

#[test]
fn mutex_guard_gives_back() {
    init();
    let mutex = Mutex::new().unwrap();
    {
        let _guard = mutex.lock(NoWait).unwrap();
        assert!(mutex.holder().is_some());
    }
    assert_eq!(mutex.holder(), None);
    mutex.take(NoWait).unwrap();
    mutex.give().unwrap();
}

#[test]
fn recursive_mutex_needs_matching_gives() {
    init();
    let mutex = Arc::new(RecursiveMutex::new().unwrap());
    mutex.take(NoWait).unwrap();
    mutex.take(NoWait).unwrap();

    let probe = |mutex: &Arc<RecursiveMutex>| {
        let result = Arc::new(freertos::queue::Queue::<bool, 1>::new().unwrap());
        let task = {
            let mutex = mutex.clone();
            let result = result.clone();
            TaskBuilder::new()
                .name("probe")
                .spawn(move || {
                    let got = mutex.take(NoWait).is_ok();
                    if got {
                        let _ = mutex.give();
                    }
                    let _ = result.send(got, Forever);
                })
                .unwrap()
        };
        let got = result.receive(Duration::millis(1000)).unwrap();
        drop(task);
        got
    };

    mutex.give().unwrap();
    // One take is still held.
    assert!(!probe(&mutex));
    assert_eq!(mutex.holder(), Some(freertos::task::current_id()));

    mutex.give().unwrap();
    assert!(probe(&mutex));
    assert_eq!(mutex.give(), Err(Error::NotOwner));
}

#[test]
fn dynamic_create_and_delete_once() {
    init();
    let before = stats();
    let sem = BinarySemaphore::new().unwrap();
    let during = stats().since(&before);
    assert_eq!(during.creates, 1);
    assert!(during.allocations >= 1);

    drop(sem);
    let after = stats().since(&before);
    assert_eq!(after.deletes, 1);
    assert_eq!(after.frees, after.allocations);
}

#[test]
fn failed_create_deletes_nothing() {
    init();
    let before = stats();
    fail_next_allocations(1);
    assert_eq!(Mutex::new().err(), Some(Error::OutOfMemory));
    let after = stats().since(&before);
    assert_eq!(after.creates, 0);
    assert_eq!(after.deletes, 0);
}

static BINARY_STORAGE: StaticStorage<StaticSemaphore_t> = StaticStorage::new();
static COUNTING_STORAGE: StaticStorage<StaticSemaphore_t> = StaticStorage::new();
static MUTEX_STORAGE: StaticStorage<StaticSemaphore_t> = StaticStorage::new();

#[test]
fn static_semaphores_use_no_heap() {
    init();
    let before = stats();
    {
        let binary = BinarySemaphore::new_given_in(&BINARY_STORAGE).unwrap();
        let counting = CountingSemaphore::new_in(&COUNTING_STORAGE, 2, 0).unwrap();
        let mutex = RecursiveMutex::new_in(&MUTEX_STORAGE).unwrap();

        binary.take(NoWait).unwrap();
        counting.give().unwrap();
        let _guard = mutex.lock(NoWait).unwrap();
        assert_eq!(stats().since(&before).creates, 3);
    }
    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.deletes, 3);
}

#[test]
fn static_storage_is_claimed_once() {
    init();
    static STORAGE: StaticStorage<StaticSemaphore_t> = StaticStorage::new();

    let first = BinarySemaphore::new_in(&STORAGE).unwrap();
    assert!(STORAGE.is_claimed());
    assert_eq!(BinarySemaphore::new_in(&STORAGE).err(), Some(Error::InUse));

    drop(first);
    assert!(!STORAGE.is_claimed());
    let again = BinarySemaphore::new_in(&STORAGE).unwrap();
    drop(again);
}

#[test]
fn counting_give_n_stops_at_max() {
    init();
    let sem = CountingSemaphore::new(5, 1).unwrap();
    sem.give_n(3).unwrap();
    assert_eq!(sem.count(), 4);

    // The gives up to the maximum still count.
    assert_eq!(sem.give_n(3), Err(Error::Full));
    assert_eq!(sem.count(), 5);
    sem.give_n(0).unwrap();
    assert_eq!(sem.count(), 5);
}

#[test]
fn mutex_reports_locked() {
    init();
    let mutex = Mutex::new().unwrap();
    assert!(!mutex.is_locked());
    {
        let _guard = mutex.lock(NoWait).unwrap();
        assert!(mutex.is_locked());
    }
    assert!(!mutex.is_locked());

    let recursive = RecursiveMutex::new().unwrap();
    recursive.take(NoWait).unwrap();
    recursive.take(NoWait).unwrap();
    assert!(recursive.is_locked());
    recursive.give().unwrap();
    assert!(recursive.is_locked());
    recursive.give().unwrap();
    assert!(!recursive.is_locked());
}
