// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Data-owning locks, on the simulated kernel.

use std::sync::Arc;

use static_assertions::{assert_impl_all, assert_not_impl_any};

use freertos::critical::{CriticalSection, InterruptMask, IsrCriticalSection};
use freertos::object::StaticStorage;
use freertos::queue::Queue;
use freertos::raw::StaticSemaphore_t;
use freertos::sync::{CriticalMutex, CriticalMutexGuard, Mutex, MutexGuard};
use freertos::task::TaskBuilder;
use freertos::time::{Duration, Forever};
use freertos::Error;
use freertos_sys::sim::{critical_nesting, run_as_isr, stats};

assert_impl_all!(Mutex<u32>: Send, Sync);
assert_not_impl_any!(MutexGuard<'static, u32>: Send);
assert_impl_all!(CriticalMutex<u32>: Send, Sync);
assert_not_impl_any!(CriticalMutexGuard<'static, u32>: Send);
assert_not_impl_any!(Mutex<std::rc::Rc<u32>>: Send, Sync);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn mutex_shares_data_between_tasks() {
    init();
    let total = Arc::new(Mutex::new(0u32).unwrap());
    let done = Arc::new(Queue::<bool, 3>::new().unwrap());

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let total = total.clone();
            let done = done.clone();
            TaskBuilder::new()
                .name("adder")
                .spawn(move || {
                    let mut ok = true;
                    for _ in 0..100 {
                        match total.lock() {
                            Ok(mut n) => *n += 1,
                            Err(_) => ok = false,
                        }
                    }
                    let _ = done.send(ok, Forever);
                })
                .unwrap()
        })
        .collect();

    for _ in 0..3 {
        assert_eq!(done.receive(Duration::millis(2000)), Ok(true));
    }
    assert_eq!(*total.lock().unwrap(), 300);
    drop(tasks);
}

#[test]
fn held_mutex_refuses_others() {
    init();
    let shared = Arc::new(Mutex::new([0u8; 4]).unwrap());
    let result = Arc::new(Queue::<Result<(), Error>, 1>::new().unwrap());

    let mut guard = shared.lock().unwrap();
    guard[0] = 1;

    let task = {
        let shared = shared.clone();
        let result = result.clone();
        TaskBuilder::new()
            .name("contender")
            .spawn(move || {
                let got = shared.try_lock_for(Duration::millis(10)).map(|_| ());
                let _ = result.send(got, Forever);
            })
            .unwrap()
    };
    assert_eq!(
        result.receive(Duration::millis(1000)).unwrap(),
        Err(Error::Timeout)
    );
    drop(task);

    drop(guard);
    assert_eq!(shared.try_lock().unwrap()[0], 1);
}

#[test]
fn exclusive_access_needs_no_lock() {
    init();
    let mut mutex = Mutex::new(String::from("owned")).unwrap();
    mutex.get_mut().push_str(" data");
    assert_eq!(mutex.into_inner(), "owned data");
}

#[test]
fn static_mutex_uses_no_heap() {
    init();
    static STORAGE: StaticStorage<StaticSemaphore_t> = StaticStorage::new();

    let before = stats();
    {
        let mutex = Mutex::new_in(&STORAGE, 5u8).unwrap();
        *mutex.lock().unwrap() += 1;
        assert_eq!(*mutex.try_lock().unwrap(), 6);
    }
    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.deletes, 1);
    assert!(!STORAGE.is_claimed());
}

#[test]
fn critical_mutex_holds_section() {
    init();
    let counter = CriticalMutex::new(0u32);
    assert_eq!(critical_nesting(), 0);
    {
        let mut n = counter.lock().unwrap();
        *n += 1;
        assert_eq!(critical_nesting(), 1);

        // Locking again from inside would alias the data.
        assert_eq!(counter.lock().err(), Some(Error::InUse));
        assert_eq!(critical_nesting(), 1);
    }
    assert_eq!(critical_nesting(), 0);

    assert_eq!(counter.with(|n| {
        *n += 1;
        *n
    }), Ok(2));
    assert_eq!(counter.into_inner(), 2);
}

static SHARED_WITH_ISR: CriticalMutex<u32> = CriticalMutex::new(0);

#[test]
fn critical_mutex_from_isr() {
    init();
    run_as_isr(|| {
        if let Ok(mut n) = SHARED_WITH_ISR.lock_isr() {
            *n += 10;
        }
    });
    assert_eq!(SHARED_WITH_ISR.with(|n| *n), Ok(10));
}

#[test]
fn critical_sections_nest() {
    init();
    {
        let _outer = CriticalSection::enter();
        assert_eq!(CriticalSection::with(critical_nesting), 2);
        assert_eq!(critical_nesting(), 1);
    }
    assert_eq!(critical_nesting(), 0);

    let inside = run_as_isr(|| {
        let _outer = IsrCriticalSection::enter();
        IsrCriticalSection::with(critical_nesting)
    });
    assert_eq!(inside, 2);
    assert_eq!(critical_nesting(), 0);

    {
        let _masked = InterruptMask::disable();
        assert_eq!(critical_nesting(), 1);
    }
    assert_eq!(critical_nesting(), 0);
}
