// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Software timers and pended calls, on the simulated kernel.
//!
//! The daemon frees what it deletes on its own thread, so heap counts here only cover what the
//! test thread does itself.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use freertos::object::StaticStorage;
use freertos::time::{sleep, tick_count, Duration, Forever, NoWait};
use freertos::timer::{pend_function_call, pend_function_call_isr, Timer, TimerStorage};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{fail_next_allocations, run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::millis(5));
    }
    cond()
}

fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn one_shot_fires_once() {
    init();
    let (count, callback) = counter();
    let timer = Timer::new(c"one-shot", Duration::millis(10), false, callback).unwrap();
    assert!(!timer.is_active());
    assert_eq!(timer.name(), c"one-shot");

    timer.start(Forever).unwrap();
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
    assert!(eventually(|| !timer.is_active()));
    sleep(Duration::millis(30));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn auto_reload_until_stopped() {
    init();
    let (count, callback) = counter();
    let timer = Timer::new(c"reload", Duration::millis(5), true, callback).unwrap();
    timer.start(NoWait).unwrap();
    assert!(eventually(|| count.load(Ordering::SeqCst) >= 4));
    assert!(timer.is_active());

    timer.stop(Forever).unwrap();
    assert!(!timer.is_active());
    let stopped = count.load(Ordering::SeqCst);
    sleep(Duration::millis(30));
    assert_eq!(count.load(Ordering::SeqCst), stopped);
}

#[test]
fn period_and_expiry() {
    init();
    let (_count, callback) = counter();
    let timer = Timer::new(c"slow", Duration::millis(1000), false, callback).unwrap();
    assert_eq!(timer.period(), Duration::millis(1000));

    timer.start(Forever).unwrap();
    let left = timer.expiry_time().ticks().wrapping_sub(tick_count().ticks());
    assert!(left <= 1000 && left > 900, "{} ticks left", left);

    timer.change_period(Duration::millis(2000), Forever).unwrap();
    assert_eq!(timer.period(), Duration::millis(2000));
    assert!(timer.is_active());
    timer.reset(Forever).unwrap();
    timer.stop(Forever).unwrap();

    assert_eq!(
        timer.change_period(Duration::millis(0), Forever),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn zero_period_rejected() {
    init();
    let (_count, callback) = counter();
    let before = stats();
    let made = Timer::new(c"never", Duration::millis(0), false, callback);
    assert_eq!(made.err(), Some(Error::InvalidArgument));
    assert_eq!(stats().since(&before).creates, 0);
}

#[test]
fn failed_create_deletes_nothing() {
    init();
    let (_count, callback) = counter();
    let before = stats();
    fail_next_allocations(1);
    let made = Timer::new(c"no-memory", Duration::millis(10), false, callback);
    assert_eq!(made.err(), Some(Error::OutOfMemory));
    let after = stats().since(&before);
    assert_eq!(after.creates, 0);
    assert_eq!(after.deletes, 0);
}

#[test]
fn drop_frees_callback_after_daemon() {
    init();
    struct Flag(Arc<AtomicUsize>);
    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let flag = Flag(drops.clone());
    let timer = Timer::new(c"owned", Duration::millis(1), true, move || {
        let _flag = &flag;
    })
    .unwrap();
    timer.start(Forever).unwrap();
    sleep(Duration::millis(10));

    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(timer);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn isr_commands() {
    init();
    let (count, callback) = counter();
    let timer = Timer::new(c"from-isr", Duration::millis(5), false, callback).unwrap();

    let before = stats();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        timer.start_isr(&mut woken).unwrap();
        // The daemon outranks the interrupted task.
        assert!(woken.is_woken());
    });
    assert_eq!(stats().since(&before).context_switch_requests, 1);
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));

    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        timer.change_period_isr(Duration::millis(500), &mut woken).unwrap();
        timer.reset_isr(&mut woken).unwrap();
        timer.stop_isr(&mut woken).unwrap();
        assert_eq!(
            timer.change_period_isr(Duration::millis(0), &mut woken),
            Err(Error::InvalidArgument)
        );
    });
    assert!(eventually(|| !timer.is_active()));
    assert!(eventually(|| timer.period() == Duration::millis(500)));
}

static STATIC_FIRED: AtomicUsize = AtomicUsize::new(0);
static TIMER_STORAGE: StaticStorage<TimerStorage<fn()>> = StaticStorage::new();

fn static_fired() {
    STATIC_FIRED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn static_timer_uses_no_heap() {
    init();
    let before = stats();
    let timer = Timer::new_in(
        &TIMER_STORAGE,
        c"static",
        Duration::millis(5),
        false,
        static_fired as fn(),
    )
    .unwrap();
    assert!(TIMER_STORAGE.is_claimed());
    timer.start(Forever).unwrap();
    assert!(eventually(|| STATIC_FIRED.load(Ordering::SeqCst) == 1));
    drop(timer);

    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.creates, 1);
    assert!(!TIMER_STORAGE.is_claimed());
}

static PENDED: AtomicU32 = AtomicU32::new(0);

fn record(arg: u32) {
    PENDED.fetch_add(arg, Ordering::SeqCst);
}

#[test]
fn pended_calls_run_on_daemon() {
    init();
    pend_function_call(record, 5, Forever).unwrap();
    assert!(eventually(|| PENDED.load(Ordering::SeqCst) == 5));

    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        pend_function_call_isr(record, 10, &mut woken).unwrap();
        assert!(woken.is_woken());
    });
    assert!(eventually(|| PENDED.load(Ordering::SeqCst) == 15));
}
