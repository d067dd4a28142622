// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Queues, on the simulated kernel.

use std::sync::Arc;
use std::time::Instant as HostInstant;

use freertos::object::StaticStorage;
use freertos::queue::{Queue, QueueStorage};
use freertos::task::TaskBuilder;
use freertos::time::{Duration, Forever, NoWait};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{fail_next_allocations, run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn fifo_and_full() {
    init();
    let queue = Queue::<u32, 2>::new().unwrap();
    queue.send(1, NoWait).unwrap();
    queue.send(2, NoWait).unwrap();
    assert_eq!(queue.send(3, NoWait), Err(Error::Full));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.spaces(), 0);

    assert_eq!(queue.receive(NoWait), Ok(1));
    assert_eq!(queue.receive(NoWait), Ok(2));
    assert_eq!(queue.receive(NoWait), Err(Error::Empty));
    assert!(queue.is_empty());
}

#[test]
fn waiting_reports_timeout() {
    init();
    let queue = Queue::<u8, 1>::new().unwrap();
    queue.send(7, NoWait).unwrap();

    let start = HostInstant::now();
    assert_eq!(queue.send(8, Duration::millis(10)), Err(Error::Timeout));
    assert!(start.elapsed() >= std::time::Duration::from_millis(5));

    queue.reset();
    assert_eq!(queue.receive(Duration::millis(10)), Err(Error::Timeout));
    assert_eq!(queue.peek(Duration::millis(1)), Err(Error::Timeout));
}

#[test]
fn send_to_front_jumps_the_line() {
    init();
    let queue = Queue::<i16, 3>::new().unwrap();
    queue.send_to_back(1, NoWait).unwrap();
    queue.send_to_back(2, NoWait).unwrap();
    queue.send_to_front(-1, NoWait).unwrap();

    assert_eq!(queue.peek(NoWait), Ok(-1));
    assert_eq!(queue.receive(NoWait), Ok(-1));
    assert_eq!(queue.receive(NoWait), Ok(1));
    assert_eq!(queue.receive(NoWait), Ok(2));
}

#[test]
fn mailbox_overwrite() {
    init();
    let mailbox = Queue::<(u16, u16), 1>::new().unwrap();
    mailbox.overwrite((1, 1));
    mailbox.overwrite((2, 2));
    assert_eq!(mailbox.len(), 1);
    assert_eq!(mailbox.peek(NoWait), Ok((2, 2)));

    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        mailbox.overwrite_isr((3, 3), &mut woken);
        assert_eq!(mailbox.peek_isr(), Ok((3, 3)));
        woken.forget();
    });
    assert_eq!(mailbox.receive(NoWait), Ok((3, 3)));
}

#[test]
fn isr_side() {
    init();
    let queue = Queue::<u32, 2>::new().unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        assert!(queue.is_empty_isr());
        assert_eq!(queue.receive_isr(&mut woken), Err(Error::Empty));
        assert_eq!(queue.peek_isr(), Err(Error::Empty));

        queue.send_isr(10, &mut woken).unwrap();
        queue.send_to_front_isr(5, &mut woken).unwrap();
        assert!(queue.is_full_isr());
        assert_eq!(queue.len_isr(), 2);
        assert_eq!(queue.send_isr(20, &mut woken), Err(Error::Full));

        assert_eq!(queue.receive_isr(&mut woken), Ok(5));
        assert!(!woken.forget());
    });
    assert_eq!(queue.receive(NoWait), Ok(10));
}

#[test]
fn blocked_receiver_gets_sent_value() {
    init();
    let requests = Arc::new(Queue::<u32, 4>::new().unwrap());
    let replies = Arc::new(Queue::<u32, 4>::new().unwrap());

    let task = {
        let requests = requests.clone();
        let replies = replies.clone();
        TaskBuilder::new()
            .name("doubler")
            .spawn(move || {
                while let Ok(n) = requests.receive(Forever) {
                    if n == 0 || replies.send(n * 2, Forever).is_err() {
                        break;
                    }
                }
            })
            .unwrap()
    };

    for n in 1..=10 {
        requests.send(n, Forever).unwrap();
        assert_eq!(replies.receive(Duration::millis(1000)), Ok(n * 2));
    }
    requests.send(0, Forever).unwrap();
    drop(task);
}

#[test]
fn registry_name() {
    init();
    let mut queue = Queue::<u8, 4>::new().unwrap();
    assert_eq!(queue.name(), None);
    queue.set_name(c"commands");
    assert_eq!(queue.name(), Some(c"commands"));
}

#[test]
fn create_and_delete_once() {
    init();
    let before = stats();
    let queue = Queue::<u64, 8>::new().unwrap();
    assert_eq!(queue.capacity(), 8);
    drop(queue);
    let after = stats().since(&before);
    assert_eq!(after.creates, 1);
    assert_eq!(after.deletes, 1);
    assert_eq!(after.allocations, after.frees);
    assert!(freertos::heap::free_size() > 0);

    fail_next_allocations(1);
    let before = stats();
    assert_eq!(Queue::<u64, 8>::new().err(), Some(Error::OutOfMemory));
    let after = stats().since(&before);
    assert_eq!(after.creates, 0);
    assert_eq!(after.deletes, 0);
}

#[test]
fn static_queue_uses_no_heap() {
    init();
    static STORAGE: StaticStorage<QueueStorage<u32, 4>> = StaticStorage::new();

    let before = stats();
    {
        let queue = Queue::new_in(&STORAGE).unwrap();
        for n in 0..4 {
            queue.send(n, NoWait).unwrap();
        }
        assert_eq!(queue.send(4, NoWait), Err(Error::Full));
        assert_eq!(Queue::<u32, 4, _>::new_in(&STORAGE).err(), Some(Error::InUse));
        assert_eq!(queue.receive(NoWait), Ok(0));
    }
    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.creates, 1);
    assert_eq!(after.deletes, 1);
    assert!(!STORAGE.is_claimed());
}
