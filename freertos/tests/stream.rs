// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Stream and message buffers, on the simulated kernel.

use std::sync::Arc;

use freertos::object::StaticStorage;
use freertos::queue::Queue;
use freertos::stream::{MessageBuffer, StreamBuffer, StreamStorage, MESSAGE_LENGTH_BYTES};
use freertos::task::TaskBuilder;
use freertos::time::{sleep, Duration, Forever, NoWait};
use freertos::{Error, TaskWoken};
use freertos_sys::sim::{fail_next_allocations, run_as_isr, stats};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn writes_are_partial() {
    init();
    let stream = StreamBuffer::<8>::new(1).unwrap();
    assert_eq!(stream.capacity(), 8);
    assert!(stream.is_empty());

    assert_eq!(stream.send(b"hello world", NoWait), Ok(8));
    assert!(stream.is_full());
    assert_eq!(stream.send(b"!", NoWait), Err(Error::Full));
    assert_eq!(stream.send(b"!", Duration::millis(10)), Err(Error::Timeout));

    let mut buf = [0u8; 4];
    assert_eq!(stream.receive(&mut buf, NoWait), Ok(4));
    assert_eq!(&buf, b"hell");
    assert_eq!(stream.bytes_available(), 4);
    assert_eq!(stream.spaces_available(), 4);

    let mut rest = [0u8; 16];
    assert_eq!(stream.receive(&mut rest, NoWait), Ok(4));
    assert_eq!(&rest[..4], b"o wo");
}

#[test]
fn empty_stream_reports_why() {
    init();
    let stream = StreamBuffer::<8>::new(1).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(stream.receive(&mut buf, NoWait), Err(Error::Empty));
    assert_eq!(stream.receive(&mut buf, Duration::millis(10)), Err(Error::Timeout));

    // Moving nothing is not an error.
    assert_eq!(stream.send(b"", NoWait), Ok(0));
    assert_eq!(stream.receive(&mut [], NoWait), Ok(0));
}

#[test]
fn trigger_level_holds_back_reader() {
    init();
    let stream = Arc::new(StreamBuffer::<16>::new(4).unwrap());
    let result = Arc::new(Queue::<usize, 1>::new().unwrap());

    let task = {
        let stream = stream.clone();
        let result = result.clone();
        TaskBuilder::new()
            .name("reader")
            .spawn(move || {
                let mut buf = [0u8; 16];
                let got = stream.receive(&mut buf, Forever).unwrap_or(0);
                let _ = result.send(got, Forever);
            })
            .unwrap()
    };

    // Let the reader block.
    sleep(Duration::millis(20));
    stream.send(b"ab", NoWait).unwrap();
    sleep(Duration::millis(20));
    assert!(result.is_empty());

    stream.send(b"cd", NoWait).unwrap();
    assert_eq!(result.receive(Duration::millis(1000)), Ok(4));
    drop(task);
}

#[test]
fn trigger_levels_checked() {
    init();
    assert_eq!(StreamBuffer::<4>::new(5).err(), Some(Error::InvalidArgument));

    let stream = StreamBuffer::<4>::new(0).unwrap();
    stream.set_trigger_level(4).unwrap();
    assert_eq!(stream.set_trigger_level(5), Err(Error::InvalidArgument));
}

#[test]
fn reset_discards() {
    init();
    let stream = StreamBuffer::<8>::new(1).unwrap();
    stream.send(b"stale", NoWait).unwrap();
    stream.reset().unwrap();
    assert!(stream.is_empty());
    assert_eq!(stream.spaces_available(), 8);
}

#[test]
fn stream_isr_side() {
    init();
    let stream = StreamBuffer::<4>::new(1).unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        let mut buf = [0u8; 4];
        assert_eq!(stream.receive_isr(&mut buf, &mut woken), Err(Error::Empty));
        assert_eq!(stream.send_isr(b"isr!", &mut woken), Ok(4));
        assert_eq!(stream.send_isr(b"more", &mut woken), Err(Error::Full));
        assert_eq!(stream.receive_isr(&mut buf[..2], &mut woken), Ok(2));
        assert!(!woken.forget());
    });
    let mut buf = [0u8; 4];
    assert_eq!(stream.receive(&mut buf, NoWait), Ok(2));
    assert_eq!(&buf[..2], b"r!");
}

#[test]
fn messages_stay_whole() {
    init();
    let messages = MessageBuffer::<64>::new().unwrap();
    assert_eq!(messages.next_len(), None);

    messages.send(b"one", NoWait).unwrap();
    messages.send(b"three", NoWait).unwrap();
    assert_eq!(messages.next_len(), Some(3));
    assert_eq!(messages.bytes_available(), 3 + 5 + 2 * MESSAGE_LENGTH_BYTES);

    // Too small for the next message, which stays put.
    let mut small = [0u8; 2];
    assert_eq!(messages.receive(&mut small, NoWait), Err(Error::Full));
    assert_eq!(messages.next_len(), Some(3));

    let mut buf = [0u8; 16];
    assert_eq!(messages.receive(&mut buf, NoWait), Ok(3));
    assert_eq!(&buf[..3], b"one");
    assert_eq!(messages.receive(&mut buf, NoWait), Ok(5));
    assert_eq!(&buf[..5], b"three");
    assert_eq!(messages.receive(&mut buf, NoWait), Err(Error::Empty));
    assert!(messages.is_empty());
}

#[test]
fn message_room() {
    init();
    let messages = MessageBuffer::<32>::new().unwrap();
    let max = MessageBuffer::<32>::MAX_MESSAGE;
    assert_eq!(max, 32 - MESSAGE_LENGTH_BYTES);

    let long = [7u8; 33];
    assert_eq!(messages.send(&long[..max + 1], NoWait), Err(Error::InvalidArgument));
    messages.send(&long[..max], NoWait).unwrap();
    assert!(messages.is_full());
    assert_eq!(messages.send(b"x", NoWait), Err(Error::Full));
    assert_eq!(messages.send(b"x", Duration::millis(10)), Err(Error::Timeout));

    messages.reset().unwrap();
    assert_eq!(messages.spaces_available(), 32);
}

#[test]
fn message_isr_side() {
    init();
    let messages = MessageBuffer::<32>::new().unwrap();
    run_as_isr(|| {
        let mut woken = TaskWoken::new();
        messages.send_isr(b"tick", &mut woken).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(messages.receive_isr(&mut buf, &mut woken), Ok(4));
        assert_eq!(messages.receive_isr(&mut buf, &mut woken), Err(Error::Empty));
        woken.forget();
    });
}

#[test]
fn create_and_delete_once() {
    init();
    let before = stats();
    drop(StreamBuffer::<32>::new(1).unwrap());
    drop(MessageBuffer::<32>::new().unwrap());
    let after = stats().since(&before);
    assert_eq!(after.creates, 2);
    assert_eq!(after.deletes, 2);
    assert_eq!(after.allocations, after.frees);

    let before = stats();
    fail_next_allocations(1);
    assert_eq!(StreamBuffer::<32>::new(1).err(), Some(Error::OutOfMemory));
    assert_eq!(stats().since(&before).creates, 0);
}

static STREAM_STORAGE: StaticStorage<StreamStorage<16>> = StaticStorage::new();
static MESSAGE_STORAGE: StaticStorage<StreamStorage<24>> = StaticStorage::new();

#[test]
fn static_buffers_use_no_heap() {
    init();
    let before = stats();
    {
        let stream = StreamBuffer::new_in(&STREAM_STORAGE, 1).unwrap();
        assert_eq!(stream.spaces_available(), 16);
        assert_eq!(stream.send(&[1u8; 20], NoWait), Ok(16));
        assert_eq!(
            StreamBuffer::<16, _>::new_in(&STREAM_STORAGE, 1).err(),
            Some(Error::InUse)
        );

        let messages = MessageBuffer::new_in(&MESSAGE_STORAGE).unwrap();
        messages.send(b"static", NoWait).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(messages.receive(&mut buf, NoWait), Ok(6));
    }
    let after = stats().since(&before);
    assert_eq!(after.allocations, 0);
    assert_eq!(after.creates, 2);
    assert_eq!(after.deletes, 2);
    assert!(!STREAM_STORAGE.is_claimed());
    assert!(!MESSAGE_STORAGE.is_claimed());
}
