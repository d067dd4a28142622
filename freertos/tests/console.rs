// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Console output and the console logger, on the simulated kernel.
//!
//! The simulator's console hook can be captured and limited per thread, which stands in for a
//! UART that runs out of room.

use std::fmt::{self, Write};
use std::sync::Mutex;

use log::LevelFilter;

use freertos::console::{lost_bytes, Console};
use freertos::{console, consoleln, Error};
use freertos_sys::sim::{capture_console, critical_nesting, limit_console, run_as_isr};

/// The lost byte count is shared by every test here.
static LOSSES: Mutex<()> = Mutex::new(());

#[test]
fn lines_reach_the_port_whole() {
    let ((), out) = capture_console(|| {
        consoleln!("reading {}", 5);
        console!("a");
        console!("b\n");
    });
    assert_eq!(out, b"reading 5\nab\n");
}

#[test]
fn long_text_spans_buffers() {
    let text: String = "é…ok ".repeat(40);
    let ((), out) = capture_console(|| consoleln!("{}", text));
    assert_eq!(out, format!("{}\n", text).into_bytes());
}

#[test]
fn refused_bytes_are_counted() {
    let _serial = LOSSES.lock().unwrap_or_else(|e| e.into_inner());
    let before = lost_bytes();
    let ((), out) = capture_console(|| {
        limit_console(Some(10));
        consoleln!("0123456789abcdef");
        limit_console(None);
    });
    assert_eq!(out, b"0123456789");
    assert_eq!(lost_bytes() - before, 7);
}

#[test]
fn console_flush_reports_failure() {
    let _serial = LOSSES.lock().unwrap_or_else(|e| e.into_inner());
    let before = lost_bytes();
    let ((written, flushed), out) = capture_console(|| {
        limit_console(Some(4));
        let mut console = Console::lock().unwrap();
        // Still in the buffer.
        let written = write!(console, "abcdefgh");
        let flushed = console.flush();
        limit_console(None);
        (written, flushed)
    });
    assert_eq!(written, Ok(()));
    assert_eq!(flushed, Err(fmt::Error));
    assert_eq!(out, b"abcd");
    assert_eq!(lost_bytes() - before, 4);
}

struct Noisy;

impl fmt::Display for Noisy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        consoleln!("inner");
        f.write_str("outer")
    }
}

#[test]
fn print_inside_print_is_dropped() {
    let _serial = LOSSES.lock().unwrap_or_else(|e| e.into_inner());
    let before = lost_bytes();
    let ((), out) = capture_console(|| consoleln!("{}", Noisy));
    assert_eq!(out, b"outer\n");
    assert_eq!(lost_bytes() - before, "inner\n".len());
}

#[test]
fn held_console_is_a_critical_section() {
    let ((), out) = capture_console(|| {
        let mut console = Console::lock().unwrap();
        assert_eq!(critical_nesting(), 1);
        assert_eq!(Console::lock().err(), Some(Error::InUse));
        let _ = console.write_str("held");
        drop(console);
        assert_eq!(critical_nesting(), 0);

        run_as_isr(|| {
            if let Ok(mut console) = Console::lock_isr() {
                let _ = console.write_str(" isr");
            }
        });
    });
    assert_eq!(out, b"held isr");
}

#[test]
fn logger_stamps_and_filters() {
    unsafe { freertos::logging::set_logger_with_level(LevelFilter::Info) }.unwrap();
    let ((), out) = capture_console(|| {
        log::info!(target: "sensor", "reading {}", 3);
        log::debug!(target: "sensor", "hidden");
    });
    let out = String::from_utf8(out).unwrap();
    assert_eq!(out.lines().count(), 1);
    assert!(out.starts_with('['));
    assert!(out.ends_with("] INFO  sensor: reading 3\n"));
}
