// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Console output.
//!
//! All output gathers in one line buffer, held in a [`CriticalMutex`], and goes to the port's
//! console hook (`rust_freertos_putchar` in the shim) when the buffer fills or the writer is done.
//! A [`Console`] holds the critical section for as long as it lives, so what it writes is never
//! split up by another task or an interrupt handler.  Keep it short lived: interrupts are masked
//! while the port writes.
//!
//! The port may refuse bytes, such as when a UART has no room.  Those bytes are dropped and
//! counted in [`lost_bytes`], and the write that lost them gives [`fmt::Error`].
//!
//! ```ignore
//! use core::fmt::Write;
//!
//! let mut out = Console::lock()?;
//! writeln!(out, "reading {}", 42).ok();
//! ```

use core::fmt::{self, Arguments, Write};

use portable_atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::raw::console_write;
use crate::sync::{CriticalMutex, CriticalMutexGuard};

/// Print to the console, without a newline.
///
/// This macro uses the same syntax as std's [`format!`], but writes to the port's console.
///
/// [`format!`]: https://doc.rust-lang.org/stable/std/macro.format.html
#[macro_export]
macro_rules! console {
    ($($arg:tt)*) => {{
        $crate::console::console(format_args!($($arg)*));
    }};
}

/// Print to the console, with a newline.
///
/// This macro uses the same syntax as std's [`format!`], but writes to the port's console.
///
/// [`format!`]: https://doc.rust-lang.org/stable/std/macro.format.html
#[macro_export]
macro_rules! consoleln {
    ($($arg:tt)*) => {{
        $crate::console::consoleln(format_args!($($arg)*));
    }};
}

/// Bytes gathered before each call to the port.
const LINE_SIZE: usize = 64;

static LINE: CriticalMutex<Line> = CriticalMutex::new(Line::new());

static LOST: AtomicUsize = AtomicUsize::new(0);

/// How many bytes the console has dropped, because the port refused them or the console was
/// already in use.
pub fn lost_bytes() -> usize {
    LOST.load(Ordering::Relaxed)
}

fn lose(count: usize) {
    if count > 0 {
        LOST.fetch_add(count, Ordering::Relaxed);
    }
}

struct Line {
    len: usize,
    buf: [u8; LINE_SIZE],
}

impl Line {
    const fn new() -> Line {
        Line {
            len: 0,
            buf: [0; LINE_SIZE],
        }
    }

    fn flush(&mut self) -> fmt::Result {
        let pending = &self.buf[..self.len];
        self.len = 0;
        if pending.is_empty() {
            return Ok(());
        }
        let taken = unsafe { console_write(pending) };
        if taken < pending.len() {
            lose(pending.len() - taken);
            return Err(fmt::Error);
        }
        Ok(())
    }
}

impl Write for Line {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut rest = s;
        let mut result = Ok(());
        while !rest.is_empty() {
            // A char that doesn't fit stays whole for the next buffer.
            let mut split = rest.len().min(LINE_SIZE - self.len);
            while !rest.is_char_boundary(split) {
                split -= 1;
            }
            if split == 0 {
                result = result.and(self.flush());
                continue;
            }
            self.buf[self.len..self.len + split].copy_from_slice(&rest.as_bytes()[..split]);
            self.len += split;
            rest = &rest[split..];
            if self.len == LINE_SIZE {
                result = result.and(self.flush());
            }
        }
        result
    }
}

/// The console, held.  Nothing else is written until this is dropped, which flushes it.
pub struct Console<'a> {
    line: CriticalMutexGuard<'a, Line>,
}

impl Console<'static> {
    /// Hold the console from a task.  Fails with [`Error::InUse`](crate::Error::InUse) when this
    /// task already holds it.
    pub fn lock() -> Result<Console<'static>> {
        Ok(Console { line: LINE.lock()? })
    }

    /// Hold the console from an interrupt handler.
    pub fn lock_isr() -> Result<Console<'static>> {
        Ok(Console {
            line: LINE.lock_isr()?,
        })
    }
}

impl Console<'_> {
    /// Hand everything written so far to the port.
    pub fn flush(&mut self) -> fmt::Result {
        self.line.flush()
    }
}

impl Write for Console<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.line.write_str(s)
    }
}

impl Drop for Console<'_> {
    fn drop(&mut self) {
        // Anything refused is already counted.
        let _ = self.line.flush();
    }
}

/// Counts what a message would have written.
struct Measure(usize);

impl Write for Measure {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

fn print(args: Arguments<'_>, newline: bool) {
    let mut console = match Console::lock() {
        Ok(console) => console,
        Err(_) => {
            // Printing from inside a print, such as in a Display impl.
            let mut measure = Measure(newline as usize);
            let _ = fmt::write(&mut measure, args);
            lose(measure.0);
            return;
        }
    };
    // Failures are counted as they happen.
    let _ = console.write_fmt(args);
    if newline {
        let _ = console.write_str("\n");
    }
}

#[doc(hidden)]
pub fn console(args: Arguments<'_>) {
    print(args, false)
}

#[doc(hidden)]
pub fn consoleln(args: Arguments<'_>) {
    print(args, true)
}
