// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Rust logging on FreeRTOS
//!
//! The kernel has no logging subsystem of its own, so logging from Rust goes through the `log`
//! crate, and each message is written out whole over the [console](crate::console), stamped with
//! the tick count:
//!
//! ```text
//! [    1042] WARN  freertos::timer: timer 0x20001a40: daemon not flushed, leaking callback
//! ```
//!
//! The library itself logs object creation and deletion at `trace` level, and uses `warn` when a
//! drop observes a kernel failure it has no way to return.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::console::Console;
use crate::time::tick_count;

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // A message logged while the console is held is counted as lost by the console.
        let Ok(mut out) = Console::lock() else {
            crate::console::consoleln(*record.args());
            return;
        };
        let _ = writeln!(
            out,
            "[{:8}] {:<5} {}: {}",
            tick_count().ticks(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static CONSOLE_LOGGER: ConsoleLogger = ConsoleLogger;

/// Send log messages at `Info` and above to the console.
///
/// # Safety
///
/// On targets without atomic pointers, this must not race with any other use of the `log` crate.
/// Calling it once, before the scheduler is started, is enough.
pub unsafe fn set_logger() -> Result<(), SetLoggerError> {
    set_logger_with_level(LevelFilter::Info)
}

/// Send log messages at `level` and above to the console.
///
/// # Safety
///
/// The same as [`set_logger`].
pub unsafe fn set_logger_with_level(level: LevelFilter) -> Result<(), SetLoggerError> {
    set_logger_internal(&CONSOLE_LOGGER, level)
}

// The log crate has different entry points depending on whether the target has atomic pointers.
// The racy ones are only sound if nothing else is touching the logger, which holds as long as this
// is called before the scheduler starts.
cfg_if::cfg_if! {
    if #[cfg(target_has_atomic = "ptr")] {
        unsafe fn set_logger_internal(
            logger: &'static dyn Log,
            level: LevelFilter,
        ) -> Result<(), SetLoggerError> {
            log::set_logger(logger)?;
            log::set_max_level(level);
            Ok(())
        }
    } else {
        unsafe fn set_logger_internal(
            logger: &'static dyn Log,
            level: LevelFilter,
        ) -> Result<(), SetLoggerError> {
            log::set_logger_racy(logger)?;
            log::set_max_level_racy(level);
            Ok(())
        }
    }
}
