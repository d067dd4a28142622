// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # FreeRTOS errors
//!
//! The kernel reports most failures as `pdFAIL` (or a null handle), leaving the reason to the
//! context of the call.  The wrappers know that context, and turn each failure into one of the
//! variants of [`Error`].

use core::fmt;

use crate::raw::{pdFALSE, BaseType_t};

/// A failed kernel operation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A blocking wait ended before the operation could complete.
    Timeout,
    /// There was no room: the queue or buffer was full, or the semaphore was at its maximum.
    Full,
    /// There was nothing to take, in a call that does not block.
    Empty,
    /// A mutex was given back by a task that does not hold it.
    NotOwner,
    /// An argument was out of range for this kernel configuration.
    InvalidArgument,
    /// The kernel heap could not satisfy an allocation.
    OutOfMemory,
    /// Static storage that is already backing another object.
    InUse,
}

impl Error {
    fn describe(&self) -> &'static str {
        match self {
            Error::Timeout => "timed out",
            Error::Full => "no space available",
            Error::Empty => "nothing available",
            Error::NotOwner => "not the owner",
            Error::InvalidArgument => "invalid argument",
            Error::OutOfMemory => "out of kernel heap",
            Error::InUse => "static storage already in use",
        }
    }
}

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "freertos error: {}", self.describe())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "freertos error: {}", self.describe())
    }
}

/// Wraps a value with a possible FreeRTOS error.
pub type Result<T> = core::result::Result<T, Error>;

/// Map a `pdPASS`/`pdFAIL` return into a Result, with the error to use on failure.
#[inline(always)]
pub(crate) fn to_result(code: BaseType_t, err: Error) -> Result<()> {
    if code == pdFALSE {
        Err(err)
    } else {
        Ok(())
    }
}

/// Map a created handle into a Result, null meaning the kernel heap was exhausted.
#[inline(always)]
pub(crate) fn check_handle<T>(handle: *mut T) -> Result<*mut T> {
    if handle.is_null() {
        Err(Error::OutOfMemory)
    } else {
        Ok(handle)
    }
}
