// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Data-owning locks.
//!
//! These are modeled after [`std::sync::Mutex`](https://doc.rust-lang.org/stable/std/sync/struct.Mutex.html):
//! the lock owns the data it protects, and the data can only be reached through a guard.
//!
//! - [`Mutex`] blocks on a kernel mutex, with priority inheritance.  Task context only.
//! - [`CriticalMutex`] holds a critical section while locked, so it can also be used from an
//!   interrupt handler.  Hold it briefly: interrupts are masked the whole time.

pub mod atomic {
    //! Re-export portable atomic.
    //!
    //! Not every target has atomic instructions for every width, and `core::sync::atomic` leaves
    //! out the types the target can't support.  `portable-atomic` fills them in with critical
    //! sections where needed, and otherwise just re-exports `core`.

    pub use portable_atomic::*;
}

mod critical_mutex;
#[cfg(configUSE_MUTEXES)]
mod mutex;

pub use critical_mutex::{CriticalMutex, CriticalMutexGuard};
#[cfg(configUSE_MUTEXES)]
pub use mutex::{Mutex, MutexGuard};
