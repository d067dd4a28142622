// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Critical section based mutexes
//!
//! A kernel mutex can't be taken from an interrupt handler.  A [`CriticalMutex`] instead masks
//! interrupts for as long as it is locked, which keeps both other tasks and interrupt handlers out.
//! It works in both contexts, as [`lock`](CriticalMutex::lock) from a task and
//! [`lock_isr`](CriticalMutex::lock_isr) from a handler.
//!
//! Critical sections nest, so a second lock of the same mutex on the same task would get in.  That
//! is caught with a flag, and fails with [`Error::InUse`] instead of handing out a second mutable
//! reference.  As nothing can block while the mutex is held, there is no waiting for the lock.

use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::critical::{CriticalSection, IsrCriticalSection};
use crate::error::{Error, Result};

/// Data protected by a critical section.
pub struct CriticalMutex<T: ?Sized> {
    locked: Cell<bool>,
    data: UnsafeCell<T>,
}

// The flag and data are only touched inside a critical section.
unsafe impl<T: ?Sized + Send> Send for CriticalMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for CriticalMutex<T> {}

impl<T> fmt::Debug for CriticalMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CriticalMutex {{ locked: {} }}", self.locked.get())
    }
}

enum Section {
    Task(#[allow(dead_code)] CriticalSection),
    Isr(#[allow(dead_code)] IsrCriticalSection),
}

/// A held [`CriticalMutex`].  The critical section ends when this is dropped.
pub struct CriticalMutexGuard<'a, T: ?Sized + 'a> {
    lock: &'a CriticalMutex<T>,
    // Dropped after the flag is cleared.  Also makes the guard !Send.
    _section: Section,
}

impl<T> CriticalMutex<T> {
    /// Wrap `t`.  Usable in a `static`.
    pub const fn new(t: T) -> CriticalMutex<T> {
        CriticalMutex {
            locked: Cell::new(false),
            data: UnsafeCell::new(t),
        }
    }

    /// Take back the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> CriticalMutex<T> {
    /// Lock from a task.
    pub fn lock(&self) -> Result<CriticalMutexGuard<'_, T>> {
        self.guard(Section::Task(CriticalSection::enter()))
    }

    /// Lock from an interrupt handler.
    pub fn lock_isr(&self) -> Result<CriticalMutexGuard<'_, T>> {
        self.guard(Section::Isr(IsrCriticalSection::enter()))
    }

    /// Run `f` on the data, from a task.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// The data, through an exclusive borrow.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn guard(&self, section: Section) -> Result<CriticalMutexGuard<'_, T>> {
        if self.locked.replace(true) {
            // The section ends as it drops here.
            return Err(Error::InUse);
        }
        Ok(CriticalMutexGuard {
            lock: self,
            _section: section,
        })
    }
}

impl<T: ?Sized> Deref for CriticalMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for CriticalMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for CriticalMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.set(false);
    }
}
