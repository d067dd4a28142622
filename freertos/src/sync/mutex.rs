// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! A kernel mutex that owns its data.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use log::warn;

use crate::error::Result;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::StaticSemaphore_t;
use crate::semaphore::{self, SemaphoreAllocator};
use crate::time::{Forever, NoWait, Timeout};

/// A mutual exclusion lock protecting a `T`.
///
/// Differences from `std::sync::Mutex`:
/// - No poisoning.  A panic halts the system.
/// - Locking can fail: creation may have no memory, and a bounded wait may time out.  With
///   [`lock`](Mutex::lock), which waits forever, it only fails if the kernel refuses the take.
/// - Locking twice from one task deadlocks, as the kernel mutex is not recursive.
pub struct Mutex<T: ?Sized, A: Allocation = Dynamic> {
    inner: semaphore::Mutex<A>,
    data: UnsafeCell<T>,
}

// The kernel mutex serializes access, so sharing only needs the data to be sendable.
unsafe impl<T: ?Sized + Send, A: Allocation + Send> Send for Mutex<T, A> {}
unsafe impl<T: ?Sized + Send, A: Allocation + Sync> Sync for Mutex<T, A> {}

impl<T, A: Allocation> fmt::Debug for Mutex<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync::{:?}", self.inner)
    }
}

/// A held [`Mutex`].  The data is reachable through `Deref`, and the lock is given back on drop.
///
/// The kernel requires a mutex to be given back by the task that took it, so this is not `Send`.
pub struct MutexGuard<'a, T: ?Sized + 'a, A: Allocation = Dynamic> {
    lock: &'a Mutex<T, A>,
    _nosend: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync, A: Allocation + Sync> Sync for MutexGuard<'_, T, A> {}

impl<T, A: SemaphoreAllocator> Mutex<T, A> {
    /// Wrap `t` in a mutex created in the given allocation.
    pub fn new_with(alloc: A, t: T) -> Result<Mutex<T, A>> {
        Ok(Mutex {
            inner: semaphore::Mutex::new_with(alloc)?,
            data: UnsafeCell::new(t),
        })
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl<T> Mutex<T, Dynamic> {
    /// Wrap `t` in a mutex from the kernel heap.
    pub fn new(t: T) -> Result<Mutex<T, Dynamic>> {
        Self::new_with(Dynamic, t)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl<T> Mutex<T, &'static StaticStorage<StaticSemaphore_t>> {
    /// Wrap `t` in a mutex in static storage.
    pub fn new_in(storage: &'static StaticStorage<StaticSemaphore_t>, t: T) -> Result<Self> {
        Self::new_with(storage, t)
    }
}

impl<T, A: Allocation> Mutex<T, A> {
    /// Take back the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, A: Allocation> Mutex<T, A> {
    /// Lock the mutex, waiting as long as it takes.
    pub fn lock(&self) -> Result<MutexGuard<'_, T, A>> {
        self.try_lock_for(Forever)
    }

    /// Lock the mutex if it is free now.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T, A>> {
        self.try_lock_for(NoWait)
    }

    /// Lock the mutex, waiting up to `timeout`.
    pub fn try_lock_for<D: Into<Timeout>>(&self, timeout: D) -> Result<MutexGuard<'_, T, A>> {
        self.inner.take(timeout)?;
        Ok(MutexGuard {
            lock: self,
            _nosend: PhantomData,
        })
    }

    /// The data, through an exclusive borrow.  Nothing else can hold the lock, so none is taken.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized, A: Allocation> Deref for MutexGuard<'_, T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, A: Allocation> DerefMut for MutexGuard<'_, T, A> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, A: Allocation> Drop for MutexGuard<'_, T, A> {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = self.lock.inner.give() {
            warn!("unable to unlock {:?}: {}", self.lock.inner, e);
        }
    }
}

impl<T: ?Sized + fmt::Debug, A: Allocation> fmt::Debug for MutexGuard<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
