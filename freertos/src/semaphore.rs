// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Semaphores and mutexes
//!
//! FreeRTOS builds all of these on its queue: a semaphore is a queue of zero sized items whose
//! length is the count.  The wrappers here give each kind its own type, with only the operations
//! that are valid for it.
//!
//! - [`BinarySemaphore`] and [`CountingSemaphore`] are signals.  Any task or interrupt may give
//!   them, and giving past the maximum count fails with [`Error::Full`].
//! - [`Mutex`] and [`RecursiveMutex`] have an owner, and priority inheritance.  Only the task that
//!   took one may give it back, and neither may be used from an interrupt handler.
//!
//! Each type is generic over its [allocation strategy](crate::object).

use core::fmt;
use core::marker::PhantomData;

use log::{trace, warn};

use crate::error::{check_handle, to_result, Error, Result};
use crate::isr::TaskWoken;
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    uxSemaphoreGetCount, uxSemaphoreGetCountFromISR, vSemaphoreDelete, xSemaphoreGive,
    xSemaphoreGiveFromISR, xSemaphoreTake, xSemaphoreTakeFromISR, SemaphoreHandle_t,
    StaticSemaphore_t, TickType_t, UBaseType_t,
};
use crate::time::{ticks, Timeout};

#[cfg(any(configUSE_MUTEXES, all(INCLUDE_xSemaphoreGetMutexHolder, configUSE_RECURSIVE_MUTEXES)))]
use crate::task::TaskId;

/// Which kind of semaphore to create.
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub enum SemaphoreKind {
    Binary,
    #[cfg(configUSE_COUNTING_SEMAPHORES)]
    Counting {
        max: UBaseType_t,
        initial: UBaseType_t,
    },
    #[cfg(configUSE_MUTEXES)]
    Mutex,
    #[cfg(configUSE_RECURSIVE_MUTEXES)]
    Recursive,
}

/// An allocation strategy that can create semaphores.
pub trait SemaphoreAllocator: Allocation {
    #[doc(hidden)]
    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<SemaphoreHandle_t>;
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl SemaphoreAllocator for Dynamic {
    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<SemaphoreHandle_t> {
        use crate::raw::*;

        let handle = unsafe {
            match kind {
                SemaphoreKind::Binary => xSemaphoreCreateBinary(),
                #[cfg(configUSE_COUNTING_SEMAPHORES)]
                SemaphoreKind::Counting { max, initial } => xSemaphoreCreateCounting(max, initial),
                #[cfg(configUSE_MUTEXES)]
                SemaphoreKind::Mutex => xSemaphoreCreateMutex(),
                #[cfg(configUSE_RECURSIVE_MUTEXES)]
                SemaphoreKind::Recursive => xSemaphoreCreateRecursiveMutex(),
            }
        };
        check_handle(handle)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl SemaphoreAllocator for &'static StaticStorage<StaticSemaphore_t> {
    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<SemaphoreHandle_t> {
        use crate::raw::*;

        crate::object::create_static(*self, |buffer| unsafe {
            match kind {
                SemaphoreKind::Binary => xSemaphoreCreateBinaryStatic(buffer),
                #[cfg(configUSE_COUNTING_SEMAPHORES)]
                SemaphoreKind::Counting { max, initial } => {
                    xSemaphoreCreateCountingStatic(max, initial, buffer)
                }
                #[cfg(configUSE_MUTEXES)]
                SemaphoreKind::Mutex => xSemaphoreCreateMutexStatic(buffer),
                #[cfg(configUSE_RECURSIVE_MUTEXES)]
                SemaphoreKind::Recursive => xSemaphoreCreateRecursiveMutexStatic(buffer),
            }
        })
    }
}

/// The owned handle shared by all the semaphore kinds.
struct RawSemaphore<A: Allocation> {
    handle: SemaphoreHandle_t,
    alloc: A,
}

// The kernel does its own locking on the handle.
unsafe impl<A: Allocation + Send> Send for RawSemaphore<A> {}
unsafe impl<A: Allocation + Sync> Sync for RawSemaphore<A> {}

impl<A: SemaphoreAllocator> RawSemaphore<A> {
    fn new(alloc: A, kind: SemaphoreKind) -> Result<RawSemaphore<A>> {
        let handle = alloc.create_semaphore(kind)?;
        trace!("semaphore {:?} created as {:?}", handle, kind);
        Ok(RawSemaphore { handle, alloc })
    }
}

impl<A: Allocation> RawSemaphore<A> {
    fn take(&self, timeout: TickType_t) -> Result<()> {
        to_result(unsafe { xSemaphoreTake(self.handle, timeout) }, Error::Timeout)
    }

    fn give(&self) -> Result<()> {
        to_result(unsafe { xSemaphoreGive(self.handle) }, Error::Full)
    }

    fn take_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        to_result(
            unsafe { xSemaphoreTakeFromISR(self.handle, woken.as_ptr()) },
            Error::Empty,
        )
    }

    fn give_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        to_result(
            unsafe { xSemaphoreGiveFromISR(self.handle, woken.as_ptr()) },
            Error::Full,
        )
    }

    fn count(&self) -> usize {
        unsafe { uxSemaphoreGetCount(self.handle) as usize }
    }

    fn count_isr(&self) -> usize {
        unsafe { uxSemaphoreGetCountFromISR(self.handle) as usize }
    }
}

impl<A: Allocation> Drop for RawSemaphore<A> {
    fn drop(&mut self) {
        trace!("semaphore {:?} deleted", self.handle);
        unsafe {
            vSemaphoreDelete(self.handle);
            self.alloc.release();
        }
    }
}

/// A semaphore that is either available or not.
///
/// Typically given by an interrupt handler or another task to signal an event, and taken by the
/// task that handles it.
pub struct BinarySemaphore<A: Allocation = Dynamic> {
    inner: RawSemaphore<A>,
}

impl<A: SemaphoreAllocator> BinarySemaphore<A> {
    /// Create a binary semaphore in the given allocation.  It starts out taken.
    pub fn new_with(alloc: A) -> Result<BinarySemaphore<A>> {
        Ok(BinarySemaphore {
            inner: RawSemaphore::new(alloc, SemaphoreKind::Binary)?,
        })
    }

    /// Create a binary semaphore that starts out available.
    pub fn new_given_with(alloc: A) -> Result<BinarySemaphore<A>> {
        let sem = Self::new_with(alloc)?;
        sem.inner.give()?;
        Ok(sem)
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl BinarySemaphore<Dynamic> {
    /// Create a binary semaphore from the kernel heap.  It starts out taken.
    pub fn new() -> Result<BinarySemaphore<Dynamic>> {
        Self::new_with(Dynamic)
    }

    /// Create a binary semaphore from the kernel heap, available at the start.
    pub fn new_given() -> Result<BinarySemaphore<Dynamic>> {
        Self::new_given_with(Dynamic)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl BinarySemaphore<&'static StaticStorage<StaticSemaphore_t>> {
    /// Create a binary semaphore in static storage.  It starts out taken.
    pub fn new_in(storage: &'static StaticStorage<StaticSemaphore_t>) -> Result<Self> {
        Self::new_with(storage)
    }

    /// Create a binary semaphore in static storage, available at the start.
    pub fn new_given_in(storage: &'static StaticStorage<StaticSemaphore_t>) -> Result<Self> {
        Self::new_given_with(storage)
    }
}

impl<A: Allocation> BinarySemaphore<A> {
    /// Take the semaphore, waiting up to `timeout` for it to be given.
    pub fn take<T>(&self, timeout: T) -> Result<()>
    where
        T: Into<Timeout>,
    {
        self.inner.take(ticks(timeout))
    }

    /// Give the semaphore.  Fails with [`Error::Full`] if it was already available.
    pub fn give(&self) -> Result<()> {
        self.inner.give()
    }

    /// Take the semaphore from an interrupt handler.  Fails with [`Error::Empty`] if it was not
    /// available.
    pub fn take_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        self.inner.take_isr(woken)
    }

    /// Give the semaphore from an interrupt handler.
    pub fn give_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        self.inner.give_isr(woken)
    }

    /// Is the semaphore currently available?
    pub fn is_available(&self) -> bool {
        self.inner.count() > 0
    }
}

impl<A: Allocation> fmt::Debug for BinarySemaphore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BinarySemaphore {:?}", self.inner.handle)
    }
}

/// A semaphore holding a count between zero and a maximum.
#[cfg(configUSE_COUNTING_SEMAPHORES)]
pub struct CountingSemaphore<A: Allocation = Dynamic> {
    inner: RawSemaphore<A>,
    max: usize,
}

#[cfg(configUSE_COUNTING_SEMAPHORES)]
impl<A: SemaphoreAllocator> CountingSemaphore<A> {
    /// Create a counting semaphore in the given allocation.
    ///
    /// The maximum must be at least one, and the initial count no more than the maximum.
    pub fn new_with(alloc: A, max: usize, initial: usize) -> Result<CountingSemaphore<A>> {
        if max == 0 || initial > max || max > UBaseType_t::MAX as usize {
            return Err(Error::InvalidArgument);
        }
        let kind = SemaphoreKind::Counting {
            max: max as UBaseType_t,
            initial: initial as UBaseType_t,
        };
        Ok(CountingSemaphore {
            inner: RawSemaphore::new(alloc, kind)?,
            max,
        })
    }
}

#[cfg(all(configUSE_COUNTING_SEMAPHORES, configSUPPORT_DYNAMIC_ALLOCATION))]
impl CountingSemaphore<Dynamic> {
    /// Create a counting semaphore from the kernel heap.
    pub fn new(max: usize, initial: usize) -> Result<CountingSemaphore<Dynamic>> {
        Self::new_with(Dynamic, max, initial)
    }
}

#[cfg(all(configUSE_COUNTING_SEMAPHORES, configSUPPORT_STATIC_ALLOCATION))]
impl CountingSemaphore<&'static StaticStorage<StaticSemaphore_t>> {
    /// Create a counting semaphore in static storage.
    pub fn new_in(
        storage: &'static StaticStorage<StaticSemaphore_t>,
        max: usize,
        initial: usize,
    ) -> Result<Self> {
        Self::new_with(storage, max, initial)
    }
}

#[cfg(configUSE_COUNTING_SEMAPHORES)]
impl<A: Allocation> CountingSemaphore<A> {
    /// Decrement the count, waiting up to `timeout` for it to be above zero.
    pub fn take<T>(&self, timeout: T) -> Result<()>
    where
        T: Into<Timeout>,
    {
        self.inner.take(ticks(timeout))
    }

    /// Increment the count.  Fails with [`Error::Full`] if it was already at the maximum.
    pub fn give(&self) -> Result<()> {
        self.inner.give()
    }

    /// Increment the count `n` times.  Stops with [`Error::Full`] at the maximum, and the gives
    /// before that still count.
    pub fn give_n(&self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.inner.give()?;
        }
        Ok(())
    }

    /// Decrement the count from an interrupt handler.
    pub fn take_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        self.inner.take_isr(woken)
    }

    /// Increment the count from an interrupt handler.
    pub fn give_isr(&self, woken: &mut TaskWoken) -> Result<()> {
        self.inner.give_isr(woken)
    }

    /// The current count.
    pub fn count(&self) -> usize {
        self.inner.count()
    }

    /// The current count, from an interrupt handler.
    pub fn count_isr(&self) -> usize {
        self.inner.count_isr()
    }

    /// The maximum count given at creation.
    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(configUSE_COUNTING_SEMAPHORES)]
impl<A: Allocation> fmt::Debug for CountingSemaphore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CountingSemaphore {:?} ({}/{})",
            self.inner.handle,
            self.count(),
            self.max
        )
    }
}

mod private {
    pub trait Sealed {}
}

/// A lock that a [`SemaphoreGuard`] can release.
pub trait RawLock: private::Sealed {
    #[doc(hidden)]
    fn unlock(&self) -> Result<()>;
}

/// A held mutex, given back when dropped.
///
/// Created by `lock` on [`Mutex`] and [`RecursiveMutex`].  It must be dropped by the task that
/// took the lock, so it is not `Send`.
pub struct SemaphoreGuard<'a, L: RawLock> {
    lock: &'a L,
    _nosend: PhantomData<*const ()>,
}

impl<L: RawLock> Drop for SemaphoreGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!("guard failed to release its lock: {}", e);
        }
    }
}

/// A mutual exclusion lock with priority inheritance.
///
/// Unlike a binary semaphore, a mutex is owned by the task that took it: only that task may give
/// it back.  A task waiting on the mutex lends its priority to the holder.
#[cfg(configUSE_MUTEXES)]
pub struct Mutex<A: Allocation = Dynamic> {
    inner: RawSemaphore<A>,
}

#[cfg(configUSE_MUTEXES)]
impl<A: SemaphoreAllocator> Mutex<A> {
    /// Create a mutex in the given allocation.  It starts out available.
    pub fn new_with(alloc: A) -> Result<Mutex<A>> {
        Ok(Mutex {
            inner: RawSemaphore::new(alloc, SemaphoreKind::Mutex)?,
        })
    }
}

#[cfg(all(configUSE_MUTEXES, configSUPPORT_DYNAMIC_ALLOCATION))]
impl Mutex<Dynamic> {
    /// Create a mutex from the kernel heap.
    pub fn new() -> Result<Mutex<Dynamic>> {
        Self::new_with(Dynamic)
    }
}

#[cfg(all(configUSE_MUTEXES, configSUPPORT_STATIC_ALLOCATION))]
impl Mutex<&'static StaticStorage<StaticSemaphore_t>> {
    /// Create a mutex in static storage.
    pub fn new_in(storage: &'static StaticStorage<StaticSemaphore_t>) -> Result<Self> {
        Self::new_with(storage)
    }
}

#[cfg(configUSE_MUTEXES)]
impl<A: Allocation> Mutex<A> {
    /// Take the mutex, waiting up to `timeout`.
    ///
    /// A task that already holds the mutex must not take it again; that deadlocks.  Use a
    /// [`RecursiveMutex`] for that.
    pub fn take<T>(&self, timeout: T) -> Result<()>
    where
        T: Into<Timeout>,
    {
        self.inner.take(ticks(timeout))
    }

    /// Give the mutex back.  Fails with [`Error::NotOwner`] if the current task does not hold it.
    ///
    /// The kernel itself doesn't check the holder on a give, so this asks for it first.  That is
    /// why mutexes need `INCLUDE_xSemaphoreGetMutexHolder`.
    pub fn give(&self) -> Result<()> {
        if !self.held_by_current() {
            return Err(Error::NotOwner);
        }
        to_result(unsafe { xSemaphoreGive(self.inner.handle) }, Error::NotOwner)
    }

    /// Is some task holding the mutex?
    pub fn is_locked(&self) -> bool {
        self.inner.count() == 0
    }

    /// Take the mutex, returning a guard that gives it back when dropped.
    pub fn lock<T>(&self, timeout: T) -> Result<SemaphoreGuard<'_, Self>>
    where
        T: Into<Timeout>,
    {
        self.take(timeout)?;
        Ok(SemaphoreGuard {
            lock: self,
            _nosend: PhantomData,
        })
    }

    /// The task currently holding the mutex, if any.
    pub fn holder(&self) -> Option<TaskId> {
        let handle = unsafe { crate::raw::xSemaphoreGetMutexHolder(self.inner.handle) };
        TaskId::from_raw(handle)
    }

    fn held_by_current(&self) -> bool {
        self.holder() == Some(crate::task::current_id())
    }
}

#[cfg(configUSE_MUTEXES)]
impl<A: Allocation> private::Sealed for Mutex<A> {}

#[cfg(configUSE_MUTEXES)]
impl<A: Allocation> RawLock for Mutex<A> {
    fn unlock(&self) -> Result<()> {
        self.give()
    }
}

#[cfg(configUSE_MUTEXES)]
impl<A: Allocation> fmt::Debug for Mutex<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutex {:?}", self.inner.handle)
    }
}

/// A mutex that its holder may take again.
///
/// Each take must be matched with a give before another task can take the mutex.
#[cfg(configUSE_RECURSIVE_MUTEXES)]
pub struct RecursiveMutex<A: Allocation = Dynamic> {
    inner: RawSemaphore<A>,
}

#[cfg(configUSE_RECURSIVE_MUTEXES)]
impl<A: SemaphoreAllocator> RecursiveMutex<A> {
    /// Create a recursive mutex in the given allocation.  It starts out available.
    pub fn new_with(alloc: A) -> Result<RecursiveMutex<A>> {
        Ok(RecursiveMutex {
            inner: RawSemaphore::new(alloc, SemaphoreKind::Recursive)?,
        })
    }
}

#[cfg(all(configUSE_RECURSIVE_MUTEXES, configSUPPORT_DYNAMIC_ALLOCATION))]
impl RecursiveMutex<Dynamic> {
    /// Create a recursive mutex from the kernel heap.
    pub fn new() -> Result<RecursiveMutex<Dynamic>> {
        Self::new_with(Dynamic)
    }
}

#[cfg(all(configUSE_RECURSIVE_MUTEXES, configSUPPORT_STATIC_ALLOCATION))]
impl RecursiveMutex<&'static StaticStorage<StaticSemaphore_t>> {
    /// Create a recursive mutex in static storage.
    pub fn new_in(storage: &'static StaticStorage<StaticSemaphore_t>) -> Result<Self> {
        Self::new_with(storage)
    }
}

#[cfg(configUSE_RECURSIVE_MUTEXES)]
impl<A: Allocation> RecursiveMutex<A> {
    /// Take the mutex, or take it once more if the current task already holds it.
    pub fn take<T>(&self, timeout: T) -> Result<()>
    where
        T: Into<Timeout>,
    {
        to_result(
            unsafe { crate::raw::xSemaphoreTakeRecursive(self.inner.handle, ticks(timeout)) },
            Error::Timeout,
        )
    }

    /// Give back one take.  Fails with [`Error::NotOwner`] if the current task does not hold the
    /// mutex.
    pub fn give(&self) -> Result<()> {
        to_result(
            unsafe { crate::raw::xSemaphoreGiveRecursive(self.inner.handle) },
            Error::NotOwner,
        )
    }

    /// Take the mutex, returning a guard that gives one take back when dropped.
    pub fn lock<T>(&self, timeout: T) -> Result<SemaphoreGuard<'_, Self>>
    where
        T: Into<Timeout>,
    {
        self.take(timeout)?;
        Ok(SemaphoreGuard {
            lock: self,
            _nosend: PhantomData,
        })
    }

    /// Is some task holding the mutex?
    pub fn is_locked(&self) -> bool {
        self.inner.count() == 0
    }

    /// The task currently holding the mutex, if any.
    #[cfg(INCLUDE_xSemaphoreGetMutexHolder)]
    pub fn holder(&self) -> Option<TaskId> {
        let handle = unsafe { crate::raw::xSemaphoreGetMutexHolder(self.inner.handle) };
        TaskId::from_raw(handle)
    }
}

#[cfg(configUSE_RECURSIVE_MUTEXES)]
impl<A: Allocation> private::Sealed for RecursiveMutex<A> {}

#[cfg(configUSE_RECURSIVE_MUTEXES)]
impl<A: Allocation> RawLock for RecursiveMutex<A> {
    fn unlock(&self) -> Result<()> {
        self.give()
    }
}

#[cfg(configUSE_RECURSIVE_MUTEXES)]
impl<A: Allocation> fmt::Debug for RecursiveMutex<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecursiveMutex {:?}", self.inner.handle)
    }
}
