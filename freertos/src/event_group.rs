// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Event groups
//!
//! An event group is a set of flag bits shared between tasks.  Tasks set and clear bits, and wait
//! for any or all of a set of bits to become set.  A wait can also clear the bits that satisfied
//! it, atomically with respect to other waiters.
//!
//! The top byte of the group is reserved by the kernel, so only the bits in [`VALID_BITS`] may be
//! used.  Masks that are zero, or that touch reserved bits, are rejected with
//! [`Error::InvalidArgument`].
//!
//! Setting bits is not a constant time operation, since any number of tasks may be waiting, so the
//! kernel does not allow it from an interrupt handler.  [`EventGroup::set_isr`] instead queues the
//! set to the timer daemon task, which performs it shortly afterwards.  A group that has had sets
//! queued this way waits for the daemon to catch up before it is deleted.

use core::fmt;

use log::{trace, warn};
use portable_atomic::{AtomicBool, Ordering};

use crate::error::{check_handle, Error, Result};
use crate::object::{Allocation, Dynamic, StaticStorage};
use crate::raw::{
    eventEVENT_BITS_CONTROL_BYTES, pdFALSE, pdTRUE, vEventGroupDelete, xEventGroupClearBits,
    xEventGroupGetBits, xEventGroupGetBitsFromISR, xEventGroupSetBits, xEventGroupSync,
    xEventGroupWaitBits, EventBits_t, EventGroupHandle_t, StaticEventGroup_t,
};
use crate::time::{ticks, Timeout};

#[cfg(all(configUSE_TIMERS, INCLUDE_xTimerPendFunctionCall))]
use crate::isr::TaskWoken;

/// The bits of an event group.
pub type EventBits = EventBits_t;

/// The bits available to applications.
pub const VALID_BITS: EventBits = !eventEVENT_BITS_CONTROL_BYTES;

/// An allocation strategy that can create event groups.
pub trait EventGroupAllocator: Allocation {
    #[doc(hidden)]
    fn create_event_group(&self) -> Result<EventGroupHandle_t>;
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl EventGroupAllocator for Dynamic {
    fn create_event_group(&self) -> Result<EventGroupHandle_t> {
        check_handle(unsafe { crate::raw::xEventGroupCreate() })
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl EventGroupAllocator for &'static StaticStorage<StaticEventGroup_t> {
    fn create_event_group(&self) -> Result<EventGroupHandle_t> {
        crate::object::create_static(*self, |buffer| unsafe {
            crate::raw::xEventGroupCreateStatic(buffer)
        })
    }
}

/// How a wait on an event group ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventWait {
    /// The condition was met.  These are the bits at that moment, before any were cleared.
    Satisfied(EventBits),
    /// The timeout expired first.  These are the bits at expiry.
    TimedOut(EventBits),
}

impl EventWait {
    /// The bits observed, either way.
    pub fn bits(&self) -> EventBits {
        match *self {
            EventWait::Satisfied(bits) | EventWait::TimedOut(bits) => bits,
        }
    }

    /// Did the condition get met?
    pub fn is_satisfied(&self) -> bool {
        matches!(self, EventWait::Satisfied(_))
    }

    /// The satisfying bits, or [`Error::Timeout`].
    pub fn into_result(self) -> Result<EventBits> {
        match self {
            EventWait::Satisfied(bits) => Ok(bits),
            EventWait::TimedOut(_) => Err(Error::Timeout),
        }
    }
}

fn check_mask(mask: EventBits) -> Result<()> {
    if mask == 0 || mask & !VALID_BITS != 0 {
        Err(Error::InvalidArgument)
    } else {
        Ok(())
    }
}

fn flag(value: bool) -> crate::raw::BaseType_t {
    if value {
        pdTRUE
    } else {
        pdFALSE
    }
}

/// A kernel event group.
pub struct EventGroup<A: Allocation = Dynamic> {
    handle: EventGroupHandle_t,
    alloc: A,
    /// Work on this group has been queued to the timer daemon.
    deferred: AtomicBool,
}

// The kernel does its own locking on the handle.
unsafe impl<A: Allocation + Send> Send for EventGroup<A> {}
unsafe impl<A: Allocation + Sync> Sync for EventGroup<A> {}

impl<A: EventGroupAllocator> EventGroup<A> {
    /// Create an event group in the given allocation, with all bits clear.
    pub fn new_with(alloc: A) -> Result<EventGroup<A>> {
        let handle = alloc.create_event_group()?;
        trace!("event group {:?} created", handle);
        Ok(EventGroup {
            handle,
            alloc,
            deferred: AtomicBool::new(false),
        })
    }
}

#[cfg(configSUPPORT_DYNAMIC_ALLOCATION)]
impl EventGroup<Dynamic> {
    /// Create an event group from the kernel heap.
    pub fn new() -> Result<EventGroup<Dynamic>> {
        Self::new_with(Dynamic)
    }
}

#[cfg(configSUPPORT_STATIC_ALLOCATION)]
impl EventGroup<&'static StaticStorage<StaticEventGroup_t>> {
    /// Create an event group in static storage.
    pub fn new_in(storage: &'static StaticStorage<StaticEventGroup_t>) -> Result<Self> {
        Self::new_with(storage)
    }
}

impl<A: Allocation> EventGroup<A> {
    /// Set bits, waking any tasks whose wait this satisfies.
    ///
    /// Returns the bits after the set.  These may already lack some of `bits`, if a woken task
    /// cleared them on exit.
    pub fn set(&self, bits: EventBits) -> Result<EventBits> {
        check_mask(bits)?;
        Ok(unsafe { xEventGroupSetBits(self.handle, bits) })
    }

    /// Clear bits.  Returns the bits as they were before the clear.
    pub fn clear(&self, bits: EventBits) -> Result<EventBits> {
        check_mask(bits)?;
        Ok(unsafe { xEventGroupClearBits(self.handle, bits) })
    }

    /// The current bits.
    pub fn get(&self) -> EventBits {
        unsafe { xEventGroupGetBits(self.handle) }
    }

    /// The current bits, from an interrupt handler.
    pub fn get_isr(&self) -> EventBits {
        unsafe { xEventGroupGetBitsFromISR(self.handle) }
    }

    /// Wait for bits in `mask` to be set.
    ///
    /// With `wait_for_all`, every bit in `mask` must be set, otherwise any one of them will do.
    /// With `clear_on_exit`, the bits in `mask` are cleared when the wait is satisfied, before any
    /// other task can observe them.  They are left alone on a timeout.
    pub fn wait<T>(
        &self,
        mask: EventBits,
        wait_for_all: bool,
        clear_on_exit: bool,
        timeout: T,
    ) -> Result<EventWait>
    where
        T: Into<Timeout>,
    {
        check_mask(mask)?;
        let bits = unsafe {
            xEventGroupWaitBits(
                self.handle,
                mask,
                flag(clear_on_exit),
                flag(wait_for_all),
                ticks(timeout),
            )
        };
        let met = if wait_for_all {
            bits & mask == mask
        } else {
            bits & mask != 0
        };
        Ok(if met {
            EventWait::Satisfied(bits)
        } else {
            EventWait::TimedOut(bits)
        })
    }

    /// Wait for any bit in `mask`, returning the bits seen, or [`Error::Timeout`].
    pub fn wait_any<T>(&self, mask: EventBits, clear_on_exit: bool, timeout: T) -> Result<EventBits>
    where
        T: Into<Timeout>,
    {
        self.wait(mask, false, clear_on_exit, timeout)?.into_result()
    }

    /// Wait for every bit in `mask`, returning the bits seen, or [`Error::Timeout`].
    pub fn wait_all<T>(&self, mask: EventBits, clear_on_exit: bool, timeout: T) -> Result<EventBits>
    where
        T: Into<Timeout>,
    {
        self.wait(mask, true, clear_on_exit, timeout)?.into_result()
    }

    /// A rendezvous: set `bits`, then wait for all of `wait_for` to be set.
    ///
    /// Each participant sets its own bit and waits for everyone's.  When the wait is satisfied,
    /// the `wait_for` bits are cleared, ready for the next round.
    pub fn sync<T>(&self, bits: EventBits, wait_for: EventBits, timeout: T) -> Result<EventWait>
    where
        T: Into<Timeout>,
    {
        if bits & !VALID_BITS != 0 {
            return Err(Error::InvalidArgument);
        }
        check_mask(wait_for)?;
        let seen = unsafe { xEventGroupSync(self.handle, bits, wait_for, ticks(timeout)) };
        Ok(if seen & wait_for == wait_for {
            EventWait::Satisfied(seen)
        } else {
            EventWait::TimedOut(seen)
        })
    }

    /// Set bits from an interrupt handler.
    ///
    /// The set is queued to the timer daemon, and happens once the daemon runs.  If the daemon has
    /// a higher priority than the interrupted task, `woken` is set, so that the daemon runs as the
    /// handler exits.  Fails with [`Error::Full`] if the daemon's command queue is full.
    #[cfg(all(configUSE_TIMERS, INCLUDE_xTimerPendFunctionCall))]
    pub fn set_isr(&self, bits: EventBits, woken: &mut TaskWoken) -> Result<()> {
        check_mask(bits)?;
        self.deferred.store(true, Ordering::Release);
        let queued =
            unsafe { crate::raw::xEventGroupSetBitsFromISR(self.handle, bits, woken.as_ptr()) };
        crate::error::to_result(queued, Error::Full)
    }

    /// Clear bits from an interrupt handler.  Like [`set_isr`](Self::set_isr), the clear is
    /// performed later by the timer daemon.
    #[cfg(all(configUSE_TIMERS, INCLUDE_xTimerPendFunctionCall))]
    pub fn clear_isr(&self, bits: EventBits) -> Result<()> {
        check_mask(bits)?;
        self.deferred.store(true, Ordering::Release);
        let queued = unsafe { crate::raw::xEventGroupClearBitsFromISR(self.handle, bits) };
        crate::error::to_result(queued, Error::Full)
    }
}

impl<A: Allocation> Drop for EventGroup<A> {
    fn drop(&mut self) {
        // The daemon must not run a queued set on a deleted group.
        #[cfg(all(configUSE_TIMERS, INCLUDE_xTimerPendFunctionCall))]
        {
            if self.deferred.load(Ordering::Acquire) && !crate::timer::flush_daemon() {
                warn!("event group {:?} dropped with queued sets, leaking", self.handle);
                return;
            }
        }
        trace!("event group {:?} deleted", self.handle);
        unsafe {
            vEventGroupDelete(self.handle);
            self.alloc.release();
        }
    }
}

impl<A: Allocation> fmt::Debug for EventGroup<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventGroup {:?} bits: {:#x}", self.handle, self.get())
    }
}
