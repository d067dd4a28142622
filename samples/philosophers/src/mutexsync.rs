// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! # Mutex implementation of ForkSync
//!
//! One kernel mutex per fork, from the kernel heap.  The philosopher that takes a fork is the one
//! that gives it back, which is what the kernel needs of a mutex.

use std::sync::Arc;

use freertos::semaphore::Mutex;
use freertos::time::Forever;
use freertos::Result;

use crate::{ForkSync, NUM_PHIL};

#[derive(Debug)]
pub struct MutexSync {
    locks: Vec<Mutex>,
}

impl ForkSync for MutexSync {
    fn take(&self, index: usize) -> Result<()> {
        self.locks[index].take(Forever)
    }

    fn release(&self, index: usize) -> Result<()> {
        self.locks[index].give()
    }
}

pub fn mutex_sync() -> Result<Vec<Arc<dyn ForkSync>>> {
    let locks = (0..NUM_PHIL)
        .map(|_| Mutex::new())
        .collect::<Result<Vec<_>>>()?;
    let syncer: Arc<dyn ForkSync> = Arc::new(MutexSync { locks });
    Ok(vec![syncer; NUM_PHIL])
}
