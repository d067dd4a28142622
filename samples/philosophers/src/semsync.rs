// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Semaphore based sync.
//!
//! The simplest way: one binary semaphore per fork, in static storage.

use std::sync::Arc;

use freertos::object::StaticStorage;
use freertos::raw::StaticSemaphore_t;
use freertos::semaphore::BinarySemaphore;
use freertos::time::Forever;
use freertos::Result;

use crate::{ForkSync, NUM_PHIL};

static FORKS: [StaticStorage<StaticSemaphore_t>; NUM_PHIL] =
    [const { StaticStorage::new() }; NUM_PHIL];

#[derive(Debug)]
pub struct SemSync {
    forks: Vec<BinarySemaphore<&'static StaticStorage<StaticSemaphore_t>>>,
}

impl ForkSync for SemSync {
    fn take(&self, index: usize) -> Result<()> {
        self.forks[index].take(Forever)
    }

    fn release(&self, index: usize) -> Result<()> {
        self.forks[index].give()
    }
}

pub fn semaphore_sync() -> Result<Vec<Arc<dyn ForkSync>>> {
    // Each fork starts out on the table.
    let forks = FORKS
        .iter()
        .map(BinarySemaphore::new_given_in)
        .collect::<Result<Vec<_>>>()?;

    let syncer: Arc<dyn ForkSync> = Arc::new(SemSync { forks });
    Ok(vec![syncer; NUM_PHIL])
}
