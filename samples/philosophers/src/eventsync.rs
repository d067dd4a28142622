// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Event group sync.
//!
//! Each fork is a bit, set while the fork is on the table.  Waiting for the bit with clear on exit
//! picks the fork up in the same step, so two philosophers can't both get it.

use std::sync::Arc;

use freertos::event_group::{EventBits, EventGroup};
use freertos::time::Forever;
use freertos::Result;

use crate::{ForkSync, NUM_PHIL};

#[derive(Debug)]
pub struct EventSync {
    table: EventGroup,
}

fn fork_bit(index: usize) -> EventBits {
    1 << index
}

impl ForkSync for EventSync {
    fn take(&self, index: usize) -> Result<()> {
        self.table.wait_all(fork_bit(index), true, Forever).map(|_| ())
    }

    fn release(&self, index: usize) -> Result<()> {
        self.table.set(fork_bit(index)).map(|_| ())
    }
}

pub fn event_group_sync() -> Result<Vec<Arc<dyn ForkSync>>> {
    let table = EventGroup::new()?;
    table.set((1 << NUM_PHIL) - 1)?;
    let syncer: Arc<dyn ForkSync> = Arc::new(EventSync { table });
    Ok(vec![syncer; NUM_PHIL])
}
