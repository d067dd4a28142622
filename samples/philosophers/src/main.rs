// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! The dining philosophers, run on the host simulator.
//!
//! The philosophers cooperate over their forks through one of several kernel mechanisms.  Each
//! round runs them with a different one for a while, stops them, and prints how often each
//! philosopher got to eat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

use freertos::consoleln;
use freertos::semaphore::CountingSemaphore;
use freertos::sync::Mutex;
use freertos::task::TaskBuilder;
use freertos::time::{sleep, tick_count, Duration, Forever, TICK_HZ};
use freertos::Result;

mod channel;
mod eventsync;
mod mutexsync;
mod semsync;

/// How many philosophers.  There are as many forks.
const NUM_PHIL: usize = 6;

/// Stack for each philosopher, in words.  Formatting the log messages is the deepest it gets.
const PHIL_STACK_DEPTH: usize = 1024;

/// How long each round runs.
const ROUND: Duration = Duration::secs(3);

/// Taking and releasing forks.  The forks are indexed the same as the philosophers.
///
/// Every implementation is a different way to get the same thing: six locks.
trait ForkSync: core::fmt::Debug + Sync + Send {
    /// Take the given fork, waiting until it is free.
    fn take(&self, index: usize) -> Result<()>;

    /// Put the given fork back.
    fn release(&self, index: usize) -> Result<()>;
}

fn main() {
    if let Err(e) = unsafe { freertos::set_logger() } {
        consoleln!("no logger: {}", e);
    }
    consoleln!("Dining philosophers, at {} ticks per second", TICK_HZ);

    let rounds: [(&str, fn() -> Result<Vec<Arc<dyn ForkSync>>>); 4] = [
        ("semaphores", semsync::semaphore_sync),
        ("mutexes", mutexsync::mutex_sync),
        ("event group", eventsync::event_group_sync),
        ("fork server", channel::channel_sync),
    ];

    for (name, get_syncer) in rounds {
        info!("round: {}", name);
        match get_syncer().and_then(run_round) {
            Ok(stats) => stats.show(),
            Err(e) => error!("round {} failed: {}", name, e),
        }
    }
}

/// Run the philosophers until the round is up, and gather what they did.
fn run_round(syncers: Vec<Arc<dyn ForkSync>>) -> Result<Stats> {
    let stats = Arc::new(Mutex::new(Stats::default())?);
    let stop = Arc::new(AtomicBool::new(false));
    let done = Arc::new(CountingSemaphore::new(NUM_PHIL, 0)?);

    let mut philosophers = Vec::with_capacity(NUM_PHIL);
    for (i, syncer) in syncers.into_iter().enumerate() {
        let stats = stats.clone();
        let stop = stop.clone();
        let done = done.clone();
        let name = format!("phil{}", i);
        let task = TaskBuilder::new()
            .name(&name)
            .stack_depth(PHIL_STACK_DEPTH)
            .spawn(move || {
                phil_task(i, syncer, &stats, &stop);
                let _ = done.give();
            })?;
        philosophers.push(task);
    }

    sleep(ROUND);
    stop.store(true, Ordering::Relaxed);
    // Each philosopher finishes the meal it is on before stopping.
    for _ in 0..philosophers.len() {
        done.take(Forever)?;
    }
    drop(philosophers);

    let stats = match Arc::try_unwrap(stats) {
        Ok(stats) => stats.into_inner(),
        Err(shared) => {
            let stats = shared.lock()?.clone();
            stats
        }
    };
    Ok(stats)
}

fn phil_task(n: usize, syncer: Arc<dyn ForkSync>, stats: &Mutex<Stats>, stop: &AtomicBool) {
    info!("philosopher {} started: {:?}", n, syncer);

    // Per Dijkstra, the last philosopher takes the forks in the other order, or they deadlock.
    let forks = if n == NUM_PHIL - 1 {
        (0, n)
    } else {
        (n, n + 1)
    };

    while !stop.load(Ordering::Relaxed) {
        if let Err(e) = dine(n, forks, &*syncer, stats) {
            error!("philosopher {}: {}", n, e);
            break;
        }
    }
}

/// Eat once, then think once.
fn dine(n: usize, forks: (usize, usize), syncer: &dyn ForkSync, stats: &Mutex<Stats>) -> Result<()> {
    syncer.take(forks.0)?;
    syncer.take(forks.1)?;

    let delay = random_delay(n, 5);
    sleep(delay);
    stats.lock()?.record_eat(n, delay);

    syncer.release(forks.1)?;
    syncer.release(forks.0)?;

    let delay = random_delay(n, 5);
    sleep(delay);
    stats.lock()?.record_think(n, delay);
    Ok(())
}

/// A delay that looks random enough, made from the philosopher's number and the tick count.
fn random_delay(id: usize, period: u32) -> Duration {
    let tick = tick_count().ticks() as usize;
    let delay = (tick / 100 * (id + 1)) & 0x1f;

    // One more, so it is never zero.
    Duration::millis((delay as u32 + 1) * period)
}

/// What each philosopher has been doing, instead of a message for every bite.
#[derive(Clone, Default)]
struct Stats {
    /// How many times each philosopher has gone through the loop.
    count: [u64; NUM_PHIL],
    /// Milliseconds spent eating.
    eating: [u64; NUM_PHIL],
    /// Milliseconds spent thinking.
    thinking: [u64; NUM_PHIL],
}

impl Stats {
    fn record_eat(&mut self, index: usize, time: Duration) {
        self.eating[index] += u64::from(time.to_millis());
    }

    fn record_think(&mut self, index: usize, time: Duration) {
        self.thinking[index] += u64::from(time.to_millis());
        self.count[index] += 1;
    }

    fn show(&self) {
        consoleln!(
            "c:{:?}, e:{:?}, t:{:?}",
            self.count,
            self.eating,
            self.thinking
        );
    }
}
