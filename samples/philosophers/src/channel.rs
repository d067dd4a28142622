// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

//! Synchronizer using queues
//!
//! The forks belong to a server task.  Philosophers ask for them over a command queue, and each
//! one waits for the answer on its own reply queue.

use std::fmt;
use std::sync::Arc;

use log::{error, warn};

use freertos::queue::Queue;
use freertos::semaphore::BinarySemaphore;
use freertos::task::{Task, TaskBuilder};
use freertos::time::Forever;
use freertos::{Error, Result};

use crate::{ForkSync, NUM_PHIL};

/// One message, so sending also gets to block now and then.
type Commands = Queue<Command, 1>;
type Reply = Queue<usize, 1>;

#[derive(Clone, Copy, Debug)]
enum Command {
    /// Philosopher `.1` wants fork `.0`.
    Acquire(usize, usize),
    Release(usize),
    Stop,
}

/// The server side of a fork.
#[derive(Default)]
enum ChannelFork {
    #[default]
    Free,
    InUse,
    /// In use, and the philosopher with this number wants it next.
    InUseWait(usize),
}

impl ChannelFork {
    /// Give the fork to `who` if it is free, otherwise make them the one waiting for it.
    fn acquire(&mut self, fork: usize, who: usize, replies: &[Arc<Reply>]) -> Result<()> {
        *self = match *self {
            ChannelFork::Free => {
                replies[who].send(fork, Forever)?;
                ChannelFork::InUse
            }
            ChannelFork::InUse => ChannelFork::InUseWait(who),
            // Each fork is shared by two philosophers, so there is never a second waiter.
            ChannelFork::InUseWait(_) => return Err(Error::InUse),
        };
        Ok(())
    }

    /// Put the fork down, handing it on to whoever is waiting.
    fn release(&mut self, fork: usize, replies: &[Arc<Reply>]) -> Result<()> {
        *self = match *self {
            ChannelFork::Free => return Err(Error::NotOwner),
            ChannelFork::InUse => ChannelFork::Free,
            ChannelFork::InUseWait(waiter) => {
                replies[waiter].send(fork, Forever)?;
                ChannelFork::InUse
            }
        };
        Ok(())
    }
}

/// Owns the server task.  Stops it once the last philosopher lets go.
struct Server {
    commands: Arc<Commands>,
    stopped: Arc<BinarySemaphore>,
    task: Option<Task<Box<dyn FnOnce() + Send>>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server {:?}", self.task)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.commands.send(Command::Stop, Forever).is_err() {
            warn!("fork server did not take the stop");
            return;
        }
        if self.stopped.take(Forever).is_ok() {
            drop(self.task.take());
        }
    }
}

#[derive(Debug)]
struct ChannelSync {
    id: usize,
    commands: Arc<Commands>,
    reply: Arc<Reply>,
    _server: Arc<Server>,
}

impl ForkSync for ChannelSync {
    fn take(&self, index: usize) -> Result<()> {
        self.commands.send(Command::Acquire(index, self.id), Forever)?;
        // The fork is ours once the server answers.
        match self.reply.receive(Forever)? {
            fork if fork == index => Ok(()),
            _ => Err(Error::InvalidArgument),
        }
    }

    fn release(&self, index: usize) -> Result<()> {
        self.commands.send(Command::Release(index), Forever)
    }
}

pub fn channel_sync() -> Result<Vec<Arc<dyn ForkSync>>> {
    let commands = Arc::new(Commands::new()?);
    let replies = (0..NUM_PHIL)
        .map(|_| Reply::new().map(Arc::new))
        .collect::<Result<Vec<_>>>()?;
    let stopped = Arc::new(BinarySemaphore::new()?);

    let task = {
        let commands = commands.clone();
        let replies = replies.clone();
        let stopped = stopped.clone();
        let routine: Box<dyn FnOnce() + Send> = Box::new(move || {
            if let Err(e) = fork_server(&commands, &replies) {
                error!("fork server: {}", e);
            }
            let _ = stopped.give();
        });
        TaskBuilder::new()
            .name("forks")
            .priority(2)
            .spawn(routine)?
    };
    let server = Arc::new(Server {
        commands: commands.clone(),
        stopped,
        task: Some(task),
    });

    let syncers = replies
        .into_iter()
        .enumerate()
        .map(|(id, reply)| {
            Arc::new(ChannelSync {
                id,
                commands: commands.clone(),
                reply,
                _server: server.clone(),
            }) as Arc<dyn ForkSync>
        })
        .collect();
    Ok(syncers)
}

/// Answer fork requests until told to stop.
fn fork_server(commands: &Commands, replies: &[Arc<Reply>]) -> Result<()> {
    let mut forks: [ChannelFork; NUM_PHIL] = Default::default();

    loop {
        match commands.receive(Forever)? {
            Command::Acquire(fork, who) => forks[fork].acquire(fork, who, replies)?,
            Command::Release(fork) => forks[fork].release(fork, replies)?,
            Command::Stop => return Ok(()),
        }
    }
}
