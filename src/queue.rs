// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The shared task queue. Multi-producer, multi-consumer, unbounded,
//! FIFO -- fed by the fetcher, drained by the dispatcher.
//!
//! A plain `crossbeam_channel::unbounded` has no "push to the front"
//! primitive, but the dispatcher's double-checked enqueue (see
//! `dispatcher.rs`) needs exactly that: when the chosen judge has
//! vanished, the task must go back ahead of tasks the fetcher hasn't
//! delivered yet, not behind them. `SharedQueue` is two channels under
//! one name: a normal FIFO fed by [`SharedQueue::push`], and a small
//! "requeue" lane fed by [`SharedQueue::push_front`] that
//! [`SharedQueue::pop_timeout`] always drains first.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Select, Sender};

use crate::task::Task;

#[derive(Clone)]
pub struct SharedQueue {
    normal_tx: Sender<Task>,
    normal_rx: Receiver<Task>,
    requeue_tx: Sender<Task>,
    requeue_rx: Receiver<Task>,
}

impl Default for SharedQueue {
    fn default() -> Self {
        SharedQueue::new()
    }
}

impl SharedQueue {
    pub fn new() -> Self {
        let (normal_tx, normal_rx) = unbounded();
        let (requeue_tx, requeue_rx) = unbounded();
        SharedQueue {
            normal_tx,
            normal_rx,
            requeue_tx,
            requeue_rx,
        }
    }

    /// Pushes a freshly fetched task onto the back of the queue.
    pub fn push(&self, task: Task) {
        // An unbounded sender only errs once every receiver has been
        // dropped, which never happens while the owning `SharedQueue` is
        // alive.
        let _ = self.normal_tx.send(task);
    }

    /// Pushes a task that must be retried ahead of everything else: a
    /// task bounced back because its chosen judge disappeared, or a task
    /// that was in flight when a session died.
    pub fn push_front(&self, task: Task) {
        let _ = self.requeue_tx.send(task);
    }

    /// Blocks for up to `timeout` waiting for a task, preferring the
    /// requeue lane. Returns `None` on timeout, which the caller uses as
    /// its liveness check against the termination flag.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Task> {
        if let Ok(task) = self.requeue_rx.try_recv() {
            return Some(task);
        }

        let mut sel = Select::new();
        let requeue_idx = sel.recv(&self.requeue_rx);
        let normal_idx = sel.recv(&self.normal_rx);

        let oper = sel.select_timeout(timeout).ok()?;
        let result = if oper.index() == requeue_idx {
            oper.recv(&self.requeue_rx)
        } else {
            debug_assert_eq!(oper.index(), normal_idx);
            oper.recv(&self.normal_rx)
        };
        result.ok()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.normal_rx.len() + self.requeue_rx.len()
    }
}
