// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The dispatcher: the one activity that moves tasks from the shared
//! queue onto a specific judge's assigned queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::queue::SharedQueue;
use crate::registry::Registry;
use crate::task::Task;
use crate::web::WebFrontend;

const TAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs the dispatch loop until `terminate` is set.
pub fn run(registry: Registry, queue: SharedQueue, web: Arc<dyn WebFrontend>, terminate: Arc<AtomicBool>) {
    while !terminate.load(Ordering::SeqCst) {
        let task = match queue.pop_timeout(TAKE_TIMEOUT) {
            Some(task) => task,
            None => continue,
        };
        dispatch_one(&registry, &queue, &web, task);
    }
    info!("dispatcher: terminating");
}

/// Selects a judge for `task` and enqueues it there, or reports
/// "no judge" to the web frontend if none qualifies.
///
/// The selection scan and the enqueue are two separate lock
/// acquisitions on purpose: a judge chosen under the first lock may have
/// disconnected by the time we're ready to hand it the task, so the
/// enqueue re-checks presence under its own lock and bounces the task
/// back to the head of the shared queue if the judge is gone. This
/// double-check is load-bearing -- a naive one-shot selection races with
/// session cleanup and silently loses tasks.
fn dispatch_one(registry: &Registry, queue: &SharedQueue, web: &Arc<dyn WebFrontend>, task: Task) {
    let snapshot = registry.snapshot();
    let chosen = snapshot
        .into_iter()
        .filter(|j| j.languages_supported.contains(&task.language))
        .min_by_key(|j| j.queue_len);

    let chosen_id = match chosen {
        Some(j) => j.id,
        None => {
            if let Err(e) = web.report_no_judge(&task) {
                warn!("dispatcher: failed to report no-judge for task {}: {}", task.id, e);
            }
            return;
        }
    };

    let enqueued = registry.with_present(&chosen_id, |handle| {
        let _ = handle.sender.send(task.clone());
    });

    if enqueued.is_none() {
        info!(
            "dispatcher: judge {:?} vanished before task {} could be enqueued, requeuing",
            chosen_id, task.id
        );
        queue.push_front(task);
    } else {
        info!("dispatcher: task {} -> judge {:?}", task.id, chosen_id);
    }
}
