// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The task fetcher: one background activity that drains the web
//! frontend into the shared queue on a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::queue::SharedQueue;
use crate::web::WebFrontend;

/// Runs the fetch loop until `terminate` is set. Intended to be spawned
/// on its own thread by `server::run`.
///
/// Loop: drain the web frontend synchronously (pulling tasks until it
/// reports none) then sleep for `refresh_interval`, checking
/// `terminate` both before the drain and in small slices during the
/// sleep so shutdown latency stays bounded.
pub fn run(web: Arc<dyn WebFrontend>, queue: SharedQueue, terminate: Arc<AtomicBool>, refresh_interval: Duration) {
    const SLEEP_SLICE: Duration = Duration::from_secs(1);

    while !terminate.load(Ordering::SeqCst) {
        loop {
            match web.fetch_task() {
                Ok(Some(task)) => {
                    debug!("fetcher: drained task {} for problem {:?}", task.id, task.problem);
                    queue.push(task);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("fetcher: web-frontend error while draining tasks: {}", e);
                    break;
                }
            }
        }

        let deadline = Instant::now() + refresh_interval;
        while Instant::now() < deadline {
            if terminate.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
    info!("fetcher: terminating");
}
