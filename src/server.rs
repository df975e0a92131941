// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Process entry point: wires together the registry, shared queue,
//! fetcher, dispatcher, and acceptor behind a single termination flag.
//!
//! Binding the listen socket, accepting connections, and spawning one
//! session-driver thread per connection all happen here; everything else
//! is delegated to the other modules.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::Config;
use crate::queue::SharedQueue;
use crate::registry::Registry;
use crate::session::SessionConfig;
use crate::web::WebFrontend;
use crate::{dispatcher, fetcher, session};

/// Handle to a running server: the termination flag and the thread
/// handles for the fetcher, dispatcher, and acceptor. Dropping this
/// handle does not stop the server -- call [`ServerHandle::shutdown`]
/// and then [`ServerHandle::join`].
pub struct ServerHandle {
    terminate: Arc<AtomicBool>,
    fetcher: std::thread::JoinHandle<()>,
    dispatcher: std::thread::JoinHandle<()>,
    acceptor: std::thread::JoinHandle<()>,
}

impl ServerHandle {
    /// Flips the shared termination flag. Every activity observes it
    /// within a few seconds (the bound on their blocking timeouts).
    pub fn shutdown(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn join(self) {
        let _ = self.fetcher.join();
        let _ = self.dispatcher.join();
        let _ = self.acceptor.join();
    }
}

/// Starts the fetcher, dispatcher, and acceptor threads and returns
/// immediately with a handle to control them. `web` is shared across all
/// three activities and every session driver.
pub fn run(config: Config, web: Arc<dyn WebFrontend>) -> std::io::Result<ServerHandle> {
    let registry = Registry::new();
    let shared_queue = SharedQueue::new();
    let terminate = Arc::new(AtomicBool::new(false));

    let listener = TcpListener::bind(&config.listen_addr)?;
    info!("server: listening on {}", config.listen_addr);

    let fetcher_handle = {
        let web = web.clone();
        let queue = shared_queue.clone();
        let terminate = terminate.clone();
        let refresh_interval = config.refresh_interval();
        std::thread::spawn(move || fetcher::run(web, queue, terminate, refresh_interval))
    };

    let dispatcher_handle = {
        let registry = registry.clone();
        let queue = shared_queue.clone();
        let web = web.clone();
        let terminate = terminate.clone();
        std::thread::spawn(move || dispatcher::run(registry, queue, web, terminate))
    };

    let acceptor_handle = {
        let registry = registry.clone();
        let queue = shared_queue.clone();
        let web = web.clone();
        let terminate = terminate.clone();
        let session_config = SessionConfig {
            id_max_len: config.judge_id_max_len,
            data_dir: config.data_dir.clone(),
            compile_max_time: Duration::from_secs(crate::protocol::COMPILE_MAX_TIME_SECS),
        };
        std::thread::spawn(move || accept_loop(listener, registry, queue, web, terminate, session_config))
    };

    Ok(ServerHandle {
        terminate,
        fetcher: fetcher_handle,
        dispatcher: dispatcher_handle,
        acceptor: acceptor_handle,
    })
}

fn accept_loop(
    listener: TcpListener,
    registry: Registry,
    queue: SharedQueue,
    web: Arc<dyn WebFrontend>,
    terminate: Arc<AtomicBool>,
    session_config: SessionConfig,
) {
    // A short accept timeout gives this loop the same termination
    // liveness as every other blocking point in the system.
    listener
        .set_nonblocking(true)
        .expect("listener must support non-blocking mode");

    while !terminate.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("server: accepted connection from {}", peer);
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("server: failed to set TCP_NODELAY for {}: {}", peer, e);
                }
                let registry = registry.clone();
                let queue = queue.clone();
                let web = web.clone();
                let terminate = terminate.clone();
                let session_config = session_config.clone();
                std::thread::spawn(move || {
                    session::run(stream, registry, queue, web, terminate, session_config);
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => {
                error!("server: accept failed: {}", e);
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
    info!("server: acceptor terminating");
}
