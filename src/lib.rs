// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Coordination core of an online programming-judge cluster: a server
//! that accepts long-lived connections from remote judge workers, polls
//! an external web frontend for pending submissions, dispatches each to
//! a capable judge, and shepherds it through the wire protocol.
//!
//! This crate never initializes a logger itself -- it only calls into
//! the `log` facade, so an embedding binary (see `src/bin/judged.rs`)
//! chooses the subscriber.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod hash;
pub mod oftp;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod task;
pub mod web;
pub mod wire;

pub use config::Config;
pub use error::Fail;
pub use server::{run, ServerHandle};
pub use task::{CaseResult, ProblemResult, Task};
pub use web::{HttpWebFrontend, MockWebFrontend, WebError, WebFrontend};
