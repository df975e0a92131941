// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Core data types: [`Task`], the per-case and per-problem results relayed
//! to the web frontend, and the manifest entry type used by the
//! data-list hasher.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// One submission awaiting judgment. Immutable once created; owned by
/// exactly one of {shared queue, a judge's assigned queue, an in-flight
/// session driver, "reported terminal"} at any instant.
#[derive(Debug, Clone)]
pub struct Task {
    /// Server-local id, not part of the wire protocol. Used only for
    /// logging and test correlation.
    pub id: u64,
    pub problem: String,
    pub language: String,
    pub source: String,
    pub input_filename: String,
    pub output_filename: String,
}

impl Task {
    pub fn new(
        problem: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
        input_filename: impl Into<String>,
        output_filename: impl Into<String>,
    ) -> Self {
        Task {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            problem: problem.into(),
            language: language.into(),
            source: source.into(),
            input_filename: input_filename.into(),
            output_filename: output_filename.into(),
        }
    }
}

/// The handful of fields the reference judge actually places on the wire
/// for a per-case report. The server never interprets these beyond
/// relaying them to the web frontend; this shape exists so the codec and
/// its tests have something concrete to round-trip.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CaseResult {
    pub verdict: String,
    pub time_used_ms: u32,
    pub memory_used_kb: u32,
    pub message: String,
}

/// Same idea as [`CaseResult`], for the final `REPORT_JUDGE_FINISH`
/// message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProblemResult {
    pub verdict: String,
    pub score: u32,
    pub message: String,
}
