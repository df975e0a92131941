// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The web-frontend adaptor: the contract the rest of the crate consumes
//! to pull tasks and report progress, plus a small HTTP implementation
//! and an in-memory mock for tests.
//!
//! The web frontend's own business logic is entirely external to this
//! core; this module only fixes the *shape* of the client.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::task::{CaseResult, ProblemResult, Task};

/// Failure talking to the web frontend. Session-fatal for the judge in
/// whose context it was raised.
#[derive(Debug, derive_more::Display)]
pub enum WebError {
    #[display(fmt = "http error: {}", _0)]
    Http(String),
    #[display(fmt = "malformed response: {}", _0)]
    Malformed(String),
}

impl std::error::Error for WebError {}

/// Operations the core consumes from the web frontend: task intake and
/// every status report a judged task can produce.
pub trait WebFrontend: Send + Sync {
    fn fetch_task(&self) -> Result<Option<Task>, WebError>;
    fn report_no_judge(&self, task: &Task) -> Result<(), WebError>;
    fn report_no_data(&self, task: &Task) -> Result<(), WebError>;
    fn report_error(&self, task: &Task, reason: &str) -> Result<(), WebError>;
    fn report_compiling(&self, task: &Task, judge_id: &str) -> Result<(), WebError>;
    fn report_compile_success(&self, task: &Task) -> Result<(), WebError>;
    fn report_compile_failure(&self, task: &Task, reason: &str) -> Result<(), WebError>;
    fn report_case_result(&self, task: &Task, case_result: &CaseResult) -> Result<(), WebError>;
    fn report_prob_result(&self, task: &Task, prob_result: &ProblemResult) -> Result<(), WebError>;
    fn get_query_list(&self) -> Result<Vec<String>, WebError>;
    fn register_new_judge(
        &self,
        judge_id: &str,
        languages: &[String],
        answers: &HashMap<String, String>,
    ) -> Result<(), WebError>;
    fn remove_judge(&self, judge_id: &str) -> Result<(), WebError>;
}

/// A tiny JSON envelope posted to the web frontend's control-plane
/// endpoint. The frontend's actual schema is external; this is shaped
/// like the small internal-API clients elsewhere in the pack (a single
/// `op` discriminant plus free-form fields).
#[derive(serde::Serialize)]
struct Envelope<'a, T: serde::Serialize> {
    op: &'a str,
    #[serde(flatten)]
    body: T,
}

/// Production [`WebFrontend`]: a blocking HTTP client posting to
/// `{base_url}/api/judge-core`.
pub struct HttpWebFrontend {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpWebFrontend {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpWebFrontend {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn post<T: serde::Serialize>(&self, op: &str, body: T) -> Result<serde_json::Value, WebError> {
        let url = format!("{}/api/judge-core", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Envelope { op, body })
            .send()
            .map_err(|e| WebError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WebError::Http(format!("status {}", resp.status())));
        }
        resp.json::<serde_json::Value>()
            .map_err(|e| WebError::Malformed(e.to_string()))
    }
}

#[derive(serde::Serialize)]
struct Empty {}

impl WebFrontend for HttpWebFrontend {
    fn fetch_task(&self) -> Result<Option<Task>, WebError> {
        let reply = self.post("fetch_task", Empty {})?;
        if reply.is_null() {
            return Ok(None);
        }
        let problem = reply
            .get("problem")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebError::Malformed("missing problem".into()))?;
        let language = reply
            .get("language")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebError::Malformed("missing language".into()))?;
        let source = reply
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WebError::Malformed("missing source".into()))?;
        let input = reply.get("input_filename").and_then(|v| v.as_str()).unwrap_or("");
        let output = reply.get("output_filename").and_then(|v| v.as_str()).unwrap_or("");
        Ok(Some(Task::new(problem, language, source, input, output)))
    }

    fn report_no_judge(&self, task: &Task) -> Result<(), WebError> {
        self.post("report_no_judge", serde_json::json!({ "task_id": task.id }))
            .map(drop)
    }

    fn report_no_data(&self, task: &Task) -> Result<(), WebError> {
        self.post("report_no_data", serde_json::json!({ "task_id": task.id }))
            .map(drop)
    }

    fn report_error(&self, task: &Task, reason: &str) -> Result<(), WebError> {
        self.post(
            "report_error",
            serde_json::json!({ "task_id": task.id, "reason": reason }),
        )
        .map(drop)
    }

    fn report_compiling(&self, task: &Task, judge_id: &str) -> Result<(), WebError> {
        self.post(
            "report_compiling",
            serde_json::json!({ "task_id": task.id, "judge_id": judge_id }),
        )
        .map(drop)
    }

    fn report_compile_success(&self, task: &Task) -> Result<(), WebError> {
        self.post("report_compile_success", serde_json::json!({ "task_id": task.id }))
            .map(drop)
    }

    fn report_compile_failure(&self, task: &Task, reason: &str) -> Result<(), WebError> {
        self.post(
            "report_compile_failure",
            serde_json::json!({ "task_id": task.id, "reason": reason }),
        )
        .map(drop)
    }

    fn report_case_result(&self, task: &Task, case_result: &CaseResult) -> Result<(), WebError> {
        self.post(
            "report_case_result",
            serde_json::json!({ "task_id": task.id, "result": case_result }),
        )
        .map(drop)
    }

    fn report_prob_result(&self, task: &Task, prob_result: &ProblemResult) -> Result<(), WebError> {
        self.post(
            "report_prob_result",
            serde_json::json!({ "task_id": task.id, "result": prob_result }),
        )
        .map(drop)
    }

    fn get_query_list(&self) -> Result<Vec<String>, WebError> {
        let reply = self.post("get_query_list", Empty {})?;
        let list = reply
            .as_array()
            .ok_or_else(|| WebError::Malformed("expected array".into()))?;
        list.iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| WebError::Malformed("non-string query entry".into()))
            })
            .collect()
    }

    fn register_new_judge(
        &self,
        judge_id: &str,
        languages: &[String],
        answers: &HashMap<String, String>,
    ) -> Result<(), WebError> {
        self.post(
            "register_new_judge",
            serde_json::json!({ "judge_id": judge_id, "languages": languages, "answers": answers }),
        )
        .map(drop)
    }

    fn remove_judge(&self, judge_id: &str) -> Result<(), WebError> {
        self.post("remove_judge", serde_json::json!({ "judge_id": judge_id }))
            .map(drop)
    }
}

/// One recorded call, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    NoJudge { task_id: u64 },
    NoData { task_id: u64 },
    Error { task_id: u64, reason: String },
    Compiling { task_id: u64, judge_id: String },
    CompileSuccess { task_id: u64 },
    CompileFailure { task_id: u64, reason: String },
    CaseResult { task_id: u64, result: CaseResult },
    ProbResult { task_id: u64, result: ProblemResult },
    RegisterJudge { judge_id: String },
    RemoveJudge { judge_id: String },
}

/// In-memory [`WebFrontend`] for tests: a scripted task source plus a
/// recorder of every reporting call.
#[derive(Default)]
pub struct MockWebFrontend {
    tasks: Mutex<std::collections::VecDeque<Task>>,
    query_list: Vec<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockWebFrontend {
    pub fn new(tasks: Vec<Task>, query_list: Vec<String>) -> Self {
        MockWebFrontend {
            tasks: Mutex::new(tasks.into()),
            query_list,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WebFrontend for MockWebFrontend {
    fn fetch_task(&self) -> Result<Option<Task>, WebError> {
        Ok(self.tasks.lock().unwrap().pop_front())
    }

    fn report_no_judge(&self, task: &Task) -> Result<(), WebError> {
        self.record(RecordedCall::NoJudge { task_id: task.id });
        Ok(())
    }

    fn report_no_data(&self, task: &Task) -> Result<(), WebError> {
        self.record(RecordedCall::NoData { task_id: task.id });
        Ok(())
    }

    fn report_error(&self, task: &Task, reason: &str) -> Result<(), WebError> {
        self.record(RecordedCall::Error {
            task_id: task.id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn report_compiling(&self, task: &Task, judge_id: &str) -> Result<(), WebError> {
        self.record(RecordedCall::Compiling {
            task_id: task.id,
            judge_id: judge_id.to_string(),
        });
        Ok(())
    }

    fn report_compile_success(&self, task: &Task) -> Result<(), WebError> {
        self.record(RecordedCall::CompileSuccess { task_id: task.id });
        Ok(())
    }

    fn report_compile_failure(&self, task: &Task, reason: &str) -> Result<(), WebError> {
        self.record(RecordedCall::CompileFailure {
            task_id: task.id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn report_case_result(&self, task: &Task, case_result: &CaseResult) -> Result<(), WebError> {
        self.record(RecordedCall::CaseResult {
            task_id: task.id,
            result: case_result.clone(),
        });
        Ok(())
    }

    fn report_prob_result(&self, task: &Task, prob_result: &ProblemResult) -> Result<(), WebError> {
        self.record(RecordedCall::ProbResult {
            task_id: task.id,
            result: prob_result.clone(),
        });
        Ok(())
    }

    fn get_query_list(&self) -> Result<Vec<String>, WebError> {
        Ok(self.query_list.clone())
    }

    fn register_new_judge(
        &self,
        judge_id: &str,
        _languages: &[String],
        _answers: &HashMap<String, String>,
    ) -> Result<(), WebError> {
        self.record(RecordedCall::RegisterJudge {
            judge_id: judge_id.to_string(),
        });
        Ok(())
    }

    fn remove_judge(&self, judge_id: &str) -> Result<(), WebError> {
        self.record(RecordedCall::RemoveJudge {
            judge_id: judge_id.to_string(),
        });
        Ok(())
    }
}
