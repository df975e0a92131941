// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The per-judge session driver: handshake, then a repeated
//! task-execution loop, for the lifetime of one judge's connection.
//!
//! Control flow is the straight-line sequence the reference judge's
//! `_solve_task` follows, not a dispatched state enum -- `TaskPhase`
//! below exists only for logging.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::error::Fail;
use crate::hash::compute_manifest;
use crate::protocol::*;
use crate::queue::SharedQueue;
use crate::registry::{JudgeHandle, Registry};
use crate::task::{CaseResult, ProblemResult, Task};
use crate::wire::{Connection, WithDeadline};
use crate::web::WebFrontend;

const QUEUE_GET_TIMEOUT: Duration = Duration::from_secs(1);

/// Phase labels used purely for diagnostics; see the module doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    Prepare,
    DataOk,
    Start,
    Compile,
    Cases,
    Finish,
}

/// Parameters a session needs beyond the process-wide shared state.
#[derive(Clone)]
pub struct SessionConfig {
    pub id_max_len: usize,
    pub data_dir: PathBuf,
    pub compile_max_time: Duration,
}

/// Runs one judge's session to completion: handshake, serve loop, and
/// unconditional cleanup on any exit path. Never panics on protocol or
/// transport errors -- those are logged and swallowed, since by design a
/// single judge's misbehavior must not bring down the server.
pub fn run<S: std::io::Read + std::io::Write + WithDeadline>(
    stream: S,
    registry: Registry,
    shared_queue: SharedQueue,
    web: Arc<dyn WebFrontend>,
    terminate: Arc<AtomicBool>,
    config: SessionConfig,
) {
    let mut conn = Connection::new(stream);
    let mut state = SessionState {
        judge_id: None,
        web_registered: false,
        current_task: None,
    };

    let outcome = handshake(&mut conn, &registry, &web, &config, &mut state)
        .and_then(|handle| serve_loop(&mut conn, &handle, &shared_queue, &web, &terminate, &config, &mut state));

    if let Err(fail) = outcome {
        match &fail {
            Fail::Transport { .. } => {
                warn!("session: failed because of network error: {}", fail);
            }
            Fail::Protocol { .. } => {
                warn!("session: protocol violation: {}", fail);
            }
            Fail::Web { .. } => {
                warn!("session: web-frontend error, notifying judge: {}", fail);
                let _ = conn.write_msg(ERROR);
            }
            Fail::Transfer { judge_id, .. } => {
                error!("session: file-transfer error with judge {:?}: {}", judge_id, fail);
            }
        }
    }

    cleanup(&registry, &shared_queue, &web, &mut state);
}

/// Everything about a session's lifetime that cleanup needs to unwind,
/// tracked across the handshake and serve loop.
struct SessionState {
    judge_id: Option<String>,
    web_registered: bool,
    current_task: Option<Task>,
}

/// A live, registered judge: its id and the receiving end of its
/// assigned queue (the registry holds the sending end).
struct LiveJudge {
    id: String,
    receiver: crossbeam_channel::Receiver<Task>,
}

fn handshake<S: std::io::Read + std::io::Write + WithDeadline>(
    conn: &mut Connection<S>,
    registry: &Registry,
    web: &Arc<dyn WebFrontend>,
    config: &SessionConfig,
    state: &mut SessionState,
) -> Result<LiveJudge, Fail> {
    conn.expect_msg(HELLO)?;
    let id = conn.read_str()?;
    let protocol_version = conn.read_u32()?;
    let n = conn.read_u32()?;
    let mut languages_supported = std::collections::HashSet::new();
    for _ in 0..n {
        languages_supported.insert(conn.read_str()?);
    }

    if id.len() > config.id_max_len {
        conn.write_msg(ID_TOO_LONG)?;
        return Err(Fail::protocol(format!("judge id {:?} exceeds max length", id)));
    }

    if registry.contains(&id) {
        conn.write_msg(DUPLICATED_ID)?;
        warn!("session: another judge declared duplicated id {:?}", id);
        return Err(Fail::protocol(format!("duplicated judge id {:?}", id)));
    }

    if protocol_version != PROTOCOL_VERSION {
        conn.write_msg(ERROR)?;
        warn!(
            "session: judge {:?} speaks protocol {:#x}, expected {:#x}",
            id, protocol_version, PROTOCOL_VERSION
        );
        return Err(Fail::protocol("protocol version mismatch"));
    }

    conn.write_msg(CONNECT_OK)?;

    let query_list = web.get_query_list().map_err(|source| Fail::Web { source })?;
    let mut answers = HashMap::new();
    for query in query_list {
        conn.write_msg(QUERY_INFO)?;
        conn.write_str(&query)?;
        conn.expect_msg(ANS_QUERY)?;
        let answer = conn.read_str()?;
        answers.insert(query, answer);
    }

    let languages: Vec<String> = languages_supported.iter().cloned().collect();
    web.register_new_judge(&id, &languages, &answers)
        .map_err(|source| Fail::Web { source })?;
    state.web_registered = true;

    let (sender, receiver) = crossbeam_channel::unbounded();
    let handle = JudgeHandle {
        id: id.clone(),
        languages_supported,
        sender,
    };
    registry
        .insert(handle)
        .map_err(|_| Fail::protocol(format!("duplicated judge id {:?} (race)", id)))?;
    state.judge_id = Some(id.clone());

    info!("session: judge {:?} connected and registered", id);
    Ok(LiveJudge { id, receiver })
}

fn serve_loop<S: std::io::Read + std::io::Write + WithDeadline>(
    conn: &mut Connection<S>,
    judge: &LiveJudge,
    shared_queue: &SharedQueue,
    web: &Arc<dyn WebFrontend>,
    terminate: &Arc<AtomicBool>,
    config: &SessionConfig,
    state: &mut SessionState,
) -> Result<(), Fail> {
    while !terminate.load(Ordering::SeqCst) {
        let task = match judge.receiver.recv_timeout(QUEUE_GET_TIMEOUT) {
            Ok(task) => task,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };
        state.current_task = Some(task.clone());
        run_task(conn, &judge.id, task, shared_queue, web, config, state)?;
    }
    Ok(())
}

/// Runs the full protocol for one task. On success (including per-task
/// conditions like no-data or compile failure) returns `Ok(())` and the
/// caller continues the serve loop; on a session-fatal error returns
/// `Err`.
fn run_task<S: std::io::Read + std::io::Write + WithDeadline>(
    conn: &mut Connection<S>,
    judge_id: &str,
    task: Task,
    shared_queue: &SharedQueue,
    web: &Arc<dyn WebFrontend>,
    config: &SessionConfig,
    state: &mut SessionState,
) -> Result<(), Fail> {
    debug!("session: judge {:?} starting task {} ({:?})", judge_id, task.id, TaskPhase::Prepare);

    let problem_dir = config.data_dir.join(&task.problem);
    let manifest = match compute_manifest(&problem_dir) {
        Ok(m) => m,
        Err(e) => {
            error!("session: no data for problem {:?}: {}", task.problem, e);
            state.current_task = None;
            web.report_no_data(&task).map_err(|source| Fail::Web { source })?;
            return Ok(());
        }
    };

    conn.write_msg(PREPARE_DATA)?;
    conn.write_str(&task.problem)?;
    conn.write_u32(manifest.len() as u32)?;
    for (filename, digest) in &manifest {
        conn.write_str(filename)?;
        conn.write_str(digest)?;
    }

    loop {
        let tag = conn.read_msg()?;
        match tag {
            DATA_OK => break,
            DATA_COMPUTING_SHA1 => {
                trace!("session: judge {:?} still hashing data for {:?}", judge_id, task.problem);
                continue;
            }
            DATA_ERROR => {
                let reason = conn.read_str()?;
                state.current_task = None;
                error!(
                    "session: judge {:?} reports data error [prob: {:?}]: {:?}",
                    judge_id, task.problem, reason
                );
                web.report_error(&task, &format!("data error: {:?}", reason))
                    .map_err(|source| Fail::Web { source })?;
                return Ok(());
            }
            NEED_FILE => {
                let filename = conn.read_str()?;
                let path = problem_dir.join(&filename);
                let speed = crate::oftp::send(&path, conn, judge_id)?;
                info!("session: file transfer speed with judge {:?}: {:.1} kb/s", judge_id, speed);
            }
            other => return Err(Fail::protocol(format!("unexpected tag {:#x} awaiting DATA_OK", other))),
        }
    }

    debug!("session: judge {:?} task {} reached {:?}", judge_id, task.id, TaskPhase::DataOk);
    let ncase = conn.read_u32()?;
    let mut case_tl = Vec::with_capacity(ncase as usize);
    for _ in 0..ncase {
        case_tl.push(conn.read_u32()?);
    }

    conn.write_msg(START_JUDGE)?;
    conn.write_str(&task.language)?;
    conn.write_str(&task.source)?;
    conn.write_str(&task.input_filename)?;
    conn.write_str(&task.output_filename)?;

    loop {
        let tag = conn.read_msg()?;
        if tag == START_JUDGE_OK {
            break;
        }
        if tag != START_JUDGE_WAIT {
            return Err(Fail::protocol(format!("unexpected tag {:#x} awaiting START_JUDGE_OK", tag)));
        }
    }

    debug!("session: judge {:?} task {} reached {:?}", judge_id, task.id, TaskPhase::Start);
    web.report_compiling(&task, judge_id).map_err(|source| Fail::Web { source })?;

    conn.set_deadline(Some(config.compile_max_time))?;
    let tag = conn.read_msg();
    conn.set_deadline(None)?;
    let tag = tag?;

    match tag {
        COMPILE_SUCCEED => {
            web.report_compile_success(&task).map_err(|source| Fail::Web { source })?;
        }
        COMPILE_FAIL => {
            let reason = conn.read_str()?;
            state.current_task = None;
            web.report_compile_failure(&task, &reason)
                .map_err(|source| Fail::Web { source })?;
            return Ok(());
        }
        other => {
            web.report_error(&task, "message check error.")
                .map_err(|source| Fail::Web { source })?;
            return Err(Fail::protocol(format!("unexpected tag {:#x} awaiting compile result", other)));
        }
    }

    debug!("session: judge {:?} task {} reached {:?}", judge_id, task.id, TaskPhase::Compile);
    for i in 0..ncase as usize {
        conn.expect_msg(REPORT_CASE)?;
        let result = read_case_result(conn)?;
        web.report_case_result(&task, &result).map_err(|source| Fail::Web { source })?;
        trace!("session: judge {:?} task {} case {}/{} reported", judge_id, task.id, i + 1, ncase);
    }

    debug!("session: judge {:?} task {} reached {:?}", judge_id, task.id, TaskPhase::Cases);
    conn.expect_msg(REPORT_JUDGE_FINISH)?;
    let result = read_prob_result(conn)?;
    web.report_prob_result(&task, &result).map_err(|source| Fail::Web { source })?;

    debug!("session: judge {:?} task {} reached {:?}", judge_id, task.id, TaskPhase::Finish);
    state.current_task = None;
    Ok(())
}

/// Reads a case result off the wire. The server never interprets these
/// fields beyond relaying them.
fn read_case_result<S: std::io::Read + std::io::Write + WithDeadline>(
    conn: &mut Connection<S>,
) -> Result<CaseResult, Fail> {
    Ok(CaseResult {
        verdict: conn.read_str()?,
        time_used_ms: conn.read_u32()?,
        memory_used_kb: conn.read_u32()?,
        message: conn.read_str()?,
    })
}

fn read_prob_result<S: std::io::Read + std::io::Write + WithDeadline>(
    conn: &mut Connection<S>,
) -> Result<ProblemResult, Fail> {
    Ok(ProblemResult {
        verdict: conn.read_str()?,
        score: conn.read_u32()?,
        message: conn.read_str()?,
    })
}

/// Unconditional on every exit path: requeue an in-flight task, remove
/// the judge from the registry, tell the web frontend it's gone, and
/// drain whatever the dispatcher had already queued for it back onto the
/// shared queue.
fn cleanup(registry: &Registry, shared_queue: &SharedQueue, web: &Arc<dyn WebFrontend>, state: &mut SessionState) {
    if let Some(task) = state.current_task.take() {
        info!("session: requeuing in-flight task {} after session end", task.id);
        shared_queue.push_front(task);
    }

    if let Some(id) = state.judge_id.take() {
        if let Some(handle) = registry.remove(&id) {
            while let Ok(task) = handle.sender.try_recv() {
                shared_queue.push_front(task);
            }
        }
        if state.web_registered {
            if let Err(e) = web.remove_judge(&id) {
                warn!("session: failed to notify web frontend that judge {:?} left: {}", id, e);
            }
        }
        info!("session: judge {:?} cleaned up", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::MockWebFrontend;
    use std::net::{TcpListener, TcpStream};

    struct ScriptedJudge {
        stream: TcpStream,
    }

    impl ScriptedJudge {
        fn connect(addr: std::net::SocketAddr) -> Self {
            ScriptedJudge {
                stream: TcpStream::connect(addr).unwrap(),
            }
        }

        fn conn(&mut self) -> Connection<&mut TcpStream> {
            Connection::new(&mut self.stream)
        }
    }

    impl WithDeadline for &mut TcpStream {
        fn set_deadline(&self, timeout: Option<Duration>) -> std::io::Result<()> {
            TcpStream::set_read_timeout(self, timeout)?;
            TcpStream::set_write_timeout(self, timeout)
        }
    }

    fn spawn_server(
        data_dir: PathBuf,
        web: Arc<dyn WebFrontend>,
    ) -> (
        std::net::SocketAddr,
        std::thread::JoinHandle<()>,
        Registry,
        SharedQueue,
        Arc<AtomicBool>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Registry::new();
        let shared_queue = SharedQueue::new();
        let terminate = Arc::new(AtomicBool::new(false));
        let config = SessionConfig {
            id_max_len: 20,
            data_dir,
            compile_max_time: Duration::from_secs(5),
        };

        let registry_clone = registry.clone();
        let queue_clone = shared_queue.clone();
        let terminate_clone = terminate.clone();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            run(stream, registry_clone, queue_clone, web, terminate_clone, config);
        });
        (addr, handle, registry, shared_queue, terminate)
    }

    #[test]
    fn happy_path_single_case() {
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(data_dir.path().join("p")).unwrap();
        std::fs::write(data_dir.path().join("p").join("a.in"), b"hi").unwrap();

        let web = Arc::new(MockWebFrontend::new(vec![], vec!["cpuinfo".to_string(), "meminfo".to_string()]));
        let (addr, server_handle, registry, shared_queue, terminate) =
            spawn_server(data_dir.path().to_path_buf(), web.clone() as Arc<dyn WebFrontend>);

        let mut judge = ScriptedJudge::connect(addr);
        {
            let mut conn = judge.conn();
            conn.write_msg(HELLO).unwrap();
            conn.write_str("j1").unwrap();
            conn.write_u32(PROTOCOL_VERSION).unwrap();
            conn.write_u32(1).unwrap();
            conn.write_str("cpp").unwrap();
            assert_eq!(conn.read_msg().unwrap(), CONNECT_OK);

            for _ in 0..2 {
                assert_eq!(conn.read_msg().unwrap(), QUERY_INFO);
                let _which = conn.read_str().unwrap();
                conn.write_msg(ANS_QUERY).unwrap();
                conn.write_str("X").unwrap();
            }
        }

        // The registry is populated asynchronously right after the
        // handshake; wait for it rather than racing the dispatcher.
        wait_until(|| registry.contains("j1"));

        let task = Task::new("p", "cpp", "int main(){}", "", "");
        let task_id = task.id;
        registry
            .with_present("j1", |h| h.sender.send(task).unwrap())
            .unwrap();

        {
            let mut conn = judge.conn();
            assert_eq!(conn.read_msg().unwrap(), PREPARE_DATA);
            assert_eq!(conn.read_str().unwrap(), "p");
            let n = conn.read_u32().unwrap();
            assert_eq!(n, 1);
            for _ in 0..n {
                let _name = conn.read_str().unwrap();
                let _digest = conn.read_str().unwrap();
            }
            conn.write_msg(DATA_OK).unwrap();
            conn.write_u32(1).unwrap();
            conn.write_u32(1000).unwrap();

            assert_eq!(conn.read_msg().unwrap(), START_JUDGE);
            assert_eq!(conn.read_str().unwrap(), "cpp");
            assert_eq!(conn.read_str().unwrap(), "int main(){}");
            assert_eq!(conn.read_str().unwrap(), "");
            assert_eq!(conn.read_str().unwrap(), "");
            conn.write_msg(START_JUDGE_OK).unwrap();

            conn.write_msg(COMPILE_SUCCEED).unwrap();

            conn.write_msg(REPORT_CASE).unwrap();
            conn.write_str("AC").unwrap();
            conn.write_u32(100).unwrap();
            conn.write_u32(256).unwrap();
            conn.write_str("").unwrap();

            conn.write_msg(REPORT_JUDGE_FINISH).unwrap();
            conn.write_str("AC").unwrap();
            conn.write_u32(100).unwrap();
            conn.write_str("").unwrap();
        }

        // The session only notices a dropped socket the next time it
        // touches the wire; since no further task is coming, signal
        // shutdown directly rather than relying on disconnect detection
        // (matching the real driver, which stays parked on its task
        // queue between tasks).
        terminate.store(true, Ordering::SeqCst);
        drop(judge);
        server_handle.join().unwrap();

        let calls = web.calls();
        assert!(calls.contains(&crate::web::RecordedCall::Compiling {
            task_id,
            judge_id: "j1".to_string()
        }));
        assert!(calls.contains(&crate::web::RecordedCall::CompileSuccess { task_id }));
        assert!(calls
            .iter()
            .any(|c| matches!(c, crate::web::RecordedCall::CaseResult { task_id: t, .. } if *t == task_id)));
        assert!(calls
            .iter()
            .any(|c| matches!(c, crate::web::RecordedCall::ProbResult { task_id: t, .. } if *t == task_id)));

        let _ = shared_queue;
    }

    #[test]
    fn duplicate_id_is_rejected_and_registry_keeps_one_entry() {
        let data_dir = tempfile::tempdir().unwrap();
        let web = Arc::new(MockWebFrontend::new(vec![], vec![]));
        let (addr, _server_handle, registry, _queue, terminate) =
            spawn_server(data_dir.path().to_path_buf(), web as Arc<dyn WebFrontend>);

        let mut first = ScriptedJudge::connect(addr);
        {
            let mut conn = first.conn();
            conn.write_msg(HELLO).unwrap();
            conn.write_str("dup").unwrap();
            conn.write_u32(PROTOCOL_VERSION).unwrap();
            conn.write_u32(0).unwrap();
            assert_eq!(conn.read_msg().unwrap(), CONNECT_OK);
        }
        wait_until(|| registry.contains("dup"));

        // The production acceptor spawns one thread per connection; this
        // test drives the session function directly for the second
        // connection since there's no listener loop here to accept it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr2 = listener.local_addr().unwrap();
        let registry2 = registry.clone();
        let queue2 = SharedQueue::new();
        let web2 = Arc::new(MockWebFrontend::new(vec![], vec![]));
        let terminate2 = Arc::new(AtomicBool::new(false));
        let config2 = SessionConfig {
            id_max_len: 20,
            data_dir: data_dir.path().to_path_buf(),
            compile_max_time: Duration::from_secs(5),
        };
        let second_handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            run(stream, registry2, queue2, web2 as Arc<dyn WebFrontend>, terminate2, config2);
        });

        let mut second = ScriptedJudge::connect(addr2);
        {
            let mut conn = second.conn();
            conn.write_msg(HELLO).unwrap();
            conn.write_str("dup").unwrap();
            conn.write_u32(PROTOCOL_VERSION).unwrap();
            conn.write_u32(0).unwrap();
            assert_eq!(conn.read_msg().unwrap(), DUPLICATED_ID);
        }
        second_handle.join().unwrap();

        assert!(registry.contains("dup"));
        assert_eq!(registry.snapshot().len(), 1);

        // The first session is parked waiting for a task it will never
        // get; tell it to stop rather than leaking the thread past the
        // end of the test.
        terminate.store(true, Ordering::SeqCst);
    }

    fn wait_until(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition never became true");
    }

    #[test]
    fn need_file_triggers_oftp_then_protocol_continues() {
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(data_dir.path().join("p")).unwrap();
        std::fs::write(data_dir.path().join("p").join("a.in"), b"hi").unwrap();

        let web = Arc::new(MockWebFrontend::new(vec![], vec![]));
        let (addr, server_handle, registry, _shared_queue, terminate) =
            spawn_server(data_dir.path().to_path_buf(), web.clone() as Arc<dyn WebFrontend>);

        let mut judge = ScriptedJudge::connect(addr);
        {
            let mut conn = judge.conn();
            conn.write_msg(HELLO).unwrap();
            conn.write_str("j2").unwrap();
            conn.write_u32(PROTOCOL_VERSION).unwrap();
            conn.write_u32(1).unwrap();
            conn.write_str("cpp").unwrap();
            assert_eq!(conn.read_msg().unwrap(), CONNECT_OK);
        }
        wait_until(|| registry.contains("j2"));

        let task = Task::new("p", "cpp", "int main(){}", "", "");
        let task_id = task.id;
        registry
            .with_present("j2", |h| h.sender.send(task).unwrap())
            .unwrap();

        {
            let mut conn = judge.conn();
            assert_eq!(conn.read_msg().unwrap(), PREPARE_DATA);
            assert_eq!(conn.read_str().unwrap(), "p");
            let n = conn.read_u32().unwrap();
            assert_eq!(n, 1);
            for _ in 0..n {
                let _name = conn.read_str().unwrap();
                let _digest = conn.read_str().unwrap();
            }

            // Ask for the one file before signaling DATA_OK, driving the
            // server through an OFTP send; play the receiver side here.
            conn.write_msg(NEED_FILE).unwrap();
            conn.write_str("a.in").unwrap();

            conn.expect_msg(crate::protocol::OFTP_BEGIN).unwrap();
            let size = conn.read_u32().unwrap() as usize;
            let mut received = Vec::with_capacity(size);
            let mut hasher = sha1::Sha1::new();
            use sha1::Digest;
            loop {
                let tag = conn.read_msg().unwrap();
                if tag == crate::protocol::OFTP_END {
                    break;
                }
                assert_eq!(tag, crate::protocol::OFTP_TRANS_BEGIN);
                conn.expect_msg(crate::protocol::OFTP_FILE_DATA).unwrap();
                let chunk = conn.read_bytes().unwrap();
                hasher.update(&chunk);
                received.extend_from_slice(&chunk);
                conn.write_msg(crate::protocol::OFTP_FDATA_RECVED).unwrap();
            }
            let expected_digest = conn.read_str().unwrap();
            let actual_digest = crate::hash::hex_lower(&hasher.finalize());
            assert_eq!(actual_digest, expected_digest);
            assert_eq!(received, b"hi");
            conn.write_msg(crate::protocol::OFTP_CHECK_OK).unwrap();

            conn.write_msg(DATA_OK).unwrap();
            conn.write_u32(1).unwrap();
            conn.write_u32(1000).unwrap();

            assert_eq!(conn.read_msg().unwrap(), START_JUDGE);
            let _ = conn.read_str().unwrap();
            let _ = conn.read_str().unwrap();
            let _ = conn.read_str().unwrap();
            let _ = conn.read_str().unwrap();
            conn.write_msg(START_JUDGE_OK).unwrap();

            conn.write_msg(COMPILE_SUCCEED).unwrap();

            conn.write_msg(REPORT_CASE).unwrap();
            conn.write_str("AC").unwrap();
            conn.write_u32(100).unwrap();
            conn.write_u32(256).unwrap();
            conn.write_str("").unwrap();

            conn.write_msg(REPORT_JUDGE_FINISH).unwrap();
            conn.write_str("AC").unwrap();
            conn.write_u32(100).unwrap();
            conn.write_str("").unwrap();
        }

        terminate.store(true, Ordering::SeqCst);
        drop(judge);
        server_handle.join().unwrap();

        let calls = web.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, crate::web::RecordedCall::ProbResult { task_id: t, .. } if *t == task_id)));
    }

    #[test]
    fn data_error_is_reported_and_session_continues_to_next_task() {
        let data_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(data_dir.path().join("p")).unwrap();
        std::fs::write(data_dir.path().join("p").join("a.in"), b"hi").unwrap();

        let web = Arc::new(MockWebFrontend::new(vec![], vec![]));
        let (addr, server_handle, registry, _shared_queue, terminate) =
            spawn_server(data_dir.path().to_path_buf(), web.clone() as Arc<dyn WebFrontend>);

        let mut judge = ScriptedJudge::connect(addr);
        {
            let mut conn = judge.conn();
            conn.write_msg(HELLO).unwrap();
            conn.write_str("j3").unwrap();
            conn.write_u32(PROTOCOL_VERSION).unwrap();
            conn.write_u32(1).unwrap();
            conn.write_str("cpp").unwrap();
            assert_eq!(conn.read_msg().unwrap(), CONNECT_OK);
        }
        wait_until(|| registry.contains("j3"));

        let task = Task::new("p", "cpp", "int main(){}", "", "");
        let task_id = task.id;
        registry
            .with_present("j3", |h| h.sender.send(task).unwrap())
            .unwrap();

        let second_task = Task::new("p", "cpp", "int main(){}", "", "");
        let second_task_id = second_task.id;

        {
            let mut conn = judge.conn();
            assert_eq!(conn.read_msg().unwrap(), PREPARE_DATA);
            let _problem = conn.read_str().unwrap();
            let n = conn.read_u32().unwrap();
            for _ in 0..n {
                let _name = conn.read_str().unwrap();
                let _digest = conn.read_str().unwrap();
            }

            conn.write_msg(DATA_ERROR).unwrap();
            conn.write_str("checksum mismatch").unwrap();
        }

        // The session must go back to the serve loop and pick up a second
        // task rather than dying after the per-task DATA_ERROR.
        registry
            .with_present("j3", |h| h.sender.send(second_task).unwrap())
            .unwrap();

        {
            let mut conn = judge.conn();
            assert_eq!(conn.read_msg().unwrap(), PREPARE_DATA);
            let _problem = conn.read_str().unwrap();
            let n = conn.read_u32().unwrap();
            for _ in 0..n {
                let _name = conn.read_str().unwrap();
                let _digest = conn.read_str().unwrap();
            }
            conn.write_msg(DATA_ERROR).unwrap();
            conn.write_str("still missing").unwrap();
        }

        terminate.store(true, Ordering::SeqCst);
        drop(judge);
        server_handle.join().unwrap();

        let calls = web.calls();
        assert!(calls.contains(&crate::web::RecordedCall::Error {
            task_id,
            reason: "data error: \"checksum mismatch\"".to_string(),
        }));
        assert!(calls.contains(&crate::web::RecordedCall::Error {
            task_id: second_task_id,
            reason: "data error: \"still missing\"".to_string(),
        }));
    }
}
