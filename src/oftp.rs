// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! OFTP: the chunked file-transfer sub-protocol used to push a
//! problem-data file to a judge that reported it missing or stale.
//!
//! Only the sender (server) side is production code here -- the judge is
//! an external collaborator. The matching receiver side exists under
//! `#[cfg(test)]` so the round-trip property (bytes received on the
//! judge side equal bytes read on the server side, for any file size
//! including 0) has something to exercise it against.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use sha1::{Digest, Sha1};

use crate::error::Fail;
use crate::hash::hex_lower;
use crate::protocol::{
    OFTP_BEGIN, OFTP_CHECK_FAIL, OFTP_CHECK_OK, OFTP_END, OFTP_FDATA_RECVED, OFTP_FILE_DATA,
    OFTP_SYSTEM_ERROR, OFTP_TRANS_BEGIN,
};
use crate::wire::Connection;

/// Chunk size used when streaming a file. Not part of the wire contract:
/// the receiver tolerates any chunk size, so this may change freely.
const CHUNK_SIZE: usize = 64 * 1024;

/// Sends `path` to the judge over `conn`, returning the observed
/// throughput in KB/s for logging.
///
/// Protocol: `OFTP_BEGIN` + file size, then for each chunk
/// `OFTP_TRANS_BEGIN` + `OFTP_FILE_DATA` + bytes, each acknowledged by the
/// judge with `OFTP_FDATA_RECVED`; finally `OFTP_END` + whole-file SHA-1
/// hex digest, acknowledged with `OFTP_CHECK_OK` or `OFTP_CHECK_FAIL`. The
/// judge may abort at any point with `OFTP_SYSTEM_ERROR`.
pub fn send<S: Read + Write>(
    path: &Path,
    conn: &mut Connection<S>,
    judge_id: &str,
) -> Result<f64, Fail> {
    let mut file = File::open(path).map_err(|e| {
        Fail::transfer(judge_id, format!("can't open {}: {}", path.display(), e))
    })?;
    let size = file
        .metadata()
        .map_err(|e| Fail::transfer(judge_id, format!("can't stat {}: {}", path.display(), e)))?
        .len();

    let started = Instant::now();
    let mut hasher = Sha1::new();

    conn.write_msg(OFTP_BEGIN)
        .map_err(|e| transfer_err(judge_id, e))?;
    conn.write_u32(size as u32)
        .map_err(|e| transfer_err(judge_id, e))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        file.read_exact(&mut buf[..want])
            .map_err(|e| Fail::transfer(judge_id, format!("read error: {}", e)))?;
        hasher.update(&buf[..want]);

        conn.write_msg(OFTP_TRANS_BEGIN)
            .map_err(|e| transfer_err(judge_id, e))?;
        conn.write_msg(OFTP_FILE_DATA)
            .map_err(|e| transfer_err(judge_id, e))?;
        conn.write_bytes(&buf[..want])
            .map_err(|e| transfer_err(judge_id, e))?;

        let ack = conn.read_msg().map_err(|e| transfer_err(judge_id, e))?;
        if ack == OFTP_SYSTEM_ERROR {
            return Err(Fail::transfer(judge_id, "judge reported system error mid-transfer"));
        }
        if ack != OFTP_FDATA_RECVED {
            return Err(Fail::transfer(
                judge_id,
                format!("unexpected ack tag {:#x}", ack),
            ));
        }

        remaining -= want as u64;
    }

    let digest = hex_lower(&hasher.finalize());
    conn.write_msg(OFTP_END).map_err(|e| transfer_err(judge_id, e))?;
    conn.write_str(&digest).map_err(|e| transfer_err(judge_id, e))?;

    let verdict = conn.read_msg().map_err(|e| transfer_err(judge_id, e))?;
    if verdict == OFTP_CHECK_FAIL {
        return Err(Fail::transfer(judge_id, "judge reported checksum mismatch"));
    }
    if verdict != OFTP_CHECK_OK {
        return Err(Fail::transfer(
            judge_id,
            format!("unexpected check-result tag {:#x}", verdict),
        ));
    }

    let elapsed = started.elapsed().as_secs_f64().max(1e-6);
    let kb_per_sec = (size as f64 / 1024.0) / elapsed;
    Ok(kb_per_sec)
}

fn transfer_err(judge_id: &str, fail: Fail) -> Fail {
    match fail {
        Fail::Transport { source } => Fail::transfer(judge_id, format!("transport error: {}", source)),
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    /// Runs `send` against a real loopback `TcpStream`, with a receiver
    /// thread playing the judge side, and returns the bytes the receiver
    /// actually saw.
    fn round_trip(contents: &[u8]) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, contents).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::new(stream);
            receive(&mut conn)
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut conn = Connection::new(stream);
        let throughput = send(&path, &mut conn, "judge-under-test").unwrap();
        assert!(throughput >= 0.0);

        receiver.join().unwrap()
    }

    /// Reference receiver implementation (stands in for the judge),
    /// mirroring `send`'s exact message sequence.
    fn receive<S: Read + Write>(conn: &mut Connection<S>) -> Vec<u8> {
        conn.expect_msg(OFTP_BEGIN).unwrap();
        let size = conn.read_u32().unwrap() as usize;
        let mut received = Vec::with_capacity(size);
        let mut hasher = Sha1::new();

        loop {
            let tag = conn.read_msg().unwrap();
            if tag == OFTP_END {
                break;
            }
            assert_eq!(tag, OFTP_TRANS_BEGIN);
            conn.expect_msg(OFTP_FILE_DATA).unwrap();
            let chunk = conn.read_bytes().unwrap();
            hasher.update(&chunk);
            received.extend_from_slice(&chunk);
            conn.write_msg(OFTP_FDATA_RECVED).unwrap();
        }

        let expected_digest = conn.read_str().unwrap();
        let actual_digest = hex_lower(&hasher.finalize());
        if actual_digest == expected_digest {
            conn.write_msg(OFTP_CHECK_OK).unwrap();
        } else {
            conn.write_msg(OFTP_CHECK_FAIL).unwrap();
        }
        received
    }

    #[test]
    fn empty_and_nonempty_files_round_trip() {
        for size in [0usize, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE * 2 + 17] {
            let contents: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let received = round_trip(&contents);
            assert_eq!(received, contents);
        }
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        // A receiver that always reports a mismatch makes `send` return a
        // transfer error, never silently succeed.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::new(stream);
            conn.expect_msg(OFTP_BEGIN).unwrap();
            let _size = conn.read_u32().unwrap();
            loop {
                let tag = conn.read_msg().unwrap();
                if tag == OFTP_END {
                    let _digest = conn.read_str().unwrap();
                    conn.write_msg(OFTP_CHECK_FAIL).unwrap();
                    break;
                }
                conn.expect_msg(OFTP_FILE_DATA).unwrap();
                let _chunk = conn.read_bytes().unwrap();
                conn.write_msg(OFTP_FDATA_RECVED).unwrap();
            }
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut conn = Connection::new(stream);
        let result = send(&path, &mut conn, "judge-under-test");
        assert!(result.is_err());
        receiver.join().unwrap();
    }
}
