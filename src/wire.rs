// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wire codec: length-prefixed strings, big-endian `u32`s, and message
//! tags over a framed, bidirectional byte stream.
//!
//! This module deliberately knows nothing about judges, tasks, or OFTP —
//! it is the thin layer the rest of the crate builds on, generic over any
//! `Read + Write` stream so the same code serves a real `TcpStream` and a
//! loopback pair in tests.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Fail;

/// A stream that can have read/write deadlines imposed on it. Implemented
/// for [`TcpStream`]; test doubles that don't need real timeouts (an
/// in-memory pipe, say) can implement it as a no-op.
pub trait WithDeadline {
    fn set_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl WithDeadline for TcpStream {
    fn set_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

/// Framed connection over some underlying stream `S`.
pub struct Connection<S> {
    stream: S,
}

impl<S> Connection<S> {
    pub fn new(stream: S) -> Self {
        Connection { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: WithDeadline> Connection<S> {
    /// Sets the deadline applied to every subsequent read *and* write.
    /// `None` means no deadline.
    pub fn set_deadline(&mut self, timeout: Option<Duration>) -> Result<(), Fail> {
        self.stream
            .set_deadline(timeout)
            .map_err(|source| Fail::Transport { source })
    }
}

impl<S: Read + Write> Connection<S> {
    pub fn write_u32(&mut self, v: u32) -> Result<(), Fail> {
        self.stream
            .write_u32::<BigEndian>(v)
            .map_err(|source| Fail::Transport { source })
    }

    pub fn read_u32(&mut self) -> Result<u32, Fail> {
        self.stream
            .read_u32::<BigEndian>()
            .map_err(|source| Fail::Transport { source })
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), Fail> {
        self.write_u32(s.len() as u32)?;
        self.stream
            .write_all(s.as_bytes())
            .map_err(|source| Fail::Transport { source })
    }

    pub fn read_str(&mut self) -> Result<String, Fail> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .map_err(|source| Fail::Transport { source })?;
        String::from_utf8(buf).map_err(|e| Fail::protocol(format!("non-utf8 string: {}", e)))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Fail> {
        self.write_u32(bytes.len() as u32)?;
        self.stream
            .write_all(bytes)
            .map_err(|source| Fail::Transport { source })
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, Fail> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .map_err(|source| Fail::Transport { source })?;
        Ok(buf)
    }

    /// Writes a single message tag.
    pub fn write_msg(&mut self, tag: u32) -> Result<(), Fail> {
        self.write_u32(tag)
    }

    /// Reads a single message tag.
    pub fn read_msg(&mut self) -> Result<u32, Fail> {
        self.read_u32()
    }

    /// Reads a message tag and fails with a protocol violation unless it
    /// matches `expected`.
    pub fn expect_msg(&mut self, expected: u32) -> Result<(), Fail> {
        let got = self.read_msg()?;
        if got != expected {
            return Err(Fail::protocol(format!(
                "expected tag {:#x}, got {:#x}",
                expected, got
            )));
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Fail> {
        self.stream.flush().map_err(|source| Fail::Transport { source })
    }
}
