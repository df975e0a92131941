// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Message-tag catalogue and protocol constants shared by the wire codec,
//! the OFTP sub-protocol, and the session driver.
//!
//! Tags are plain `u32` constants rather than a Rust `enum` so that an
//! out-of-range value read off the wire is just "not one of these",
//! handled by the caller as a protocol violation, instead of forcing an
//! intermediate fallible conversion everywhere a tag is read.

/// Negotiated protocol version. A judge whose `HELLO` carries any other
/// value never enters the registry.
pub const PROTOCOL_VERSION: u32 = 0xFF00_0001;

/// Maximum compile time the session driver will wait for `COMPILE_SUCCEED`
/// or `COMPILE_FAIL` after `START_JUDGE_OK`, in seconds.
pub const COMPILE_MAX_TIME_SECS: u64 = 30;

/// Reserved tag for a generic, catch-all error report.
pub const ERROR: u32 = 0xFFFF_FFFF;

pub const TELL_ONLINE: u32 = 0;
pub const HELLO: u32 = 1;

pub const DUPLICATED_ID: u32 = 2;
pub const ID_TOO_LONG: u32 = 3;
pub const CONNECT_OK: u32 = 4;

pub const QUERY_INFO: u32 = 5;
pub const ANS_QUERY: u32 = 6;

pub const PREPARE_DATA: u32 = 7;
pub const DATA_COMPUTING_SHA1: u32 = 8;
pub const NEED_FILE: u32 = 9;
pub const DATA_ERROR: u32 = 10;
pub const DATA_OK: u32 = 11;

pub const START_JUDGE: u32 = 12;
pub const START_JUDGE_OK: u32 = 13;
pub const START_JUDGE_WAIT: u32 = 14;

pub const COMPILE_SUCCEED: u32 = 15;
pub const COMPILE_FAIL: u32 = 16;

pub const REPORT_CASE: u32 = 17;
pub const REPORT_JUDGE_FINISH: u32 = 18;

pub const OFTP_BEGIN: u32 = 19;
pub const OFTP_TRANS_BEGIN: u32 = 20;
pub const OFTP_FILE_DATA: u32 = 21;
pub const OFTP_FDATA_RECVED: u32 = 22;
pub const OFTP_CHECK_OK: u32 = 23;
pub const OFTP_CHECK_FAIL: u32 = 24;
pub const OFTP_END: u32 = 25;
pub const OFTP_SYSTEM_ERROR: u32 = 26;
