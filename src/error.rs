// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Session-fatal error kinds that cross the boundary of a single judge
//! connection. Everything here unwinds straight to the session driver's
//! cleanup path; per-task conditions (no data, compile failure, ...) are
//! reported to the web frontend and handled inline instead.

use crate::web::WebError;

custom_error::custom_error! {
    /// Errors that terminate a judge session.
    pub Fail
    Transport{source: std::io::Error} = "transport error: {source}",
    Protocol{detail: String} = "protocol violation: {detail}",
    Web{source: WebError} = "web-frontend error: {source}",
    Transfer{judge_id: String, detail: String} = "file-transfer error with judge {judge_id:?}: {detail}",
}

impl Fail {
    /// Shorthand for the common "unexpected tag" case.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Fail::Protocol {
            detail: detail.into(),
        }
    }

    pub fn transfer(judge_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Fail::Transfer {
            judge_id: judge_id.into(),
            detail: detail.into(),
        }
    }
}
