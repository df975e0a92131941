// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Process configuration. Loading configuration from a file or CLI surface
//! is out of scope for this crate; `Config` is a plain, validated struct
//! that an embedding binary (see `src/bin/judged.rs`) fills in however it
//! likes (environment variables, a config file, hardcoded defaults) before
//! handing it to [`crate::server::run`].

use std::path::PathBuf;

/// Default value for [`Config::refresh_interval_secs`].
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 2;

/// Default value for [`Config::judge_id_max_len`].
pub const DEFAULT_JUDGE_ID_MAX_LEN: usize = 20;

/// Default listen address. The original has no default; this one is
/// picked to be obviously overridable rather than silently binding a
/// well-known port.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9132";

#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds between fetches from the web frontend. Must be >= 1.
    pub refresh_interval_secs: u64,
    /// Maximum judge-id length in bytes. Must be >= 1.
    pub judge_id_max_len: usize,
    /// Working directory containing one subdirectory per problem.
    pub data_dir: PathBuf,
    /// Address the acceptor binds.
    pub listen_addr: String,
    /// Base URL for the HTTP web-frontend adaptor.
    pub web_base_url: String,
}

/// A configuration value failed validation.
#[derive(Debug, derive_more::Display)]
#[display(fmt = "invalid configuration: {option} can not be {problem}")]
pub struct ConfigError {
    pub option: &'static str,
    pub problem: &'static str,
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn new(data_dir: PathBuf, web_base_url: impl Into<String>) -> Self {
        Config {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            judge_id_max_len: DEFAULT_JUDGE_ID_MAX_LEN,
            data_dir,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            web_base_url: web_base_url.into(),
        }
    }

    pub fn with_refresh_interval_secs(mut self, secs: u64) -> Result<Self, ConfigError> {
        if secs < 1 {
            return Err(ConfigError {
                option: "RefreshInterval",
                problem: "less than 1 second",
            });
        }
        self.refresh_interval_secs = secs;
        Ok(self)
    }

    pub fn with_judge_id_max_len(mut self, len: usize) -> Result<Self, ConfigError> {
        if len < 1 {
            return Err(ConfigError {
                option: "JudgeIdMaxLen",
                problem: "less than 1",
            });
        }
        self.judge_id_max_len = len;
        Ok(self)
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs)
    }
}
