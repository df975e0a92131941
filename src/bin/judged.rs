// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Binary entry point. Configuration loading and CLI parsing are outside
//! this crate's scope; this file reads a handful of environment
//! variables into a [`judged::Config`] and installs `flexi_logger` the
//! way a `log`-based library consumer is expected to.

use std::path::PathBuf;

use judged::{Config, HttpWebFrontend, WebFrontend};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn load_config() -> Config {
    let data_dir = std::env::var("JUDGED_DATA_DIR").unwrap_or_else(|_| {
        eprintln!("JUDGED_DATA_DIR is required and has no default");
        std::process::exit(1);
    });
    let web_base_url = std::env::var("JUDGED_WEB_BASE_URL").unwrap_or_else(|_| {
        eprintln!("JUDGED_WEB_BASE_URL is required and has no default");
        std::process::exit(1);
    });

    let mut config = Config::new(PathBuf::from(data_dir), web_base_url)
        .with_listen_addr(env_or("JUDGED_LISTEN_ADDR", judged::config::DEFAULT_LISTEN_ADDR));

    if let Ok(secs) = std::env::var("JUDGED_REFRESH_INTERVAL_SECS") {
        match secs.parse::<u64>() {
            Ok(v) => {
                config = config.with_refresh_interval_secs(v).unwrap_or_else(|e| {
                    eprintln!("{}", e);
                    std::process::exit(1);
                });
            }
            Err(_) => {
                eprintln!("JUDGED_REFRESH_INTERVAL_SECS must be an integer");
                std::process::exit(1);
            }
        }
    }

    if let Ok(len) = std::env::var("JUDGED_ID_MAX_LEN") {
        match len.parse::<usize>() {
            Ok(v) => {
                config = config.with_judge_id_max_len(v).unwrap_or_else(|e| {
                    eprintln!("{}", e);
                    std::process::exit(1);
                });
            }
            Err(_) => {
                eprintln!("JUDGED_ID_MAX_LEN must be an integer");
                std::process::exit(1);
            }
        }
    }

    config
}

fn main() {
    flexi_logger::Logger::try_with_env_or_str(
        std::env::var("JUDGED_LOG").unwrap_or_else(|_| "info".to_string()),
    )
    .expect("invalid JUDGED_LOG filter")
    .start()
    .expect("failed to start logger");

    let config = load_config();
    let web: std::sync::Arc<dyn WebFrontend> =
        std::sync::Arc::new(HttpWebFrontend::new(config.web_base_url.clone()));

    let handle = judged::run(config, web).unwrap_or_else(|e| {
        log::error!("failed to start server: {}", e);
        std::process::exit(1);
    });

    // Signal handling (SIGINT/SIGTERM) and an exit-code surface are
    // outside this crate's scope; an operator stops the process the
    // blunt way for now (SIGKILL or a supervisor), and `handle.shutdown()`
    // is the hook a future CLI surface would call.
    handle.join();
}
