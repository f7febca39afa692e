// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Execution of external files.
//!
//! SQL scripts run through the configured command line client, connected to
//! the database under test. Any other file is executed directly.

use std::path::Path;

use async_trait::async_trait;
use itertools::Itertools;
use tokio::process::Command;
use tracing::error;

use crate::config::RunConfig;

/// The outcome of running one external file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub passed: bool,
    /// A human readable account of the execution, including the captured
    /// output.
    pub diagnostics: String,
}

/// Runs external files on behalf of a test case.
#[async_trait]
pub trait FileExecutor {
    /// Runs `path`. Failures are reported in the outcome, never as errors.
    async fn execute(&self, path: &Path) -> FileOutcome;
}

/// A [`FileExecutor`] spawning child processes.
#[derive(Debug, Clone)]
pub struct ProcessFileExecutor {
    config: RunConfig,
}

impl ProcessFileExecutor {
    pub fn new(config: RunConfig) -> ProcessFileExecutor {
        ProcessFileExecutor { config }
    }

    /// Builds the command running `path`.
    pub fn command(&self, path: &Path) -> Command {
        if path.extension().is_some_and(|ext| ext == "sql") {
            let mut cmd = Command::new(&self.config.sql_client);
            cmd.args(self.config.tool_args())
                .args(["--no-psqlrc", "--echo-all", "--set", "ON_ERROR_STOP=1"])
                .arg("--file")
                .arg(path)
                .envs(self.config.tool_env());
            cmd
        } else {
            Command::new(path)
        }
    }
}

#[async_trait]
impl FileExecutor for ProcessFileExecutor {
    async fn execute(&self, path: &Path) -> FileOutcome {
        let mut cmd = self.command(path);
        let mut diagnostics = {
            let std_cmd = cmd.as_std();
            format!(
                "Executing {} using command:\n{} {}",
                path.display(),
                std_cmd.get_program().to_string_lossy(),
                std_cmd.get_args().map(|a| a.to_string_lossy()).join(" "),
            )
        };
        let separator = "-".repeat(80);

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                error!("error executing file {}: {}", path.display(), e);
                diagnostics.push_str(&format!("\nUnable to start: {e}\nFAILED"));
                return FileOutcome {
                    passed: false,
                    diagnostics,
                };
            }
        };

        diagnostics.push_str(&format!(
            "\n{separator}\n{}{}{separator}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ));
        let passed = output.status.success();
        if passed {
            diagnostics.push_str("\nPASSED");
        } else {
            error!(
                "error executing file {}: {}",
                path.display(),
                output.status
            );
            diagnostics.push_str(&format!("\nCommand returned {}\nFAILED", output.status));
        }
        FileOutcome {
            passed,
            diagnostics,
        }
    }
}
