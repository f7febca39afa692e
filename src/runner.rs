// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Running test cases.

use std::fmt;
use std::ops;
use std::path::Path;

use tracing::{error, info, warn};

use crate::case::{self, Statement, TestCase};
use crate::config::RunConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::{LoadError, RunError};
use crate::executor;
use crate::file::FileExecutor;
use crate::gateway::Gateway;
use crate::vars::VariableStore;

/// Counts of test case verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcomes {
    pub passed: usize,
    pub failed: usize,
}

impl Outcomes {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, passed: bool) {
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl ops::AddAssign<Outcomes> for Outcomes {
    fn add_assign(&mut self, rhs: Outcomes) {
        self.passed += rhs.passed;
        self.failed += rhs.failed;
    }
}

impl fmt::Display for Outcomes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = if self.any_failed() {
            "FAIL!"
        } else {
            "SUCCESS!"
        };
        write!(
            f,
            "{} passed={} failed={} total={}",
            status,
            self.passed,
            self.failed,
            self.total()
        )
    }
}

/// The collaborators a run is executed with.
///
/// Test cases run one after another through the single gateway; each case
/// gets a fresh [`VariableStore`].
pub struct Harness<'a> {
    pub config: &'a RunConfig,
    pub gateway: &'a mut dyn Gateway,
    pub files: &'a dyn FileExecutor,
    pub sink: &'a mut dyn DiagnosticSink,
}

impl Harness<'_> {
    /// Runs the test case at `path`, or every test case directly inside
    /// `path` in file name order when it is a directory.
    pub async fn run_path(&mut self, path: &Path) -> Result<Outcomes, RunError> {
        let mut outcomes = Outcomes::default();
        if path.is_dir() {
            outcomes += self.run_dir(path).await?;
        } else if path.is_file() {
            outcomes.record(self.run_file(path).await?);
        } else {
            println!(
                "{} is neither file nor dir so nothing to run",
                path.display()
            );
            warn!("{} is neither file nor directory", path.display());
        }
        Ok(outcomes)
    }

    async fn run_dir(&mut self, dir: &Path) -> Result<Outcomes, RunError> {
        let mut outcomes = Outcomes::default();
        for case_path in case::discover_cases(dir)? {
            outcomes.record(self.run_file(&case_path).await?);
        }
        info!("{}: {}", dir.display(), outcomes);
        Ok(outcomes)
    }

    /// Loads and runs the test case stored in `path`.
    ///
    /// A document that cannot be loaded counts as a failed case.
    pub async fn run_file(&mut self, path: &Path) -> Result<bool, RunError> {
        match case::load_case(path) {
            Ok(case) => self.run_case(&case).await,
            Err(e @ (LoadError::Read { .. } | LoadError::Parse { .. })) => {
                println!("Failed: {}", path.display());
                error!("{}", e);
                Ok(false)
            }
            Err(e) => Err(RunError::Load(e)),
        }
    }

    /// Runs one test case and reports its verdict.
    pub async fn run_case(&mut self, case: &TestCase) -> Result<bool, RunError> {
        let definition = serde_json::to_string_pretty(case).unwrap_or_else(|_| format!("{case:?}"));
        self.sink.record(&case.id, &definition)?;

        if let Some(data_files) = &case.data_files {
            if !self.config.skip_data_files {
                info!("preparing data for test {} '{}'", case.id, case.name);
                for path in data_files {
                    self.sink
                        .record(&case.id, &format!("Processing data_file {}", path.display()))?;
                    let outcome = self.files.execute(path).await;
                    self.sink.record(&case.id, &outcome.diagnostics)?;
                    // A failed preparation is logged, but the test still runs.
                    if !outcome.passed {
                        warn!(
                            "data file {} of test {} failed",
                            path.display(),
                            case.id
                        );
                    }
                }
            }
        }

        info!("running test {} '{}'", case.id, case.name);
        let mut vars = VariableStore::new();
        let mut passed = true;

        if let Some(test_files) = &case.test_files {
            self.sink.record(&case.id, "Executing test files")?;
            for path in test_files {
                let outcome = self.files.execute(path).await;
                self.sink.record(&case.id, &outcome.diagnostics)?;
                passed &= outcome.passed;
            }
        }

        if let Some(statements) = &case.test_statements {
            self.sink.record(&case.id, "Processing test statements")?;
            for stmt in statements {
                passed &= self.run_statement(&case.id, stmt, &mut vars).await?;
            }
        }

        if passed {
            println!("Passed: {}", case.name);
            info!("passed");
        } else {
            println!("Failed: {}", case.name);
            info!("failed");
        }
        self.sink
            .record(&case.id, if passed { "TEST PASSED" } else { "TEST FAILED" })?;
        Ok(passed)
    }

    /// Runs one statement of the case `case_id` and records its report.
    pub async fn run_statement(
        &mut self,
        case_id: &str,
        stmt: &Statement,
        vars: &mut VariableStore,
    ) -> Result<bool, RunError> {
        let report = executor::execute_statement(stmt, vars, &mut *self.gateway).await?;
        if !report.passed {
            error!(
                "error while executing statement: {} with params {:?}. {:?}",
                stmt.sql, report.params, report.outcome
            );
        }
        self.sink.record(case_id, &report.to_string())?;
        Ok(report.passed)
    }
}
