// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Declarative statement test driver for SQL databases.
//!
//! A test case is a JSON document naming data preparation files, external
//! test files and a list of SQL statements with expectations. Statements run
//! in order against one connection; every column of a statement's first
//! result row is bound as a variable that later statements can pass as a
//! parameter or check with `expect_values` and `expect_equals`.
//!
//! ```json
//! {
//!     "id": "42",
//!     "name": "insert then read back",
//!     "test_statements": [
//!         {"sql": "INSERT INTO t VALUES (1) RETURNING id AS new_id"},
//!         {"sql": "SELECT count(*) AS n FROM t WHERE id = $1",
//!          "params": ["new_id"], "expect_values": {"n": ">0"}}
//!     ]
//! }
//! ```

use std::path::Path;

pub mod case;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod file;
pub mod gateway;
pub mod restore;
pub mod runner;
pub mod vars;

pub use crate::config::RunConfig;
pub use crate::error::RunError;
pub use crate::runner::{Harness, Outcomes};

use crate::diagnostics::DiagnosticSink;
use crate::file::FileExecutor;
use crate::gateway::Gateway;

/// Runs the test case or directory of test cases at `path`.
pub async fn run_path(
    config: &RunConfig,
    gateway: &mut dyn Gateway,
    files: &dyn FileExecutor,
    sink: &mut dyn DiagnosticSink,
    path: &Path,
) -> Result<Outcomes, RunError> {
    let mut harness = Harness {
        config,
        gateway,
        files,
        sink,
    };
    harness.run_path(path).await
}
