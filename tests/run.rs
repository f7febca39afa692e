// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runs test case documents from disk against an in-memory database.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use stmtdrive::diagnostics::MemorySink;
use stmtdrive::error::GatewayError;
use stmtdrive::file::{FileExecutor, FileOutcome};
use stmtdrive::gateway::{DatabaseError, ExecutionResult, Gateway};
use stmtdrive::{Outcomes, RunConfig};

/// Answers statements from a fixed table of results keyed by SQL text.
/// Unknown statements succeed without rows.
#[derive(Default)]
struct TableGateway {
    answers: BTreeMap<String, ExecutionResult>,
    calls: Vec<(String, Vec<String>)>,
}

impl TableGateway {
    fn row(mut self, sql: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.answers
            .insert(sql.into(), ExecutionResult::Success(columns));
        self
    }

    fn error(mut self, sql: &str, message: &str, code: &str) -> Self {
        self.answers.insert(
            sql.into(),
            ExecutionResult::DatabaseError(DatabaseError {
                message: message.into(),
                legacy_code: None,
                engine_code: code.into(),
            }),
        );
        self
    }
}

#[async_trait]
impl Gateway for TableGateway {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[String],
    ) -> Result<ExecutionResult, GatewayError> {
        self.calls.push((sql.into(), params.to_vec()));
        Ok(self
            .answers
            .get(sql)
            .cloned()
            .unwrap_or(ExecutionResult::Success(vec![])))
    }
}

struct NoFiles;

#[async_trait]
impl FileExecutor for NoFiles {
    async fn execute(&self, path: &Path) -> FileOutcome {
        FileOutcome {
            passed: false,
            diagnostics: format!("{} not available", path.display()),
        }
    }
}

async fn run(gateway: &mut TableGateway, sink: &mut MemorySink, path: &Path) -> Outcomes {
    stmtdrive::run_path(&RunConfig::default(), gateway, &NoFiles, sink, path)
        .await
        .unwrap()
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
async fn test_directory_runs_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b.json"),
        r#"{"id": "b", "name": "second", "test_statements": [{"sql": "SELECT 2"}]}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("a.fbt"),
        r#"{"id": "a", "name": "first", "test_statements": [{"sql": "SELECT 1"}]}"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a test case").unwrap();
    fs::create_dir(dir.path().join("nested.json")).unwrap();

    let mut gateway = TableGateway::default();
    let mut sink = MemorySink::new();
    let outcomes = run(&mut gateway, &mut sink, dir.path()).await;

    assert_eq!(
        outcomes,
        Outcomes {
            passed: 2,
            failed: 0
        }
    );
    let sqls: Vec<_> = gateway.calls.iter().map(|(sql, _)| sql.as_str()).collect();
    assert_eq!(sqls, ["SELECT 1", "SELECT 2"]);
    assert_eq!(sink.records.keys().collect::<Vec<_>>(), ["a", "b"]);
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
async fn test_unparseable_document_fails_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1.json"), r#"{"id": "1", "nmae": "typo"}"#).unwrap();
    fs::write(dir.path().join("2.json"), r#"{"id": "2", "name": "ok"}"#).unwrap();

    let mut gateway = TableGateway::default();
    let mut sink = MemorySink::new();
    let outcomes = run(&mut gateway, &mut sink, dir.path()).await;

    assert_eq!(
        outcomes,
        Outcomes {
            passed: 1,
            failed: 1
        }
    );
    assert_eq!(outcomes.to_string(), "FAIL! passed=1 failed=1 total=2");
}

#[tokio::test]
async fn test_missing_path_runs_nothing() {
    let mut gateway = TableGateway::default();
    let mut sink = MemorySink::new();
    let outcomes = run(
        &mut gateway,
        &mut sink,
        Path::new("/nonexistent/stmtdrive/cases"),
    )
    .await;
    assert_eq!(outcomes, Outcomes::default());
    assert!(gateway.calls.is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
async fn test_variables_flow_between_statements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");
    fs::write(
        &path,
        r#"{
            "id": "flow",
            "name": "insert and read back",
            "test_statements": [
                {"sql": ["INSERT INTO t", "VALUES (7)", "RETURNING id AS new_id"]},
                {"sql": "SELECT count(*) AS n, 7 AS seven FROM t WHERE id = $1",
                 "params": ["NEW_ID"],
                 "expect_values": {"n": ">0"},
                 "expect_equals": ["new_id", "seven"]},
                {"sql": "INSERT INTO t VALUES ($1)",
                 "params": ["new_id"],
                 "expect_error_gdscode": "23505"},
                {"sql": "INSERT INTO t VALUES ($1)",
                 "params": ["new_id"],
                 "expect_error_string": "duplicate key"}
            ]
        }"#,
    )
    .unwrap();

    let mut gateway = TableGateway::default()
        .row(
            "INSERT INTO t VALUES (7) RETURNING id AS new_id",
            &[("NEW_ID", "7")],
        )
        .row(
            "SELECT count(*) AS n, 7 AS seven FROM t WHERE id = $1",
            &[("N", "1"), ("SEVEN", "7.0")],
        )
        .error(
            "INSERT INTO t VALUES ($1)",
            "duplicate key value violates unique constraint \"t_pkey\"",
            "23505",
        );
    let mut sink = MemorySink::new();
    let outcomes = run(&mut gateway, &mut sink, &path).await;

    assert_eq!(outcomes.passed, 1, "{:#?}", sink.records);
    assert_eq!(gateway.calls[1].1, ["7"]);
    assert_eq!(gateway.calls.len(), 4);
    let log = sink.case("flow");
    assert_eq!(log.last().map(String::as_str), Some("TEST PASSED"));
    assert!(log.iter().any(|r| r.contains("Comparing values 7 and 7.0")));
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
async fn test_cases_do_not_share_variables() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("1.json"),
        r#"{"id": "1", "name": "binds", "test_statements": [{"sql": "SELECT 1 AS x"}]}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("2.json"),
        r#"{"id": "2", "name": "reads", "test_statements": [
            {"sql": "SELECT $1", "params": ["x"]},
            {"sql": "SELECT 2", "expect_values": {"x": "1"}}
        ]}"#,
    )
    .unwrap();

    let mut gateway = TableGateway::default().row("SELECT 1 AS x", &[("X", "1")]);
    let mut sink = MemorySink::new();
    let outcomes = run(&mut gateway, &mut sink, dir.path()).await;

    assert_eq!(
        outcomes,
        Outcomes {
            passed: 1,
            failed: 1
        }
    );
    // The unbound parameter keeps the first statement of case 2 away from
    // the database; the second still runs.
    let sqls: Vec<_> = gateway.calls.iter().map(|(sql, _)| sql.as_str()).collect();
    assert_eq!(sqls, ["SELECT 1 AS x", "SELECT 2"]);
    let lookups = sink
        .case("2")
        .iter()
        .filter(|r| r.contains("variable X is not bound"))
        .count();
    assert_eq!(lookups, 2);
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
async fn test_unexpected_error_and_missing_test_file_fail_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.json");
    fs::write(
        &path,
        r#"{"id": "9", "name": "errors", "test_files": ["check.sh"],
            "test_statements": [{"sql": "DROP TABLE missing"}]}"#,
    )
    .unwrap();

    let mut gateway =
        TableGateway::default().error("DROP TABLE missing", "table does not exist", "42P01");
    let mut sink = MemorySink::new();
    let outcomes = run(&mut gateway, &mut sink, &path).await;

    assert!(outcomes.any_failed());
    let log = sink.case("9");
    assert!(log.iter().any(|r| r == "check.sh not available"));
    assert!(log.iter().any(|r| r.contains("table does not exist 42P01")));
    assert_eq!(log.last().map(String::as_str), Some("TEST FAILED"));
}
