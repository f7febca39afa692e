// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Execution of a single statement and evaluation of its expectations.

use std::fmt;
use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::case::Statement;
use crate::compare::compare;
use crate::error::{GatewayError, UnboundVariable};
use crate::gateway::{DatabaseError, ExecutionResult, Gateway};
use crate::vars::VariableStore;

/// What happened when a statement was run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The gateway executed the statement.
    Executed(ExecutionResult),
    /// A parameter named a variable that is not bound. The statement was not
    /// sent to the database.
    Unbound(UnboundVariable),
    /// The gateway failed without the database reporting an error.
    GatewayFailed(String),
}

/// The record of running one statement.
#[derive(Debug)]
pub struct StatementReport<'a> {
    pub statement: &'a Statement,
    /// The variables as they were before the statement ran.
    pub variables: VariableStore,
    pub params: Vec<String>,
    pub outcome: Outcome,
    /// Wall clock execution time, when the statement reached the gateway.
    pub elapsed: Option<Duration>,
    /// Comparisons and checks performed, in order.
    pub notes: Vec<String>,
    pub passed: bool,
}

impl<'a> StatementReport<'a> {
    fn new(statement: &'a Statement, variables: VariableStore, outcome: Outcome) -> Self {
        StatementReport {
            statement,
            variables,
            params: vec![],
            outcome,
            elapsed: None,
            notes: vec![],
            passed: false,
        }
    }
}

impl fmt::Display for StatementReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let statement = serde_json::to_string_pretty(self.statement).map_err(|_| fmt::Error)?;
        writeln!(f, "{}", statement)?;
        write!(f, "\nVariables: {}", self.variables)?;
        if !self.params.is_empty() {
            write!(f, "\nParameters: {:?}", self.params)?;
        }
        match &self.outcome {
            Outcome::Executed(ExecutionResult::Success(columns)) if columns.is_empty() => (),
            Outcome::Executed(result) => write!(f, "\n\nResults:\n{}", result)?,
            Outcome::Unbound(e) => write!(f, "\n\nLookup failure: {}", e)?,
            Outcome::GatewayFailed(e) => write!(f, "\n\nGateway failure: {}", e)?,
        }
        for note in &self.notes {
            write!(f, "\n{}", note)?;
        }
        if let Some(elapsed) = self.elapsed {
            write!(f, "\nElapsed: {:.6} seconds", elapsed.as_secs_f64())?;
        }
        f.write_str(if self.passed { "\nPASSED" } else { "\nFAILED" })
    }
}

/// Runs `stmt` through `gateway` and decides whether it passed.
///
/// Parameters are resolved from `vars`, and every column of a successful
/// result is bound into `vars` before the expectations are checked, whether
/// or not the statement passes. Only a fatal gateway failure is returned as
/// an error; everything else is reflected in the report's verdict.
pub async fn execute_statement<'a, G>(
    stmt: &'a Statement,
    vars: &mut VariableStore,
    gateway: &mut G,
) -> Result<StatementReport<'a>, GatewayError>
where
    G: Gateway + ?Sized,
{
    let snapshot = vars.clone();
    let params = match vars.resolve(stmt.params.as_deref().unwrap_or_default()) {
        Ok(params) => params,
        Err(e) => return Ok(StatementReport::new(stmt, snapshot, Outcome::Unbound(e))),
    };

    let sql = stmt.sql.to_sql();
    let start = Instant::now();
    let res = gateway.execute(&sql, &params).await;
    let elapsed = start.elapsed();

    let result = match res {
        Ok(result) => result,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            let mut report =
                StatementReport::new(stmt, snapshot, Outcome::GatewayFailed(e.to_string()));
            report.params = params;
            report.elapsed = Some(elapsed);
            return Ok(report);
        }
    };

    let mut notes = vec![];
    let mut passed = match &result {
        ExecutionResult::DatabaseError(err) => check_error(stmt, err, &mut notes),
        ExecutionResult::Success(columns) => {
            for (name, value) in columns {
                vars.bind(name, value.clone());
            }
            check_values(stmt, vars, &mut notes)
        }
    };

    if passed {
        if let Some(limit) = stmt.expect_duration {
            if elapsed.as_secs_f64() > limit {
                passed = false;
                notes.push(format!(
                    "Timeout: statement executed {:.6} seconds while expected {}",
                    elapsed.as_secs_f64(),
                    limit
                ));
            }
        }
    }

    Ok(StatementReport {
        statement: stmt,
        variables: snapshot,
        params,
        outcome: Outcome::Executed(result),
        elapsed: Some(elapsed),
        notes,
        passed,
    })
}

/// Checks a database error against the error expectations of `stmt`.
///
/// A matching engine code passes the statement. When the code check did not
/// fail, an expected message substring decides the verdict on its own.
fn check_error(stmt: &Statement, err: &DatabaseError, notes: &mut Vec<String>) -> bool {
    let mut passed = false;
    let mut code_mismatch = false;
    if let Some(code) = &stmt.expect_error_gdscode {
        if *code == err.engine_code {
            passed = true;
        } else {
            code_mismatch = true;
            notes.push(format!(
                "Error code {} while expected {}",
                err.engine_code, code
            ));
        }
    }
    if !code_mismatch {
        if let Some(needle) = &stmt.expect_error_string {
            passed = err.message.contains(needle.as_str());
            if !passed {
                notes.push(format!("Error message does not contain {:?}", needle));
            }
        }
    }
    if !stmt.expects_error() {
        notes.push("Unexpected database error".into());
    }
    passed
}

/// Checks the bound variables against the value expectations of `stmt`.
///
/// Every `expect_values` entry is checked even after one fails.
fn check_values(stmt: &Statement, vars: &VariableStore, notes: &mut Vec<String>) -> bool {
    let mut passed = true;
    for (name, expected) in stmt.expect_values.iter().flatten() {
        match vars.get(name) {
            Ok(received) => {
                if !compare(received, expected) {
                    passed = false;
                    notes.push(format!(
                        "Value of {} is {:?} while expected {:?}",
                        name.to_uppercase(),
                        received,
                        expected
                    ));
                }
            }
            Err(e) => {
                passed = false;
                notes.push(format!("Lookup failure: {}", e));
            }
        }
    }
    if passed {
        for (a, b) in stmt.expect_equals.iter().flatten().tuple_windows() {
            match (vars.get(a), vars.get(b)) {
                (Ok(v1), Ok(v2)) => {
                    notes.push(format!("Comparing values {} and {}", v1, v2));
                    passed = passed && compare(v1, v2);
                }
                (Err(e), _) | (_, Err(e)) => {
                    passed = false;
                    notes.push(format!("Lookup failure: {}", e));
                }
            }
        }
    }
    passed
}
