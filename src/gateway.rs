// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The connection to the database under test.

use std::fmt;

use async_trait::async_trait;
use itertools::Itertools;

use crate::error::GatewayError;

mod postgres;

pub use postgres::PostgresGateway;

/// Executes statements against the database under test.
///
/// Each call runs in its own transaction, which is committed when the
/// statement succeeds and rolled back when it fails.
#[async_trait]
pub trait Gateway {
    /// Executes `sql`, substituting `params` for its positional parameters.
    ///
    /// Errors reported by the database are returned as
    /// [`ExecutionResult::DatabaseError`]. `Err` is reserved for failures of
    /// the gateway itself.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[String],
    ) -> Result<ExecutionResult, GatewayError>;
}

/// The outcome of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The columns of the first result row, in result order. Empty when the
    /// statement produced no rows.
    Success(Vec<(String, String)>),
    DatabaseError(DatabaseError),
}

/// An error reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// The human readable message.
    pub message: String,
    /// The deprecated numeric error code, for engines that still have one.
    pub legacy_code: Option<i64>,
    /// The engine's own error code.
    pub engine_code: String,
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.legacy_code {
            write!(f, " {code}")?;
        }
        write!(f, " {}", self.engine_code)
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionResult::Success(columns) => write!(
                f,
                "{{{}}}",
                columns
                    .iter()
                    .format_with(", ", |(k, v), f| f(&format_args!("{k:?}: {v:?}")))
            ),
            ExecutionResult::DatabaseError(err) => err.fmt(f),
        }
    }
}
