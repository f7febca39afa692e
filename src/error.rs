// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Error types.
//!
//! Errors reported by the database under test are not errors here: they are
//! an expected class of outcome and travel as
//! [`ExecutionResult::DatabaseError`](crate::gateway::ExecutionResult).
//! The types below cover failures of the driver itself.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A failure to load a test case document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("reading {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("scanning {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A statement referenced a variable that no earlier statement bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("variable {name} is not bound")]
pub struct UnboundVariable {
    /// The uppercased variable name.
    pub name: String,
}

/// A failure of the database gateway that is not a database error.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The connection is gone. No further statement can run.
    #[error("connection closed: {0}")]
    Closed(#[source] tokio_postgres::Error),
    /// The client rejected the request before the server reported an error.
    #[error("client error: {0}")]
    Client(#[source] tokio_postgres::Error),
    /// A result column could not be rendered as text.
    #[error("unsupported type {type_name} in column {column}")]
    UnsupportedType { column: String, type_name: String },
    #[error("decoding column {column}: {message}")]
    Decode { column: String, message: String },
}

impl GatewayError {
    /// Reports whether the error ends the run rather than the statement.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Closed(_))
    }
}

/// A failure that aborts the whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("writing diagnostics: {0}")]
    Diagnostics(#[from] io::Error),
}
