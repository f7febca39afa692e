// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Test case documents.
//!
//! A test case is a JSON document describing the files and statements to run
//! and the outcomes to expect. Documents are deserialized strictly: unknown
//! fields are rejected so that a misspelled expectation cannot silently turn
//! into a test that always passes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::LoadError;

/// File extensions recognized as test case documents when scanning a
/// directory.
pub const TEST_EXTENSIONS: &[&str] = &["fbt", "json"];

/// One independently reported unit of testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    /// Identifier, unique within a run. Names the per-case log file.
    pub id: String,
    /// Human readable name used when reporting the verdict.
    pub name: String,
    /// Files run before the test proper to prepare data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_files: Option<Vec<PathBuf>>,
    /// Files whose exit status is part of the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_files: Option<Vec<PathBuf>>,
    /// Statements run in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_statements: Option<Vec<Statement>>,
}

/// One SQL operation plus the expectations on its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Statement {
    pub sql: SqlText,
    /// Names of the variables bound, in order, to the positional parameters
    /// of `sql`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    /// Expected values by variable name. Numbers are accepted and kept in
    /// their textual form.
    #[serde(
        default,
        deserialize_with = "deserialize_expected_values",
        skip_serializing_if = "Option::is_none"
    )]
    pub expect_values: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_equals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error_string: Option<String>,
    #[serde(
        default,
        alias = "expect_error_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub expect_error_gdscode: Option<String>,
    /// Upper bound on the wall clock execution time, in seconds.
    #[serde(
        default,
        deserialize_with = "deserialize_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expect_duration: Option<f64>,
}

impl Statement {
    /// Reports whether the statement carries any expectation about an error
    /// outcome.
    pub fn expects_error(&self) -> bool {
        self.expect_error_gdscode.is_some() || self.expect_error_string.is_some()
    }
}

/// SQL text, written either as one string or as fragments to be joined with
/// spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlText {
    Single(String),
    Fragments(Vec<String>),
}

impl SqlText {
    /// Returns the statement text as sent to the database.
    pub fn to_sql(&self) -> String {
        match self {
            SqlText::Single(s) => s.clone(),
            SqlText::Fragments(fragments) => fragments.iter().join(" "),
        }
    }
}

impl fmt::Display for SqlText {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Accepts either a JSON number or a string holding one.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SecondsVisitor;

    impl<'de> Visitor<'de> for SecondsVisitor {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number of seconds")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(SecondsVisitor)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.trim()
                .parse()
                .map(Some)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_option(SecondsVisitor)
}

fn deserialize_expected_values<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(values) = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?
    else {
        return Ok(None);
    };
    values
        .into_iter()
        .map(|(name, value)| match value {
            serde_json::Value::String(s) => Ok((name, s)),
            serde_json::Value::Number(n) => Ok((name, n.to_string())),
            other => {
                let unexpected = match &other {
                    serde_json::Value::Null => de::Unexpected::Unit,
                    serde_json::Value::Bool(b) => de::Unexpected::Bool(*b),
                    serde_json::Value::Array(_) => de::Unexpected::Seq,
                    _ => de::Unexpected::Map,
                };
                Err(<D::Error as de::Error>::invalid_type(
                    unexpected,
                    &"a string or a number",
                ))
            }
        })
        .collect::<Result<_, _>>()
        .map(Some)
}

/// Parses a test case from the contents of a document.
pub fn parse_case(contents: &str) -> Result<TestCase, serde_json::Error> {
    serde_json::from_str(contents)
}

/// Loads the test case stored in `path`.
pub fn load_case(path: &Path) -> Result<TestCase, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_case(&contents).map_err(|source| LoadError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Lists the test case documents directly inside `dir`, sorted by file name.
pub fn discover_cases(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| LoadError::Scan {
            path: dir.to_owned(),
            source: e,
        })?;
        let is_case = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TEST_EXTENSIONS.contains(&ext));
        if entry.file_type().is_file() && is_case {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
