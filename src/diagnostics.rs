// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-case diagnostic output.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::debug;

/// Separates consecutive records in a case log.
pub const RECORD_SEPARATOR_WIDTH: usize = 80;

/// Receives the human readable diagnostics produced while running a test
/// case.
pub trait DiagnosticSink {
    /// Records one block of diagnostic text for the case `case_id`.
    fn record(&mut self, case_id: &str, text: &str) -> Result<(), io::Error>;
}

/// Appends records to `<dir>/<case id>.log`.
#[derive(Debug)]
pub struct ResultsDirSink {
    dir: PathBuf,
}

impl ResultsDirSink {
    /// Creates a sink writing into `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<ResultsDirSink, io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(ResultsDirSink { dir })
    }

    pub fn log_path(&self, case_id: &str) -> PathBuf {
        self.dir.join(format!("{case_id}.log"))
    }
}

impl DiagnosticSink for ResultsDirSink {
    fn record(&mut self, case_id: &str, text: &str) -> Result<(), io::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(case_id))?;
        writeln!(file, "{}", text)?;
        writeln!(file, "{}", "=".repeat(RECORD_SEPARATOR_WIDTH))
    }
}

/// Forwards records to the `tracing` debug stream.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, case_id: &str, text: &str) -> Result<(), io::Error> {
        debug!(case = case_id, "{}", text);
        Ok(())
    }
}

/// Keeps records in memory, grouped by case.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: BTreeMap<String, Vec<String>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// Returns the records of `case_id` in the order they were recorded.
    pub fn case(&self, case_id: &str) -> &[String] {
        self.records.get(case_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&mut self, case_id: &str, text: &str) -> Result<(), io::Error> {
        self.records
            .entry(case_id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
    fn results_dir_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ResultsDirSink::new(dir.path().join("results")).unwrap();
        sink.record("7", "first").unwrap();
        sink.record("7", "second").unwrap();
        sink.record("8", "other").unwrap();

        let sep = "=".repeat(80);
        let log = fs::read_to_string(sink.log_path("7")).unwrap();
        assert_eq!(log, format!("first\n{sep}\nsecond\n{sep}\n"));
        let log = fs::read_to_string(dir.path().join("results").join("8.log")).unwrap();
        assert_eq!(log, format!("other\n{sep}\n"));
    }

    #[test]
    fn memory_groups_by_case() {
        let mut sink = MemorySink::new();
        sink.record("a", "1").unwrap();
        sink.record("b", "2").unwrap();
        sink.record("a", "3").unwrap();
        assert_eq!(sink.case("a"), ["1", "3"]);
        assert!(sink.case("c").is_empty());
    }
}
