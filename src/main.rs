// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use stmtdrive::diagnostics::{DiagnosticSink, ResultsDirSink, TracingSink};
use stmtdrive::file::ProcessFileExecutor;
use stmtdrive::gateway::PostgresGateway;
use stmtdrive::{Outcomes, RunConfig, restore};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static ENV_FILTER: &str = "stmtdrive=info";

/// Runs declarative statement test cases against a database.
#[derive(Parser, Debug)]
#[clap(name = "stmtdrive", version)]
struct Args {
    // === Connection options. ===
    /// The host of the database server.
    #[clap(short = 's', long, env = "STMTDRIVE_SERVER", default_value = "127.0.0.1")]
    server: String,
    /// The port of the database server.
    #[clap(long, env = "STMTDRIVE_PORT", default_value = "5432")]
    port: u16,
    /// The database to run the test cases against.
    #[clap(short = 'd', long, env = "STMTDRIVE_DATABASE")]
    database: String,
    #[clap(short = 'u', long, env = "STMTDRIVE_USERNAME", default_value = "postgres")]
    username: String,
    #[clap(short = 'p', long, env = "STMTDRIVE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// The client encoding of the session.
    #[clap(long, env = "STMTDRIVE_CHARSET", default_value = "UTF8")]
    charset: String,

    // === Run options. ===
    /// Restore this backup into the database before running any test case.
    #[clap(short = 'b', long, env = "STMTDRIVE_USE_BACKUP", value_name = "FILE")]
    use_backup: Option<PathBuf>,
    /// Skip the data preparation files of every test case.
    #[clap(short = 'n', long, env = "STMTDRIVE_NO_TEST_DATA")]
    no_test_data: bool,
    /// A test case file, or a directory of test case files.
    #[clap(short = 't', long, env = "STMTDRIVE_RUN_TEST", value_name = "PATH")]
    run_test: PathBuf,
    /// The command line client used to run `.sql` files.
    #[clap(short = 'i', long, env = "STMTDRIVE_CLIENT", default_value = "psql")]
    client: String,
    /// The tool used to restore the backup.
    #[clap(short = 'g', long, env = "STMTDRIVE_RESTORE", default_value = "pg_restore")]
    restore: String,
    /// Write per-case logs and the run log into this directory.
    #[clap(short = 'r', long, env = "STMTDRIVE_RESULTS_DIR", value_name = "DIR")]
    results_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> (RunConfig, PathBuf, Option<PathBuf>) {
        let config = RunConfig {
            host: self.server,
            port: self.port,
            database: self.database,
            user: self.username,
            password: self.password,
            charset: self.charset,
            skip_data_files: self.no_test_data,
            results_dir: self.results_dir,
            sql_client: self.client,
            restore_tool: self.restore,
        };
        (config, self.run_test, self.use_backup)
    }
}

/// Opens `<dir>/logfile.log` for appending, so the run log accumulates
/// across runs.
fn create_log_file(dir: &Path) -> Result<File, std::io::Error> {
    fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("logfile.log"))
}

fn init_tracing(results_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(ENV_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    match create_log_file(results_dir.unwrap_or(Path::new("."))) {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
            error!("unable to create the run log: {}", e);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, path, backup) = args.into_config();
    init_tracing(config.results_dir.as_deref());

    match run(&config, &path, backup.as_deref()).await {
        Ok(outcomes) => {
            println!("{}", outcomes);
            info!("{}", outcomes);
            if outcomes.any_failed() {
                process::exit(1);
            }
        }
        Err(err) => {
            error!("stmtdrive: fatal: {:#}", err);
            process::exit(1);
        }
    }
}

async fn run(
    config: &RunConfig,
    path: &Path,
    backup: Option<&Path>,
) -> Result<Outcomes, anyhow::Error> {
    if let Some(backup) = backup {
        restore::restore_backup(config, backup).await?;
    }

    let mut gateway = PostgresGateway::connect(&config.pg_config()).await?;
    let files = ProcessFileExecutor::new(config.clone());
    let mut sink: Box<dyn DiagnosticSink> = match &config.results_dir {
        Some(dir) => Box::new(
            ResultsDirSink::new(dir)
                .with_context(|| format!("creating results directory {}", dir.display()))?,
        ),
        None => Box::new(TracingSink),
    };

    let outcomes =
        stmtdrive::run_path(config, &mut gateway, &files, sink.as_mut(), path).await?;
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    #[cfg_attr(miri, ignore)] // unsupported operation: can't call foreign function `open`
    fn run_log_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("results");
        writeln!(create_log_file(&logs).unwrap(), "first run").unwrap();
        writeln!(create_log_file(&logs).unwrap(), "second run").unwrap();
        let log = fs::read_to_string(logs.join("logfile.log")).unwrap();
        assert_eq!(log, "first run\nsecond run\n");
    }
}
