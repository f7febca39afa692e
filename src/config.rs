// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

/// User-settable configuration parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    // === Connection options. ===
    /// The host of the database server.
    pub host: String,
    /// The port of the database server.
    pub port: u16,
    /// The database to run the tests against.
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    /// The client encoding of the session.
    pub charset: String,

    // === Driver options. ===
    /// Whether to skip the data preparation files of each test case.
    pub skip_data_files: bool,
    /// The directory receiving per-case logs and the run log.
    ///
    /// If unspecified, per-case diagnostics go to the debug log only.
    pub results_dir: Option<PathBuf>,
    /// The command line client used to run `.sql` files.
    pub sql_client: String,
    /// The tool used to restore a backup before the run.
    pub restore_tool: String,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            host: "127.0.0.1".into(),
            port: 5432,
            database: "postgres".into(),
            user: "postgres".into(),
            password: None,
            charset: "UTF8".into(),
            skip_data_files: false,
            results_dir: None,
            sql_client: "psql".into(),
            restore_tool: "pg_restore".into(),
        }
    }
}

impl RunConfig {
    /// Returns the connection parameters for the database gateway.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name("stmtdrive")
            .options(&format!("-c client_encoding={}", self.charset));
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }

    /// Returns the connection arguments understood by the PostgreSQL command
    /// line tools.
    ///
    /// The password is not part of the arguments; pass it through
    /// [`RunConfig::tool_env`].
    pub fn tool_args(&self) -> Vec<String> {
        vec![
            "--host".into(),
            self.host.clone(),
            "--port".into(),
            self.port.to_string(),
            "--username".into(),
            self.user.clone(),
            "--dbname".into(),
            self.database.clone(),
        ]
    }

    /// Returns the environment for the PostgreSQL command line tools.
    pub fn tool_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![("PGCLIENTENCODING", self.charset.clone())];
        if let Some(password) = &self.password {
            env.push(("PGPASSWORD", password.clone()));
        }
        env
    }
}
