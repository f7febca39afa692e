// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Restoring the database under test from a backup.

use std::path::Path;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RunConfig;

/// Builds the command restoring `backup` into the configured database.
pub fn restore_command(config: &RunConfig, backup: &Path) -> Command {
    let mut cmd = Command::new(&config.restore_tool);
    cmd.args(config.tool_args())
        .args(["--clean", "--if-exists", "--no-owner"])
        .arg(backup)
        .envs(config.tool_env());
    cmd
}

/// Restores `backup` into the configured database, replacing the objects it
/// contains.
pub async fn restore_backup(config: &RunConfig, backup: &Path) -> Result<(), anyhow::Error> {
    info!("restoring {} into {}", backup.display(), config.database);
    let output = restore_command(config, backup)
        .output()
        .await
        .with_context(|| format!("running {}", config.restore_tool))?;
    debug!("{}", String::from_utf8_lossy(&output.stdout));
    if !output.status.success() {
        bail!(
            "restoring {} failed with {}: {}",
            backup.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
