// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::path::Path;

use crate::error::DbError;

/// Open the client registry database with WAL mode.
///
/// # Arguments
/// * `path` - Registry file, e.g. `/etc/wireguard/clientList`
/// * `allow_create` - Create the file when it is missing
///
/// # Errors
/// Returns `DbError::NotInitialized` if the file is missing and `allow_create`
/// is false, or `DbError::Sqlx` if the connection fails.
#[tracing::instrument(fields(path = %path.display()))]
pub async fn create_pool(path: &Path, allow_create: bool) -> Result<SqlitePool, DbError> {
	let exists = tokio::fs::try_exists(path)
		.await
		.map_err(|e| DbError::Internal(format!("cannot stat {}: {e}", path.display())))?;
	if !exists && !allow_create {
		return Err(DbError::NotInitialized(path.to_path_buf()));
	}

	let options = SqliteConnectOptions::new()
		.filename(path)
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(allow_create);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!(created = !exists, "registry pool created");
	Ok(pool)
}
