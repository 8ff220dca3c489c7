// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client registry repository.
//!
//! One row per provisioned peer in `wg_user`. The public key is the primary
//! key and the tunnel address is unique, so the table itself refuses a second
//! client on either.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use crate::error::DbError;

/// `(public_key, name, ip, added)`
pub type ClientRowTuple = (String, String, String, String);

#[derive(Clone)]
pub struct ClientRepository {
	pool: SqlitePool,
}

impl ClientRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub async fn table_exists(&self) -> Result<bool, DbError> {
		let found: Option<(String,)> =
			sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'wg_user'")
				.fetch_optional(&self.pool)
				.await?;

		Ok(found.is_some())
	}

	/// Makes sure `wg_user` is usable. Without `allow_create` a registry that
	/// lacks the table is rejected as `NotInitialized` instead of being set up.
	#[tracing::instrument(skip(self), fields(path = %path.display()))]
	pub async fn check_or_create(&self, path: &Path, allow_create: bool) -> Result<(), DbError> {
		if !allow_create {
			if self.table_exists().await? {
				return Ok(());
			}
			return Err(DbError::NotInitialized(path.to_path_buf()));
		}

		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS wg_user (
				public_key TEXT PRIMARY KEY,
				name TEXT NOT NULL,
				ip TEXT NOT NULL UNIQUE,
				added TEXT NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<ClientRowTuple>, DbError> {
		let rows: Vec<ClientRowTuple> = sqlx::query_as(
			"SELECT public_key, name, ip, added FROM wg_user ORDER BY added, public_key",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	#[tracing::instrument(skip(self), fields(%public_key))]
	pub async fn get(&self, public_key: &str) -> Result<Option<ClientRowTuple>, DbError> {
		let row: Option<ClientRowTuple> = sqlx::query_as(
			"SELECT public_key, name, ip, added FROM wg_user WHERE public_key = ?",
		)
		.bind(public_key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row)
	}

	#[tracing::instrument(skip(self), fields(%public_key, %name, %ip))]
	pub async fn add(&self, public_key: &str, name: &str, ip: &str, added: &str) -> Result<(), DbError> {
		sqlx::query("INSERT INTO wg_user (public_key, name, ip, added) VALUES (?, ?, ?, ?)")
			.bind(public_key)
			.bind(name)
			.bind(ip)
			.bind(added)
			.execute(&self.pool)
			.await
			.map_err(|e| match e {
				sqlx::Error::Database(ref db) if db.is_unique_violation() => {
					DbError::Conflict(format!("client {public_key} or address {ip} already registered"))
				}
				other => DbError::Sqlx(other),
			})?;

		Ok(())
	}

	/// Deletes the row for `public_key`. Returns the number of rows removed, so
	/// `0` for an unknown key.
	#[tracing::instrument(skip(self), fields(%public_key))]
	pub async fn remove(&self, public_key: &str) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM wg_user WHERE public_key = ?")
			.bind(public_key)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
pub trait ClientStore: Send + Sync {
	async fn list(&self) -> Result<Vec<ClientRowTuple>, DbError>;
	async fn get(&self, public_key: &str) -> Result<Option<ClientRowTuple>, DbError>;
	async fn add(&self, public_key: &str, name: &str, ip: &str, added: &str) -> Result<(), DbError>;
	async fn remove(&self, public_key: &str) -> Result<u64, DbError>;
}

#[async_trait]
impl ClientStore for ClientRepository {
	async fn list(&self) -> Result<Vec<ClientRowTuple>, DbError> {
		self.list().await
	}

	async fn get(&self, public_key: &str) -> Result<Option<ClientRowTuple>, DbError> {
		self.get(public_key).await
	}

	async fn add(&self, public_key: &str, name: &str, ip: &str, added: &str) -> Result<(), DbError> {
		self.add(public_key, name, ip, added).await
	}

	async fn remove(&self, public_key: &str) -> Result<u64, DbError> {
		self.remove(public_key).await
	}
}
