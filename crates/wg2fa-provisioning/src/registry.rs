// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, instrument, warn};
use wg2fa_db::{create_pool, ClientRepository, ClientRowTuple, ClientStore, DbError};
use wg2fa_wireguard::WgPublicKey;

type Result<T> = std::result::Result<T, DbError>;

/// A provisioned peer. Serializes with the registry's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
	pub name: String,
	pub public_key: WgPublicKey,
	/// Tunnel address with the pool prefix, e.g. `10.0.0.3/24`.
	#[serde(rename = "ip")]
	pub address: IpNet,
	#[serde(rename = "added")]
	pub admitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryScan {
	pub records: Vec<ClientRecord>,
	pub unreadable: Vec<WgPublicKey>,
}

#[derive(Debug, Clone)]
struct ClientRow {
	public_key: String,
	name: String,
	ip: String,
	added: String,
}

impl From<ClientRowTuple> for ClientRow {
	fn from((public_key, name, ip, added): ClientRowTuple) -> Self {
		Self {
			public_key,
			name,
			ip,
			added,
		}
	}
}

impl TryFrom<ClientRow> for ClientRecord {
	type Error = DbError;

	fn try_from(row: ClientRow) -> Result<Self> {
		Ok(ClientRecord {
			public_key: WgPublicKey::from_base64(&row.public_key)
				.map_err(|e| DbError::Internal(format!("invalid public key in registry: {e}")))?,
			address: row
				.ip
				.parse()
				.map_err(|_| DbError::Internal(format!("invalid address in registry: {}", row.ip)))?,
			admitted_at: parse_datetime(&row.added)?,
			name: row.name,
		})
	}
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.or_else(|_| {
			chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
				.map(|ndt| ndt.and_utc())
				.map_err(|_| DbError::Internal(format!("invalid datetime: {s}")))
		})
}

/// Typed view over the `wg_user` table.
#[derive(Clone)]
pub struct ClientRegistry {
	store: Arc<dyn ClientStore>,
}

impl ClientRegistry {
	pub fn new(store: Arc<dyn ClientStore>) -> Self {
		Self { store }
	}

	/// Opens the sqlite registry at `path`, creating the file and table when
	/// `allow_create` is set. Otherwise both must already exist.
	#[instrument(fields(path = %path.display()))]
	pub async fn open(path: &Path, allow_create: bool) -> Result<Self> {
		let pool = create_pool(path, allow_create).await?;
		let repo = ClientRepository::new(pool);
		repo.check_or_create(path, allow_create).await?;
		Ok(Self::new(Arc::new(repo)))
	}

	/// All readable records. See [`ClientRegistry::scan`] for the rest.
	pub async fn list(&self) -> Result<Vec<ClientRecord>> {
		Ok(self.scan().await?.records)
	}

	/// Every row, split into records and the keys of rows whose other columns
	/// no longer parse. Rows without a readable key cannot be acted on at all.
	#[instrument(skip(self))]
	pub async fn scan(&self) -> Result<RegistryScan> {
		let rows = self.store.list().await?;
		let mut scan = RegistryScan {
			records: Vec::with_capacity(rows.len()),
			unreadable: Vec::new(),
		};
		for row in rows {
			let raw_key = row.0.clone();
			match ClientRecord::try_from(ClientRow::from(row)) {
				Ok(record) => scan.records.push(record),
				Err(e) => {
					error!(inconsistency = true, public_key = %raw_key, error = %e, "unreadable registry row");
					if let Ok(key) = WgPublicKey::from_base64(&raw_key) {
						scan.unreadable.push(key);
					}
				}
			}
		}
		Ok(scan)
	}

	#[instrument(skip(self), fields(public_key = %public_key))]
	pub async fn get(&self, public_key: &WgPublicKey) -> Result<Option<ClientRecord>> {
		self
			.store
			.get(&public_key.to_base64())
			.await?
			.map(|row| ClientRecord::try_from(ClientRow::from(row)))
			.transpose()
	}

	/// Inserts a record stamped with the current time.
	#[instrument(skip(self), fields(public_key = %public_key, %address))]
	pub async fn add(
		&self,
		name: &str,
		public_key: &WgPublicKey,
		address: &IpNet,
	) -> Result<ClientRecord> {
		let admitted_at = Utc::now();
		self
			.store
			.add(
				&public_key.to_base64(),
				name,
				&address.to_string(),
				&admitted_at.to_rfc3339(),
			)
			.await?;

		Ok(ClientRecord {
			name: name.to_string(),
			public_key: *public_key,
			address: *address,
			admitted_at,
		})
	}

	/// Returns whether a record was removed.
	#[instrument(skip(self), fields(public_key = %public_key))]
	pub async fn remove(&self, public_key: &WgPublicKey) -> Result<bool> {
		Ok(self.store.remove(&public_key.to_base64()).await? > 0)
	}

	/// Host addresses held by registered clients.
	pub async fn addresses(&self) -> Result<HashSet<IpAddr>> {
		let rows = self.store.list().await?;
		let mut addresses = HashSet::with_capacity(rows.len());
		for (public_key, _, ip, _) in rows {
			match wg2fa_wireguard::parse_host(&ip) {
				Ok(addr) => {
					addresses.insert(addr);
				}
				Err(e) => warn!(%public_key, error = %e, "registry row has unreadable address"),
			}
		}
		Ok(addresses)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wg2fa_db::testing::create_test_repository;

	async fn registry() -> (ClientRegistry, ClientRepository) {
		let repo = create_test_repository().await;
		(ClientRegistry::new(Arc::new(repo.clone())), repo)
	}

	fn key(b: u8) -> WgPublicKey {
		WgPublicKey::from_bytes([b; 32])
	}

	#[tokio::test]
	async fn add_get_remove() {
		let (registry, _) = registry().await;
		let address: IpNet = "10.0.0.2/24".parse().unwrap();

		let record = registry.add("alice", &key(1), &address).await.unwrap();
		assert_eq!(registry.get(&key(1)).await.unwrap(), Some(record));

		assert!(registry.remove(&key(1)).await.unwrap());
		assert!(!registry.remove(&key(1)).await.unwrap());
		assert!(registry.get(&key(1)).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn duplicate_address_is_conflict() {
		let (registry, _) = registry().await;
		let address: IpNet = "10.0.0.2/24".parse().unwrap();
		registry.add("alice", &key(1), &address).await.unwrap();

		let err = registry.add("bob", &key(2), &address).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn list_skips_rows_with_bad_timestamps() {
		let (registry, repo) = registry().await;
		registry
			.add("alice", &key(1), &"10.0.0.2/24".parse().unwrap())
			.await
			.unwrap();
		repo
			.add(&key(2).to_base64(), "bob", "10.0.0.3/24", "yesterday")
			.await
			.unwrap();

		let records = registry.list().await.unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].name, "alice");

		let scan = registry.scan().await.unwrap();
		assert_eq!(scan.records, records);
		assert_eq!(scan.unreadable, vec![key(2)]);

		// Its address is still taken.
		let addresses = registry.addresses().await.unwrap();
		assert!(addresses.contains(&"10.0.0.3".parse::<IpAddr>().unwrap()));
	}

	#[tokio::test]
	async fn accepts_sqlite_datetime_format() {
		let (registry, repo) = registry().await;
		repo
			.add(&key(3).to_base64(), "carol", "10.0.0.4/24", "2025-03-01 12:00:00")
			.await
			.unwrap();

		let record = registry.get(&key(3)).await.unwrap().unwrap();
		assert_eq!(record.admitted_at.to_rfc3339(), "2025-03-01T12:00:00+00:00");
	}

	#[tokio::test]
	async fn open_without_create_rejects_file_missing_the_table() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("clientList");
		std::fs::write(&path, b"").unwrap();

		let err = ClientRegistry::open(&path, false).await.err().unwrap();
		assert!(matches!(err, DbError::NotInitialized(_)));

		let registry = ClientRegistry::open(&path, true).await.unwrap();
		assert!(registry.list().await.unwrap().is_empty());
		assert!(ClientRegistry::open(&path, false).await.is_ok());
	}

	#[test]
	fn record_json_uses_registry_field_names() {
		let record = ClientRecord {
			name: "alice".to_string(),
			public_key: key(1),
			address: "10.0.0.2/24".parse().unwrap(),
			admitted_at: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
				.unwrap()
				.with_timezone(&Utc),
		};
		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(json["name"], "alice");
		assert_eq!(json["ip"], "10.0.0.2/24");
		assert_eq!(json["public_key"], key(1).to_base64());
		assert!(json.get("added").is_some());
	}
}
