// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Model of a `wg-quick` style interface configuration file.
//!
//! The grammar is line oriented:
//!
//! - a line starting with `#` is a comment
//! - `[Name]` (ASCII alphanumerics only) opens a new section
//! - anything else is split on the first `=`, both halves trimmed
//! - lines without `=` are ignored
//!
//! Lines before the first header land in a synthetic `Default` section.

use crate::keys::{KeyError, WgPrivateKey, WgPublicKey};
use fs2::FileExt;
use ipnet::IpNet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};

pub const DEFAULT_SECTION: &str = "Default";
pub const INTERFACE_SECTION: &str = "Interface";
pub const PEER_SECTION: &str = "Peer";

#[derive(Error, Debug)]
pub enum ConfFileError {
	#[error("failed to access config file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("no [{0}] section in config file")]
	MissingSection(&'static str),

	#[error("[{section}] section is missing {field}")]
	MissingField {
		section: &'static str,
		field: &'static str,
	},

	#[error("invalid {field} in config file: {message}")]
	InvalidField {
		field: &'static str,
		message: String,
	},

	#[error("a peer with public key {0} already exists")]
	DuplicatePeer(String),
}

pub type Result<T> = std::result::Result<T, ConfFileError>;

impl From<KeyError> for ConfFileError {
	fn from(e: KeyError) -> Self {
		ConfFileError::InvalidField {
			field: "PrivateKey",
			message: e.to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSection {
	pub name: String,
	pub values: HashMap<String, String>,
}

impl ConfigSection {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			values: HashMap::new(),
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.values.get(key).map(String::as_str)
	}
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
	Comment,
	Header(&'a str),
	Pair(&'a str, &'a str),
	Other,
}

fn classify(line: &str) -> Line<'_> {
	if line.starts_with('#') {
		return Line::Comment;
	}

	if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
		if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) {
			return Line::Header(name);
		}
	}

	match line.split_once('=') {
		Some((key, value)) => Line::Pair(key.trim(), value.trim()),
		None => Line::Other,
	}
}

/// Parses config text into its ordered list of sections.
pub fn parse_str(content: &str) -> Vec<ConfigSection> {
	let mut sections = Vec::new();
	let mut current = ConfigSection::new(DEFAULT_SECTION);

	for line in content.lines() {
		match classify(line) {
			Line::Header(name) => {
				let finished = std::mem::replace(&mut current, ConfigSection::new(name));
				sections.push(finished);
			}
			Line::Pair(key, value) => {
				current.values.insert(key.to_string(), value.to_string());
			}
			Line::Comment | Line::Other => {}
		}
	}

	sections.push(current);
	sections
}

/// Reads and parses the config file at `path`.
#[instrument(fields(path = %path.as_ref().display()))]
pub async fn parse_config(path: impl AsRef<Path>) -> Result<Vec<ConfigSection>> {
	let path = path.as_ref();
	let content = fs::read_to_string(path)
		.await
		.map_err(|source| ConfFileError::Io {
			path: path.to_path_buf(),
			source,
		})?;
	Ok(parse_str(&content))
}

pub fn find_section<'a>(sections: &'a [ConfigSection], name: &str) -> Option<&'a ConfigSection> {
	sections.iter().find(|s| s.name == name)
}

pub fn peer_public_keys(sections: &[ConfigSection]) -> Vec<String> {
	sections
		.iter()
		.filter(|s| s.name == PEER_SECTION)
		.filter_map(|s| s.get("PublicKey"))
		.map(str::to_string)
		.collect()
}

/// Typed view of the `[Interface]` section.
#[derive(Debug, Clone)]
pub struct InterfaceSection {
	pub private_key: WgPrivateKey,
	/// Interface address with the pool prefix, e.g. `10.0.0.1/24`.
	pub address: IpNet,
	pub listen_port: Option<u16>,
}

impl InterfaceSection {
	pub fn from_sections(sections: &[ConfigSection]) -> Result<Self> {
		let section = find_section(sections, INTERFACE_SECTION)
			.ok_or(ConfFileError::MissingSection(INTERFACE_SECTION))?;

		let private_key = section
			.get("PrivateKey")
			.filter(|v| !v.is_empty())
			.ok_or(ConfFileError::MissingField {
				section: INTERFACE_SECTION,
				field: "PrivateKey",
			})?;
		let private_key = WgPrivateKey::from_base64(private_key)?;

		let address = section
			.get("Address")
			.filter(|v| !v.is_empty())
			.ok_or(ConfFileError::MissingField {
				section: INTERFACE_SECTION,
				field: "Address",
			})?;
		// wg-quick allows `Address = 10.0.0.1/24, fd00::1/64`; the pool is the first entry.
		let first = address.split(',').next().unwrap_or_default().trim();
		let address: IpNet = first.parse().map_err(|e| ConfFileError::InvalidField {
			field: "Address",
			message: format!("{first}: {e}"),
		})?;

		let listen_port = match section.get("ListenPort") {
			Some(port) => Some(port.parse().map_err(|_| ConfFileError::InvalidField {
				field: "ListenPort",
				message: port.to_string(),
			})?),
			None => None,
		};

		Ok(Self {
			private_key,
			address,
			listen_port,
		})
	}
}

/// Renders a server-side `[Peer]` block.
pub fn render_peer_block(public_key: &WgPublicKey, preshared_key: &str, allowed_ips: &IpNet) -> String {
	format!(
		"[Peer]\nPublicKey = {public_key}\nPresharedKey = {preshared_key}\nAllowedIPs = {allowed_ips}\n"
	)
}

/// Handle on the interface config file.
///
/// Mutations run under [`ConfigFileLock`], an advisory `flock` on a sibling
/// `.<name>.lock` file, so separate processes working on the same file take
/// turns. The lock file is never renamed, which keeps the lock valid across
/// the temp-file rewrite in `remove_peer_block`.
#[derive(Debug)]
pub struct WgConfigFile {
	path: PathBuf,
	local: Mutex<()>,
}

impl WgConfigFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			local: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, source: std::io::Error) -> ConfFileError {
		ConfFileError::Io {
			path: self.path.clone(),
			source,
		}
	}

	fn sibling(&self, suffix: &str) -> PathBuf {
		let file_name = self
			.path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "wg.conf".to_string());
		self.path.with_file_name(format!(".{file_name}.{suffix}"))
	}

	pub fn lock_path(&self) -> PathBuf {
		self.sibling("lock")
	}

	async fn read_raw(&self) -> Result<String> {
		fs::read_to_string(&self.path)
			.await
			.map_err(|e| self.io_error(e))
	}

	pub async fn read(&self) -> Result<Vec<ConfigSection>> {
		parse_config(&self.path).await
	}

	pub async fn interface(&self) -> Result<InterfaceSection> {
		InterfaceSection::from_sections(&self.read().await?)
	}

	pub async fn peer_keys(&self) -> Result<Vec<String>> {
		Ok(peer_public_keys(&self.read().await?))
	}

	/// Waits for exclusive ownership of the config file. Tasks of this process
	/// queue on the handle's mutex first, so at most one of them blocks on the
	/// file lock at a time.
	#[instrument(skip(self), fields(path = %self.path.display()))]
	pub async fn lock(&self) -> Result<ConfigFileLock<'_>> {
		let guard = self.local.lock().await;

		let lock_path = self.lock_path();
		let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
			let file = std::fs::OpenOptions::new()
				.read(true)
				.write(true)
				.create(true)
				.truncate(false)
				.open(&lock_path)?;
			file.lock_exclusive()?;
			Ok(file)
		})
		.await
		.map_err(|e| self.io_error(std::io::Error::other(e)))?
		.map_err(|e| self.io_error(e))?;

		debug!("config file lock acquired");
		Ok(ConfigFileLock {
			config: self,
			_file: file,
			_guard: guard,
		})
	}

	/// Locks, appends and unlocks. See [`ConfigFileLock::append_peer_block`].
	pub async fn append_peer_block(&self, block: &str, public_key: &str) -> Result<()> {
		self.lock().await?.append_peer_block(block, public_key).await
	}

	/// Locks, removes and unlocks. See [`ConfigFileLock::remove_peer_block`].
	pub async fn remove_peer_block(&self, public_key: &str) -> Result<bool> {
		self.lock().await?.remove_peer_block(public_key).await
	}
}

/// Exclusive hold on a [`WgConfigFile`]. Dropping it closes the lock file,
/// which releases the `flock`.
#[derive(Debug)]
pub struct ConfigFileLock<'a> {
	config: &'a WgConfigFile,
	_file: std::fs::File,
	_guard: MutexGuard<'a, ()>,
}

impl ConfigFileLock<'_> {
	/// Appends `block` unless a `[Peer]` with `public_key` is already present.
	/// The file is left untouched on rejection.
	#[instrument(skip(self, block), fields(path = %self.config.path.display()))]
	pub async fn append_peer_block(&self, block: &str, public_key: &str) -> Result<()> {
		let config = self.config;
		let content = config.read_raw().await?;
		if peer_public_keys(&parse_str(&content)).iter().any(|k| k == public_key) {
			return Err(ConfFileError::DuplicatePeer(public_key.to_string()));
		}

		let separator = if content.is_empty() || content.ends_with("\n\n") {
			""
		} else if content.ends_with('\n') {
			"\n"
		} else {
			"\n\n"
		};

		let mut file = OpenOptions::new()
			.append(true)
			.open(&config.path)
			.await
			.map_err(|e| config.io_error(e))?;
		file
			.write_all(format!("{separator}{block}").as_bytes())
			.await
			.map_err(|e| config.io_error(e))?;
		file.flush().await.map_err(|e| config.io_error(e))?;

		debug!("appended peer block");
		Ok(())
	}

	/// Drops the `[Peer]` block carrying `public_key`, rewriting the file via a
	/// sibling temp file and rename. Returns whether a block was removed.
	#[instrument(skip(self), fields(path = %self.config.path.display()))]
	pub async fn remove_peer_block(&self, public_key: &str) -> Result<bool> {
		let config = self.config;
		let content = config.read_raw().await?;
		let (rewritten, removed) = strip_peer_block(&content, public_key);
		if !removed {
			return Ok(false);
		}

		let tmp_path = config.sibling("wg2fa-tmp");

		let mut options = OpenOptions::new();
		options.write(true).create(true).truncate(true);
		#[cfg(unix)]
		options.mode(0o600);

		let mut tmp = options
			.open(&tmp_path)
			.await
			.map_err(|e| config.io_error(e))?;
		tmp
			.write_all(rewritten.as_bytes())
			.await
			.map_err(|e| config.io_error(e))?;
		tmp.sync_all().await.map_err(|e| config.io_error(e))?;
		drop(tmp);

		fs::rename(&tmp_path, &config.path)
			.await
			.map_err(|e| config.io_error(e))?;

		debug!("removed peer block");
		Ok(true)
	}
}

/// Splits `content` into header-led chunks and drops every `[Peer]` chunk whose
/// `PublicKey` matches. Everything else is kept byte for byte.
fn strip_peer_block(content: &str, public_key: &str) -> (String, bool) {
	let mut chunks: Vec<Vec<&str>> = vec![Vec::new()];
	for line in content.split_inclusive('\n') {
		if matches!(classify(line.trim_end_matches(['\r', '\n'])), Line::Header(_)) {
			chunks.push(Vec::new());
		}
		if let Some(chunk) = chunks.last_mut() {
			chunk.push(line);
		}
	}

	let mut removed = false;
	let mut out = String::with_capacity(content.len());
	for chunk in chunks {
		let text: String = chunk.concat();
		let is_match = match parse_str(&text).last() {
			Some(section) => {
				section.name == PEER_SECTION && section.get("PublicKey") == Some(public_key)
			}
			None => false,
		};
		if is_match {
			removed = true;
		} else {
			out.push_str(&text);
		}
	}

	(out, removed)
}
