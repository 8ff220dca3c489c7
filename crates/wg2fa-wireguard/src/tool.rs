// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Thin wrapper around the `wg(8)` command line tool.

use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{trace, warn};

pub const DEFAULT_WG_BINARY: &str = "wg";

#[derive(Error, Debug)]
pub enum WgToolError {
	#[error("{0} not found in PATH")]
	NotInstalled(String),

	#[error("I/O error running {binary}: {source}")]
	Io {
		binary: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{binary} {} failed: {stderr}", .args.join(" "))]
	CommandFailed {
		binary: String,
		args: Vec<String>,
		stderr: String,
	},
}

/// Runs `binary args...`, optionally feeding `stdin`, and returns trimmed stdout.
///
/// `stdin` carries key material for `wg pubkey`; it is never logged.
pub async fn run_wg(binary: &str, args: &[&str], stdin: Option<&str>) -> Result<String, WgToolError> {
	let mut cmd = Command::new(binary);
	cmd.args(args)
		.stdin(if stdin.is_some() {
			Stdio::piped()
		} else {
			Stdio::null()
		})
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	trace!(cmd = %format!("{binary} {}", args.join(" ")), "running wg command");

	let io_error = |source: std::io::Error| {
		if source.kind() == std::io::ErrorKind::NotFound {
			warn!(binary, "wg tool not found in PATH");
			WgToolError::NotInstalled(binary.to_string())
		} else {
			WgToolError::Io {
				binary: binary.to_string(),
				source,
			}
		}
	};

	let mut child = cmd.spawn().map_err(io_error)?;

	if let Some(input) = stdin {
		if let Some(mut pipe) = child.stdin.take() {
			pipe.write_all(input.as_bytes()).await.map_err(io_error)?;
			pipe.write_all(b"\n").await.map_err(io_error)?;
			// Closing stdin lets `wg pubkey` see EOF.
			drop(pipe);
		}
	}

	let output = child.wait_with_output().await.map_err(io_error)?;

	if output.status.success() {
		Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
	} else {
		Err(WgToolError::CommandFailed {
			binary: binary.to_string(),
			args: args.iter().map(|s| s.to_string()).collect(),
			stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
		})
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_binary_is_not_installed() {
		let err = run_wg("wg2fa-definitely-not-a-binary", &["show"], None)
			.await
			.unwrap_err();
		assert!(matches!(err, WgToolError::NotInstalled(_)));
	}

	#[tokio::test]
	async fn stdout_is_trimmed() {
		let out = run_wg("echo", &["  hello  "], None).await.unwrap();
		assert_eq!(out, "hello");
	}

	#[tokio::test]
	async fn stdin_is_forwarded() {
		let out = run_wg("cat", &[], Some("key-material")).await.unwrap();
		assert_eq!(out, "key-material");
	}

	#[tokio::test]
	async fn non_zero_exit_is_command_failed() {
		let err = run_wg("false", &[], None).await.unwrap_err();
		match err {
			WgToolError::CommandFailed { binary, .. } => assert_eq!(binary, "false"),
			other => panic!("unexpected error: {other:?}"),
		}
	}
}
