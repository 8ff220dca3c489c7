// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wg2fa server binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wg2fa_provisioning::{AdmissionRequest, ClientRecord};
use wg2fa_server_config::{LoggingConfig, ServerConfig};
use wg2fa_wireguard::WgPublicKey;

mod services;
mod version;

/// wg2fa - WireGuard peer provisioning with session expiry.
#[derive(Parser, Debug)]
#[command(name = "wg2fa", about = "WireGuard peer provisioning and session watchdog", version)]
struct Args {
	/// Config file to load instead of /etc/wg2fa/server.toml
	#[arg(long, global = true, env = "WG2FA_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the session watchdog until interrupted
	Serve,
	/// Admit a client and print its profile as JSON
	Provision {
		/// Client name, recorded in the registry
		name: String,
		/// Base64 public key; a key pair is minted when omitted
		#[arg(long)]
		public_key: Option<String>,
		/// Submit the admission as unauthenticated
		#[arg(long)]
		unauthenticated: bool,
	},
	/// Remove a client from the interface, config file and registry
	Revoke {
		/// Base64 public key of the client
		public_key: String,
	},
	/// List admitted clients
	List {
		#[arg(long)]
		json: bool,
	},
	/// Compare registry, running interface and config file
	Drift,
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => wg2fa_server_config::load_config_with_file(path),
		None => wg2fa_server_config::load_config(),
	}
	.context("failed to load configuration")?;

	init_tracing(&config.logging);

	run(args.command, &config).await
}

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());

	let json_layer = logging
		.json
		.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
	let text_layer = (!logging.json)
		.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

	tracing_subscriber::registry()
		.with(filter)
		.with(json_layer)
		.with(text_layer)
		.init();
}

async fn run(command: Command, config: &ServerConfig) -> anyhow::Result<()> {
	match command {
		Command::Serve => serve(config).await,
		Command::Provision {
			name,
			public_key,
			unauthenticated,
		} => {
			let services = services::build_services(config, false).await?;
			let profile = services
				.provisioning
				.admit(AdmissionRequest {
					client_name: name,
					public_key,
					authenticated: !unauthenticated,
				})
				.await?;
			println!("{}", serde_json::to_string_pretty(&profile)?);
			Ok(())
		}
		Command::Revoke { public_key } => {
			let key: WgPublicKey = public_key
				.parse()
				.with_context(|| format!("invalid public key '{public_key}'"))?;
			let services = services::build_services(config, false).await?;
			services.provisioning.revoke(&key).await?;
			println!("revoked {key}");
			Ok(())
		}
		Command::List { json } => {
			let services = services::build_services(config, false).await?;
			let records = services.provisioning.list_active().await?;
			if json {
				println!("{}", serde_json::to_string_pretty(&records)?);
			} else {
				for record in &records {
					println!("{}", format_record(record));
				}
			}
			Ok(())
		}
		Command::Drift => {
			let services = services::build_services(config, false).await?;
			let report = services.provisioning.drift().await?;
			println!("{}", serde_json::to_string_pretty(&report)?);
			if !report.is_clean() {
				tracing::warn!("registry, interface and config file disagree");
			}
			Ok(())
		}
		Command::Version => {
			println!("{}", version::format_version_info());
			Ok(())
		}
	}
}

async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
	let services = services::build_services(config, true).await?;

	tracing::info!(
		interface = %config.wireguard.interface,
		endpoint = %config.wireguard.endpoint,
		"starting wg2fa"
	);

	let handle = services.watchdog.map(|watchdog| watchdog.spawn());
	if handle.is_none() {
		tracing::info!("session watchdog disabled");
	}

	tokio::signal::ctrl_c()
		.await
		.context("failed to listen for shutdown signal")?;
	tracing::info!("shutdown signal received");

	if let Some(handle) = handle {
		handle.shutdown().await;
	}

	tracing::info!("wg2fa stopped");
	Ok(())
}

fn format_record(record: &ClientRecord) -> String {
	format!(
		"{}\t{}\t{}\t{}",
		record.name,
		record.public_key,
		record.address,
		record.admitted_at.to_rfc3339()
	)
}
