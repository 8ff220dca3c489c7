// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic eviction of sessions that outlived their time budget.

use crate::error::Result;
use crate::registry::ClientRecord;
use crate::service::ProvisioningService;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use wg2fa_wireguard::WgPublicKey;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
	/// Admitted longer ago than the re-authentication period.
	ForceReauth,
	/// No handshake within the idle period, or none at all.
	Idle,
}

impl std::fmt::Display for EvictionReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EvictionReason::ForceReauth => f.write_str("force_reauth"),
			EvictionReason::Idle => f.write_str("idle"),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogPolicy {
	pub force_reauth: Option<ChronoDuration>,
	pub idle: Option<ChronoDuration>,
}

impl WatchdogPolicy {
	/// Minutes at or below zero disable the corresponding check.
	pub fn from_minutes(force_reauth_minutes: i64, idle_minutes: i64) -> Self {
		let enabled = |minutes: i64| {
			if minutes > 0 {
				ChronoDuration::try_minutes(minutes)
			} else {
				None
			}
		};
		Self {
			force_reauth: enabled(force_reauth_minutes),
			idle: enabled(idle_minutes),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.force_reauth.is_some() || self.idle.is_some()
	}

	pub fn evaluate(
		&self,
		record: &ClientRecord,
		last_handshake: Option<DateTime<Utc>>,
		now: DateTime<Utc>,
	) -> Option<EvictionReason> {
		if let Some(force) = self.force_reauth {
			if now - record.admitted_at > force {
				return Some(EvictionReason::ForceReauth);
			}
		}

		self.evaluate_idle(last_handshake, now)
	}

	/// The idle check alone, which needs nothing from the registry row.
	pub fn evaluate_idle(
		&self,
		last_handshake: Option<DateTime<Utc>>,
		now: DateTime<Utc>,
	) -> Option<EvictionReason> {
		let idle = self.idle?;
		let idle_for_too_long = match last_handshake {
			Some(at) => now - at > idle,
			None => true,
		};
		idle_for_too_long.then_some(EvictionReason::Idle)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	pub examined: usize,
	pub evicted: Vec<(WgPublicKey, EvictionReason)>,
	pub failed: usize,
}

#[derive(Clone)]
pub struct Watchdog {
	service: ProvisioningService,
	policy: WatchdogPolicy,
	interval: Duration,
}

impl Watchdog {
	pub fn new(service: ProvisioningService, policy: WatchdogPolicy, interval: Duration) -> Self {
		Self {
			service,
			policy,
			interval,
		}
	}

	/// One pass. Errors fetching records or telemetry abort the pass before
	/// anything is evicted; a failed eviction is counted and the pass goes on.
	/// Rows whose admission time is unreadable only get the idle check.
	#[instrument(skip(self))]
	pub async fn reconcile_once(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
		let scan = self.service.registry().scan().await?;
		let handshakes = self.service.control().last_handshakes().await?;

		let mut report = ReconcileReport {
			examined: scan.records.len() + scan.unreadable.len(),
			..Default::default()
		};

		let decisions = scan
			.records
			.iter()
			.map(|record| {
				let last_handshake = handshakes.get(&record.public_key).copied();
				(
					record.public_key,
					self.policy.evaluate(record, last_handshake, now),
				)
			})
			.chain(scan.unreadable.iter().map(|key| {
				let last_handshake = handshakes.get(key).copied();
				(*key, self.policy.evaluate_idle(last_handshake, now))
			}));

		for (public_key, decision) in decisions {
			let Some(reason) = decision else {
				continue;
			};

			match self.service.revoke(&public_key).await {
				Ok(()) => {
					info!(%public_key, %reason, "session evicted");
					report.evicted.push((public_key, reason));
				}
				Err(e) => {
					warn!(%public_key, error = %e, "eviction failed");
					report.failed += 1;
				}
			}
		}

		Ok(report)
	}

	/// Runs until `shutdown` flips to `true` or its sender is dropped. A pass
	/// in progress always completes.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		info!(
			interval_secs = self.interval.as_secs(),
			force_reauth = ?self.policy.force_reauth,
			idle = ?self.policy.idle,
			"session watchdog started"
		);

		loop {
			tokio::select! {
				biased;

				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						info!("session watchdog stopping");
						break;
					}
				}

				_ = ticker.tick() => {
					match self.reconcile_once(Utc::now()).await {
						Ok(report) if report.evicted.is_empty() && report.failed == 0 => {
							debug!(examined = report.examined, "watchdog pass clean");
						}
						Ok(report) => {
							info!(
								examined = report.examined,
								evicted = report.evicted.len(),
								failed = report.failed,
								"watchdog pass complete"
							);
						}
						Err(e) => warn!(error = %e, "watchdog pass skipped"),
					}
				}
			}
		}
	}

	pub fn spawn(self) -> WatchdogHandle {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let join = tokio::spawn(self.run(shutdown_rx));
		WatchdogHandle { shutdown_tx, join }
	}
}

pub struct WatchdogHandle {
	shutdown_tx: watch::Sender<bool>,
	join: JoinHandle<()>,
}

impl WatchdogHandle {
	/// Signals the loop and waits for it to finish its current pass.
	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(true);
		if let Err(e) = self.join.await {
			warn!(error = %e, "watchdog task ended abnormally");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::TestEnv;
	use std::sync::atomic::Ordering;

	fn record(admitted_at: DateTime<Utc>) -> ClientRecord {
		ClientRecord {
			name: "alice".to_string(),
			public_key: WgPublicKey::from_bytes([1; 32]),
			address: "10.0.0.2/24".parse().unwrap(),
			admitted_at,
		}
	}

	#[test]
	fn non_positive_minutes_disable_checks() {
		let policy = WatchdogPolicy::from_minutes(0, -5);
		assert!(!policy.is_enabled());
		let now = Utc::now();
		let old = record(now - ChronoDuration::days(365));
		assert_eq!(policy.evaluate(&old, None, now), None);
	}

	#[test]
	fn force_reauth_after_threshold() {
		let policy = WatchdogPolicy::from_minutes(60, 0);
		let now = Utc::now();
		let recent_handshake = Some(now - ChronoDuration::minutes(1));

		let stale = record(now - ChronoDuration::minutes(61));
		assert_eq!(
			policy.evaluate(&stale, recent_handshake, now),
			Some(EvictionReason::ForceReauth)
		);

		let fresh = record(now - ChronoDuration::minutes(59));
		assert_eq!(policy.evaluate(&fresh, recent_handshake, now), None);
	}

	#[test]
	fn never_handshaked_is_idle() {
		let policy = WatchdogPolicy::from_minutes(0, 10);
		let now = Utc::now();
		let r = record(now - ChronoDuration::minutes(1));
		assert_eq!(policy.evaluate(&r, None, now), Some(EvictionReason::Idle));
		assert_eq!(
			policy.evaluate(&r, Some(now - ChronoDuration::minutes(11)), now),
			Some(EvictionReason::Idle)
		);
		assert_eq!(
			policy.evaluate(&r, Some(now - ChronoDuration::minutes(9)), now),
			None
		);
	}

	#[test]
	fn force_wins_over_idle() {
		let policy = WatchdogPolicy::from_minutes(60, 10);
		let now = Utc::now();
		let r = record(now - ChronoDuration::minutes(61));
		assert_eq!(policy.evaluate(&r, None, now), Some(EvictionReason::ForceReauth));
	}

	#[tokio::test]
	async fn pass_force_evicts_despite_recent_handshake() {
		let env = TestEnv::new().await;
		let profile = env.service.provision("alice", None).await.unwrap();
		let now = Utc::now() + ChronoDuration::minutes(61);
		env.control
			.set_handshake(profile.public_key, now - ChronoDuration::minutes(1));

		let watchdog = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(60, 0),
			DEFAULT_INTERVAL,
		);
		let report = watchdog.reconcile_once(now).await.unwrap();

		assert_eq!(report.examined, 1);
		assert_eq!(
			report.evicted,
			vec![(profile.public_key, EvictionReason::ForceReauth)]
		);
		assert!(env.service.list_active().await.unwrap().is_empty());
		assert!(!env.control.has_peer(&profile.public_key));
		assert!(!env
			.config_file
			.peer_keys()
			.await
			.unwrap()
			.contains(&profile.public_key.to_base64()));
	}

	#[tokio::test]
	async fn pass_idle_evicts_only_silent_peers() {
		let env = TestEnv::new().await;
		let silent = env.service.provision("silent", None).await.unwrap();
		let chatty = env.service.provision("chatty", None).await.unwrap();
		let now = Utc::now();
		env.control.set_handshake(chatty.public_key, now);

		let watchdog = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(0, 10),
			DEFAULT_INTERVAL,
		);
		let report = watchdog.reconcile_once(now).await.unwrap();

		assert_eq!(report.evicted, vec![(silent.public_key, EvictionReason::Idle)]);
		let remaining = env.service.list_active().await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].public_key, chatty.public_key);
	}

	#[tokio::test]
	async fn unreadable_row_still_gets_idle_check() {
		let env = TestEnv::new().await;
		let chatty = env.service.provision("chatty", None).await.unwrap();
		let broken = WgPublicKey::from_bytes([4; 32]);
		env
			.store
			.inner
			.add(&broken.to_base64(), "broken", "10.0.0.50/24", "last tuesday")
			.await
			.unwrap();
		let now = Utc::now();
		env.control.set_handshake(chatty.public_key, now);

		let force_only = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(60, 0),
			DEFAULT_INTERVAL,
		);
		let report = force_only.reconcile_once(now).await.unwrap();
		assert_eq!(report.examined, 2);
		assert!(report.evicted.is_empty());

		let idle = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(60, 10),
			DEFAULT_INTERVAL,
		);
		let report = idle.reconcile_once(now).await.unwrap();
		assert_eq!(report.evicted, vec![(broken, EvictionReason::Idle)]);
		assert!(env.store.inner.get(&broken.to_base64()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn telemetry_failure_skips_pass() {
		let env = TestEnv::new().await;
		env.service.provision("alice", None).await.unwrap();
		env.control.fail_telemetry.store(true, Ordering::SeqCst);

		let watchdog = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(0, 10),
			DEFAULT_INTERVAL,
		);
		assert!(watchdog.reconcile_once(Utc::now()).await.is_err());
		assert_eq!(env.service.list_active().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn spawned_loop_evicts_and_shuts_down() {
		let env = TestEnv::new().await;
		env.service.provision("alice", None).await.unwrap();

		let handle = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(0, 10),
			Duration::from_millis(20),
		)
		.spawn();

		let mut evicted = false;
		for _ in 0..100 {
			if env.service.list_active().await.unwrap().is_empty() {
				evicted = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		handle.shutdown().await;
		assert!(evicted);
	}

	#[tokio::test]
	async fn first_pass_waits_one_interval() {
		let env = TestEnv::new().await;
		env.service.provision("alice", None).await.unwrap();

		let handle = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(0, 10),
			Duration::from_millis(400),
		)
		.spawn();

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert_eq!(env.service.list_active().await.unwrap().len(), 1);

		let mut evicted = false;
		for _ in 0..200 {
			if env.service.list_active().await.unwrap().is_empty() {
				evicted = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		handle.shutdown().await;
		assert!(evicted);
	}

	#[tokio::test]
	async fn loop_keeps_running_after_failed_pass() {
		let env = TestEnv::new().await;
		env.service.provision("alice", None).await.unwrap();
		env.control.fail_telemetry.store(true, Ordering::SeqCst);

		let handle = Watchdog::new(
			env.service.clone(),
			WatchdogPolicy::from_minutes(0, 10),
			Duration::from_millis(20),
		)
		.spawn();

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert_eq!(env.service.list_active().await.unwrap().len(), 1);
		env.control.fail_telemetry.store(false, Ordering::SeqCst);

		let mut evicted = false;
		for _ in 0..100 {
			if env.service.list_active().await.unwrap().is_empty() {
				evicted = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		handle.shutdown().await;
		assert!(evicted);
	}
}
