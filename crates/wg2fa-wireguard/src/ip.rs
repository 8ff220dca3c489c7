// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunnel address allocation inside the interface's CIDR block.
//!
//! Candidates are walked in ascending numeric order on the raw octets, so the
//! same code path serves IPv4 and IPv6 ranges. Network and broadcast addresses
//! are skipped whenever the prefix leaves at least two host bits.

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IpError {
	#[error("IP address space exhausted in {0}")]
	PoolExhausted(IpNet),

	#[error("invalid IP address: {0}")]
	InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, IpError>;

/// Adds one to a big-endian integer in place, carrying from the last byte.
/// Returns `false` when the value wrapped around to zero.
pub fn increment(bytes: &mut [u8]) -> bool {
	for byte in bytes.iter_mut().rev() {
		let (next, overflow) = byte.overflowing_add(1);
		*byte = next;
		if !overflow {
			return true;
		}
	}
	false
}

fn octets(addr: IpAddr) -> Vec<u8> {
	match addr {
		IpAddr::V4(v4) => v4.octets().to_vec(),
		IpAddr::V6(v6) => v6.octets().to_vec(),
	}
}

fn from_octets(bytes: &[u8]) -> IpAddr {
	match bytes.len() {
		4 => {
			let mut arr = [0u8; 4];
			arr.copy_from_slice(bytes);
			IpAddr::V4(Ipv4Addr::from(arr))
		}
		_ => {
			let mut arr = [0u8; 16];
			arr.copy_from_slice(bytes);
			IpAddr::V6(Ipv6Addr::from(arr))
		}
	}
}

/// Returns the lowest address of `range` not in `excluded`, carrying the
/// prefix length of `range`.
///
/// `excluded` is expected to already contain the interface's own address.
pub fn allocate(range: &IpNet, excluded: &HashSet<IpAddr>) -> Result<IpNet> {
	let host_bits = range.max_prefix_len() - range.prefix_len();
	let skip_edges = host_bits >= 2;

	let mut candidate = octets(range.network());
	let last = octets(range.broadcast());

	if skip_edges {
		increment(&mut candidate);
	}

	loop {
		if skip_edges && candidate == last {
			break;
		}

		let addr = from_octets(&candidate);
		if !excluded.contains(&addr) {
			return IpNet::new(addr, range.prefix_len())
				.map_err(|_| IpError::InvalidAddress(addr.to_string()));
		}

		if candidate == last || !increment(&mut candidate) {
			break;
		}
	}

	Err(IpError::PoolExhausted(range.trunc()))
}

/// Parses either a bare address or the CIDR form stored in the registry
/// (`10.0.0.3/24`) down to the host address.
pub fn parse_host(s: &str) -> Result<IpAddr> {
	let s = s.trim();
	if let Ok(net) = s.parse::<IpNet>() {
		return Ok(net.addr());
	}
	s.parse()
		.map_err(|_| IpError::InvalidAddress(s.to_string()))
}

/// Host-length network for a single address, as used in server-side
/// `AllowedIPs`.
pub fn host_net(addr: IpAddr) -> IpNet {
	IpNet::from(addr)
}
