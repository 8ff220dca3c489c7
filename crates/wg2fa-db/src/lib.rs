// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod clients;
pub mod error;
pub mod pool;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use clients::{ClientRepository, ClientRowTuple, ClientStore};
pub use error::{DbError, Result};
pub use pool::create_pool;
