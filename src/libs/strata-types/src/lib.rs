// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Types shared across the strata virtual filesystem components.

pub mod config;
pub mod error;
pub mod mount;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use mount::{MountPermissions, WriteMode};
