// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! A layered virtual filesystem.
//!
//! Storage backends ("devices") are mounted onto prefixes of a single
//! virtual path tree; later mounts shadow earlier ones on overlapping
//! prefixes, and reads fall through a shadowing mount to the layers
//! underneath when the file is absent. All requests are processed
//! asynchronously by one background worker per [`FileEngine`]; each request
//! returns a [`WorkItemHandle`] the caller may poll, block on, or — with the
//! `_with_callback` variants — have delivered on the worker thread.

#[macro_use]
extern crate slog;

pub mod device;
pub mod engine;
pub mod path;
pub mod work_item;

mod mount;
mod pool;
mod queue;
mod semaphore;

pub use engine::{FileEngine, Mount, WorkItemHandle};
pub use strata_types::{EngineConfig, Error, MountPermissions, Result, WriteMode};
pub use work_item::{BufferAction, Operation, WorkItem};

// Convenience macro to obtain the scoped logger
#[macro_export]
macro_rules! sl {
    () => {
        slog_scope::logger()
    };
}
