// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Storage backend interface.
//!
//! A backend is described by two traits: [`DeviceDriver`], the registered
//! factory that creates device instances and declares which optional
//! operations the backend implements, and [`Device`], the per-mount instance
//! the engine calls into. The engine serializes calls on its single worker,
//! so a device sees at most one concurrent request per engine; instances
//! shared between engines must tolerate concurrent calls.

use strata_types::{Error, MountPermissions, Result, WriteMode};

pub mod directory;

pub use directory::{DirectoryDevice, DirectoryDriver};

/// One mounted backend instance. Paths are device-relative: the virtual path
/// with the mount prefix stripped (so they start with `/`, or are empty when
/// the request targeted the mount point itself).
pub trait Device: Send + Sync {
    /// Whether `path` names an existing file on this device.
    fn exists(&self, path: &str) -> bool;

    /// Size in bytes of the file at `path`.
    fn size(&self, path: &str) -> Result<u64>;

    /// Read up to `max_bytes` starting at `offset`, allocating the output
    /// buffer. With `null_terminate` the device appends a single `0` byte
    /// after the payload; the payload length is the buffer length minus that
    /// terminator.
    fn read(&self, path: &str, offset: u64, max_bytes: u64, null_terminate: bool)
        -> Result<Vec<u8>>;

    /// Write `data` according to `mode`, returning the bytes written.
    /// `offset` is only meaningful for [`WriteMode::Segment`].
    fn write(&self, _path: &str, _offset: u64, _data: &[u8], _mode: WriteMode) -> Result<u64> {
        Err(Error::Unsupported)
    }

    /// Remove the file at `path`.
    fn delete(&self, _path: &str) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Create the directory at `path`.
    fn create_dir(&self, _path: &str) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Remove the directory at `path` and everything below it.
    fn delete_dir(&self, _path: &str) -> Result<()> {
        Err(Error::Unsupported)
    }
}

/// A registered backend type.
pub trait DeviceDriver: Send + Sync {
    /// Short name used in log records.
    fn name(&self) -> &str;

    /// The mutation operations this backend implements. `READ` is implied
    /// and need not be included; a mount is never granted a permission the
    /// driver does not report here.
    fn capabilities(&self) -> MountPermissions;

    /// Create a device instance bound to `device_path`. Returns
    /// [`Error::NotFound`] when the backing location does not exist.
    fn create(&self, device_path: &str) -> Result<Box<dyn Device>>;
}
