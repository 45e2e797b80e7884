// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Result codes surfaced by the engine and by device backends.

use std::io;

/// Terminal status of a filesystem request.
///
/// Success is `Ok(())`; every failure is one of these codes. Devices report
/// their native errors through [`Error::from`] on [`io::Error`] so that the
/// same code surfaces no matter which backend handled the request.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Path not found on any mount")]
    NotFound,
    #[error("No mount supports the requested operation")]
    Unsupported,
    #[error("Target already exists")]
    AlreadyExists,
    #[error("Insufficient permissions")]
    Permissions,
    #[error("Device out of space")]
    OutOfSpace,
    #[error("Unknown device type index")]
    InvalidDevice,
    #[error("Work item pool exhausted")]
    OutOfWorkItems,
    #[error("Device I/O error")]
    Generic,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound,
            io::ErrorKind::PermissionDenied => Error::Permissions,
            io::ErrorKind::AlreadyExists => Error::AlreadyExists,
            io::ErrorKind::StorageFull => Error::OutOfSpace,
            io::ErrorKind::ReadOnlyFilesystem => Error::Unsupported,
            _ => Error::Generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let cases = [
            (io::ErrorKind::NotFound, Error::NotFound),
            (io::ErrorKind::PermissionDenied, Error::Permissions),
            (io::ErrorKind::AlreadyExists, Error::AlreadyExists),
            (io::ErrorKind::StorageFull, Error::OutOfSpace),
            (io::ErrorKind::ReadOnlyFilesystem, Error::Unsupported),
            (io::ErrorKind::BrokenPipe, Error::Generic),
        ];
        for (kind, code) in cases.iter() {
            assert_eq!(Error::from(io::Error::from(*kind)), *code);
        }
    }
}
