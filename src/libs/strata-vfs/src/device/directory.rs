// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Host directory backend.
//!
//! Maps device-relative virtual paths onto a subtree of the host filesystem
//! with `std::fs`. This is the default backend, registered at driver index
//! [`crate::FileEngine::DIRECTORY_DEVICE`].

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use strata_types::{Error, MountPermissions, Result, WriteMode};

use super::{Device, DeviceDriver};

/// Driver creating [`DirectoryDevice`] instances.
pub struct DirectoryDriver;

impl DeviceDriver for DirectoryDriver {
    fn name(&self) -> &str {
        "directory"
    }

    fn capabilities(&self) -> MountPermissions {
        MountPermissions::WRITE_FILE
            | MountPermissions::DELETE_FILE
            | MountPermissions::CREATE_DIR
            | MountPermissions::DELETE_DIR
    }

    fn create(&self, device_path: &str) -> Result<Box<dyn Device>> {
        match fs::metadata(device_path) {
            Ok(md) if md.is_dir() => Ok(Box::new(DirectoryDevice {
                root: PathBuf::from(device_path),
            })),
            _ => Err(Error::NotFound),
        }
    }
}

/// A device rooted at one host directory.
pub struct DirectoryDevice {
    root: PathBuf,
}

impl DirectoryDevice {
    fn host_path(&self, path: &str) -> PathBuf {
        // device-relative paths keep their leading '/'; joining an absolute
        // path would discard the root
        self.root.join(path.trim_start_matches('/'))
    }

    fn ensure_parent(&self, host: &Path) -> Result<()> {
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Device for DirectoryDevice {
    fn exists(&self, path: &str) -> bool {
        fs::metadata(self.host_path(path))
            .map(|md| md.is_file())
            .unwrap_or(false)
    }

    fn size(&self, path: &str) -> Result<u64> {
        let md = fs::metadata(self.host_path(path))?;
        if md.is_file() {
            Ok(md.len())
        } else {
            Err(Error::Unsupported)
        }
    }

    fn read(&self, path: &str, offset: u64, max_bytes: u64, null_terminate: bool)
        -> Result<Vec<u8>> {
        let mut file = File::open(self.host_path(path)).map_err(|_| Error::NotFound)?;

        let len = file.metadata()?.len();
        let to_read = len.saturating_sub(offset).min(max_bytes);
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }

        let mut buf = Vec::with_capacity(to_read as usize + null_terminate as usize);
        file.take(to_read).read_to_end(&mut buf)?;
        if null_terminate {
            buf.push(0);
        }
        Ok(buf)
    }

    fn write(&self, path: &str, offset: u64, data: &[u8], mode: WriteMode) -> Result<u64> {
        let host = self.host_path(path);
        self.ensure_parent(&host)?;

        let mut file = match mode {
            WriteMode::Truncate => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&host)?,
            WriteMode::Append => OpenOptions::new().append(true).create(true).open(&host)?,
            WriteMode::Segment => OpenOptions::new().write(true).create(true).open(&host)?,
        };

        if mode == WriteMode::Segment {
            file.seek(SeekFrom::Start(offset))?;
        }
        file.write_all(data)?;
        Ok(data.len() as u64)
    }

    fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.host_path(path)).map_err(Into::into)
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        let host = self.host_path(path);
        if fs::metadata(&host).is_ok() {
            return Err(Error::AlreadyExists);
        }
        fs::create_dir_all(&host).map_err(Into::into)
    }

    fn delete_dir(&self, path: &str) -> Result<()> {
        let host = self.host_path(path);
        let md = fs::metadata(&host)?;
        if !md.is_dir() {
            return Err(Error::Unsupported);
        }
        fs::remove_dir_all(&host).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(dir: &tempfile::TempDir) -> DirectoryDevice {
        DirectoryDevice {
            root: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn test_create_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryDriver.create(dir.path().to_str().unwrap()).is_ok());
        assert_eq!(
            DirectoryDriver
                .create(dir.path().join("missing").to_str().unwrap())
                .err(),
            Some(Error::NotFound)
        );

        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert_eq!(
            DirectoryDriver.create(file.to_str().unwrap()).err(),
            Some(Error::NotFound)
        );
    }

    #[test]
    fn test_exists_only_for_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"hello").unwrap();

        let dev = device(&dir);
        assert!(dev.exists("/sub/a.txt"));
        assert!(!dev.exists("/sub"));
        assert!(!dev.exists("/nope"));
    }

    #[test]
    fn test_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let dev = device(&dir);
        assert_eq!(dev.size("/a.txt"), Ok(5));
        assert_eq!(dev.size("/missing"), Err(Error::NotFound));
        assert_eq!(dev.size(""), Err(Error::Unsupported));
    }

    #[test]
    fn test_read_segment_and_terminator() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello world").unwrap();

        let dev = device(&dir);
        assert_eq!(dev.read("/a.txt", 0, u64::MAX, false).unwrap(), b"hello world");
        assert_eq!(dev.read("/a.txt", 6, 5, false).unwrap(), b"world");
        assert_eq!(dev.read("/a.txt", 6, u64::MAX, true).unwrap(), b"world\0");
        // reading past the end yields an empty payload, not an error
        assert_eq!(dev.read("/a.txt", 100, u64::MAX, false).unwrap(), b"");
        assert_eq!(dev.read("/missing", 0, u64::MAX, false), Err(Error::NotFound));
    }

    #[test]
    fn test_write_modes() {
        let dir = tempfile::tempdir().unwrap();
        let dev = device(&dir);

        // parents are created as needed
        assert_eq!(dev.write("/new/f.txt", 0, b"abcdef", WriteMode::Truncate), Ok(6));
        assert_eq!(dev.write("/new/f.txt", 0, b"xyz", WriteMode::Append), Ok(3));
        assert_eq!(fs::read(dir.path().join("new/f.txt")).unwrap(), b"abcdefxyz");

        assert_eq!(dev.write("/new/f.txt", 2, b"??", WriteMode::Segment), Ok(2));
        assert_eq!(fs::read(dir.path().join("new/f.txt")).unwrap(), b"ab??efxyz");

        assert_eq!(dev.write("/new/f.txt", 0, b"short", WriteMode::Truncate), Ok(5));
        assert_eq!(fs::read(dir.path().join("new/f.txt")).unwrap(), b"short");
    }

    #[test]
    fn test_delete_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dev = device(&dir);

        assert_eq!(dev.delete("/missing"), Err(Error::NotFound));
        dev.write("/d/f.txt", 0, b"x", WriteMode::Truncate).unwrap();
        assert_eq!(dev.delete("/d/f.txt"), Ok(()));
        assert!(!dev.exists("/d/f.txt"));

        assert_eq!(dev.create_dir("/d/nested/deep"), Ok(()));
        assert_eq!(dev.create_dir("/d/nested/deep"), Err(Error::AlreadyExists));
        dev.write("/d/nested/deep/f.txt", 0, b"x", WriteMode::Truncate)
            .unwrap();
        assert_eq!(dev.delete_dir("/d/nested"), Ok(()));
        assert!(fs::metadata(dir.path().join("d/nested")).is_err());
        assert_eq!(dev.delete_dir("/d/nested"), Err(Error::NotFound));
    }
}
