// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Mount table entries and prefix matching.

use strata_types::MountPermissions;

use crate::device::Device;

/// One binding of a virtual prefix to a device instance.
///
/// Entries live in the engine's ordered mount list; entries added later
/// shadow earlier ones on overlapping prefixes. The prefix is stored exactly
/// as supplied at mount creation.
pub(crate) struct MountEntry {
    pub id: u64,
    pub prefix: String,
    pub device: Box<dyn Device>,
    pub permissions: MountPermissions,
}

impl MountEntry {
    /// Match `path` against this mount's prefix and return the
    /// device-relative remainder.
    ///
    /// A match requires the prefix to be a byte-wise prefix of `path` with a
    /// component boundary right after it: the next byte is `/`, or the path
    /// ends there, or the prefix is the root `/`. The remainder is the full
    /// path for a root prefix, otherwise the suffix past the prefix (empty
    /// when the path names the mount point itself).
    pub fn match_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !path.as_bytes().starts_with(self.prefix.as_bytes()) {
            return None;
        }
        if self.prefix.len() == 1 {
            return Some(path);
        }
        match path.as_bytes().get(self.prefix.len()) {
            None => Some(""),
            Some(b'/') => Some(&path[self.prefix.len()..]),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DirectoryDriver;
    use crate::device::DeviceDriver;

    fn entry(prefix: &str) -> MountEntry {
        let dir = tempfile::tempdir().unwrap();
        let device = DirectoryDriver.create(dir.path().to_str().unwrap()).unwrap();
        // the tempdir may be removed; matching never touches the device
        MountEntry {
            id: 0,
            prefix: prefix.to_string(),
            device,
            permissions: MountPermissions::READ,
        }
    }

    #[test]
    fn test_root_matches_everything() {
        let m = entry("/");
        assert_eq!(m.match_path("/"), Some("/"));
        assert_eq!(m.match_path("/a/b.txt"), Some("/a/b.txt"));
    }

    #[test]
    fn test_prefix_requires_component_boundary() {
        let m = entry("/assets");
        assert_eq!(m.match_path("/assets/a.txt"), Some("/a.txt"));
        assert_eq!(m.match_path("/assets"), Some(""));
        assert_eq!(m.match_path("/assets2/a.txt"), None);
        assert_eq!(m.match_path("/asset"), None);
        assert_eq!(m.match_path("/other/assets/a.txt"), None);
    }

    #[test]
    fn test_nested_prefix() {
        let m = entry("/a/b");
        assert_eq!(m.match_path("/a/b/c"), Some("/c"));
        assert_eq!(m.match_path("/a/bc"), None);
    }
}
