// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Mount permissions and device write modes.

use bitflags::bitflags;

bitflags! {
    /// Operations a mount grants on its subtree.
    ///
    /// A mount never grants more than its backing device supports; the
    /// supported set is derived from the device driver's capabilities at
    /// mount creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MountPermissions: u32 {
        const READ = 0x01;
        const WRITE_FILE = 0x02;
        const DELETE_FILE = 0x04;
        const CREATE_DIR = 0x08;
        const DELETE_DIR = 0x10;
    }
}

/// How a device should position and truncate on a file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole file with the payload.
    Truncate,
    /// Write the payload after the existing content.
    Append,
    /// Overwrite in place starting at the request offset.
    Segment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bits_are_distinct() {
        let all = MountPermissions::all();
        assert_eq!(all.bits(), 0x1f);
        assert!(all.contains(MountPermissions::READ | MountPermissions::DELETE_DIR));
    }

    #[test]
    fn test_subset_check() {
        let supported = MountPermissions::READ | MountPermissions::WRITE_FILE;
        assert!(supported.contains(MountPermissions::READ));
        assert!(!supported.contains(MountPermissions::DELETE_FILE));
    }
}
