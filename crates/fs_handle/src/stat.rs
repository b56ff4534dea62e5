// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::time::SystemTime;

use bitflags::bitflags;

/// The kind of filesystem object a [`Stat`] record describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link (or, on Windows, another reparse-point-bearing object).
    Symlink,
    /// A block device.
    BlockDevice,
    /// A character device.
    CharDevice,
    /// A named pipe / FIFO.
    Fifo,
    /// A socket.
    Socket,
    /// The platform reported a kind this crate does not model.
    #[default]
    Unknown,
}

bitflags! {
    /// Platform attribute bits of a filesystem object that survive portably.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StatFlags: u32 {
        /// The object has unallocated extents (sparse regions).
        const SPARSE = 1 << 0;
        /// The object is transparently compressed by the filesystem.
        const COMPRESSED = 1 << 1;
        /// The object carries a reparse point (symbolic link, junction, ...).
        const REPARSE_POINT = 1 << 2;
    }
}

/// Structured metadata for a filesystem object.
///
/// Produced by [`Handle::stat`][crate::Handle::stat] and populated for every entry
/// yielded by directory enumeration. Timestamps the platform does not record are `None`
/// (e.g. birth time on filesystems that do not store one).
#[derive(Clone, Debug, Default)]
pub struct Stat {
    /// Identifier of the device holding the object.
    pub device: u64,
    /// The object's inode / file id on its device. Stable for the life of the object on
    /// most filesystems, but some platforms may not supply one.
    pub inode: u64,
    /// What kind of object this is.
    pub kind: FileKind,
    /// Number of hard links to the object.
    pub links: u32,
    /// Last access time.
    pub accessed: Option<SystemTime>,
    /// Last content modification time.
    pub modified: Option<SystemTime>,
    /// Last status (metadata) change time.
    pub changed: Option<SystemTime>,
    /// Creation time, where the filesystem records one.
    pub created: Option<SystemTime>,
    /// Size of the object's content in bytes.
    pub size: u64,
    /// Bytes of storage actually allocated for the object.
    pub allocated: u64,
    /// Portable attribute bits.
    pub flags: StatFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let stat = Stat::default();
        assert_eq!(stat.kind, FileKind::Unknown);
        assert_eq!(stat.flags, StatFlags::empty());
        assert!(stat.created.is_none());
    }
}
