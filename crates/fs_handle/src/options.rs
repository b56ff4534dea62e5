// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use bitflags::bitflags;

/// The access requested when opening a handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// No data access; the handle can only be closed or used as identity.
    None,
    /// Metadata may be read, data may not.
    AttrRead,
    /// Metadata may be read and written, data may not.
    AttrWrite,
    /// Data and metadata may be read.
    #[default]
    Read,
    /// Data and metadata may be read and written.
    Write,
    /// Data may only be appended; every write lands at end-of-file.
    Append,
}

impl OpenMode {
    /// Whether this mode permits reading data.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }

    /// Whether this mode permits writing data.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}

/// What to do about (non-)existence of the target when opening a handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Creation {
    /// Open the object; fail if it does not exist.
    #[default]
    OpenExisting,
    /// Create the object; fail if it already exists.
    OnlyIfNotExist,
    /// Open the object, creating it first if it does not exist.
    IfNeeded,
    /// Open the object and discard its content; fail if it does not exist.
    ///
    /// Categorically invalid for directories, which report
    /// [`Error::IsADirectory`][crate::Error::IsADirectory].
    Truncate,
    /// Create the object, replacing whatever was at the path before.
    AlwaysNew,
}

/// How aggressively the operating system may cache I/O through the handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Caching {
    /// Bypass the OS cache entirely (direct I/O). Offsets and buffers must then be
    /// aligned to the device's logical sector size.
    None,
    /// Cache reads only; writes reach storage before completion is reported.
    Reads,
    /// Cache reads and writes (the platform default).
    #[default]
    All,
    /// The object is expected to be short-lived; the OS may avoid writing it to storage
    /// at all.
    Temporary,
}

impl Caching {
    /// Whether this caching mode requires sector-aligned I/O.
    #[must_use]
    pub fn requires_aligned_io(&self) -> bool {
        matches!(self, Self::None)
    }
}

bitflags! {
    /// Additional per-handle open flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HandleFlags: u32 {
        /// Best-effort unlink of the object when the handle is dropped.
        const UNLINK_ON_FIRST_CLOSE = 1 << 0;
    }
}
