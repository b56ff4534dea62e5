// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use bitflags::bitflags;
use tracing::{Level, event};

/// The raw operating system resource identifier: a file descriptor on POSIX.
#[cfg(unix)]
pub type RawNativeHandle = std::os::fd::RawFd;

/// The raw operating system resource identifier: the integer value of a `HANDLE`.
#[cfg(windows)]
pub type RawNativeHandle = isize;

bitflags! {
    /// Behavioral facts about an open native handle.
    ///
    /// These are established when the handle is opened and never change afterwards. The
    /// native I/O layer consults them to pick an execution strategy (e.g. whether
    /// operations may be issued overlapped) and to validate requests (e.g. whether a
    /// finite deadline is meaningful for this handle).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Behaviour: u32 {
        /// Reads are permitted.
        const READABLE = 1 << 0;
        /// Writes are permitted.
        const WRITABLE = 1 << 1;
        /// The handle has a concept of file offset.
        const SEEKABLE = 1 << 2;
        /// Native operations can be issued without blocking and waited on with a timeout.
        const OVERLAPPED = 1 << 3;
        /// Every write lands at end-of-file regardless of the requested offset.
        const APPEND_ONLY = 1 << 4;
        /// Offsets and buffer addresses/lengths must be aligned to the device's logical
        /// sector size (uncached/direct modes).
        const ALIGNED_IO = 1 << 5;
        /// The handle refers to a directory.
        const DIRECTORY = 1 << 6;
        /// The handle refers to a symbolic link or other reparse-point-bearing object.
        const SYMLINK = 1 << 7;
        /// The handle retains only identity, usable as a relative-open root but not for I/O.
        const PATH_ONLY = 1 << 8;
        /// Native operations fail with a would-block classification instead of waiting.
        /// Never set for filesystem objects on the supported platforms; reserved for
        /// handle kinds whose native resources support it.
        const NON_BLOCKING = 1 << 9;
    }
}

/// An owned operating system resource identifier plus the behavioral facts established
/// at open time.
///
/// A valid `NativeHandle` owns its resource exclusively until it is explicitly cloned
/// (which duplicates the resource) or dropped (which releases it exactly once).
#[derive(Debug)]
pub struct NativeHandle {
    raw: RawNativeHandle,
    behaviour: Behaviour,
}

impl NativeHandle {
    /// Takes ownership of an already-open native resource.
    pub(crate) fn new(raw: RawNativeHandle, behaviour: Behaviour) -> Self {
        Self { raw, behaviour }
    }

    /// The raw resource identifier. The handle retains ownership; the caller must not
    /// close it.
    #[must_use]
    pub fn raw(&self) -> RawNativeHandle {
        self.raw
    }

    /// The behavioral facts established when the handle was opened.
    #[must_use]
    pub fn behaviour(&self) -> Behaviour {
        self.behaviour
    }

    /// Whether this handle refers to a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.behaviour.contains(Behaviour::DIRECTORY)
    }

    /// Whether this handle refers to a symbolic link.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.behaviour.contains(Behaviour::SYMLINK)
    }

    /// Whether native operations on this handle can be issued overlapped and waited on
    /// with a timeout.
    #[must_use]
    pub fn is_overlapped(&self) -> bool {
        self.behaviour.contains(Behaviour::OVERLAPPED)
    }

    /// Whether every write through this handle lands at end-of-file.
    #[must_use]
    pub fn is_append_only(&self) -> bool {
        self.behaviour.contains(Behaviour::APPEND_ONLY)
    }

    /// Releases ownership of the raw identifier without closing it.
    ///
    /// Used when the resource is handed to a native call that consumes it.
    pub(crate) fn into_raw(self) -> RawNativeHandle {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        // We ignore the error because there is not much we can do about it; the resource
        // identifier must be considered released either way.
        if let Err(error) = crate::pal::close(self.raw) {
            event!(Level::ERROR, handle = self.raw, %error, "closing native handle failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(NativeHandle: Send, Sync);
    }

    #[test]
    fn behaviour_predicates() {
        let behaviour = Behaviour::READABLE | Behaviour::DIRECTORY;
        assert!(behaviour.contains(Behaviour::DIRECTORY));
        assert!(!behaviour.contains(Behaviour::OVERLAPPED));
    }
}
