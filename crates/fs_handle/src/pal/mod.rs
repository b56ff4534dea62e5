// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

//! The platform abstraction layer: the native I/O execution layer of the crate.
//!
//! Each target family implements the same function surface; upper layers contain no
//! platform conditionals beyond what the data model itself requires. The surface
//! translates portable requests into native system calls, manages the native buffers
//! those calls require, and maps native status codes into the crate's error taxonomy.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::*;

use std::collections::VecDeque;
use std::ffi::OsStr;

use crate::dir::{DirectoryEntry, EntryFilter};
use crate::{Caching, Creation, Error, HandleFlags, NativeHandle, OpenMode, Result};

/// Which family of filesystem object an open request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpenKind {
    /// A regular file, opened for data I/O.
    File,
    /// A directory, opened for enumeration and as a relative-open root.
    Directory,
    /// A symbolic link itself (not its target).
    Symlink,
    /// Identity only: usable as a relative-open root, not for I/O.
    Path,
}

/// The fully resolved shape of an open request handed to the native layer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OpenSpec {
    pub kind: OpenKind,
    pub mode: OpenMode,
    pub creation: Creation,
    pub caching: Caching,
    pub flags: HandleFlags,
}

/// The working state of one directory enumeration call, borrowed from the caller's
/// request object so that buffers survive across continuation calls.
#[derive(Debug)]
pub(crate) struct EnumContext<'a> {
    /// Which entries to admit.
    pub filter: &'a EntryFilter,
    /// How many entries the caller can accept in this call.
    pub slots: usize,
    /// The growable native record buffer, reused across calls.
    pub buffer: &'a mut Vec<u8>,
    /// Entries already fetched from the native cursor but not yet handed to the caller.
    /// Used on platforms whose native enumeration cannot rewind mid-batch.
    pub pending: &'a mut VecDeque<DirectoryEntry>,
}

/// Where a symbolic link lives, as needed by the native link calls.
///
/// The handle always refers to the link object itself. The parent directory handle and
/// leaf name are recorded at open time on platforms whose native link-rewrite primitive
/// is "create a replacement beside the old link and rename it into place".
#[derive(Clone, Copy, Debug)]
pub(crate) struct LinkSite<'a> {
    pub handle: &'a NativeHandle,
    pub parent: Option<&'a NativeHandle>,
    pub leaf: Option<&'a OsStr>,
}

/// One round of a native call that may report "insufficient buffer".
///
/// The calls that enumerate directories or fetch link targets fill a caller-growable
/// native buffer. Each attempt either completes or asks for the buffer to be regrown;
/// the looping is done by the visible operation, not hidden inside the call.
pub(crate) enum Attempt<T> {
    /// The native call completed with this outcome.
    Done(T),
    /// The buffer was too small; regrow it and try again.
    Grow,
}

/// Discards `buffer` and reallocates it at double its previous size (or `initial` bytes
/// when it has no storage yet). Buffers are never shrunk.
pub(crate) fn grow_buffer(buffer: &mut Vec<u8>, initial: usize) -> Result<()> {
    let new_len = if buffer.is_empty() {
        initial.max(1)
    } else {
        buffer
            .len()
            .checked_mul(2)
            .ok_or(Error::NotEnoughMemory)?
    };

    let mut grown = Vec::new();
    grown
        .try_reserve_exact(new_len)
        .map_err(|_| Error::NotEnoughMemory)?;
    grown.resize(new_len, 0);

    *buffer = grown;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_growth_uses_the_initial_estimate() {
        let mut buffer = Vec::new();
        grow_buffer(&mut buffer, 4096).expect("allocation of 4 KB must succeed");
        assert_eq!(buffer.len(), 4096);
    }

    #[test]
    fn subsequent_growth_doubles() {
        let mut buffer = vec![0_u8; 512];
        grow_buffer(&mut buffer, 4096).expect("allocation of 1 KB must succeed");
        assert_eq!(buffer.len(), 1024);
        grow_buffer(&mut buffer, 4096).expect("allocation of 2 KB must succeed");
        assert_eq!(buffer.len(), 2048);
    }
}
