// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

//! Low-level typed filesystem handles with deadline-bounded I/O.
//!
//! This crate provides a filesystem API that differs from [`std::fs`] in three key ways:
//!
//! 1. **Typed handles.** A regular file, a directory, a symbolic link and a pure
//!    identity anchor are four different types ([`FileHandle`], [`DirectoryHandle`],
//!    [`SymlinkHandle`], [`PathHandle`]), each exposing only the operations that are
//!    meaningful for it. Categorical misuse (truncating a directory, appending to a
//!    link) is rejected before any native call is issued.
//!
//! 2. **Race-free relative opens.** Every open accepts an optional [`PathHandle`] base
//!    that pins a directory's identity, so lookups resolve against the object itself
//!    and are immune to concurrent renames of ancestor directories. Handles survive
//!    their object being renamed or even unlinked.
//!
//! 3. **Deadline-bounded operations.** Every potentially blocking operation accepts a
//!    [`Deadline`]: infinite, zero (try once, never wait), or a finite time bound.
//!    Scatter/gather requests carry up to [`MAX_SPANS`] spans and respect the deadline
//!    across all of their native sub-operations.
//!
//! # Quick start
//!
//! ```no_run
//! # fn example() -> fs_handle::Result<()> {
//! use std::path::Path;
//!
//! use fs_handle::{
//!     Caching, Creation, Deadline, FileHandle, HandleFlags, OpenMode, WriteRequest,
//! };
//!
//! let file = FileHandle::open(
//!     None,
//!     Path::new("journal.dat"),
//!     OpenMode::Write,
//!     Creation::IfNeeded,
//!     Caching::All,
//!     HandleFlags::empty(),
//! )?;
//!
//! // One gather write: both spans land contiguously at offset 0.
//! let spans: [&[u8]; 2] = [b"hello, ", b"world"];
//! file.write(WriteRequest::new(0, &spans), Deadline::Infinite)?;
//! file.flush(true)?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod pal;

mod buffers;
mod deadline;
mod dir;
mod error;
mod file;
mod handle;
mod lock;
mod native_handle;
mod options;
mod path;
mod stat;
mod symlink;

pub use buffers::{MAX_SPANS, ReadRequest, TransferSizes, WriteRequest};
pub use deadline::{Deadline, DeadlineTimer};
pub use dir::{DirectoryEntry, DirectoryHandle, EntryFilter, EnumerateRequest, Enumeration};
pub use error::{Error, Result};
pub use file::FileHandle;
pub use handle::Handle;
pub use lock::ExtentGuard;
pub use native_handle::{Behaviour, NativeHandle, RawNativeHandle};
pub use options::{Caching, Creation, HandleFlags, OpenMode};
pub use path::PathHandle;
pub use stat::{FileKind, Stat, StatFlags};
pub use symlink::{SymlinkHandle, SymlinkKind, SymlinkRequest, SymlinkTarget};
