// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{Level, event};

use crate::handle::{Handle, ensure_deadline};
use crate::pal::{LinkSite, OpenKind, OpenSpec};
use crate::path::PathHandle;
use crate::{
    Caching, Creation, Deadline, Error, HandleFlags, OpenMode, Result, Stat, pal,
};

/// The flavor of link a [`SymlinkTarget`] carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkKind {
    /// Not a link. Targets of this kind cannot be written.
    #[default]
    None,
    /// An ordinary symbolic link.
    Symbolic,
    /// An NTFS directory junction. Reported on Windows only; writing one elsewhere
    /// fails with [`Error::NotSupported`][crate::Error::NotSupported].
    Junction,
    /// A link owned by the Windows Subsystem for Linux. Its payload format belongs to
    /// that subsystem, so this crate refuses to read or write it.
    Wsl,
}

/// The decoded target of a link: its kind, the path it points at, and whether that path
/// is relative to the link's parent directory.
#[derive(Clone, Debug)]
pub struct SymlinkTarget {
    kind: SymlinkKind,
    path: PathBuf,
    relative: bool,
}

impl SymlinkTarget {
    pub(crate) fn new(kind: SymlinkKind, path: PathBuf, relative: bool) -> Self {
        Self {
            kind,
            path,
            relative,
        }
    }

    /// A writable target: an ordinary symbolic link pointing at `path`.
    #[must_use]
    pub fn symbolic(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let relative = path.is_relative();
        Self::new(SymlinkKind::Symbolic, path, relative)
    }

    /// A writable target: an NTFS directory junction pointing at `path`. Junction
    /// targets are always absolute.
    #[must_use]
    pub fn junction(path: impl Into<PathBuf>) -> Self {
        Self::new(SymlinkKind::Junction, path.into(), false)
    }

    /// The flavor of link this target describes.
    #[must_use]
    pub fn kind(&self) -> SymlinkKind {
        self.kind
    }

    /// The path the link points at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path is resolved relative to the link's parent directory.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        self.relative
    }
}

/// The reusable state of link-target reads: the native payload buffer, grown as needed
/// and kept across calls so repeated reads settle into zero allocation.
#[derive(Debug, Default)]
pub struct SymlinkRequest {
    buffer: Vec<u8>,
}

impl SymlinkRequest {
    /// A request with no buffer yet; the first read sizes it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A handle to a symbolic link itself, as opposed to whatever the link points at.
///
/// Opening the link object requires suppressing the path resolver's own link-following,
/// which is exactly what this type does. The link's parent directory is pinned alongside
/// it, both so that target rewrites can be performed atomically beside the link and so
/// that reads observe the link currently at the name rather than a replaced predecessor.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct SymlinkHandle {
    inner: Handle,
    parent: Option<PathHandle>,
    leaf: Option<OsString>,
}

impl SymlinkHandle {
    /// Opens (or creates, per `creation`) the link object at `path`, resolved relative
    /// to `base` when given.
    ///
    /// A link created here points at its own directory until a real target is
    /// [written][Self::write].
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] for [`OpenMode::Append`] and
    /// [`Creation::Truncate`], which are meaningless for links, or if the native open
    /// fails.
    pub fn open(
        base: Option<&PathHandle>,
        path: &Path,
        mode: OpenMode,
        creation: Creation,
    ) -> Result<Self> {
        event!(Level::TRACE, path = ?path, ?mode, ?creation, "open symlink");
        if mode == OpenMode::Append {
            return Err(Error::InvalidArgument("cannot append to a symbolic link"));
        }
        if creation == Creation::Truncate {
            return Err(Error::InvalidArgument("cannot truncate a symbolic link"));
        }

        let spec = OpenSpec {
            kind: OpenKind::Symlink,
            mode,
            creation,
            caching: Caching::All,
            flags: HandleFlags::empty(),
        };
        let native = pal::open(base.map(PathHandle::native), path, &spec)?;
        let inner = Handle::new(native, HandleFlags::empty());

        // Pin the parent directory next to the link. Target rewrites and fresh reads
        // both go through it, so a handle opened before a rewrite still observes the
        // link currently at the name.
        let leaf = path.file_name().map(OsString::from);
        let parent = if leaf.is_some() {
            Self::pin_parent(base, path)?
        } else {
            None
        };

        Ok(Self {
            inner,
            parent,
            leaf,
        })
    }

    fn pin_parent(base: Option<&PathHandle>, path: &Path) -> Result<Option<PathHandle>> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        match (base, parent) {
            (_, Some(parent)) => Ok(Some(PathHandle::open(base, parent)?)),
            (Some(base), None) => Ok(Some(base.as_handle().to_path_handle()?)),
            (None, None) => Ok(Some(PathHandle::open(None, Path::new("."))?)),
        }
    }

    /// The capability core of this handle: metadata, identity, duplication and
    /// namespace operations.
    #[must_use]
    pub fn as_handle(&self) -> &Handle {
        &self.inner
    }

    /// Fetches fresh metadata for the link object itself.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn stat(&self) -> Result<Stat> {
        self.inner.stat()
    }

    fn site(&self) -> LinkSite<'_> {
        LinkSite {
            handle: self.inner.native(),
            parent: self.parent.as_ref().map(PathHandle::native),
            leaf: self.leaf.as_deref(),
        }
    }

    /// Reads the link's current target.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ProtocolNotSupported`] when the link's payload belongs to a
    /// foreign subsystem ([`SymlinkKind::Wsl`], for example), or if the native read
    /// fails.
    pub fn read(&self) -> Result<SymlinkTarget> {
        let mut request = SymlinkRequest::new();
        self.read_with(&mut request)
    }

    /// Reads the link's current target, reusing the request's buffer.
    ///
    /// # Errors
    ///
    /// The same failures as [`read`][Self::read].
    pub fn read_with(&self, request: &mut SymlinkRequest) -> Result<SymlinkTarget> {
        event!(Level::TRACE, "read symlink");
        pal::read_link(self.site(), &mut request.buffer)
    }

    /// Atomically replaces the link's target.
    ///
    /// A concurrent resolver of the link's name sees either the old target or the new
    /// one, never a missing link.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] for a [`SymlinkKind::None`] target, with
    /// [`Error::NotSupported`] or [`Error::ProtocolNotSupported`] for target kinds the
    /// platform cannot express, or if the native rewrite fails.
    pub fn write(&self, target: &SymlinkTarget, deadline: Deadline) -> Result<()> {
        event!(Level::TRACE, target = ?target.path(), "write symlink");
        ensure_deadline(self.inner.native(), deadline)?;
        let timer = deadline.timer();
        pal::write_link(self.site(), target, &timer)
    }
}

impl Default for SymlinkTarget {
    fn default() -> Self {
        Self::new(SymlinkKind::None, PathBuf::new(), false)
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(SymlinkHandle: Send, Sync);
        assert_impl_all!(SymlinkTarget: Send, Sync);
    }

    #[test]
    fn symbolic_target_infers_relativity() {
        assert!(SymlinkTarget::symbolic("sibling").is_relative());
        let absolute = if cfg!(windows) { r"C:\tmp" } else { "/tmp" };
        assert!(!SymlinkTarget::symbolic(absolute).is_relative());
    }

    #[test]
    fn default_target_kind_is_unwritable() {
        assert_eq!(SymlinkTarget::default().kind(), SymlinkKind::None);
    }
}
