// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

use crate::handle::Handle;
use crate::pal::{OpenKind, OpenSpec};
use crate::{Caching, Creation, HandleFlags, NativeHandle, OpenMode, Result, Stat, pal};

/// An identity-only handle to a filesystem object.
///
/// A `PathHandle` carries no data-access rights at all; its sole purpose is to pin an
/// object's identity so that later opens can be resolved relative to it, immune to
/// concurrent renames of any ancestor directory. Every `open` in this crate accepts an
/// optional `PathHandle` base for exactly this reason.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct PathHandle {
    inner: Handle,
}

impl PathHandle {
    /// Opens an identity-only handle to the object at `path`, resolved relative to
    /// `base` when given.
    ///
    /// # Errors
    ///
    /// Fails if the object does not exist or the native open fails.
    pub fn open(base: Option<&PathHandle>, path: &Path) -> Result<Self> {
        let spec = OpenSpec {
            kind: OpenKind::Path,
            mode: OpenMode::None,
            creation: Creation::OpenExisting,
            caching: Caching::All,
            flags: HandleFlags::empty(),
        };
        let native = pal::open(base.map(Self::native), path, &spec)?;
        Ok(Self {
            inner: Handle::new(native, HandleFlags::empty()),
        })
    }

    pub(crate) fn from_handle(inner: Handle) -> Self {
        Self { inner }
    }

    pub(crate) fn native(&self) -> &NativeHandle {
        self.inner.native()
    }

    /// The capability core of this handle.
    #[must_use]
    pub fn as_handle(&self) -> &Handle {
        &self.inner
    }

    /// Fetches fresh metadata for the pinned object.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn stat(&self) -> Result<Stat> {
        self.inner.stat()
    }

    /// Best-effort reverse lookup of the pinned object's current path.
    ///
    /// # Errors
    ///
    /// Fails if the object has been unlinked or the native lookup fails.
    pub fn current_path(&self) -> Result<PathBuf> {
        self.inner.current_path()
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(PathHandle: Send, Sync);
    }
}
