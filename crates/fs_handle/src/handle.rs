// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

use tracing::{Level, event};

use crate::path::PathHandle;
use crate::{
    Behaviour, Caching, Deadline, Error, HandleFlags, NativeHandle, OpenMode, Result, Stat, pal,
};

/// The capability core shared by every typed handle in this crate.
///
/// A `Handle` owns exactly one native resource. The operations here are the ones that
/// make sense for every kind of filesystem object: metadata, identity, duplication and
/// namespace manipulation. Data I/O and enumeration live on the typed wrappers.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct Handle {
    native: NativeHandle,
    flags: HandleFlags,
}

impl Handle {
    pub(crate) fn new(native: NativeHandle, flags: HandleFlags) -> Self {
        Self { native, flags }
    }

    /// The behavioral facts established when this handle was opened.
    #[must_use]
    pub fn behaviour(&self) -> Behaviour {
        self.native.behaviour()
    }

    /// The flags this handle was opened with.
    #[must_use]
    pub fn flags(&self) -> HandleFlags {
        self.flags
    }

    /// The owned native resource backing this handle.
    #[must_use]
    pub fn native(&self) -> &NativeHandle {
        &self.native
    }

    /// Fetches fresh metadata for the object this handle refers to.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn stat(&self) -> Result<Stat> {
        pal::stat_handle(&self.native)
    }

    /// Best-effort reverse lookup of the path this handle's object currently has.
    ///
    /// The result is advisory: the object may be renamed or unlinked by other parties at
    /// any moment, so the path may be stale by the time it is used. An unlinked object
    /// reports a not-found classified [`Error::Native`].
    ///
    /// # Errors
    ///
    /// Fails if the object has been unlinked or the native lookup fails.
    pub fn current_path(&self) -> Result<PathBuf> {
        pal::current_path(&self.native)
    }

    /// Duplicates this handle. The clone refers to the same underlying object with the
    /// same access, and has a fully independent lifetime.
    ///
    /// # Errors
    ///
    /// Fails if the native duplication fails.
    pub fn try_clone(&self) -> Result<Self> {
        let native = pal::clone_handle(&self.native, None, self.native.behaviour())?;
        Ok(Self::new(native, HandleFlags::empty()))
    }

    /// Re-opens this handle's object with different access and caching.
    ///
    /// # Errors
    ///
    /// Fails if the requested access cannot be granted for the object.
    pub fn reopen(&self, mode: OpenMode, caching: Caching) -> Result<Self> {
        let mut behaviour = self.native.behaviour()
            & (Behaviour::SEEKABLE | Behaviour::OVERLAPPED | Behaviour::DIRECTORY);
        if mode.is_readable() {
            behaviour |= Behaviour::READABLE;
        }
        if mode.is_writable() {
            behaviour |= Behaviour::WRITABLE;
        }
        if mode == OpenMode::Append {
            behaviour |= Behaviour::APPEND_ONLY;
        }
        if caching.requires_aligned_io() {
            behaviour |= Behaviour::ALIGNED_IO;
        }

        let native = pal::clone_handle(&self.native, Some((mode, caching)), behaviour)?;
        Ok(Self::new(native, HandleFlags::empty()))
    }

    /// Produces an identity-only handle to the same object, usable as the base of
    /// relative opens but not for I/O.
    ///
    /// # Errors
    ///
    /// Fails if the native re-open fails.
    pub fn to_path_handle(&self) -> Result<PathHandle> {
        let native = pal::to_path_handle(&self.native)?;
        Ok(PathHandle::from_handle(Self::new(native, HandleFlags::empty())))
    }

    /// Atomically renames the object this handle refers to.
    ///
    /// `new_path` is resolved relative to `base` when given, otherwise against the
    /// process working directory. With `replace_existing` unset, an object already at
    /// the destination fails the operation instead of being replaced.
    ///
    /// # Errors
    ///
    /// Fails if the rename is rejected natively, the destination exists while
    /// `replace_existing` is unset, or the deadline is finite on a handle that cannot
    /// wait with a timeout.
    pub fn relink(
        &self,
        base: Option<&PathHandle>,
        new_path: &Path,
        replace_existing: bool,
        deadline: Deadline,
    ) -> Result<()> {
        event!(Level::TRACE, path = ?new_path, replace_existing, "relink");
        ensure_deadline(&self.native, deadline)?;
        let timer = deadline.timer();
        pal::relink(
            &self.native,
            base.map(PathHandle::native),
            new_path,
            replace_existing,
            &timer,
        )
    }

    /// Removes the object this handle refers to from the filesystem namespace.
    ///
    /// The handle stays open and fully usable afterwards; the object's storage is
    /// reclaimed once the last handle to it closes.
    ///
    /// # Errors
    ///
    /// Fails if the native removal is rejected or the deadline is finite on a handle
    /// that cannot wait with a timeout.
    pub fn unlink(&self, deadline: Deadline) -> Result<()> {
        event!(Level::TRACE, "unlink");
        ensure_deadline(&self.native, deadline)?;
        let timer = deadline.timer();
        pal::unlink(&self.native, &timer)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.flags.contains(HandleFlags::UNLINK_ON_FIRST_CLOSE) {
            // Best effort: the object may already be gone.
            let timer = Deadline::Infinite.timer();
            if let Err(error) = pal::unlink(&self.native, &timer) {
                if !error.is_not_found() {
                    event!(Level::ERROR, %error, "unlink on close failed");
                }
            }
        }
    }
}

/// Handles that are not capable of overlapped I/O cannot wait on a native operation
/// with a timeout, so a finite nonzero deadline is rejected up front rather than being
/// silently ignored. Infinite and zero deadlines remain valid everywhere.
pub(crate) fn ensure_deadline(native: &NativeHandle, deadline: Deadline) -> Result<()> {
    if deadline.is_finite() && !native.is_overlapped() {
        return Err(Error::NotSupported);
    }

    Ok(())
}
