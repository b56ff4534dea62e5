// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

use tracing::{Level, event};

use crate::handle::{Handle, ensure_deadline};
use crate::lock::ExtentGuard;
use crate::pal::{OpenKind, OpenSpec};
use crate::path::PathHandle;
use crate::{
    Behaviour, Caching, Creation, Deadline, Error, HandleFlags, OpenMode, ReadRequest, Result,
    Stat, TransferSizes, WriteRequest, pal,
};

/// A handle to a regular file, supporting deadline-bounded scatter/gather data I/O and
/// byte-range locking.
///
/// All I/O is positional: every request names its own absolute offset and the handle
/// keeps no file-pointer state, so one handle may serve concurrent requests from many
/// threads without coordination.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct FileHandle {
    inner: Handle,
}

impl FileHandle {
    /// Opens (or creates, per `creation`) the file at `path`, resolved relative to
    /// `base` when given.
    ///
    /// # Errors
    ///
    /// Fails if the creation disposition is not satisfiable (for example
    /// [`Creation::OnlyIfNotExist`] on an existing file) or the native open fails.
    pub fn open(
        base: Option<&PathHandle>,
        path: &Path,
        mode: OpenMode,
        creation: Creation,
        caching: Caching,
        flags: HandleFlags,
    ) -> Result<Self> {
        event!(Level::TRACE, path = ?path, ?mode, ?creation, ?caching, "open file");
        let spec = OpenSpec {
            kind: OpenKind::File,
            mode,
            creation,
            caching,
            flags,
        };
        let native = pal::open(base.map(PathHandle::native), path, &spec)?;
        Ok(Self {
            inner: Handle::new(native, flags),
        })
    }

    /// The capability core of this handle: metadata, identity, duplication and
    /// namespace operations.
    #[must_use]
    pub fn as_handle(&self) -> &Handle {
        &self.inner
    }

    /// The behavioral facts established when this handle was opened.
    #[must_use]
    pub fn behaviour(&self) -> Behaviour {
        self.inner.behaviour()
    }

    /// Fetches fresh metadata for the file.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn stat(&self) -> Result<Stat> {
        self.inner.stat()
    }

    /// Best-effort reverse lookup of the file's current path.
    ///
    /// # Errors
    ///
    /// Fails if the file has been unlinked or the native lookup fails.
    pub fn current_path(&self) -> Result<PathBuf> {
        self.inner.current_path()
    }

    /// Reads the request's spans from consecutive extents of the file starting at the
    /// request's offset.
    ///
    /// Returns the bytes transferred into each span, in request order. A transfer
    /// shorter than a span means end-of-file was reached; spans past that point report
    /// zero bytes. Completion of a span is all-or-nothing per span, never partial
    /// interleaving.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ArgumentListTooLong`] when the request exceeds
    /// [`MAX_SPANS`][crate::MAX_SPANS], with [`Error::NotSupported`] when the deadline
    /// is finite on a handle that cannot wait with a timeout or the handle is not
    /// readable, with [`Error::InvalidArgument`] when an unbuffered handle's request is
    /// not sector-aligned, and with [`Error::TimedOut`] when the deadline elapses.
    pub fn read(
        &self,
        mut request: ReadRequest<'_, '_>,
        deadline: Deadline,
    ) -> Result<TransferSizes> {
        event!(Level::TRACE, offset = request.offset(), "read");
        request.validate()?;
        ensure_deadline(self.inner.native(), deadline)?;
        if !self.behaviour().contains(Behaviour::READABLE) {
            return Err(Error::NotSupported);
        }
        self.validate_alignment(
            request.offset(),
            request.spans().iter().map(|span| (span.as_ptr() as usize, span.len())),
        )?;

        let timer = deadline.timer();
        let offset = request.offset();
        pal::read_spans(self.inner.native(), offset, request.spans(), &timer)
    }

    /// Writes the request's spans to consecutive extents of the file starting at the
    /// request's offset.
    ///
    /// On an append-only handle the offset is ignored and every span lands at the
    /// file's end. Returns the bytes transferred from each span, in request order.
    ///
    /// # Errors
    ///
    /// The same failures as [`read`][Self::read], with writability in place of
    /// readability.
    pub fn write(&self, request: WriteRequest<'_, '_>, deadline: Deadline) -> Result<TransferSizes> {
        event!(Level::TRACE, offset = request.offset(), "write");
        request.validate()?;
        ensure_deadline(self.inner.native(), deadline)?;
        if !self.behaviour().contains(Behaviour::WRITABLE) {
            return Err(Error::NotSupported);
        }
        self.validate_alignment(
            request.offset(),
            request.spans().iter().map(|span| (span.as_ptr() as usize, span.len())),
        )?;

        let timer = deadline.timer();
        pal::write_spans(self.inner.native(), request.offset(), request.spans(), &timer)
    }

    /// Acquires a byte-range lock over `bytes` bytes starting at `offset`, waiting
    /// under `deadline` while any conflicting lock is held.
    ///
    /// A `bytes` of zero locks to the end of the representable range. Locks are
    /// advisory between cooperating users of this interface; exclusive locks conflict
    /// with every other lock on an overlapping range, shared locks only with exclusive
    /// ones. The returned guard releases the range when dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TimedOut`] when a conflicting lock is still held at expiry
    /// (immediately, for [`Deadline::Zero`]).
    pub fn lock(
        &self,
        offset: u64,
        bytes: u64,
        exclusive: bool,
        deadline: Deadline,
    ) -> Result<ExtentGuard<'_>> {
        ExtentGuard::acquire(self.inner.native(), offset, bytes, exclusive, deadline)
    }

    /// The current length of the file's content in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn maximum_extent(&self) -> Result<u64> {
        pal::maximum_extent(self.inner.native())
    }

    /// Sets the length of the file's content, extending with zeros or truncating as
    /// needed, and returns the new length.
    ///
    /// # Errors
    ///
    /// Fails if the handle is not writable or the native resize fails.
    pub fn truncate(&self, new_len: u64) -> Result<u64> {
        event!(Level::TRACE, new_len, "truncate");
        if !self.behaviour().contains(Behaviour::WRITABLE) {
            return Err(Error::NotSupported);
        }

        pal::truncate(self.inner.native(), new_len)
    }

    /// Flushes buffered data to storage. With `data_only` set, metadata that is not
    /// needed to read the flushed data back (timestamps, for example) may be skipped
    /// where the platform distinguishes the two.
    ///
    /// # Errors
    ///
    /// Fails if the native flush fails.
    pub fn flush(&self, data_only: bool) -> Result<()> {
        pal::flush(self.inner.native(), data_only)
    }

    /// The logical sector size unbuffered I/O through this handle must align to.
    #[must_use]
    pub fn logical_sector_size(&self) -> usize {
        pal::logical_sector_size(self.inner.native())
    }

    /// Unbuffered handles require every offset, span address and span length to be
    /// sector-aligned. This is validated identically in every build; native layers
    /// fail such requests inconsistently and sometimes only intermittently.
    fn validate_alignment(
        &self,
        offset: u64,
        spans: impl Iterator<Item = (usize, usize)>,
    ) -> Result<()> {
        if !self.behaviour().contains(Behaviour::ALIGNED_IO) {
            return Ok(());
        }

        let sector = self.logical_sector_size() as u64;
        if offset % sector != 0 {
            return Err(Error::InvalidArgument("offset not sector-aligned"));
        }
        for (address, len) in spans {
            if address as u64 % sector != 0 {
                return Err(Error::InvalidArgument("span address not sector-aligned"));
            }
            if len as u64 % sector != 0 {
                return Err(Error::InvalidArgument("span length not sector-aligned"));
            }
        }

        Ok(())
    }
}
