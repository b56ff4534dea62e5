// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use tracing::{Level, event};

use crate::{Deadline, NativeHandle, Result, pal};

/// An acquired byte-range lock, released when the guard is dropped.
///
/// The guard borrows the handle it was acquired through, so the lock can never outlive
/// the handle. Dropping the guard releases the range; if the native release fails the
/// process is aborted, because continuing with an extent lock in an unknown state would
/// invite silent data corruption in every cooperating process. Use
/// [`release`][Self::release] to observe the release outcome instead.
#[derive(Debug)]
#[must_use = "the locked range is released as soon as the guard is dropped"]
pub struct ExtentGuard<'handle> {
    native: &'handle NativeHandle,
    offset: u64,
    bytes: u64,
    held: bool,
}

impl<'handle> ExtentGuard<'handle> {
    /// Acquires the lock, waiting under `deadline` while the range is held elsewhere.
    pub(crate) fn acquire(
        native: &'handle NativeHandle,
        offset: u64,
        bytes: u64,
        exclusive: bool,
        deadline: Deadline,
    ) -> Result<Self> {
        event!(Level::TRACE, offset, bytes, exclusive, "lock extent");
        let timer = deadline.timer();
        pal::lock_range(native, offset, bytes, exclusive, &timer)?;

        Ok(Self {
            native,
            offset,
            bytes,
            held: true,
        })
    }

    /// The absolute file offset at which the locked range begins.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The length of the locked range in bytes. Zero means "to the end of the
    /// representable range".
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Releases the lock, reporting the native outcome.
    ///
    /// Unlike dropping the guard, a failed release here surfaces as an error and the
    /// process continues.
    ///
    /// # Errors
    ///
    /// Fails if the native release fails; the range must then be assumed still held.
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        pal::unlock_range(self.native, self.offset, self.bytes)
    }
}

impl Drop for ExtentGuard<'_> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }

        if let Err(error) = pal::unlock_range(self.native, self.offset, self.bytes) {
            // An extent lock in an unknown state cannot be tolerated: other processes
            // would block forever or, worse, proceed against half-protected data.
            event!(
                Level::ERROR,
                offset = self.offset,
                bytes = self.bytes,
                %error,
                "releasing extent lock failed; aborting"
            );
            std::process::abort();
        }
    }
}
