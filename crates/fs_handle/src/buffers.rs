// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use crate::{Error, Result};

/// The maximum number of spans a single scatter/gather request may carry.
///
/// Requests with more spans are rejected with [`Error::ArgumentListTooLong`] before any
/// native operation is issued; they are never silently truncated.
pub const MAX_SPANS: usize = 64;

/// The number of bytes actually transferred for each span of a request, in request order.
///
/// Fixed capacity so that per-span bookkeeping never allocates.
pub type TransferSizes = heapless::Vec<usize, MAX_SPANS>;

/// A scatter read request: an ordered sequence of mutable byte spans plus the absolute
/// file offset at which the first span is read.
///
/// Each span consumes the next contiguous extent of the file: span `i` is read at
/// `offset` advanced by the summed lengths of spans `0..i`, regardless of how many bytes
/// earlier spans actually transferred.
#[derive(Debug)]
pub struct ReadRequest<'req, 'data> {
    offset: u64,
    spans: &'req mut [&'data mut [u8]],
}

impl<'req, 'data> ReadRequest<'req, 'data> {
    /// Creates a read request over the given spans starting at `offset`.
    pub fn new(offset: u64, spans: &'req mut [&'data mut [u8]]) -> Self {
        Self { offset, spans }
    }

    /// The absolute file offset of the first span.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The spans to be filled.
    #[must_use]
    pub fn spans(&mut self) -> &mut [&'data mut [u8]] {
        self.spans
    }

    /// Fails with [`Error::ArgumentListTooLong`] if the request exceeds [`MAX_SPANS`].
    pub(crate) fn validate(&self) -> Result<()> {
        validate_span_count(self.spans.len())
    }
}

/// A gather write request: an ordered sequence of immutable byte spans plus the absolute
/// file offset at which the first span is written.
///
/// Offset advancement follows the same rule as [`ReadRequest`]. For append-only handles
/// the offset is ignored and every span is directed at the native end-of-file sentinel.
#[derive(Debug)]
pub struct WriteRequest<'req, 'data> {
    offset: u64,
    spans: &'req [&'data [u8]],
}

impl<'req, 'data> WriteRequest<'req, 'data> {
    /// Creates a write request over the given spans starting at `offset`.
    pub fn new(offset: u64, spans: &'req [&'data [u8]]) -> Self {
        Self { offset, spans }
    }

    /// The absolute file offset of the first span.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The spans to be written.
    #[must_use]
    pub fn spans(&self) -> &[&'data [u8]] {
        self.spans
    }

    /// Fails with [`Error::ArgumentListTooLong`] if the request exceeds [`MAX_SPANS`].
    pub(crate) fn validate(&self) -> Result<()> {
        validate_span_count(self.spans.len())
    }
}

fn validate_span_count(count: usize) -> Result<()> {
    if count > MAX_SPANS {
        return Err(Error::ArgumentListTooLong);
    }

    Ok(())
}
