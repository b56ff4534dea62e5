// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use thiserror::Error;

/// Any error that may arise from the native filesystem operations provided by this crate.
///
/// Every native failure code (`errno` on POSIX, a Win32 error code on Windows) is mapped to
/// one member of this small portable taxonomy. Codes without a portable classification are
/// carried through transparently as [`Error::Native`].
///
/// Transient "buffer too small" conditions reported by the operating system are retried
/// internally by the operations that can encounter them and never surface through this type.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request shape makes no sense, e.g. an unsupported flag combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is categorically inapplicable to a directory, e.g. truncation.
    #[error("is a directory")]
    IsADirectory,

    /// The operation is not supported on this handle kind, e.g. a nonzero deadline on a
    /// handle that is not capable of overlapped I/O.
    #[error("operation not supported on this handle")]
    NotSupported,

    /// The operation is not implemented on this platform.
    #[error("function not supported on this platform")]
    FunctionNotSupported,

    /// A scatter/gather request exceeded the fixed span cap ([`MAX_SPANS`][crate::MAX_SPANS]).
    #[error("too many buffers in scatter/gather request")]
    ArgumentListTooLong,

    /// A native buffer allocation failed.
    #[error("not enough memory for native buffer")]
    NotEnoughMemory,

    /// The deadline elapsed before the operation completed. Also returned when a zero
    /// deadline was supplied and the operation was not immediately ready.
    #[error("deadline expired before completion")]
    TimedOut,

    /// A native record carried a recognized but unhandled protocol tag, e.g. a reparse
    /// point that is neither a symbolic link nor a junction.
    #[error("unsupported native record protocol")]
    ProtocolNotSupported,

    /// An operating system error code with no portable classification, carried through
    /// transparently. The code is `errno` on POSIX and the Win32 error code on Windows.
    #[error("native error code {0}")]
    Native(i32),
}

/// A specialized `Result` for use with native filesystem operations.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Classifies a raw operating system error code into the portable taxonomy.
    ///
    /// The code is `errno` on POSIX and the value of `GetLastError()` on Windows.
    #[must_use]
    pub fn from_os_code(code: i32) -> Self {
        classify_os_code(code)
    }

    /// Classifies the calling thread's most recent operating system error.
    #[must_use]
    pub(crate) fn last_os() -> Self {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        classify_os_code(code)
    }

    /// Whether this error indicates that the target filesystem object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match *self {
            #[cfg(unix)]
            Self::Native(code) => code == libc::ENOENT || code == libc::ENOTDIR,
            #[cfg(windows)]
            Self::Native(code) => {
                code == windows_sys::Win32::Foundation::ERROR_FILE_NOT_FOUND as i32
                    || code == windows_sys::Win32::Foundation::ERROR_PATH_NOT_FOUND as i32
            }
            _ => false,
        }
    }

    /// Whether this error indicates the target already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match *self {
            #[cfg(unix)]
            Self::Native(code) => code == libc::EEXIST,
            #[cfg(windows)]
            Self::Native(code) => {
                code == windows_sys::Win32::Foundation::ERROR_FILE_EXISTS as i32
                    || code == windows_sys::Win32::Foundation::ERROR_ALREADY_EXISTS as i32
            }
            _ => false,
        }
    }
}

#[cfg(unix)]
fn classify_os_code(code: i32) -> Error {
    match code {
        libc::EINVAL => Error::InvalidArgument("rejected by the operating system"),
        libc::EISDIR => Error::IsADirectory,
        libc::ENOTSUP => Error::NotSupported,
        libc::ENOSYS => Error::FunctionNotSupported,
        libc::E2BIG => Error::ArgumentListTooLong,
        libc::ENOMEM => Error::NotEnoughMemory,
        libc::ETIMEDOUT => Error::TimedOut,
        libc::EPROTONOSUPPORT => Error::ProtocolNotSupported,
        other => Error::Native(other),
    }
}

#[cfg(windows)]
fn classify_os_code(code: i32) -> Error {
    use windows_sys::Win32::Foundation::{
        ERROR_DIRECTORY_NOT_SUPPORTED, ERROR_INVALID_PARAMETER, ERROR_NOT_ENOUGH_MEMORY,
        ERROR_NOT_SUPPORTED, ERROR_OUTOFMEMORY, ERROR_TIMEOUT, WAIT_TIMEOUT,
    };

    match code as u32 {
        ERROR_INVALID_PARAMETER => Error::InvalidArgument("rejected by the operating system"),
        ERROR_DIRECTORY_NOT_SUPPORTED => Error::IsADirectory,
        ERROR_NOT_SUPPORTED => Error::NotSupported,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => Error::NotEnoughMemory,
        ERROR_TIMEOUT | WAIT_TIMEOUT => Error::TimedOut,
        _ => Error::Native(code),
    }
}

/// Represents a native filesystem error as a standard I/O error.
/// This is often used when interoperating with libraries that expect standard I/O errors.
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Native(code) => Self::from_raw_os_error(code),
            Error::TimedOut => Self::new(std::io::ErrorKind::TimedOut, value),
            Error::NotSupported | Error::FunctionNotSupported => {
                Self::new(std::io::ErrorKind::Unsupported, value)
            }
            Error::InvalidArgument(_) | Error::ArgumentListTooLong => {
                Self::new(std::io::ErrorKind::InvalidInput, value)
            }
            Error::NotEnoughMemory => Self::new(std::io::ErrorKind::OutOfMemory, value),
            _ => Self::other(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[cfg(unix)]
    #[test]
    fn classifies_portable_codes() {
        assert!(matches!(Error::from_os_code(libc::EISDIR), Error::IsADirectory));
        assert!(matches!(Error::from_os_code(libc::ENOMEM), Error::NotEnoughMemory));
        assert!(matches!(Error::from_os_code(libc::ETIMEDOUT), Error::TimedOut));
        assert!(matches!(Error::from_os_code(libc::ENOSYS), Error::FunctionNotSupported));
    }

    #[cfg(unix)]
    #[test]
    fn passes_through_unclassified_codes() {
        match Error::from_os_code(libc::ENOENT) {
            Error::Native(code) => assert_eq!(code, libc::ENOENT),
            other => panic!("unexpected classification: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn not_found_predicate() {
        assert!(Error::from_os_code(libc::ENOENT).is_not_found());
        assert!(!Error::TimedOut.is_not_found());
    }

    #[test]
    fn into_stdio_error() {
        let io_error: std::io::Error = Error::TimedOut.into();
        assert_eq!(io_error.kind(), std::io::ErrorKind::TimedOut);

        let io_error: std::io::Error = Error::ArgumentListTooLong.into();
        assert_eq!(io_error.kind(), std::io::ErrorKind::InvalidInput);
    }
}
