// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

//! Windows implementation of the native I/O execution layer.
//!
//! Every data handle is opened with `FILE_FLAG_OVERLAPPED`, so a scatter/gather request
//! issues all of its native operations up front and then waits on each in turn with a
//! slice of the remaining deadline budget. Destructive namespace operations never run on
//! the caller's handle: a short-lived delete-capable alias is opened beside it, so
//! directory handles in particular never hold delete rights.

use std::ffi::{OsStr, OsString, c_void};
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use windows_sys::Win32::Foundation::{
    CloseHandle, DUPLICATE_SAME_ACCESS, DuplicateHandle, ERROR_ALREADY_EXISTS,
    ERROR_HANDLE_EOF, ERROR_INSUFFICIENT_BUFFER, ERROR_IO_PENDING, ERROR_LOCK_VIOLATION,
    ERROR_MORE_DATA, ERROR_NO_MORE_FILES, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    BY_HANDLE_FILE_INFORMATION, CREATE_ALWAYS, CREATE_NEW, CreateDirectoryW,
    CreateFileW, DELETE, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL,
    FILE_ATTRIBUTE_REPARSE_POINT, FILE_ATTRIBUTE_SPARSE_FILE, FILE_ATTRIBUTE_TEMPORARY,
    FILE_BASIC_INFO, FILE_DISPOSITION_INFO, FILE_END_OF_FILE_INFO, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_NO_BUFFERING, FILE_FLAG_OPEN_REPARSE_POINT, FILE_FLAG_OVERLAPPED,
    FILE_FLAG_WRITE_THROUGH, FILE_ID_BOTH_DIR_INFO, FILE_NAME_NORMALIZED, FILE_READ_ATTRIBUTES,
    FILE_RENAME_INFO, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_STANDARD_INFO,
    FILE_STORAGE_INFO, FILE_WRITE_ATTRIBUTES, FileBasicInfo, FileDispositionInfo,
    FileEndOfFileInfo, FileIdBothDirectoryInfo, FileIdBothDirectoryRestartInfo, FileRenameInfo,
    FileStandardInfo, FileStorageInfo, FlushFileBuffers, GetFileInformationByHandle,
    GetFileInformationByHandleEx, GetFinalPathNameByHandleW, LOCKFILE_EXCLUSIVE_LOCK,
    LOCKFILE_FAIL_IMMEDIATELY, LockFileEx, OPEN_ALWAYS, OPEN_EXISTING, ReOpenFile, ReadFile,
    SetFileInformationByHandle, TRUNCATE_EXISTING, UnlockFileEx, WriteFile,
};
use windows_sys::Win32::System::IO::{
    CancelIoEx, DeviceIoControl, GetOverlappedResult, OVERLAPPED,
};
use windows_sys::Win32::System::Ioctl::{FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT};
use windows_sys::Win32::System::SystemServices::{
    IO_REPARSE_TAG_MOUNT_POINT, IO_REPARSE_TAG_SYMLINK, MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, GetCurrentProcess, INFINITE, WaitForSingleObject,
};

use crate::dir::DirectoryEntry;
use crate::pal::{Attempt, EnumContext, LinkSite, OpenKind, OpenSpec, grow_buffer};
use crate::symlink::{SymlinkKind, SymlinkTarget};
use crate::{
    Behaviour, Caching, Creation, DeadlineTimer, Error, FileKind, NativeHandle, OpenMode,
    RawNativeHandle, Result, Stat, StatFlags, TransferSizes,
};

/// Conservative logical sector size assumed for alignment validation when the device
/// cannot be probed.
const FALLBACK_SECTOR_SIZE: usize = 512;

/// How long to sleep between byte-range lock attempts while the deadline has budget.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Estimated native record size used for the initial enumeration buffer: the fixed
/// `FILE_ID_BOTH_DIR_INFO` header plus a 64-character name in UTF-16.
const DIR_RECORD_ESTIMATE: usize = std::mem::size_of::<FILE_ID_BOTH_DIR_INFO>() + 64 * 2;

/// The WSL per-distribution symbolic link reparse tag. Its payload format is owned by
/// the Linux subsystem, so this layer refuses to interpret it.
const IO_REPARSE_TAG_LX_SYMLINK: u32 = 0xA000_001D;

/// Marks a symbolic link reparse payload whose target is relative to the link's parent.
const SYMLINK_FLAG_RELATIVE: u32 = 1;

/// Seconds between the Windows file time epoch (1601) and the Unix epoch (1970).
const FILETIME_UNIX_OFFSET_SECS: u64 = 11_644_473_600;

fn raw_handle(native: &NativeHandle) -> HANDLE {
    native.raw() as HANDLE
}

fn wide_path(path: &Path) -> Result<Vec<u16>> {
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return Err(Error::InvalidArgument("path contains an interior NUL unit"));
    }

    wide.push(0);
    Ok(wide)
}

/// Closes a raw handle. The handle must be considered released even on failure.
pub(crate) fn close(raw: RawNativeHandle) -> Result<()> {
    // SAFETY: The caller owns the handle and will not use it again.
    if unsafe { CloseHandle(raw as HANDLE) } == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// An owned event handle used to observe completion of one overlapped operation.
struct Event(HANDLE);

impl Event {
    fn new() -> Result<Self> {
        // SAFETY: No borrowed arguments; a manual-reset unnamed event.
        let event = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
        if event.is_null() {
            return Err(Error::last_os());
        }

        Ok(Self(event))
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // SAFETY: The event was created by us and is not waited on past this point.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn resolve_relative(base: Option<&NativeHandle>, path: &Path) -> Result<PathBuf> {
    match base {
        Some(base) if path.is_relative() => Ok(current_path(base)?.join(path)),
        _ => Ok(path.to_path_buf()),
    }
}

/// Opens a filesystem object relative to `base` (or the current directory) according to
/// the resolved open spec, returning an owned native handle tagged with its behaviour.
pub(crate) fn open(
    base: Option<&NativeHandle>,
    path: &Path,
    spec: &OpenSpec,
) -> Result<NativeHandle> {
    let full_path = resolve_relative(base, path)?;
    let wide = wide_path(&full_path)?;

    let mut access = 0_u32;
    let mut flags = 0_u32;
    let mut behaviour = Behaviour::empty();
    let share = FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE;

    let disposition = match spec.creation {
        Creation::OpenExisting => OPEN_EXISTING,
        Creation::OnlyIfNotExist => CREATE_NEW,
        Creation::IfNeeded => OPEN_ALWAYS,
        Creation::Truncate => TRUNCATE_EXISTING,
        Creation::AlwaysNew => CREATE_ALWAYS,
    };

    match spec.kind {
        OpenKind::File => {
            behaviour |= Behaviour::SEEKABLE | Behaviour::OVERLAPPED;
            flags |= FILE_FLAG_OVERLAPPED;
            match spec.mode {
                OpenMode::None => {}
                OpenMode::AttrRead => access |= FILE_READ_ATTRIBUTES,
                OpenMode::AttrWrite => access |= FILE_READ_ATTRIBUTES | FILE_WRITE_ATTRIBUTES,
                OpenMode::Read => {
                    access |= GENERIC_READ;
                    behaviour |= Behaviour::READABLE;
                }
                OpenMode::Write => {
                    access |= GENERIC_READ | GENERIC_WRITE;
                    behaviour |= Behaviour::READABLE | Behaviour::WRITABLE;
                }
                OpenMode::Append => {
                    access |= GENERIC_WRITE;
                    behaviour |= Behaviour::WRITABLE | Behaviour::APPEND_ONLY;
                }
            }

            match spec.caching {
                Caching::None => {
                    flags |= FILE_FLAG_NO_BUFFERING | FILE_FLAG_WRITE_THROUGH;
                    behaviour |= Behaviour::ALIGNED_IO;
                }
                Caching::Reads => flags |= FILE_FLAG_WRITE_THROUGH,
                Caching::All => flags |= FILE_ATTRIBUTE_NORMAL,
                Caching::Temporary => flags |= FILE_ATTRIBUTE_TEMPORARY,
            }
        }
        OpenKind::Directory => {
            // Directory handles never request DELETE rights; destructive operations go
            // through a short-lived delete-capable alias instead.
            access |= GENERIC_READ;
            flags |= FILE_FLAG_BACKUP_SEMANTICS;
            behaviour |= Behaviour::READABLE | Behaviour::DIRECTORY;

            match spec.creation {
                Creation::OpenExisting => {}
                Creation::Truncate => return Err(Error::IsADirectory),
                Creation::OnlyIfNotExist | Creation::IfNeeded | Creation::AlwaysNew => {
                    // SAFETY: The wide path is live and NUL-terminated.
                    if unsafe { CreateDirectoryW(wide.as_ptr(), std::ptr::null()) } == 0 {
                        let error = Error::last_os();
                        let tolerable = spec.creation != Creation::OnlyIfNotExist
                            && error.is_already_exists();
                        if !tolerable {
                            return Err(error);
                        }
                    }
                }
            }

            return open_raw(&wide, access, share, OPEN_EXISTING, flags, behaviour);
        }
        OpenKind::Symlink => {
            flags |= FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT;
            behaviour |= Behaviour::SYMLINK;
            if spec.mode.is_readable() || spec.mode == OpenMode::AttrRead {
                access |= GENERIC_READ;
                behaviour |= Behaviour::READABLE;
            }
            if spec.mode.is_writable() || spec.mode == OpenMode::AttrWrite {
                access |= GENERIC_WRITE;
                behaviour |= Behaviour::WRITABLE;
            }
            if access == 0 {
                access = FILE_READ_ATTRIBUTES;
            }

            // A link object created here starts life as an empty file; it only becomes
            // a link once a target payload is written into its reparse point.
            return open_raw(&wide, access, share, disposition, flags, behaviour);
        }
        OpenKind::Path => {
            access |= FILE_READ_ATTRIBUTES;
            flags |= FILE_FLAG_BACKUP_SEMANTICS;
            behaviour |= Behaviour::PATH_ONLY;
        }
    }

    open_raw(&wide, access, share, disposition, flags, behaviour)
}

fn open_raw(
    wide: &[u16],
    access: u32,
    share: u32,
    disposition: u32,
    flags: u32,
    behaviour: Behaviour,
) -> Result<NativeHandle> {
    // SAFETY: The wide path is live and NUL-terminated; no other borrowed arguments.
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            access,
            share,
            std::ptr::null(),
            disposition,
            flags,
            std::ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(Error::last_os());
    }

    Ok(NativeHandle::new(handle as RawNativeHandle, behaviour))
}

/// One issued overlapped operation awaiting completion.
struct Inflight {
    overlapped: OVERLAPPED,
    event: Event,
    /// Whether the native call was actually issued (spans past end-of-issue are skipped).
    issued: bool,
}

fn overlapped_at(offset: u64, event: &Event) -> OVERLAPPED {
    // SAFETY: All-zero bytes are a valid OVERLAPPED.
    let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
    overlapped.Anonymous.Anonymous.Offset = (offset & 0xFFFF_FFFF) as u32;
    overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
    overlapped.hEvent = event.0;
    overlapped
}

/// Waits for every issued operation, giving each wait a slice of the remaining budget.
/// On expiry, all still-pending operations are cancelled and quiesced before reporting
/// the timeout, so no native operation can touch the caller's buffers afterwards.
fn await_inflight(
    handle: HANDLE,
    inflight: &mut [Inflight],
    timer: &DeadlineTimer,
) -> Result<TransferSizes> {
    let mut sizes = TransferSizes::new();

    for index in 0..inflight.len() {
        if !inflight[index].issued {
            push_size(&mut sizes, 0)?;
            continue;
        }

        let remaining_ops = inflight[index..].iter().filter(|op| op.issued).count().max(1);
        let wait_millis = match timer.remaining_per(remaining_ops) {
            None => INFINITE,
            Some(slice) => u32::try_from(slice.as_millis()).unwrap_or(u32::MAX),
        };

        // SAFETY: The event is live for the duration of the wait.
        let waited = unsafe { WaitForSingleObject(inflight[index].event.0, wait_millis) };
        if waited == WAIT_TIMEOUT {
            quiesce(handle, &mut inflight[index..]);
            return Err(Error::TimedOut);
        }
        if waited != WAIT_OBJECT_0 {
            quiesce(handle, &mut inflight[index..]);
            return Err(Error::last_os());
        }

        let mut transferred = 0_u32;
        // SAFETY: The overlapped structure is live and its operation has signalled.
        let ok = unsafe {
            GetOverlappedResult(
                handle,
                &raw const inflight[index].overlapped,
                &raw mut transferred,
                0,
            )
        };
        if ok == 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if code as u32 != ERROR_HANDLE_EOF {
                quiesce(handle, &mut inflight[index + 1..]);
                return Err(Error::from_os_code(code));
            }
        }

        push_size(&mut sizes, transferred as usize)?;
    }

    Ok(sizes)
}

/// Cancels and drains every still-pending operation in `inflight`. The blocking drain is
/// what makes it safe for the caller's buffers to be reused after a timeout.
fn quiesce(handle: HANDLE, inflight: &mut [Inflight]) {
    for op in inflight.iter_mut().filter(|op| op.issued) {
        // SAFETY: The overlapped structure is live; cancellation of an already-complete
        // operation is a harmless no-op.
        unsafe {
            CancelIoEx(handle, &raw const op.overlapped);
        }

        let mut transferred = 0_u32;
        // SAFETY: Waiting (last argument nonzero) guarantees the operation has fully
        // retired before the overlapped structure and data buffers go out of scope.
        unsafe {
            GetOverlappedResult(handle, &raw const op.overlapped, &raw mut transferred, 1);
        }
    }
}

/// Issues one overlapped read per span, then waits for all of them under the deadline.
pub(crate) fn read_spans(
    native: &NativeHandle,
    offset: u64,
    spans: &mut [&mut [u8]],
    timer: &DeadlineTimer,
) -> Result<TransferSizes> {
    let handle = raw_handle(native);
    // Preallocated so pushes never relocate an OVERLAPPED the kernel holds a pointer to.
    let mut inflight: Vec<Inflight> = Vec::with_capacity(spans.len());
    let mut at = offset;

    for span in spans.iter_mut() {
        let event = Event::new()?;
        let index = inflight.len();
        inflight.push(Inflight {
            overlapped: overlapped_at(at, &event),
            event,
            issued: false,
        });

        let span_len = u32::try_from(span.len())
            .map_err(|_| Error::InvalidArgument("span length exceeds the representable range"))?;
        // SAFETY: The span pointer and length describe a live, exclusively borrowed
        // buffer, and the overlapped structure sits in its final storage slot;
        // `await_inflight`/`quiesce` guarantee the operation retires before this
        // function returns.
        let ok = unsafe {
            ReadFile(
                handle,
                span.as_mut_ptr(),
                span_len,
                std::ptr::null_mut(),
                &raw mut inflight[index].overlapped,
            )
        };
        if ok == 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
            if code != ERROR_IO_PENDING && code != ERROR_HANDLE_EOF {
                quiesce(handle, &mut inflight[..index]);
                return Err(Error::from_os_code(code as i32));
            }
            inflight[index].issued = code == ERROR_IO_PENDING;
        } else {
            inflight[index].issued = true;
        }

        at = at
            .checked_add(span.len() as u64)
            .ok_or(Error::InvalidArgument("request extends past representable offsets"))?;
    }

    await_inflight(handle, &mut inflight, timer)
}

/// Issues one overlapped write per span, then waits for all of them under the deadline.
///
/// Append-only handles ignore the offsets entirely; the sentinel offset makes each write
/// land at the file's current end.
pub(crate) fn write_spans(
    native: &NativeHandle,
    offset: u64,
    spans: &[&[u8]],
    timer: &DeadlineTimer,
) -> Result<TransferSizes> {
    let handle = raw_handle(native);
    // Preallocated so pushes never relocate an OVERLAPPED the kernel holds a pointer to.
    let mut inflight: Vec<Inflight> = Vec::with_capacity(spans.len());
    let mut at = offset;

    for span in spans {
        let span_offset = if native.is_append_only() {
            // The all-ones overlapped offset is the native sentinel for end-of-file.
            u64::MAX
        } else {
            at
        };

        let event = Event::new()?;
        let index = inflight.len();
        inflight.push(Inflight {
            overlapped: overlapped_at(span_offset, &event),
            event,
            issued: false,
        });

        let span_len = u32::try_from(span.len())
            .map_err(|_| Error::InvalidArgument("span length exceeds the representable range"))?;
        // SAFETY: The span pointer and length describe a live borrowed buffer, and the
        // overlapped structure sits in its final storage slot; `await_inflight`/
        // `quiesce` guarantee the operation retires before this function returns.
        let ok = unsafe {
            WriteFile(
                handle,
                span.as_ptr(),
                span_len,
                std::ptr::null_mut(),
                &raw mut inflight[index].overlapped,
            )
        };
        if ok == 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
            if code != ERROR_IO_PENDING {
                quiesce(handle, &mut inflight[..index]);
                return Err(Error::from_os_code(code as i32));
            }
        }
        inflight[index].issued = true;

        at = at
            .checked_add(span.len() as u64)
            .ok_or(Error::InvalidArgument("request extends past representable offsets"))?;
    }

    await_inflight(handle, &mut inflight, timer)
}

fn push_size(sizes: &mut TransferSizes, size: usize) -> Result<()> {
    sizes.push(size).map_err(|_| Error::ArgumentListTooLong)
}

/// The logical sector size the handle's device requires for unbuffered I/O.
pub(crate) fn logical_sector_size(native: &NativeHandle) -> usize {
    // SAFETY: All-zero bytes are a valid FILE_STORAGE_INFO output area.
    let mut info: FILE_STORAGE_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: The output area is live and exclusively borrowed for the call.
    let ok = unsafe {
        GetFileInformationByHandleEx(
            raw_handle(native),
            FileStorageInfo,
            (&raw mut info).cast::<c_void>(),
            std::mem::size_of::<FILE_STORAGE_INFO>() as u32,
        )
    };
    if ok == 0 || info.LogicalBytesPerSector == 0 {
        return FALLBACK_SECTOR_SIZE;
    }

    info.LogicalBytesPerSector as usize
}

/// Acquires a byte-range lock, retrying while the deadline has budget.
///
/// A poll (zero) deadline makes exactly one attempt and reports [`Error::TimedOut`] if
/// the range is held elsewhere.
pub(crate) fn lock_range(
    native: &NativeHandle,
    offset: u64,
    bytes: u64,
    exclusive: bool,
    timer: &DeadlineTimer,
) -> Result<()> {
    let handle = raw_handle(native);
    // A zero length portably means "to the end of the representable range".
    let bytes = if bytes == 0 { u64::MAX - offset } else { bytes };
    let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
    if exclusive {
        flags |= LOCKFILE_EXCLUSIVE_LOCK;
    }

    loop {
        let event = Event::new()?;
        let mut overlapped = overlapped_at(offset, &event);

        // SAFETY: The overlapped structure is live for the duration of the operation.
        let ok = unsafe {
            LockFileEx(
                handle,
                flags,
                0,
                (bytes & 0xFFFF_FFFF) as u32,
                (bytes >> 32) as u32,
                &raw mut overlapped,
            )
        };
        let code = if ok != 0 {
            0
        } else {
            std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32
        };

        match code {
            0 => return Ok(()),
            ERROR_IO_PENDING => {
                let mut transferred = 0_u32;
                // SAFETY: Waiting guarantees the operation retires before the overlapped
                // structure goes out of scope.
                let done = unsafe {
                    GetOverlappedResult(handle, &raw const overlapped, &raw mut transferred, 1)
                };
                if done != 0 {
                    return Ok(());
                }

                let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
                if code != ERROR_LOCK_VIOLATION {
                    return Err(Error::from_os_code(code as i32));
                }
            }
            ERROR_LOCK_VIOLATION => {}
            other => return Err(Error::from_os_code(other as i32)),
        }

        // The range is held elsewhere; fail on an exhausted budget, otherwise retry.
        timer.check()?;
        let pause = timer
            .remaining()
            .map_or(LOCK_RETRY_INTERVAL, |budget| budget.min(LOCK_RETRY_INTERVAL));
        std::thread::sleep(pause);
    }
}

/// Releases a byte-range lock. The range must exactly match a prior acquisition.
pub(crate) fn unlock_range(native: &NativeHandle, offset: u64, bytes: u64) -> Result<()> {
    let bytes = if bytes == 0 { u64::MAX - offset } else { bytes };
    let event = Event::new()?;
    let mut overlapped = overlapped_at(offset, &event);

    // SAFETY: The overlapped structure is live for the duration of the operation.
    let ok = unsafe {
        UnlockFileEx(
            raw_handle(native),
            0,
            (bytes & 0xFFFF_FFFF) as u32,
            (bytes >> 32) as u32,
            &raw mut overlapped,
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

fn system_time_from_filetime(intervals: i64) -> Option<SystemTime> {
    if intervals <= 0 {
        return None;
    }

    let total = Duration::from_nanos(u64::try_from(intervals).ok()?.checked_mul(100)?);
    let unix_offset = Duration::from_secs(FILETIME_UNIX_OFFSET_SECS);
    if total < unix_offset {
        return UNIX_EPOCH.checked_sub(unix_offset - total);
    }

    UNIX_EPOCH.checked_add(total - unix_offset)
}

fn kind_from_attributes(attributes: u32, reparse_tag: u32) -> FileKind {
    if attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        return match reparse_tag {
            IO_REPARSE_TAG_SYMLINK | IO_REPARSE_TAG_MOUNT_POINT => FileKind::Symlink,
            _ => FileKind::Unknown,
        };
    }

    if attributes & FILE_ATTRIBUTE_DIRECTORY != 0 {
        FileKind::Directory
    } else {
        FileKind::File
    }
}

fn stat_flags_from_attributes(attributes: u32) -> StatFlags {
    let mut flags = StatFlags::empty();
    if attributes & FILE_ATTRIBUTE_SPARSE_FILE != 0 {
        flags |= StatFlags::SPARSE;
    }
    if attributes & 0x800 != 0 {
        // FILE_ATTRIBUTE_COMPRESSED
        flags |= StatFlags::COMPRESSED;
    }
    if attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        flags |= StatFlags::REPARSE_POINT;
    }
    flags
}

/// Enumerates directory entries, yielding at most `ctx.slots` entries that pass the
/// filter.
///
/// The native enumeration cursor cannot be rewound mid-batch, so admitted records beyond
/// the caller's slots spill into `ctx.pending` and are drained first on the next call.
pub(crate) fn enumerate(
    native: &NativeHandle,
    ctx: &mut EnumContext<'_>,
) -> Result<(Vec<DirectoryEntry>, bool)> {
    let mut entries = Vec::new();
    while entries.len() < ctx.slots {
        let Some(entry) = ctx.pending.pop_front() else {
            break;
        };
        entries.push(entry);
    }
    if entries.len() == ctx.slots && !ctx.pending.is_empty() {
        return Ok((entries, false));
    }

    // An empty buffer marks a fresh enumeration: the first native call restarts the
    // handle's cursor; continuation calls resume it.
    let mut info_class = if ctx.buffer.is_empty() {
        grow_buffer(ctx.buffer, DIR_RECORD_ESTIMATE.saturating_mul(ctx.slots.max(1)))?;
        FileIdBothDirectoryRestartInfo
    } else {
        FileIdBothDirectoryInfo
    };

    let handle = raw_handle(native);
    loop {
        let batch_len = match fill_batch(handle, info_class, ctx.buffer)? {
            Attempt::Done(Some(len)) => len,
            Attempt::Done(None) => {
                // Native chain exhausted.
                return Ok((entries, ctx.pending.is_empty()));
            }
            Attempt::Grow => {
                grow_buffer(ctx.buffer, DIR_RECORD_ESTIMATE)?;
                continue;
            }
        };
        info_class = FileIdBothDirectoryInfo;

        let mut position = 0_usize;
        loop {
            let (record, next) = parse_record(&ctx.buffer[..batch_len], position)?;
            if ctx.filter.admits(&record.leaf) {
                let entry = DirectoryEntry::new(record.leaf, record.stat);
                if entries.len() < ctx.slots {
                    entries.push(entry);
                } else {
                    ctx.pending.push_back(entry);
                }
            }

            match next {
                Some(next) => position = next,
                None => break,
            }
        }

        if entries.len() == ctx.slots {
            // The caller's slots are exhausted. Whatever the last batch produced beyond
            // them is already queued, so the next call continues without losing records.
            return Ok((entries, false));
        }
    }
}

fn fill_batch(
    handle: HANDLE,
    info_class: i32,
    buffer: &mut Vec<u8>,
) -> Result<Attempt<Option<usize>>> {
    let len = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
    // SAFETY: The buffer is live and exclusively borrowed for the duration of the call.
    let ok = unsafe {
        GetFileInformationByHandleEx(handle, info_class, buffer.as_mut_ptr().cast(), len)
    };
    if ok == 0 {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
        return match code {
            ERROR_NO_MORE_FILES => Ok(Attempt::Done(None)),
            // The buffer cannot hold even one record.
            ERROR_MORE_DATA | ERROR_INSUFFICIENT_BUFFER => Ok(Attempt::Grow),
            other => Err(Error::from_os_code(other as i32)),
        };
    }

    Ok(Attempt::Done(Some(buffer.len())))
}

/// One parsed native directory record.
struct DirRecord {
    leaf: OsString,
    stat: Stat,
}

/// Parses the record at `position`, returning it plus the position of the next record in
/// the chain (or `None` at the end of the batch).
fn parse_record(batch: &[u8], position: usize) -> Result<(DirRecord, Option<usize>)> {
    const MALFORMED: Error = Error::InvalidArgument("malformed native directory record");

    let header_len = std::mem::size_of::<FILE_ID_BOTH_DIR_INFO>();
    if batch.len() < position || batch.len() - position < header_len {
        return Err(MALFORMED);
    }

    // SAFETY: The bounds check above guarantees `header_len` readable bytes; the
    // unaligned read copes with the batch buffer's arbitrary alignment.
    let info: FILE_ID_BOTH_DIR_INFO =
        unsafe { std::ptr::read_unaligned(batch.as_ptr().add(position).cast()) };

    let name_offset = std::mem::offset_of!(FILE_ID_BOTH_DIR_INFO, FileName);
    let name_bytes = info.FileNameLength as usize;
    let name_area = batch
        .get(position + name_offset..position + name_offset + name_bytes)
        .ok_or(MALFORMED)?;
    let units: Vec<u16> = name_area
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let leaf = OsString::from_wide(&units);

    let attributes = info.FileAttributes;
    // For reparse points the EA size field doubles as the reparse tag.
    let reparse_tag = if attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        info.EaSize as u32
    } else {
        0
    };
    let kind = kind_from_attributes(attributes, reparse_tag);

    let stat = Stat {
        device: 0,
        inode: u64::try_from(info.FileId).unwrap_or(0),
        kind,
        links: 1,
        accessed: system_time_from_filetime(info.LastAccessTime),
        modified: system_time_from_filetime(info.LastWriteTime),
        changed: system_time_from_filetime(info.ChangeTime),
        created: system_time_from_filetime(info.CreationTime),
        size: u64::try_from(info.EndOfFile).unwrap_or(0),
        allocated: u64::try_from(info.AllocationSize).unwrap_or(0),
        flags: stat_flags_from_attributes(attributes),
    };

    let next = if info.NextEntryOffset == 0 {
        None
    } else {
        Some(position + info.NextEntryOffset as usize)
    };

    Ok((DirRecord { leaf, stat }, next))
}

// Byte offsets within a native reparse payload. The payload begins with the tag, the
// data length and a reserved field; a symbolic link's data then carries two
// offset/length pairs (substitute and print name) plus a flags word, a mount point's
// just the two pairs.
const REPARSE_TAG_OFFSET: usize = 0;
const REPARSE_DATA_LEN_OFFSET: usize = 4;
const REPARSE_SUBST_OFFSET: usize = 8;
const REPARSE_SUBST_LEN: usize = 10;
const SYMLINK_FLAGS_OFFSET: usize = 16;
const SYMLINK_PATH_OFFSET: usize = 20;
const MOUNT_POINT_PATH_OFFSET: usize = 16;

fn read_u16(payload: &[u8], at: usize) -> Result<u16> {
    payload
        .get(at..at + 2)
        .and_then(|pair| pair.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or(Error::InvalidArgument("malformed native reparse payload"))
}

fn read_u32(payload: &[u8], at: usize) -> Result<u32> {
    payload
        .get(at..at + 4)
        .and_then(|quad| quad.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(Error::InvalidArgument("malformed native reparse payload"))
}

/// Reads the target of a symbolic link or junction from its reparse payload.
pub(crate) fn read_link(site: LinkSite<'_>, buffer: &mut Vec<u8>) -> Result<SymlinkTarget> {
    if buffer.is_empty() {
        grow_buffer(buffer, MAXIMUM_REPARSE_DATA_BUFFER_SIZE as usize)?;
    }

    let handle = raw_handle(site.handle);
    let mut filled = 0_u32;
    // SAFETY: The buffer is live and exclusively borrowed for the duration of the call.
    let ok = unsafe {
        DeviceIoControl(
            handle,
            FSCTL_GET_REPARSE_POINT,
            std::ptr::null(),
            0,
            buffer.as_mut_ptr().cast(),
            u32::try_from(buffer.len()).unwrap_or(u32::MAX),
            &raw mut filled,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    let payload = &buffer[..filled as usize];
    let tag = read_u32(payload, REPARSE_TAG_OFFSET)?;

    let (data_offset, relative) = match tag {
        IO_REPARSE_TAG_SYMLINK => {
            let flags = read_u32(payload, SYMLINK_FLAGS_OFFSET)?;
            (SYMLINK_PATH_OFFSET, flags & SYMLINK_FLAG_RELATIVE != 0)
        }
        IO_REPARSE_TAG_MOUNT_POINT => (MOUNT_POINT_PATH_OFFSET, false),
        // The Linux subsystem owns this payload format; refuse to interpret it.
        IO_REPARSE_TAG_LX_SYMLINK => return Err(Error::ProtocolNotSupported),
        _ => return Err(Error::ProtocolNotSupported),
    };

    let subst_offset = read_u16(payload, REPARSE_SUBST_OFFSET)? as usize;
    let subst_len = read_u16(payload, REPARSE_SUBST_LEN)? as usize;
    let name_area = payload
        .get(data_offset + subst_offset..data_offset + subst_offset + subst_len)
        .ok_or(Error::InvalidArgument("malformed native reparse payload"))?;
    let units: Vec<u16> = name_area
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut path = PathBuf::from(OsString::from_wide(&units));
    if let Ok(stripped) = path.strip_prefix(r"\??\") {
        path = stripped.to_path_buf();
    }

    let kind = if tag == IO_REPARSE_TAG_MOUNT_POINT {
        SymlinkKind::Junction
    } else {
        SymlinkKind::Symbolic
    };
    Ok(SymlinkTarget::new(kind, path, relative))
}

fn push_u16(payload: &mut Vec<u8>, value: u16) {
    payload.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(payload: &mut Vec<u8>, value: u32) {
    payload.extend_from_slice(&value.to_le_bytes());
}

/// Rewrites a symbolic link (or junction) to point at `target` by replacing the reparse
/// payload in place. A concurrent resolver sees either the old target or the new one.
pub(crate) fn write_link(
    site: LinkSite<'_>,
    target: &SymlinkTarget,
    _timer: &DeadlineTimer,
) -> Result<()> {
    let tag = match target.kind() {
        SymlinkKind::Symbolic => IO_REPARSE_TAG_SYMLINK,
        SymlinkKind::Junction => IO_REPARSE_TAG_MOUNT_POINT,
        SymlinkKind::Wsl => return Err(Error::ProtocolNotSupported),
        SymlinkKind::None => {
            return Err(Error::InvalidArgument("unwritable symlink kind"));
        }
    };

    let print: Vec<u16> = target.path().as_os_str().encode_wide().collect();
    let substitute: Vec<u16> = if target.path().is_absolute() {
        OsStr::new(r"\??\")
            .encode_wide()
            .chain(print.iter().copied())
            .collect()
    } else {
        print.clone()
    };
    let subst_bytes = substitute.len() * 2;
    let print_bytes = print.len() * 2;

    let mut payload = Vec::new();
    push_u32(&mut payload, tag);
    let name_data_len = subst_bytes + print_bytes + 4;
    let data_len = if tag == IO_REPARSE_TAG_SYMLINK {
        name_data_len + 4
    } else {
        name_data_len
    };
    push_u16(
        &mut payload,
        u16::try_from(data_len)
            .map_err(|_| Error::InvalidArgument("link target exceeds the payload limit"))?,
    );
    push_u16(&mut payload, 0); // reserved
    push_u16(&mut payload, 0); // substitute name offset
    push_u16(
        &mut payload,
        u16::try_from(subst_bytes)
            .map_err(|_| Error::InvalidArgument("link target exceeds the payload limit"))?,
    );
    push_u16(
        &mut payload,
        u16::try_from(subst_bytes + 2).unwrap_or(u16::MAX), // print name offset
    );
    push_u16(&mut payload, u16::try_from(print_bytes).unwrap_or(u16::MAX));
    if tag == IO_REPARSE_TAG_SYMLINK {
        let flags = if target.path().is_relative() {
            SYMLINK_FLAG_RELATIVE
        } else {
            0
        };
        push_u32(&mut payload, flags);
    }
    for unit in substitute.iter().chain(std::iter::once(&0)) {
        push_u16(&mut payload, *unit);
    }
    for unit in print.iter().chain(std::iter::once(&0)) {
        push_u16(&mut payload, *unit);
    }

    let mut returned = 0_u32;
    // SAFETY: The payload is live and exclusively borrowed for the duration of the call.
    let ok = unsafe {
        DeviceIoControl(
            raw_handle(site.handle),
            FSCTL_SET_REPARSE_POINT,
            payload.as_ptr().cast(),
            u32::try_from(payload.len())
                .map_err(|_| Error::InvalidArgument("link target exceeds the payload limit"))?,
            std::ptr::null_mut(),
            0,
            &raw mut returned,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// Duplicates the underlying native resource into a new handle.
///
/// With `reopen` set, the duplicate is produced by re-opening the same file object so
/// the new handle can carry different access and caching than the original.
pub(crate) fn clone_handle(
    native: &NativeHandle,
    reopen: Option<(OpenMode, Caching)>,
    behaviour: Behaviour,
) -> Result<NativeHandle> {
    let Some((mode, caching)) = reopen else {
        let mut duplicated: HANDLE = std::ptr::null_mut();
        // SAFETY: Both process handles are the pseudo-handle for the current process;
        // the output handle pointer is live.
        let ok = unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                raw_handle(native),
                GetCurrentProcess(),
                &raw mut duplicated,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if ok == 0 {
            return Err(Error::last_os());
        }

        return Ok(NativeHandle::new(duplicated as RawNativeHandle, behaviour));
    };

    let mut access = 0_u32;
    match mode {
        OpenMode::None => {}
        OpenMode::AttrRead => access |= FILE_READ_ATTRIBUTES,
        OpenMode::AttrWrite => access |= FILE_READ_ATTRIBUTES | FILE_WRITE_ATTRIBUTES,
        OpenMode::Read => access |= GENERIC_READ,
        OpenMode::Write => access |= GENERIC_READ | GENERIC_WRITE,
        OpenMode::Append => access |= GENERIC_WRITE,
    }

    let mut flags = FILE_FLAG_OVERLAPPED;
    if native.is_directory() {
        flags |= FILE_FLAG_BACKUP_SEMANTICS;
    }
    if caching.requires_aligned_io() {
        flags |= FILE_FLAG_NO_BUFFERING | FILE_FLAG_WRITE_THROUGH;
    }

    reopen_alias(native, access, flags).map(|handle| {
        let raw = handle.into_raw();
        NativeHandle::new(raw, behaviour)
    })
}

/// Opens a second handle to the same file object with different access rights.
fn reopen_alias(native: &NativeHandle, access: u32, flags: u32) -> Result<NativeHandle> {
    // SAFETY: The original handle is live; ReOpenFile does not consume it.
    let handle = unsafe {
        ReOpenFile(
            raw_handle(native),
            access,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            flags,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(Error::last_os());
    }

    Ok(NativeHandle::new(
        handle as RawNativeHandle,
        native.behaviour(),
    ))
}

/// Produces a minimal identity-only handle usable as a relative-open root.
pub(crate) fn to_path_handle(native: &NativeHandle) -> Result<NativeHandle> {
    let alias = reopen_alias(
        native,
        FILE_READ_ATTRIBUTES,
        FILE_FLAG_BACKUP_SEMANTICS,
    )?;
    let raw = alias.into_raw();
    Ok(NativeHandle::new(raw, Behaviour::PATH_ONLY))
}

/// Best-effort reverse lookup of the handle's current path.
pub(crate) fn current_path(native: &NativeHandle) -> Result<PathBuf> {
    let handle = raw_handle(native);
    let mut capacity = 512_usize;

    loop {
        let mut buffer = vec![0_u16; capacity];
        // SAFETY: The buffer is live and exclusively borrowed for the duration of the
        // call; the length argument matches its capacity.
        let filled = unsafe {
            GetFinalPathNameByHandleW(
                handle,
                buffer.as_mut_ptr(),
                u32::try_from(buffer.len()).unwrap_or(u32::MAX),
                FILE_NAME_NORMALIZED,
            )
        };
        if filled == 0 {
            return Err(Error::last_os());
        }

        let filled = filled as usize;
        if filled >= buffer.len() {
            // The return value is the required capacity including the terminator.
            capacity = filled + 1;
            continue;
        }

        let path = OsString::from_wide(&buffer[..filled]);
        let path = PathBuf::from(path);
        return Ok(match path.strip_prefix(r"\\?\") {
            Ok(stripped) => stripped.to_path_buf(),
            Err(_) => path,
        });
    }
}

/// Applies a rename through a short-lived delete-capable alias of the handle.
fn rename_via_alias(
    native: &NativeHandle,
    destination: &Path,
    replace_existing: bool,
) -> Result<()> {
    let mut flags = FILE_FLAG_OVERLAPPED;
    if native.is_directory() {
        flags |= FILE_FLAG_BACKUP_SEMANTICS;
    }
    let alias = reopen_alias(native, DELETE, flags)?;

    let name = wide_path(destination)?;
    let name_bytes = (name.len() - 1) * 2;
    let header_len = std::mem::size_of::<FILE_RENAME_INFO>();
    let mut info = vec![0_u8; header_len + name_bytes];

    {
        // SAFETY: The buffer is at least FILE_RENAME_INFO-sized; writes are unaligned.
        let header = info.as_mut_ptr().cast::<FILE_RENAME_INFO>();
        // SAFETY: In-bounds field writes into the zeroed header region.
        unsafe {
            (&raw mut (*header).Anonymous.ReplaceIfExists)
                .write_unaligned(u8::from(replace_existing));
            (&raw mut (*header).RootDirectory).write_unaligned(std::ptr::null_mut());
            (&raw mut (*header).FileNameLength).write_unaligned(name_bytes as u32);
        }

        let name_area = std::mem::offset_of!(FILE_RENAME_INFO, FileName);
        for (index, unit) in name.iter().take(name.len() - 1).enumerate() {
            let at = name_area + index * 2;
            info[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    // SAFETY: The info buffer is live and exclusively borrowed for the call.
    let ok = unsafe {
        SetFileInformationByHandle(
            raw_handle(&alias),
            FileRenameInfo,
            info.as_ptr().cast(),
            u32::try_from(info.len()).unwrap_or(u32::MAX),
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// Renames the object the handle refers to. With `replace_existing` unset, an object
/// already at the destination fails the operation instead of being replaced.
pub(crate) fn relink(
    native: &NativeHandle,
    base: Option<&NativeHandle>,
    new_path: &Path,
    replace_existing: bool,
    _timer: &DeadlineTimer,
) -> Result<()> {
    let destination = resolve_relative(base, new_path)?;
    if !replace_existing {
        // The rename information class replaces unconditionally on some filesystems, so
        // the no-replace contract is enforced up front.
        let probe = wide_path(&destination)?;
        // SAFETY: The wide path is live and NUL-terminated.
        let existing = unsafe {
            CreateFileW(
                probe.as_ptr(),
                FILE_READ_ATTRIBUTES,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                std::ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                std::ptr::null_mut(),
            )
        };
        if existing != INVALID_HANDLE_VALUE {
            // SAFETY: The probe handle was opened above and is not used again.
            unsafe {
                CloseHandle(existing);
            }
            return Err(Error::from_os_code(ERROR_ALREADY_EXISTS as i32));
        }
    }

    rename_via_alias(native, &destination, replace_existing)
}

/// A hidden tombstone name: deleted-but-still-open objects are renamed under it so
/// enumeration can screen them out while the filesystem finishes reclaiming them.
fn tombstone_leaf() -> OsString {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_nanos());
    let salted = u128::from(std::process::id()) ^ nonce;
    OsString::from(format!("{salted:064x}.deleted"))
}

/// Removes the object the handle refers to from the namespace. The handle itself stays
/// open and valid until dropped.
///
/// Deletion of an open object is deferred by the filesystem until every handle closes,
/// during which time the doomed name would still appear in its parent directory. The
/// object is therefore first renamed to a tombstone in the same directory, which the
/// enumeration filter screens out.
pub(crate) fn unlink(native: &NativeHandle, _timer: &DeadlineTimer) -> Result<()> {
    if let Some(parent) = current_path(native)?.parent() {
        let tombstone = parent.join(tombstone_leaf());
        // Renaming can fail on filesystems without rename rights here; deletion still
        // proceeds, just without the tombstone.
        let _ = rename_via_alias(native, &tombstone, false);
    }

    let mut flags = FILE_FLAG_OVERLAPPED;
    if native.is_directory() {
        flags |= FILE_FLAG_BACKUP_SEMANTICS;
    }
    let alias = reopen_alias(native, DELETE, flags)?;

    let info = FILE_DISPOSITION_INFO { DeleteFile: 1 };
    // SAFETY: The info structure is live and exclusively borrowed for the call.
    let ok = unsafe {
        SetFileInformationByHandle(
            raw_handle(&alias),
            FileDispositionInfo,
            (&raw const info).cast(),
            std::mem::size_of::<FILE_DISPOSITION_INFO>() as u32,
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// Fetches fresh metadata for the object the handle refers to.
pub(crate) fn stat_handle(native: &NativeHandle) -> Result<Stat> {
    let handle = raw_handle(native);

    // SAFETY: All-zero bytes are a valid output area.
    let mut by_handle: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
    // SAFETY: The output area is live and exclusively borrowed for the call.
    if unsafe { GetFileInformationByHandle(handle, &raw mut by_handle) } == 0 {
        return Err(Error::last_os());
    }

    // SAFETY: All-zero bytes are a valid output area.
    let mut basic: FILE_BASIC_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: The output area is live and exclusively borrowed for the call.
    if unsafe {
        GetFileInformationByHandleEx(
            handle,
            FileBasicInfo,
            (&raw mut basic).cast::<c_void>(),
            std::mem::size_of::<FILE_BASIC_INFO>() as u32,
        )
    } == 0
    {
        return Err(Error::last_os());
    }

    // SAFETY: All-zero bytes are a valid output area.
    let mut standard: FILE_STANDARD_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: The output area is live and exclusively borrowed for the call.
    if unsafe {
        GetFileInformationByHandleEx(
            handle,
            FileStandardInfo,
            (&raw mut standard).cast::<c_void>(),
            std::mem::size_of::<FILE_STANDARD_INFO>() as u32,
        )
    } == 0
    {
        return Err(Error::last_os());
    }

    let attributes = by_handle.dwFileAttributes;
    let reparse_tag = if attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        IO_REPARSE_TAG_SYMLINK
    } else {
        0
    };
    let size = u64::from(by_handle.nFileSizeHigh) << 32 | u64::from(by_handle.nFileSizeLow);

    Ok(Stat {
        device: u64::from(by_handle.dwVolumeSerialNumber),
        inode: u64::from(by_handle.nFileIndexHigh) << 32 | u64::from(by_handle.nFileIndexLow),
        kind: kind_from_attributes(attributes, reparse_tag),
        links: by_handle.nNumberOfLinks,
        accessed: system_time_from_filetime(basic.LastAccessTime),
        modified: system_time_from_filetime(basic.LastWriteTime),
        changed: system_time_from_filetime(basic.ChangeTime),
        created: system_time_from_filetime(basic.CreationTime),
        size,
        allocated: u64::try_from(standard.AllocationSize).unwrap_or(0),
        flags: stat_flags_from_attributes(attributes),
    })
}

/// Flushes buffered data and metadata to storage. The native flush has no data-only
/// variant; `data_only` is accepted for interface parity and flushes everything.
pub(crate) fn flush(native: &NativeHandle, _data_only: bool) -> Result<()> {
    // SAFETY: No borrowed arguments beyond the owned handle.
    if unsafe { FlushFileBuffers(raw_handle(native)) } == 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// The current length of the object's content in bytes.
pub(crate) fn maximum_extent(native: &NativeHandle) -> Result<u64> {
    Ok(stat_handle(native)?.size)
}

/// Sets the length of the object's content, returning the new length.
pub(crate) fn truncate(native: &NativeHandle, new_len: u64) -> Result<u64> {
    let info = FILE_END_OF_FILE_INFO {
        EndOfFile: i64::try_from(new_len)
            .map_err(|_| Error::InvalidArgument("length exceeds the representable range"))?,
    };

    // SAFETY: The info structure is live and exclusively borrowed for the call.
    let ok = unsafe {
        SetFileInformationByHandle(
            raw_handle(native),
            FileEndOfFileInfo,
            (&raw const info).cast(),
            std::mem::size_of::<FILE_END_OF_FILE_INFO>() as u32,
        )
    };
    if ok == 0 {
        return Err(Error::last_os());
    }

    Ok(new_len)
}
