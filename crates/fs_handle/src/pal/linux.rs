// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

//! Linux implementation of the native I/O execution layer.
//!
//! File descriptors here are never capable of overlapped I/O, so scatter/gather requests
//! execute as a sequence of positional system calls and finite deadlines are rejected by
//! the layer above. Byte-range locking uses open-file-description locks, so two handles
//! within one process genuinely conflict.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::dir::DirectoryEntry;
use crate::pal::{Attempt, EnumContext, LinkSite, OpenKind, OpenSpec, grow_buffer};
use crate::symlink::{SymlinkKind, SymlinkTarget};
use crate::{
    Behaviour, Caching, Creation, DeadlineTimer, Error, FileKind, HandleFlags, NativeHandle,
    OpenMode, RawNativeHandle, Result, Stat, StatFlags, TransferSizes,
};

/// Conservative logical sector size assumed for alignment validation when the device
/// cannot be probed.
const FALLBACK_SECTOR_SIZE: usize = 512;

/// How long to sleep between byte-range lock attempts while the deadline has budget.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Estimated native record size used for the initial enumeration buffer: the fixed
/// `linux_dirent64` header plus a 64-character name.
const DIRENT_ESTIMATE: usize = DIRENT_HEADER_LEN + 64;

/// Initial target-path capacity assumed when reading a symbolic link.
const LINK_TARGET_ESTIMATE: usize = 256;

/// Process-wide facts about the running kernel, probed once before first use.
struct PlatformProbes {
    /// Whether `statx` is available. Pre-4.11 kernels report `ENOSYS`; the stat readers
    /// then fall back to `fstatat` for the life of the process.
    have_statx: AtomicBool,
}

fn probes() -> &'static PlatformProbes {
    static PROBES: OnceLock<PlatformProbes> = OnceLock::new();
    PROBES.get_or_init(|| PlatformProbes {
        have_statx: AtomicBool::new(true),
    })
}

fn cstring_from_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidArgument("path contains an interior NUL byte"))
}

fn cstring_from_os(name: &OsStr) -> Result<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| Error::InvalidArgument("name contains an interior NUL byte"))
}

fn base_fd(base: Option<&NativeHandle>) -> libc::c_int {
    base.map_or(libc::AT_FDCWD, NativeHandle::raw)
}

/// Closes a raw descriptor. The descriptor must be considered released even on failure.
pub(crate) fn close(raw: RawNativeHandle) -> Result<()> {
    // SAFETY: The caller owns the descriptor and will not use it again.
    if unsafe { libc::close(raw) } < 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// Opens a filesystem object relative to `base` (or the current directory) according to
/// the resolved open spec, returning an owned native handle tagged with its behaviour.
pub(crate) fn open(
    base: Option<&NativeHandle>,
    path: &Path,
    spec: &OpenSpec,
) -> Result<NativeHandle> {
    let c_path = cstring_from_path(path)?;
    let dirfd = base_fd(base);

    let mut oflags = libc::O_CLOEXEC;
    let mut behaviour = Behaviour::empty();

    match spec.kind {
        OpenKind::File => {
            behaviour |= Behaviour::SEEKABLE;
            match spec.mode {
                OpenMode::None | OpenMode::AttrRead => oflags |= libc::O_RDONLY,
                OpenMode::AttrWrite => oflags |= libc::O_RDWR,
                OpenMode::Read => {
                    oflags |= libc::O_RDONLY;
                    behaviour |= Behaviour::READABLE;
                }
                OpenMode::Write => {
                    oflags |= libc::O_RDWR;
                    behaviour |= Behaviour::READABLE | Behaviour::WRITABLE;
                }
                OpenMode::Append => {
                    oflags |= libc::O_WRONLY | libc::O_APPEND;
                    behaviour |= Behaviour::WRITABLE | Behaviour::APPEND_ONLY;
                }
            }

            match spec.creation {
                Creation::OpenExisting => {}
                Creation::OnlyIfNotExist => oflags |= libc::O_CREAT | libc::O_EXCL,
                Creation::IfNeeded => oflags |= libc::O_CREAT,
                Creation::Truncate => oflags |= libc::O_TRUNC,
                Creation::AlwaysNew => oflags |= libc::O_CREAT | libc::O_TRUNC,
            }

            if spec.caching.requires_aligned_io() {
                oflags |= libc::O_DIRECT;
                behaviour |= Behaviour::ALIGNED_IO;
            }
        }
        OpenKind::Directory => {
            // POSIX has no delete bit in a descriptor's rights, so the "directories
            // never hold delete permission" invariant is structural here: the descriptor
            // is read-only and destructive operations go through `unlinkat`/`renameat`
            // against the parent.
            oflags |= libc::O_RDONLY | libc::O_DIRECTORY;
            behaviour |= Behaviour::READABLE | Behaviour::DIRECTORY;

            match spec.creation {
                Creation::OpenExisting => {}
                Creation::Truncate => return Err(Error::IsADirectory),
                Creation::OnlyIfNotExist | Creation::IfNeeded | Creation::AlwaysNew => {
                    // SAFETY: Both pointers refer to live, NUL-terminated storage.
                    if unsafe { libc::mkdirat(dirfd, c_path.as_ptr(), 0o777) } < 0 {
                        let error = Error::last_os();
                        let tolerable = spec.creation != Creation::OnlyIfNotExist
                            && error.is_already_exists();
                        if !tolerable {
                            return Err(error);
                        }
                    }
                }
            }
        }
        OpenKind::Symlink => {
            oflags |= libc::O_PATH | libc::O_NOFOLLOW;
            behaviour |= Behaviour::SYMLINK;
            if spec.mode.is_readable() || spec.mode == OpenMode::AttrRead {
                behaviour |= Behaviour::READABLE;
            }
            if spec.mode.is_writable() || spec.mode == OpenMode::AttrWrite {
                behaviour |= Behaviour::WRITABLE;
            }

            create_link_placeholder(dirfd, &c_path, spec.creation)?;
        }
        OpenKind::Path => {
            oflags |= libc::O_PATH;
            behaviour |= Behaviour::PATH_ONLY;
        }
    }

    // SAFETY: Both pointers refer to live, NUL-terminated storage; the variadic mode
    // argument is only read when O_CREAT is present.
    let fd = unsafe { libc::openat(dirfd, c_path.as_ptr(), oflags, 0o666 as libc::c_uint) };
    if fd < 0 {
        return Err(Error::last_os());
    }

    Ok(NativeHandle::new(fd, behaviour))
}

/// Creates the link object when the creation disposition asks for one.
///
/// A freshly created link needs some target; it points at its own directory until the
/// caller writes a real one.
fn create_link_placeholder(
    dirfd: libc::c_int,
    c_path: &CStr,
    creation: Creation,
) -> Result<()> {
    match creation {
        Creation::OpenExisting => return Ok(()),
        Creation::Truncate => {
            return Err(Error::InvalidArgument("cannot truncate a symbolic link"));
        }
        Creation::OnlyIfNotExist | Creation::IfNeeded | Creation::AlwaysNew => {}
    }

    if creation == Creation::AlwaysNew {
        // SAFETY: Both pointers refer to live, NUL-terminated storage.
        if unsafe { libc::unlinkat(dirfd, c_path.as_ptr(), 0) } < 0 {
            let error = Error::last_os();
            if !error.is_not_found() {
                return Err(error);
            }
        }
    }

    let placeholder = c".";
    // SAFETY: Both pointers refer to live, NUL-terminated storage.
    if unsafe { libc::symlinkat(placeholder.as_ptr(), dirfd, c_path.as_ptr()) } < 0 {
        let error = Error::last_os();
        let tolerable = creation == Creation::IfNeeded && error.is_already_exists();
        if !tolerable {
            return Err(error);
        }
    }

    Ok(())
}

/// Reads each span at its precomputed offset with one positional system call per span.
///
/// A short transfer (end of file) stops further issuance; the untouched spans report
/// zero bytes.
pub(crate) fn read_spans(
    native: &NativeHandle,
    offset: u64,
    spans: &mut [&mut [u8]],
    _timer: &DeadlineTimer,
) -> Result<TransferSizes> {
    let mut sizes = TransferSizes::new();
    let mut at = checked_offset(offset)?;

    let mut hit_end = false;
    for span in spans.iter_mut() {
        if hit_end {
            push_size(&mut sizes, 0)?;
            continue;
        }

        // SAFETY: The pointer and length describe a live, exclusively borrowed span.
        let transferred =
            unsafe { libc::pread(native.raw(), span.as_mut_ptr().cast(), span.len(), at) };
        if transferred < 0 {
            return Err(Error::last_os());
        }

        let transferred = usize::try_from(transferred).unwrap_or(0);
        push_size(&mut sizes, transferred)?;
        hit_end = transferred < span.len();

        at = advance_offset(at, span.len())?;
    }

    Ok(sizes)
}

/// Writes each span at its precomputed offset with one positional system call per span.
///
/// Append-only handles ignore the offsets entirely; each span lands at end-of-file via
/// the descriptor's append semantics.
pub(crate) fn write_spans(
    native: &NativeHandle,
    offset: u64,
    spans: &[&[u8]],
    _timer: &DeadlineTimer,
) -> Result<TransferSizes> {
    let mut sizes = TransferSizes::new();
    let mut at = checked_offset(offset)?;

    for span in spans {
        // SAFETY: The pointer and length describe a live borrowed span.
        let transferred = if native.is_append_only() {
            unsafe { libc::write(native.raw(), span.as_ptr().cast(), span.len()) }
        } else {
            unsafe { libc::pwrite(native.raw(), span.as_ptr().cast(), span.len(), at) }
        };
        if transferred < 0 {
            return Err(Error::last_os());
        }

        push_size(&mut sizes, usize::try_from(transferred).unwrap_or(0))?;
        at = advance_offset(at, span.len())?;
    }

    Ok(sizes)
}

fn push_size(sizes: &mut TransferSizes, size: usize) -> Result<()> {
    sizes.push(size).map_err(|_| Error::ArgumentListTooLong)
}

fn checked_offset(offset: u64) -> Result<libc::off_t> {
    libc::off_t::try_from(offset)
        .map_err(|_| Error::InvalidArgument("offset exceeds the platform's representable range"))
}

fn advance_offset(at: libc::off_t, span_len: usize) -> Result<libc::off_t> {
    let advance = libc::off_t::try_from(span_len)
        .map_err(|_| Error::InvalidArgument("span length exceeds the representable range"))?;
    at.checked_add(advance)
        .ok_or(Error::InvalidArgument("request extends past representable offsets"))
}

/// The logical sector size the handle's device requires for direct I/O.
pub(crate) fn logical_sector_size(_native: &NativeHandle) -> usize {
    // Probing BLKSSZGET only works on block devices; regular files on common
    // filesystems accept 512-byte alignment for O_DIRECT.
    FALLBACK_SECTOR_SIZE
}

fn lock_description(offset: u64, bytes: u64, kind: libc::c_int) -> Result<libc::flock> {
    // SAFETY: All-zero bytes are a valid `flock`.
    let mut description: libc::flock = unsafe { std::mem::zeroed() };
    description.l_type = kind as libc::c_short;
    description.l_whence = libc::SEEK_SET as libc::c_short;
    description.l_start = checked_offset(offset)?;
    // A zero length is the native sentinel for "to the end of the representable range",
    // matching the portable contract directly.
    description.l_len = libc::off_t::try_from(bytes)
        .map_err(|_| Error::InvalidArgument("lock length exceeds the representable range"))?;
    Ok(description)
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
    let kind = if exclusive { libc::F_WRLCK } else { libc::F_RDLCK };
    let description = lock_description(offset, bytes, libc::c_int::from(kind))?;

    loop {
        // SAFETY: The descriptor is owned and the flock structure outlives the call.
        if unsafe { libc::fcntl(native.raw(), libc::F_OFD_SETLK, &description) } == 0 {
            return Ok(());
        }

        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        if code != libc::EAGAIN && code != libc::EACCES {
            return Err(Error::from_os_code(code));
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
    let description = lock_description(offset, bytes, libc::c_int::from(libc::F_UNLCK))?;

    // SAFETY: The descriptor is owned and the flock structure outlives the call.
    if unsafe { libc::fcntl(native.raw(), libc::F_OFD_SETLK, &description) } != 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

// `linux_dirent64` record layout: fixed header followed by a NUL-terminated name.
const DIRENT_INO_OFFSET: usize = 0;
const DIRENT_OFF_OFFSET: usize = 8;
const DIRENT_RECLEN_OFFSET: usize = 16;
const DIRENT_TYPE_OFFSET: usize = 18;
const DIRENT_HEADER_LEN: usize = 19;

fn getdents(fd: libc::c_int, buffer: &mut [u8]) -> libc::c_long {
    // SAFETY: The buffer is live and exclusively borrowed for the duration of the call.
    unsafe {
        libc::syscall(
            libc::SYS_getdents64,
            fd,
            buffer.as_mut_ptr(),
            buffer.len() as libc::c_uint,
        )
    }
}

fn seek_dir(fd: libc::c_int, to: libc::off_t) -> Result<()> {
    // SAFETY: No pointer arguments.
    if unsafe { libc::lseek(fd, to, libc::SEEK_SET) } < 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

fn dir_position(fd: libc::c_int) -> Result<libc::off_t> {
    // SAFETY: No pointer arguments.
    let position = unsafe { libc::lseek(fd, 0, libc::SEEK_CUR) };
    if position < 0 {
        return Err(Error::last_os());
    }

    Ok(position)
}

/// One parsed native directory record.
struct DirentRecord<'a> {
    inode: u64,
    /// The directory-stream offset of the record *after* this one.
    next_offset: libc::off_t,
    record_len: usize,
    kind: FileKind,
    name: &'a [u8],
}

fn parse_dirent(batch: &[u8], position: usize) -> Result<DirentRecord<'_>> {
    const MALFORMED: Error = Error::InvalidArgument("malformed native directory record");

    let header = batch
        .get(position..position + DIRENT_HEADER_LEN)
        .ok_or(MALFORMED)?;

    let inode = u64::from_ne_bytes(
        header[DIRENT_INO_OFFSET..DIRENT_INO_OFFSET + 8]
            .try_into()
            .map_err(|_| MALFORMED)?,
    );
    let next_offset = libc::off_t::from_ne_bytes(
        header[DIRENT_OFF_OFFSET..DIRENT_OFF_OFFSET + 8]
            .try_into()
            .map_err(|_| MALFORMED)?,
    );
    let record_len = usize::from(u16::from_ne_bytes(
        header[DIRENT_RECLEN_OFFSET..DIRENT_RECLEN_OFFSET + 2]
            .try_into()
            .map_err(|_| MALFORMED)?,
    ));
    if record_len <= DIRENT_HEADER_LEN {
        return Err(MALFORMED);
    }

    let kind = match header[DIRENT_TYPE_OFFSET] {
        libc::DT_REG => FileKind::File,
        libc::DT_DIR => FileKind::Directory,
        libc::DT_LNK => FileKind::Symlink,
        libc::DT_BLK => FileKind::BlockDevice,
        libc::DT_CHR => FileKind::CharDevice,
        libc::DT_FIFO => FileKind::Fifo,
        libc::DT_SOCK => FileKind::Socket,
        _ => FileKind::Unknown,
    };

    let name_area = batch
        .get(position + DIRENT_HEADER_LEN..position + record_len)
        .ok_or(MALFORMED)?;
    let name_len = name_area
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(name_area.len());

    Ok(DirentRecord {
        inode,
        next_offset,
        record_len,
        kind,
        name: &name_area[..name_len],
    })
}

/// Enumerates directory entries, yielding at most `ctx.slots` entries that pass the
/// filter.
///
/// Returns the entries plus `done`: `false` means the native cursor stopped because the
/// caller's slots ran out, and a further call will continue from where it left off. The
/// kernel's directory stream can be repositioned exactly, so `ctx.pending` stays empty
/// on this platform.
pub(crate) fn enumerate(
    native: &NativeHandle,
    ctx: &mut EnumContext<'_>,
) -> Result<(Vec<DirectoryEntry>, bool)> {
    let fd = native.raw();
    if ctx.buffer.is_empty() {
        // An empty buffer marks a fresh enumeration: rewind the handle's directory
        // stream to its head so the request starts over; continuation calls resume
        // from wherever the previous call repositioned it.
        grow_buffer(ctx.buffer, DIRENT_ESTIMATE.saturating_mul(ctx.slots.max(1)))?;
        seek_dir(fd, 0)?;
    }

    let mut entries = Vec::new();

    loop {
        let batch_start = dir_position(fd)?;
        let batch_len = match fill_batch(fd, ctx.buffer)? {
            Attempt::Done(len) => len,
            Attempt::Grow => {
                grow_buffer(ctx.buffer, DIRENT_ESTIMATE)?;
                continue;
            }
        };

        if batch_len == 0 {
            // Native chain exhausted.
            return Ok((entries, true));
        }

        let batch = &ctx.buffer[..batch_len];
        let mut position = 0;
        while position < batch_len {
            let record = parse_dirent(batch, position)?;

            if ctx.filter.admits(OsStr::from_bytes(record.name)) {
                if entries.len() == ctx.slots {
                    // The caller's slots are exhausted with records still pending.
                    // Rewind the native cursor to this record so the next call
                    // continues here, then report an unfinished enumeration.
                    seek_dir(fd, record_start_offset(batch, position, batch_start)?)?;
                    return Ok((entries, false));
                }

                let leaf = OsString::from_vec(record.name.to_vec());
                let stat = stat_at(fd, OsStr::from_bytes(record.name)).unwrap_or_else(|_| Stat {
                    inode: record.inode,
                    kind: record.kind,
                    ..Stat::default()
                });
                entries.push(DirectoryEntry::new(leaf, stat));
            }

            position += record.record_len;
        }
    }
}

/// The directory-stream offset at which the record at `position` begins.
///
/// A record's `d_off` names the record *after* it, so the start of the record at
/// `position` is the preceding record's `d_off`, or the batch's starting stream
/// position when it is the first record of the batch.
fn record_start_offset(
    batch: &[u8],
    position: usize,
    batch_start: libc::off_t,
) -> Result<libc::off_t> {
    let mut walk = 0;
    let mut start = batch_start;
    while walk < position {
        let record = parse_dirent(batch, walk)?;
        start = record.next_offset;
        walk += record.record_len;
    }

    Ok(start)
}

fn fill_batch(fd: libc::c_int, buffer: &mut Vec<u8>) -> Result<Attempt<usize>> {
    let read = getdents(fd, buffer);
    if read < 0 {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        // EINVAL from getdents64 means the buffer cannot hold even one record.
        if code == libc::EINVAL {
            return Ok(Attempt::Grow);
        }

        return Err(Error::from_os_code(code));
    }

    Ok(Attempt::Done(usize::try_from(read).unwrap_or(0)))
}

/// Reads the target of a symbolic link, growing the buffer until the whole target fits.
pub(crate) fn read_link(site: LinkSite<'_>, buffer: &mut Vec<u8>) -> Result<SymlinkTarget> {
    if buffer.is_empty() {
        grow_buffer(buffer, LINK_TARGET_ESTIMATE)?;
    }

    loop {
        let filled = match read_link_attempt(site, buffer)? {
            Attempt::Done(filled) => filled,
            Attempt::Grow => {
                grow_buffer(buffer, LINK_TARGET_ESTIMATE)?;
                continue;
            }
        };

        let path = PathBuf::from(OsString::from_vec(buffer[..filled].to_vec()));
        let relative = path.is_relative();
        return Ok(SymlinkTarget::new(SymlinkKind::Symbolic, path, relative));
    }
}

fn read_link_attempt(site: LinkSite<'_>, buffer: &mut [u8]) -> Result<Attempt<usize>> {
    // Prefer the parent + leaf form: after a link rewrite the O_PATH descriptor still
    // names the replaced object, while the parent always resolves the current one.
    let filled = if let (Some(parent), Some(leaf)) = (site.parent, site.leaf) {
        let c_leaf = cstring_from_os(leaf)?;
        // SAFETY: All pointers refer to live storage; the buffer is exclusively borrowed.
        unsafe {
            libc::readlinkat(
                parent.raw(),
                c_leaf.as_ptr(),
                buffer.as_mut_ptr().cast(),
                buffer.len(),
            )
        }
    } else {
        // Operating directly on the link descriptor: the empty-path form requires the
        // descriptor to have been opened with O_PATH | O_NOFOLLOW, which `open` ensures.
        // SAFETY: All pointers refer to live storage; the buffer is exclusively borrowed.
        unsafe {
            libc::readlinkat(
                site.handle.raw(),
                c"".as_ptr(),
                buffer.as_mut_ptr().cast(),
                buffer.len(),
            )
        }
    };

    if filled < 0 {
        return Err(Error::last_os());
    }

    let filled = usize::try_from(filled).unwrap_or(0);
    if filled == buffer.len() {
        // The target may have been truncated to fit; only a shorter-than-buffer result
        // proves the whole thing was seen.
        return Ok(Attempt::Grow);
    }

    Ok(Attempt::Done(filled))
}

/// Rewrites a symbolic link to point at `target`.
///
/// The replacement link is created beside the old one under a transient name and renamed
/// into place, so a concurrent resolver sees either the old target or the new one, never
/// a missing link.
pub(crate) fn write_link(
    site: LinkSite<'_>,
    target: &SymlinkTarget,
    _timer: &DeadlineTimer,
) -> Result<()> {
    match target.kind() {
        SymlinkKind::Symbolic => {}
        // Junction points are a Windows construct.
        SymlinkKind::Junction => return Err(Error::NotSupported),
        SymlinkKind::Wsl | SymlinkKind::None => {
            return Err(Error::InvalidArgument("unwritable symlink kind"));
        }
    }

    let (parent, leaf) = match (site.parent, site.leaf) {
        (Some(parent), Some(leaf)) => (parent, leaf),
        _ => return Err(Error::FunctionNotSupported),
    };

    let c_target = cstring_from_path(target.path())?;
    let c_leaf = cstring_from_os(leaf)?;
    let c_transient = cstring_from_os(&transient_leaf_name(leaf))?;

    // SAFETY: All pointers refer to live, NUL-terminated storage.
    if unsafe { libc::symlinkat(c_target.as_ptr(), parent.raw(), c_transient.as_ptr()) } < 0 {
        return Err(Error::last_os());
    }

    // SAFETY: All pointers refer to live, NUL-terminated storage.
    if unsafe {
        libc::renameat(
            parent.raw(),
            c_transient.as_ptr(),
            parent.raw(),
            c_leaf.as_ptr(),
        )
    } < 0
    {
        let error = Error::last_os();
        // SAFETY: All pointers refer to live, NUL-terminated storage.
        unsafe {
            libc::unlinkat(parent.raw(), c_transient.as_ptr(), 0);
        }
        return Err(error);
    }

    Ok(())
}

fn transient_leaf_name(leaf: &OsStr) -> OsString {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_nanos());
    let mut name = OsString::from(".");
    name.push(leaf);
    name.push(format!(".{}.{nonce:x}.tmp", std::process::id()));
    name
}

/// Duplicates the underlying native resource into a new descriptor.
///
/// With `reopen` set, the duplicate is re-opened through `/proc/self/fd` so the new
/// descriptor can carry different access flags than the original.
pub(crate) fn clone_handle(
    native: &NativeHandle,
    reopen: Option<(OpenMode, Caching)>,
    behaviour: Behaviour,
) -> Result<NativeHandle> {
    let Some((mode, caching)) = reopen else {
        // SAFETY: No pointer arguments.
        let fd = unsafe { libc::fcntl(native.raw(), libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(Error::last_os());
        }

        return Ok(NativeHandle::new(fd, behaviour));
    };

    let spec = OpenSpec {
        kind: if native.is_directory() {
            OpenKind::Directory
        } else {
            OpenKind::File
        },
        mode,
        creation: Creation::OpenExisting,
        caching,
        flags: HandleFlags::empty(),
    };
    open(None, &proc_fd_path(native.raw()), &spec)
}

/// Produces a minimal identity-only handle usable as a relative-open root.
pub(crate) fn to_path_handle(native: &NativeHandle) -> Result<NativeHandle> {
    let spec = OpenSpec {
        kind: OpenKind::Path,
        mode: OpenMode::None,
        creation: Creation::OpenExisting,
        caching: Caching::All,
        flags: HandleFlags::empty(),
    };
    open(None, &proc_fd_path(native.raw()), &spec)
}

fn proc_fd_path(fd: RawNativeHandle) -> PathBuf {
    PathBuf::from(format!("/proc/self/fd/{fd}"))
}

/// Best-effort reverse lookup of the handle's current path.
///
/// Fails with a not-found classification once the object has been unlinked.
pub(crate) fn current_path(native: &NativeHandle) -> Result<PathBuf> {
    let c_link = cstring_from_path(&proc_fd_path(native.raw()))?;
    let mut buffer = Vec::new();
    grow_buffer(&mut buffer, LINK_TARGET_ESTIMATE)?;

    loop {
        // SAFETY: All pointers refer to live storage; the buffer is exclusively borrowed.
        let filled = unsafe {
            libc::readlinkat(
                libc::AT_FDCWD,
                c_link.as_ptr(),
                buffer.as_mut_ptr().cast(),
                buffer.len(),
            )
        };
        if filled < 0 {
            return Err(Error::last_os());
        }

        let filled = usize::try_from(filled).unwrap_or(0);
        if filled == buffer.len() {
            grow_buffer(&mut buffer, LINK_TARGET_ESTIMATE)?;
            continue;
        }

        let bytes = &buffer[..filled];
        // The kernel marks unlinked objects by appending " (deleted)".
        if bytes.ends_with(b" (deleted)") {
            return Err(Error::from_os_code(libc::ENOENT));
        }

        return Ok(PathBuf::from(OsString::from_vec(bytes.to_vec())));
    }
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
    let old_path = current_path(native)?;
    let c_old = cstring_from_path(&old_path)?;
    let c_new = cstring_from_path(new_path)?;
    let new_dirfd = base_fd(base);

    if replace_existing {
        // SAFETY: All pointers refer to live, NUL-terminated storage.
        if unsafe { libc::renameat(libc::AT_FDCWD, c_old.as_ptr(), new_dirfd, c_new.as_ptr()) } < 0
        {
            return Err(Error::last_os());
        }

        return Ok(());
    }

    // SAFETY: All pointers refer to live, NUL-terminated storage.
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            c_old.as_ptr(),
            new_dirfd,
            c_new.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if rc < 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

/// Removes the object the handle refers to from the namespace. The handle itself stays
/// open and valid until dropped.
pub(crate) fn unlink(native: &NativeHandle, _timer: &DeadlineTimer) -> Result<()> {
    let path = current_path(native)?;
    let c_path = cstring_from_path(&path)?;
    let flags = if native.is_directory() {
        libc::AT_REMOVEDIR
    } else {
        0
    };

    // SAFETY: All pointers refer to live, NUL-terminated storage.
    if unsafe { libc::unlinkat(libc::AT_FDCWD, c_path.as_ptr(), flags) } < 0 {
        return Err(Error::last_os());
    }

    Ok(())
}

fn system_time(seconds: i64, nanoseconds: i64) -> Option<SystemTime> {
    let nanoseconds = u64::try_from(nanoseconds).unwrap_or(0);
    let base = if seconds >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds.unsigned_abs()))?
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_secs(seconds.unsigned_abs()))?
    };
    base.checked_add(Duration::from_nanos(nanoseconds))
}

fn kind_from_mode(mode: libc::mode_t) -> FileKind {
    match mode & libc::S_IFMT {
        libc::S_IFREG => FileKind::File,
        libc::S_IFDIR => FileKind::Directory,
        libc::S_IFLNK => FileKind::Symlink,
        libc::S_IFBLK => FileKind::BlockDevice,
        libc::S_IFCHR => FileKind::CharDevice,
        libc::S_IFIFO => FileKind::Fifo,
        libc::S_IFSOCK => FileKind::Socket,
        _ => FileKind::Unknown,
    }
}

fn stat_flags(kind: FileKind, size: u64, allocated: u64, compressed: bool) -> StatFlags {
    let mut flags = StatFlags::empty();
    if kind == FileKind::File && allocated < size {
        flags |= StatFlags::SPARSE;
    }
    if compressed {
        flags |= StatFlags::COMPRESSED;
    }
    if kind == FileKind::Symlink {
        flags |= StatFlags::REPARSE_POINT;
    }
    flags
}

fn stat_from_statx(data: &libc::statx) -> Stat {
    let kind = kind_from_mode(libc::mode_t::from(data.stx_mode));
    let allocated = data.stx_blocks.saturating_mul(512);
    let compressed = data.stx_attributes & libc::STATX_ATTR_COMPRESSED as u64 != 0;

    Stat {
        device: u64::from(data.stx_dev_major) << 32 | u64::from(data.stx_dev_minor),
        inode: data.stx_ino,
        kind,
        links: data.stx_nlink,
        accessed: system_time(data.stx_atime.tv_sec, i64::from(data.stx_atime.tv_nsec)),
        modified: system_time(data.stx_mtime.tv_sec, i64::from(data.stx_mtime.tv_nsec)),
        changed: system_time(data.stx_ctime.tv_sec, i64::from(data.stx_ctime.tv_nsec)),
        created: if data.stx_mask & libc::STATX_BTIME != 0 {
            system_time(data.stx_btime.tv_sec, i64::from(data.stx_btime.tv_nsec))
        } else {
            None
        },
        size: data.stx_size,
        allocated,
        flags: stat_flags(kind, data.stx_size, allocated, compressed),
    }
}

fn stat_from_fstat(data: &libc::stat) -> Stat {
    let kind = kind_from_mode(data.st_mode);
    let size = u64::try_from(data.st_size).unwrap_or(0);
    let allocated = u64::try_from(data.st_blocks).unwrap_or(0).saturating_mul(512);

    Stat {
        device: data.st_dev,
        inode: data.st_ino,
        kind,
        links: u32::try_from(data.st_nlink).unwrap_or(u32::MAX),
        accessed: system_time(data.st_atime, data.st_atime_nsec),
        modified: system_time(data.st_mtime, data.st_mtime_nsec),
        changed: system_time(data.st_ctime, data.st_ctime_nsec),
        created: None,
        size,
        allocated,
        flags: stat_flags(kind, size, allocated, false),
    }
}

fn statx_call(dirfd: libc::c_int, c_path: &CStr, at_flags: libc::c_int) -> Result<Option<Stat>> {
    if !probes().have_statx.load(Ordering::Relaxed) {
        return Ok(None);
    }

    // SAFETY: All-zero bytes are a valid `statx` output area.
    let mut data: libc::statx = unsafe { std::mem::zeroed() };
    // SAFETY: All pointers refer to live storage exclusively borrowed for the call.
    let rc = unsafe {
        libc::statx(
            dirfd,
            c_path.as_ptr(),
            at_flags,
            libc::STATX_BASIC_STATS | libc::STATX_BTIME,
            &raw mut data,
        )
    };
    if rc < 0 {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        if code == libc::ENOSYS {
            // Old kernel: remember and use the fallback for the rest of the process.
            probes().have_statx.store(false, Ordering::Relaxed);
            return Ok(None);
        }

        return Err(Error::from_os_code(code));
    }

    Ok(Some(stat_from_statx(&data)))
}

fn fstatat_call(dirfd: libc::c_int, c_path: &CStr, at_flags: libc::c_int) -> Result<Stat> {
    // SAFETY: All-zero bytes are a valid `stat` output area.
    let mut data: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: All pointers refer to live storage exclusively borrowed for the call.
    if unsafe { libc::fstatat(dirfd, c_path.as_ptr(), &raw mut data, at_flags) } < 0 {
        return Err(Error::last_os());
    }

    Ok(stat_from_fstat(&data))
}

fn stat_at(dirfd: libc::c_int, name: &OsStr) -> Result<Stat> {
    let c_name = cstring_from_os(name)?;
    let at_flags = libc::AT_SYMLINK_NOFOLLOW;

    if let Some(stat) = statx_call(dirfd, &c_name, at_flags)? {
        return Ok(stat);
    }

    fstatat_call(dirfd, &c_name, at_flags)
}

/// Fetches fresh metadata for the object the handle refers to.
pub(crate) fn stat_handle(native: &NativeHandle) -> Result<Stat> {
    let at_flags = libc::AT_EMPTY_PATH | libc::AT_SYMLINK_NOFOLLOW;

    if let Some(stat) = statx_call(native.raw(), c"", at_flags)? {
        return Ok(stat);
    }

    fstatat_call(native.raw(), c"", at_flags)
}

/// Flushes buffered data (and, unless `data_only`, metadata) to storage.
pub(crate) fn flush(native: &NativeHandle, data_only: bool) -> Result<()> {
    // SAFETY: No pointer arguments.
    let rc = if data_only {
        unsafe { libc::fdatasync(native.raw()) }
    } else {
        unsafe { libc::fsync(native.raw()) }
    };
    if rc < 0 {
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
    let len = checked_offset(new_len)?;
    // SAFETY: No pointer arguments.
    if unsafe { libc::ftruncate(native.raw(), len) } < 0 {
        return Err(Error::last_os());
    }

    Ok(new_len)
}
