// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
#![allow(clippy::missing_panics_doc, reason = "Tests")]
#![allow(unused_results, reason = "Tests")]
#![allow(missing_docs, reason = "Tests")]
#![allow(clippy::assertions_on_result_states, reason = "Tests use assert!(x.is_err()) for clarity")]

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use fs_handle::{
    Behaviour, Caching, Creation, Deadline, DirectoryHandle, EntryFilter, EnumerateRequest, Error,
    FileHandle, FileKind, HandleFlags, MAX_SPANS, OpenMode, PathHandle, ReadRequest,
    SymlinkHandle, SymlinkKind, SymlinkTarget, WriteRequest,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_file(dir: &Path, leaf: &str, mode: OpenMode, creation: Creation) -> FileHandle {
    FileHandle::open(
        None,
        &dir.join(leaf),
        mode,
        creation,
        Caching::All,
        HandleFlags::empty(),
    )
    .unwrap()
}

fn write_all(file: &FileHandle, offset: u64, data: &[u8]) {
    let spans: [&[u8]; 1] = [data];
    let sizes = file
        .write(WriteRequest::new(offset, &spans), Deadline::Infinite)
        .unwrap();
    assert_eq!(sizes[0], data.len());
}

fn read_exact(file: &FileHandle, offset: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0_u8; len];
    {
        let mut spans: [&mut [u8]; 1] = [&mut data];
        let sizes = file
            .read(ReadRequest::new(offset, &mut spans), Deadline::Infinite)
            .unwrap();
        assert_eq!(sizes[0], len);
    }
    data
}

// ===========================================================================
// Scatter/gather file I/O
// ===========================================================================

mod file_io {
    use super::*;

    #[test]
    fn gather_write_scatter_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "data.bin", OpenMode::Write, Creation::IfNeeded);

        let spans: [&[u8]; 3] = [b"alpha", b"-", b"beta"];
        let sizes = file
            .write(WriteRequest::new(0, &spans), Deadline::Infinite)
            .unwrap();
        assert_eq!(sizes.as_slice(), &[5, 1, 4]);

        let mut first = [0_u8; 6];
        let mut second = [0_u8; 4];
        {
            let mut spans: [&mut [u8]; 2] = [&mut first, &mut second];
            let sizes = file
                .read(ReadRequest::new(0, &mut spans), Deadline::Infinite)
                .unwrap();
            assert_eq!(sizes.as_slice(), &[6, 4]);
        }
        assert_eq!(&first, b"alpha-");
        assert_eq!(&second, b"beta");
    }

    #[test]
    fn spans_consume_consecutive_extents_regardless_of_transfers() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "offsets.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"0123456789");

        // The second span reads at offset + len(first span), not offset + transferred.
        let mut a = [0_u8; 4];
        let mut b = [0_u8; 4];
        let mut spans: [&mut [u8]; 2] = [&mut a, &mut b];
        file.read(ReadRequest::new(2, &mut spans), Deadline::Infinite)
            .unwrap();
        assert_eq!(&a, b"2345");
        assert_eq!(&b, b"6789");
    }

    #[test]
    fn short_read_at_end_of_file_zeroes_later_spans() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "short.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"abcdef");

        let mut a = [0_u8; 4];
        let mut b = [0_u8; 4];
        let mut c = [0_u8; 4];
        let mut spans: [&mut [u8]; 3] = [&mut a, &mut b, &mut c];
        let sizes = file
            .read(ReadRequest::new(0, &mut spans), Deadline::Infinite)
            .unwrap();
        assert_eq!(sizes.as_slice(), &[4, 2, 0]);
    }

    #[test]
    fn requests_above_the_span_cap_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "cap.bin", OpenMode::Write, Creation::IfNeeded);

        let mut backing = vec![0_u8; MAX_SPANS + 1];
        let mut spans: Vec<&mut [u8]> = backing.chunks_mut(1).collect();
        let outcome = file.read(ReadRequest::new(0, &mut spans), Deadline::Infinite);
        assert!(matches!(outcome, Err(Error::ArgumentListTooLong)));

        let unit = b"x";
        let spans: Vec<&[u8]> = (0..=MAX_SPANS).map(|_| &unit[..]).collect();
        let outcome = file.write(WriteRequest::new(0, &spans), Deadline::Infinite);
        assert!(matches!(outcome, Err(Error::ArgumentListTooLong)));
    }

    #[test]
    fn append_handles_ignore_the_request_offset() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "log.txt", OpenMode::Append, Creation::IfNeeded);
        assert!(file.behaviour().contains(Behaviour::APPEND_ONLY));

        let spans: [&[u8]; 1] = [b"first|"];
        file.write(WriteRequest::new(999, &spans), Deadline::Infinite)
            .unwrap();
        let spans: [&[u8]; 1] = [b"second"];
        file.write(WriteRequest::new(0, &spans), Deadline::Infinite)
            .unwrap();

        let reader = open_file(tmp.path(), "log.txt", OpenMode::Read, Creation::OpenExisting);
        assert_eq!(read_exact(&reader, 0, 12), b"first|second");
    }

    #[test]
    fn reading_a_write_only_append_handle_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "wo.txt", OpenMode::Append, Creation::IfNeeded);

        let mut data = [0_u8; 1];
        let mut spans: [&mut [u8]; 1] = [&mut data];
        let outcome = file.read(ReadRequest::new(0, &mut spans), Deadline::Infinite);
        assert!(matches!(outcome, Err(Error::NotSupported)));
    }

    #[cfg(unix)]
    #[test]
    fn finite_deadlines_are_rejected_without_overlapped_io() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "dl.bin", OpenMode::Write, Creation::IfNeeded);
        assert!(!file.behaviour().contains(Behaviour::OVERLAPPED));

        let mut data = [0_u8; 1];
        let mut spans: [&mut [u8]; 1] = [&mut data];
        let deadline = Deadline::Relative(Duration::from_millis(50));
        let outcome = file.read(ReadRequest::new(0, &mut spans), deadline);
        assert!(matches!(outcome, Err(Error::NotSupported)));

        // Zero and infinite deadlines remain valid on the same handle.
        let mut spans: [&mut [u8]; 1] = [&mut data];
        file.read(ReadRequest::new(0, &mut spans), Deadline::Zero)
            .unwrap();
    }

    #[test]
    fn truncate_and_maximum_extent() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "size.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"0123456789");
        assert_eq!(file.maximum_extent().unwrap(), 10);

        assert_eq!(file.truncate(4).unwrap(), 4);
        assert_eq!(file.maximum_extent().unwrap(), 4);

        // Extension zero-fills.
        assert_eq!(file.truncate(8).unwrap(), 8);
        assert_eq!(read_exact(&file, 0, 8), b"0123\0\0\0\0");
    }

    #[test]
    fn creation_dispositions() {
        let tmp = TempDir::new().unwrap();

        let missing = FileHandle::open(
            None,
            &tmp.path().join("missing.bin"),
            OpenMode::Read,
            Creation::OpenExisting,
            Caching::All,
            HandleFlags::empty(),
        );
        assert!(missing.unwrap_err().is_not_found());

        open_file(tmp.path(), "one.bin", OpenMode::Write, Creation::OnlyIfNotExist);
        let again = FileHandle::open(
            None,
            &tmp.path().join("one.bin"),
            OpenMode::Write,
            Creation::OnlyIfNotExist,
            Caching::All,
            HandleFlags::empty(),
        );
        assert!(again.unwrap_err().is_already_exists());

        let file = open_file(tmp.path(), "one.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"payload");
        drop(file);
        let truncated = open_file(tmp.path(), "one.bin", OpenMode::Write, Creation::Truncate);
        assert_eq!(truncated.maximum_extent().unwrap(), 0);
    }

    #[test]
    fn flush_succeeds_in_both_variants() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "sync.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"durable");
        file.flush(true).unwrap();
        file.flush(false).unwrap();
    }
}

// ===========================================================================
// Handle capabilities
// ===========================================================================

mod handle_ops {
    use super::*;

    #[test]
    fn handles_survive_unlink() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "doomed.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"still here");

        file.as_handle().unlink(Deadline::Infinite).unwrap();
        assert!(!tmp.path().join("doomed.bin").exists());

        // Data I/O continues against the unlinked object.
        assert_eq!(read_exact(&file, 0, 10), b"still here");
        assert!(file.current_path().unwrap_err().is_not_found());
    }

    #[test]
    fn relink_moves_the_open_object() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "old.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"content");

        file.as_handle()
            .relink(None, &tmp.path().join("new.bin"), false, Deadline::Infinite)
            .unwrap();

        assert!(!tmp.path().join("old.bin").exists());
        assert!(tmp.path().join("new.bin").exists());
        let renamed = file.current_path().unwrap();
        assert_eq!(renamed.file_name().unwrap(), "new.bin");
        assert_eq!(read_exact(&file, 0, 7), b"content");
    }

    #[test]
    fn relink_without_replace_fails_on_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "a.bin", OpenMode::Write, Creation::IfNeeded);
        open_file(tmp.path(), "b.bin", OpenMode::Write, Creation::IfNeeded);

        let outcome =
            file.as_handle()
                .relink(None, &tmp.path().join("b.bin"), false, Deadline::Infinite);
        assert!(outcome.is_err());

        file.as_handle()
            .relink(None, &tmp.path().join("b.bin"), true, Deadline::Infinite)
            .unwrap();
    }

    #[test]
    fn unlink_on_first_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("transient.bin");
        let file = FileHandle::open(
            None,
            &path,
            OpenMode::Write,
            Creation::IfNeeded,
            Caching::All,
            HandleFlags::UNLINK_ON_FIRST_CLOSE,
        )
        .unwrap();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn clone_shares_the_object() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "shared.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"via original");

        let clone = file.as_handle().try_clone().unwrap();
        assert_eq!(clone.stat().unwrap().size, 12);
        assert_eq!(file.stat().unwrap().inode, clone.stat().unwrap().inode);
    }

    #[test]
    fn stat_reports_kind_and_size() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "meta.bin", OpenMode::Write, Creation::IfNeeded);
        write_all(&file, 0, b"12345");

        let stat = file.stat().unwrap();
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.size, 5);
        assert_eq!(stat.links, 1);
        assert!(stat.modified.is_some());
    }
}

// ===========================================================================
// Path handles and relative opens
// ===========================================================================

mod path_handles {
    use super::*;

    #[test]
    fn relative_opens_resolve_against_the_base() {
        let tmp = TempDir::new().unwrap();
        let base = PathHandle::open(None, tmp.path()).unwrap();

        let file = FileHandle::open(
            Some(&base),
            Path::new("nested.bin"),
            OpenMode::Write,
            Creation::IfNeeded,
            Caching::All,
            HandleFlags::empty(),
        )
        .unwrap();
        write_all(&file, 0, b"rooted");

        assert!(tmp.path().join("nested.bin").exists());
    }

    #[test]
    fn base_pins_identity_across_renames() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("subject");
        std::fs::create_dir(&dir_path).unwrap();
        let base = PathHandle::open(None, &dir_path).unwrap();

        // Rename the directory out from under the path handle.
        let moved = tmp.path().join("renamed");
        std::fs::rename(&dir_path, &moved).unwrap();

        let file = FileHandle::open(
            Some(&base),
            Path::new("inside.bin"),
            OpenMode::Write,
            Creation::IfNeeded,
            Caching::All,
            HandleFlags::empty(),
        )
        .unwrap();
        write_all(&file, 0, b"x");
        assert!(moved.join("inside.bin").exists());
    }

    #[test]
    fn to_path_handle_drops_data_access() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "anchor.bin", OpenMode::Write, Creation::IfNeeded);
        let anchor = file.as_handle().to_path_handle().unwrap();
        assert!(anchor
            .as_handle()
            .behaviour()
            .contains(Behaviour::PATH_ONLY));
        assert_eq!(anchor.stat().unwrap().inode, file.stat().unwrap().inode);
    }
}

// ===========================================================================
// Directory enumeration
// ===========================================================================

mod enumeration {
    use super::*;

    fn open_dir(path: &Path, creation: Creation) -> DirectoryHandle {
        DirectoryHandle::open(None, path, OpenMode::Read, creation, HandleFlags::empty()).unwrap()
    }

    fn populate(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn yields_every_entry_without_dot_entries() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &["a", "b", "c"]);
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut request = EnumerateRequest::new(16);
        let outcome = dir.enumerate(&mut request, Deadline::Infinite).unwrap();
        assert!(outcome.is_done());

        let names: BTreeSet<OsString> = outcome
            .entries()
            .iter()
            .map(|entry| entry.leaf_name().to_os_string())
            .collect();
        let expected: BTreeSet<OsString> =
            ["a", "b", "c"].iter().map(OsString::from).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn continuation_neither_skips_nor_repeats() {
        let tmp = TempDir::new().unwrap();
        let names: Vec<String> = (0..10).map(|index| format!("entry_{index:02}")).collect();
        for name in &names {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut request = EnumerateRequest::new(4);
        let mut seen = Vec::new();
        loop {
            let outcome = dir.enumerate(&mut request, Deadline::Infinite).unwrap();
            assert!(outcome.entries().len() <= 4);
            seen.extend(
                outcome
                    .entries()
                    .iter()
                    .map(|entry| entry.leaf_name().to_os_string()),
            );
            if outcome.is_done() {
                break;
            }
        }

        let unique: BTreeSet<&OsString> = seen.iter().collect();
        assert_eq!(unique.len(), seen.len(), "an entry was yielded twice");
        let expected: BTreeSet<OsString> = names.iter().map(OsString::from).collect();
        assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn fresh_requests_restart_from_the_beginning() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &["x", "y", "z"]);
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut first = EnumerateRequest::new(16);
        let outcome = dir.enumerate(&mut first, Deadline::Infinite).unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.entries().len(), 3);

        // Continuation state lives in the request, not the handle: a fresh request on
        // the same handle starts over from the head of the directory.
        let mut second = EnumerateRequest::new(16);
        let outcome = dir.enumerate(&mut second, Deadline::Infinite).unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.entries().len(), 3, "fresh request did not restart");
    }

    #[test]
    fn entries_carry_metadata() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("sized"), b"four").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut request = EnumerateRequest::new(16);
        let outcome = dir.enumerate(&mut request, Deadline::Infinite).unwrap();
        for entry in outcome.entries() {
            if entry.leaf_name() == "sized" {
                assert_eq!(entry.stat().kind, FileKind::File);
                assert_eq!(entry.stat().size, 4);
            } else {
                assert_eq!(entry.stat().kind, FileKind::Directory);
            }
        }
    }

    #[test]
    fn glob_filter_narrows_results() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path(), &["one.log", "two.log", "three.txt"]);
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut request = EnumerateRequest::with_filter(16, EntryFilter::with_glob("*.log"));
        let outcome = dir.enumerate(&mut request, Deadline::Infinite).unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.entries().len(), 2);
    }

    #[test]
    fn tombstones_are_screened_out() {
        let tmp = TempDir::new().unwrap();
        let tombstone = format!("{:064x}.deleted", 0xfeed_u32);
        populate(tmp.path(), &[tombstone.as_str(), "survivor"]);
        let dir = open_dir(tmp.path(), Creation::OpenExisting);

        let mut request = EnumerateRequest::new(16);
        let outcome = dir.enumerate(&mut request, Deadline::Infinite).unwrap();
        assert_eq!(outcome.entries().len(), 1);
        assert_eq!(outcome.entries()[0].leaf_name(), "survivor");
    }

    #[test]
    fn truncating_a_directory_is_categorically_invalid() {
        let tmp = TempDir::new().unwrap();
        let outcome = DirectoryHandle::open(
            None,
            tmp.path(),
            OpenMode::Read,
            Creation::Truncate,
            HandleFlags::empty(),
        );
        assert!(matches!(outcome, Err(Error::IsADirectory)));
    }

    #[test]
    fn directories_can_be_created_and_unlinked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fresh");
        let dir = open_dir(&path, Creation::OnlyIfNotExist);
        assert!(path.is_dir());

        dir.as_handle().unlink(Deadline::Infinite).unwrap();
        assert!(!path.exists());

        // The handle outlives the unlink; a fresh open of the name fails.
        assert!(dir.stat().is_ok());
        let reopened = DirectoryHandle::open(
            None,
            &path,
            OpenMode::Read,
            Creation::OpenExisting,
            HandleFlags::empty(),
        );
        assert!(reopened.unwrap_err().is_not_found());
    }
}

// ===========================================================================
// Byte-range locks
// ===========================================================================

mod locks {
    use super::*;

    #[test]
    fn exclusive_locks_conflict_between_handles() {
        let tmp = TempDir::new().unwrap();
        let first = open_file(tmp.path(), "lock.bin", OpenMode::Write, Creation::IfNeeded);
        let second = open_file(tmp.path(), "lock.bin", OpenMode::Write, Creation::OpenExisting);

        let guard = first.lock(0, 100, true, Deadline::Infinite).unwrap();

        // A poll deadline makes one attempt and reports the conflict as a timeout.
        let contended = second.lock(0, 100, true, Deadline::Zero);
        assert!(matches!(contended, Err(Error::TimedOut)));

        drop(guard);
        second.lock(0, 100, true, Deadline::Zero).unwrap();
    }

    #[test]
    fn shared_locks_coexist_until_an_exclusive_arrives() {
        let tmp = TempDir::new().unwrap();
        let first = open_file(tmp.path(), "shared.bin", OpenMode::Write, Creation::IfNeeded);
        let second = open_file(tmp.path(), "shared.bin", OpenMode::Write, Creation::OpenExisting);

        let _reader_a = first.lock(0, 10, false, Deadline::Zero).unwrap();
        let _reader_b = second.lock(0, 10, false, Deadline::Zero).unwrap();

        let writer = second.lock(0, 10, true, Deadline::Zero);
        assert!(matches!(writer, Err(Error::TimedOut)));
    }

    #[test]
    fn disjoint_ranges_do_not_conflict() {
        let tmp = TempDir::new().unwrap();
        let first = open_file(tmp.path(), "ranges.bin", OpenMode::Write, Creation::IfNeeded);
        let second = open_file(tmp.path(), "ranges.bin", OpenMode::Write, Creation::OpenExisting);

        let _low = first.lock(0, 50, true, Deadline::Zero).unwrap();
        let _high = second.lock(50, 50, true, Deadline::Zero).unwrap();
    }

    #[test]
    fn zero_length_locks_cover_to_the_end_of_the_range() {
        let tmp = TempDir::new().unwrap();
        let first = open_file(tmp.path(), "whole.bin", OpenMode::Write, Creation::IfNeeded);
        let second = open_file(tmp.path(), "whole.bin", OpenMode::Write, Creation::OpenExisting);

        // Zero bytes is the sentinel for "from the offset to the end of the
        // representable range"; a lock far past any written data still conflicts.
        let guard = first.lock(0, 0, true, Deadline::Infinite).unwrap();
        assert_eq!(guard.bytes(), 0);

        let far = second.lock(1 << 40, 10, true, Deadline::Zero);
        assert!(matches!(far, Err(Error::TimedOut)));

        drop(guard);
        second.lock(1 << 40, 10, true, Deadline::Zero).unwrap();
    }

    #[test]
    fn finite_deadline_expires_while_contended() {
        let tmp = TempDir::new().unwrap();
        let first = open_file(tmp.path(), "wait.bin", OpenMode::Write, Creation::IfNeeded);
        let second = open_file(tmp.path(), "wait.bin", OpenMode::Write, Creation::OpenExisting);

        let _guard = first.lock(0, 10, true, Deadline::Infinite).unwrap();

        let started = std::time::Instant::now();
        let outcome = second.lock(0, 10, true, Deadline::Relative(Duration::from_millis(80)));
        assert!(matches!(outcome, Err(Error::TimedOut)));
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn explicit_release_reports_the_outcome() {
        let tmp = TempDir::new().unwrap();
        let file = open_file(tmp.path(), "rel.bin", OpenMode::Write, Creation::IfNeeded);

        let guard = file.lock(10, 20, true, Deadline::Zero).unwrap();
        assert_eq!(guard.offset(), 10);
        assert_eq!(guard.bytes(), 20);
        guard.release().unwrap();

        // The range is reusable immediately.
        let other = open_file(tmp.path(), "rel.bin", OpenMode::Write, Creation::OpenExisting);
        other.lock(10, 20, true, Deadline::Zero).unwrap();
    }
}

// ===========================================================================
// Overlapped deadlines (Windows)
// ===========================================================================

#[cfg(windows)]
mod overlapped_deadlines {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::FILE_FLAG_OVERLAPPED;
    use windows_sys::Win32::System::Pipes::{
        CreateNamedPipeW, PIPE_ACCESS_DUPLEX, PIPE_TYPE_BYTE, PIPE_WAIT,
    };

    use super::*;

    /// The server end of a named pipe that never produces any data, so overlapped reads
    /// of the client end pend until they are cancelled.
    struct SilentServer(HANDLE);

    impl SilentServer {
        fn create(name: &str) -> Self {
            let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();
            // SAFETY: The wide name is live and NUL-terminated; no other pointer
            // arguments.
            let handle = unsafe {
                CreateNamedPipeW(
                    wide.as_ptr(),
                    PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
                    PIPE_TYPE_BYTE | PIPE_WAIT,
                    1,
                    4096,
                    4096,
                    0,
                    std::ptr::null(),
                )
            };
            assert_ne!(handle, INVALID_HANDLE_VALUE, "failed to create pipe server");
            Self(handle)
        }
    }

    impl Drop for SilentServer {
        fn drop(&mut self) {
            // SAFETY: The handle is owned and closed exactly once.
            unsafe { CloseHandle(self.0) };
        }
    }

    #[test]
    fn expired_deadline_cancels_every_span_with_no_partial_transfer() {
        let name = format!(r"\\.\pipe\fs_handle_quiesce_{}", std::process::id());
        let _server = SilentServer::create(&name);

        let file = FileHandle::open(
            None,
            Path::new(&name),
            OpenMode::Read,
            Creation::OpenExisting,
            Caching::All,
            HandleFlags::empty(),
        )
        .unwrap();
        assert!(file.behaviour().contains(Behaviour::OVERLAPPED));

        let mut a = [0xA5_u8; 64];
        let mut b = [0xA5_u8; 64];
        let mut spans: [&mut [u8]; 2] = [&mut a, &mut b];
        let started = std::time::Instant::now();
        let outcome = file.read(
            ReadRequest::new(0, &mut spans),
            Deadline::Relative(Duration::from_millis(50)),
        );
        assert!(matches!(outcome, Err(Error::TimedOut)));
        assert!(started.elapsed() >= Duration::from_millis(50));

        // Every span was cancelled and drained to quiescence before the call returned:
        // nothing was transferred and the buffers are immediately reusable.
        assert!(a.iter().all(|&byte| byte == 0xA5));
        assert!(b.iter().all(|&byte| byte == 0xA5));
    }
}

// ===========================================================================
// Symbolic links
// ===========================================================================

#[cfg(unix)]
mod symlinks {
    use super::*;

    #[test]
    fn create_write_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("target.bin"), b"pointed at").unwrap();

        let link = SymlinkHandle::open(
            None,
            &tmp.path().join("link"),
            OpenMode::Write,
            Creation::OnlyIfNotExist,
        )
        .unwrap();

        link.write(&SymlinkTarget::symbolic("target.bin"), Deadline::Infinite)
            .unwrap();

        let target = link.read().unwrap();
        assert_eq!(target.kind(), SymlinkKind::Symbolic);
        assert_eq!(target.path(), Path::new("target.bin"));
        assert!(target.is_relative());

        // The link resolves for ordinary path lookups.
        assert_eq!(
            std::fs::read(tmp.path().join("link")).unwrap(),
            b"pointed at"
        );
    }

    #[test]
    fn rewrite_is_observed_by_an_already_open_handle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("flip");

        let writer =
            SymlinkHandle::open(None, &path, OpenMode::Write, Creation::OnlyIfNotExist).unwrap();
        let reader =
            SymlinkHandle::open(None, &path, OpenMode::Read, Creation::OpenExisting).unwrap();

        writer
            .write(&SymlinkTarget::symbolic("first"), Deadline::Infinite)
            .unwrap();
        assert_eq!(reader.read().unwrap().path(), Path::new("first"));

        writer
            .write(&SymlinkTarget::symbolic("second"), Deadline::Infinite)
            .unwrap();
        assert_eq!(reader.read().unwrap().path(), Path::new("second"));
    }

    #[test]
    fn link_metadata_reports_the_link_itself() {
        let tmp = TempDir::new().unwrap();
        let link = SymlinkHandle::open(
            None,
            &tmp.path().join("meta"),
            OpenMode::Write,
            Creation::OnlyIfNotExist,
        )
        .unwrap();
        link.write(&SymlinkTarget::symbolic("elsewhere"), Deadline::Infinite)
            .unwrap();

        assert_eq!(link.stat().unwrap().kind, FileKind::Symlink);
    }

    #[test]
    fn append_and_truncate_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let appended = SymlinkHandle::open(
            None,
            &tmp.path().join("x"),
            OpenMode::Append,
            Creation::IfNeeded,
        );
        assert!(matches!(appended, Err(Error::InvalidArgument(_))));

        let truncated = SymlinkHandle::open(
            None,
            &tmp.path().join("x"),
            OpenMode::Write,
            Creation::Truncate,
        );
        assert!(matches!(truncated, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn junction_targets_are_foreign_here() {
        let tmp = TempDir::new().unwrap();
        let link = SymlinkHandle::open(
            None,
            &tmp.path().join("j"),
            OpenMode::Write,
            Creation::OnlyIfNotExist,
        )
        .unwrap();

        let outcome = link.write(&SymlinkTarget::junction("/mnt/volume"), Deadline::Infinite);
        assert!(matches!(outcome, Err(Error::NotSupported)));
    }

    #[test]
    fn unwritable_target_kinds_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let link = SymlinkHandle::open(
            None,
            &tmp.path().join("n"),
            OpenMode::Write,
            Creation::OnlyIfNotExist,
        )
        .unwrap();

        let outcome = link.write(&SymlinkTarget::default(), Deadline::Infinite);
        assert!(matches!(outcome, Err(Error::InvalidArgument(_))));
    }
}
