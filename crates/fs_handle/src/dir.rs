// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{Level, event};

use crate::handle::{Handle, ensure_deadline};
use crate::pal::{EnumContext, OpenKind, OpenSpec};
use crate::path::PathHandle;
use crate::{
    Caching, Creation, Deadline, Error, HandleFlags, OpenMode, Result, Stat, pal,
};

/// One entry yielded by directory enumeration: the leaf name plus the metadata captured
/// at enumeration time.
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    leaf_name: OsString,
    stat: Stat,
}

impl DirectoryEntry {
    pub(crate) fn new(leaf_name: OsString, stat: Stat) -> Self {
        Self { leaf_name, stat }
    }

    /// The entry's name within its directory, with no path separators.
    #[must_use]
    pub fn leaf_name(&self) -> &OsStr {
        &self.leaf_name
    }

    /// The entry's metadata as captured during enumeration. A point-in-time snapshot;
    /// the object may have changed since.
    #[must_use]
    pub fn stat(&self) -> &Stat {
        &self.stat
    }
}

/// Decides which directory entries an enumeration yields.
///
/// The `.` and `..` entries and this crate's deletion tombstones are always screened
/// out; a glob pattern (with `*` and `?` wildcards) may narrow the rest further.
#[derive(Clone, Debug, Default)]
pub struct EntryFilter {
    glob: Option<String>,
}

impl EntryFilter {
    /// A filter that admits every ordinary entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter that additionally requires the leaf name to match `glob`, where `*`
    /// matches any run of characters and `?` any single character.
    #[must_use]
    pub fn with_glob(glob: impl Into<String>) -> Self {
        Self {
            glob: Some(glob.into()),
        }
    }

    pub(crate) fn admits(&self, leaf: &OsStr) -> bool {
        if leaf == OsStr::new(".") || leaf == OsStr::new("..") {
            return false;
        }
        if is_tombstone(leaf) {
            return false;
        }

        match &self.glob {
            None => true,
            // Names that are not valid Unicode cannot match a Unicode pattern.
            Some(glob) => leaf
                .to_str()
                .is_some_and(|name| glob_match(glob, name)),
        }
    }
}

/// Whether `leaf` is a deletion tombstone: an object renamed out of the way while the
/// filesystem finishes reclaiming it (64 hexadecimal characters plus `.deleted`).
fn is_tombstone(leaf: &OsStr) -> bool {
    let Some(name) = leaf.to_str() else {
        return false;
    };
    let Some(stem) = name.strip_suffix(".deleted") else {
        return false;
    };

    stem.len() == 64 && stem.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Iterative glob matcher over `*` and `?`, with single-star backtracking.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let mut p = 0;
    let mut n = 0;
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            // Let the most recent star absorb one more character and retry.
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// The reusable state of one directory enumeration.
///
/// A request holds the caller's slot budget, the entry filter, and the native buffers
/// that survive across continuation calls. Re-using one request object across the calls
/// of a single enumeration is what makes continuation work; a fresh request restarts
/// from the beginning of the directory.
#[derive(Debug)]
pub struct EnumerateRequest {
    filter: EntryFilter,
    slots: usize,
    buffer: Vec<u8>,
    pending: VecDeque<DirectoryEntry>,
}

impl EnumerateRequest {
    /// A request yielding at most `slots` entries per call, admitting every ordinary
    /// entry.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self::with_filter(slots, EntryFilter::new())
    }

    /// A request yielding at most `slots` entries per call through `filter`.
    #[must_use]
    pub fn with_filter(slots: usize, filter: EntryFilter) -> Self {
        Self {
            filter,
            slots,
            buffer: Vec::new(),
            pending: VecDeque::new(),
        }
    }
}

/// The outcome of one enumeration call.
#[derive(Debug)]
pub struct Enumeration {
    entries: Vec<DirectoryEntry>,
    done: bool,
}

impl Enumeration {
    /// The entries yielded by this call, in native directory order.
    #[must_use]
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Consumes the outcome, returning the yielded entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<DirectoryEntry> {
        self.entries
    }

    /// Whether the directory is exhausted. When `false`, a further call with the same
    /// request continues exactly where this one stopped.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// A handle to a directory, supporting enumeration and relative opens.
///
/// Directory handles never hold delete rights over their directory; destructive
/// namespace operations are executed through short-lived native aliases instead, so a
/// long-lived directory handle can never be the reason a tree cannot be cleaned up.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug)]
pub struct DirectoryHandle {
    inner: Handle,
}

impl DirectoryHandle {
    /// Opens (or creates, per `creation`) the directory at `path`, resolved relative to
    /// `base` when given.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IsADirectory`] for [`Creation::Truncate`], which is
    /// categorically invalid for directories, or if the native open fails.
    pub fn open(
        base: Option<&PathHandle>,
        path: &Path,
        mode: OpenMode,
        creation: Creation,
        flags: HandleFlags,
    ) -> Result<Self> {
        event!(Level::TRACE, path = ?path, ?mode, ?creation, "open directory");
        if creation == Creation::Truncate {
            return Err(Error::IsADirectory);
        }

        let spec = OpenSpec {
            kind: OpenKind::Directory,
            mode,
            creation,
            caching: Caching::All,
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

    /// Fetches fresh metadata for the directory.
    ///
    /// # Errors
    ///
    /// Fails if the native metadata query fails.
    pub fn stat(&self) -> Result<Stat> {
        self.inner.stat()
    }

    /// Best-effort reverse lookup of the directory's current path.
    ///
    /// # Errors
    ///
    /// Fails if the directory has been unlinked or the native lookup fails.
    pub fn current_path(&self) -> Result<PathBuf> {
        self.inner.current_path()
    }

    /// Yields the next batch of entries, at most the request's slot count.
    ///
    /// Entries are returned in native directory order with their metadata captured at
    /// enumeration time. When the outcome is not [done][Enumeration::is_done], calling
    /// again with the same request continues where this call stopped, without skipping
    /// or repeating entries that existed throughout.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotSupported`] when the deadline is finite (directory
    /// handles cannot wait with a timeout) or if the native enumeration fails.
    pub fn enumerate(
        &self,
        request: &mut EnumerateRequest,
        deadline: Deadline,
    ) -> Result<Enumeration> {
        event!(Level::TRACE, slots = request.slots, "enumerate");
        ensure_deadline(self.inner.native(), deadline)?;

        let mut ctx = EnumContext {
            filter: &request.filter,
            slots: request.slots,
            buffer: &mut request.buffer,
            pending: &mut request.pending,
        };
        let (entries, done) = pal::enumerate(self.inner.native(), &mut ctx)?;
        Ok(Enumeration { entries, done })
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(DirectoryHandle: Send, Sync);
        assert_impl_all!(EnumerateRequest: Send, Sync);
    }

    #[test]
    fn filter_always_screens_dot_entries() {
        let filter = EntryFilter::new();
        assert!(!filter.admits(OsStr::new(".")));
        assert!(!filter.admits(OsStr::new("..")));
        assert!(filter.admits(OsStr::new("...")));
        assert!(filter.admits(OsStr::new(".hidden")));
    }

    #[test]
    fn filter_screens_tombstones() {
        let tombstone = format!("{:064x}.deleted", 0xdead_beef_u64);
        assert!(!EntryFilter::new().admits(OsStr::new(&tombstone)));

        // Wrong stem length, or non-hex stem: an ordinary name.
        assert!(EntryFilter::new().admits(OsStr::new("abc.deleted")));
        let non_hex = format!("{}z.deleted", "0".repeat(63));
        assert!(EntryFilter::new().admits(OsStr::new(&non_hex)));
    }

    #[test]
    fn glob_filter_narrows() {
        let filter = EntryFilter::with_glob("*.log");
        assert!(filter.admits(OsStr::new("trace.log")));
        assert!(filter.admits(OsStr::new(".log")));
        assert!(!filter.admits(OsStr::new("trace.txt")));
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(glob_match("a*c", "abbbc"));
        assert!(!glob_match("a*c", "abd"));
        assert!(glob_match("?at", "cat"));
        assert!(!glob_match("?at", "at"));
        assert!(glob_match("a*b*c", "a-b-b-c"));
        assert!(!glob_match("", "x"));
        assert!(glob_match("", ""));
        assert!(glob_match("**", ""));
    }
}
