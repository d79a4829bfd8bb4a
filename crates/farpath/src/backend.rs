//! Backend capability contract - all storage operations go through this.
//!
//! One implementation per storage variant ([`crate::local::LocalBackend`],
//! [`crate::ftp::FtpBackend`], [`crate::http::HttpBackend`]), selected once
//! at handler construction and never re-inspected per call. A handler is
//! bound to one root-relative directory; `cd` derives a sibling handler for
//! another directory over the same session.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use crate::connection::Credential;
use crate::error::Result;

/// Mode for [`Backend::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only. Remote backends fetch the full content up front.
    Read,
    /// Create or truncate. Remote backends buffer and flush once on close.
    Write,
    /// Read-write positioned at the end. Remote backends fetch the current
    /// content, buffer appended bytes and flush the whole object on close.
    Append,
}

/// Uniform capability contract over one concrete transport.
///
/// All relative paths are interpreted against the handler's root directory;
/// an empty relative path designates the root itself.
pub trait Backend: Send + Sync {
    /// Scheme token of this handler variant.
    fn scheme(&self) -> &'static str;

    /// True for handlers that talk to a remote session.
    fn is_remote(&self) -> bool;

    /// Root-relative directory, already stripped of scheme and credentials.
    fn root(&self) -> &str;

    /// Credential owned or borrowed by this handler.
    fn credential(&self) -> Credential;

    /// Displayable form of the root. Never includes a password, even though
    /// the live credential retains it.
    fn render_root(&self) -> String;

    /// Derive a handler for a directory relative to this one. Pure; no I/O.
    fn cd(&self, rel: &str) -> Arc<dyn Backend>;

    /// Relative names matching a glob pattern, in native listing order.
    fn list(&self, pattern: &str) -> Result<Vec<String>>;

    /// Open a file inside the directory as a scoped resource.
    fn open(&self, rel: &str, mode: OpenMode) -> Result<FileHandle>;

    /// Create a leaf directory and all intermediates. Idempotent; fails with
    /// `ConflictingEntry` when a non-directory occupies a segment.
    fn make_directories(&self, rel: &str) -> Result<()>;

    /// Recursively delete a subtree.
    fn remove_tree(&self, rel: &str) -> Result<()>;

    /// Existence of the bound directory itself, probed directly.
    fn exists(&self) -> Result<bool>;

    /// Existence of a relative entry.
    fn has(&self, rel: &str) -> Result<bool>;

    fn is_file(&self, rel: &str) -> Result<bool>;

    fn is_dir(&self, rel: &str) -> Result<bool>;

    /// Last modification time, where the transport can provide it.
    fn modified(&self, rel: &str) -> Result<SystemTime>;

    /// Last access time, where the transport can provide it.
    fn accessed(&self, rel: &str) -> Result<SystemTime>;

    /// Creation time, where the transport can provide it.
    fn created(&self, rel: &str) -> Result<SystemTime>;

    /// Object size in bytes, where the transport can provide it.
    fn size(&self, rel: &str) -> Result<u64>;
}

/// Where a buffered handle flushes on close. The target path is the
/// handle's own `path`.
pub(crate) enum RemoteSink {
    Ftp { session: Arc<crate::ftp::FtpSession> },
}

pub(crate) enum HandleInner {
    /// Direct stream over the local filesystem.
    Local(std::fs::File),
    /// Fully materialized remote object. `sink` is `None` for read-only
    /// handles; otherwise the buffer is stored in one round trip on close.
    Buffered {
        buf: io::Cursor<Vec<u8>>,
        sink: Option<RemoteSink>,
        path: String,
        dirty: bool,
    },
}

/// Scoped file resource returned by [`Backend::open`].
///
/// Implements `Read`, `Write` and `Seek`. For remote write/append handles
/// the single network write happens in [`FileHandle::close`]; dropping a
/// dirty handle without closing discards the buffer and logs a warning.
/// Correctness must never rely on `Drop`.
pub struct FileHandle {
    inner: Option<HandleInner>,
}

impl FileHandle {
    pub(crate) fn local(file: std::fs::File) -> Self {
        Self {
            inner: Some(HandleInner::Local(file)),
        }
    }

    pub(crate) fn buffered(
        content: Vec<u8>,
        sink: Option<RemoteSink>,
        path: String,
        mode: OpenMode,
    ) -> Self {
        let mut buf = io::Cursor::new(content);
        if mode == OpenMode::Append {
            let end = buf.get_ref().len() as u64;
            buf.set_position(end);
        }
        Self {
            inner: Some(HandleInner::Buffered {
                buf,
                sink,
                path,
                dirty: false,
            }),
        }
    }

    /// Release the handle, performing the deferred write round trip for
    /// remote write/append handles. Must be called on every code path that
    /// wrote data, including error paths.
    pub fn close(mut self) -> Result<()> {
        match self.inner.take() {
            Some(HandleInner::Local(mut file)) => {
                file.flush()?;
                Ok(())
            }
            Some(HandleInner::Buffered { buf, sink, path, .. }) => match sink {
                Some(RemoteSink::Ftp { session }) => {
                    tracing::debug!(path = %path, bytes = buf.get_ref().len(), "flushing buffered write");
                    session.store(&path, buf.get_ref())
                }
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Read the remaining content to a string. Convenience over `Read`.
    pub fn read_to_string(&mut self) -> Result<String> {
        let mut s = String::new();
        Read::read_to_string(self, &mut s)?;
        Ok(s)
    }

    /// Read the remaining content to a byte vector.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut v = Vec::new();
        Read::read_to_end(self, &mut v)?;
        Ok(v)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("FileHandle");
        match &self.inner {
            Some(HandleInner::Local(_)) => d.field("kind", &"local"),
            Some(HandleInner::Buffered { path, dirty, .. }) => {
                d.field("kind", &"buffered").field("path", path).field("dirty", dirty)
            }
            None => d.field("kind", &"closed"),
        };
        d.finish()
    }
}

impl Read for FileHandle {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(HandleInner::Local(file)) => file.read(out),
            Some(HandleInner::Buffered { buf, .. }) => buf.read(out),
            None => Ok(0),
        }
    }
}

impl Write for FileHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(HandleInner::Local(file)) => file.write(data),
            Some(HandleInner::Buffered { buf, dirty, .. }) => {
                *dirty = true;
                buf.write(data)
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "handle closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(HandleInner::Local(file)) => file.flush(),
            // deferred until close: at most one network write per handle
            _ => Ok(()),
        }
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.inner.as_mut() {
            Some(HandleInner::Local(file)) => file.seek(pos),
            Some(HandleInner::Buffered { buf, .. }) => buf.seek(pos),
            None => Err(io::Error::new(io::ErrorKind::Other, "handle closed")),
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Some(HandleInner::Buffered {
            sink: Some(_),
            dirty: true,
            path,
            ..
        }) = &self.inner
        {
            tracing::warn!(path = %path, "write handle dropped without close; buffered bytes discarded");
        }
    }
}
