//! FTP backend over a single stateful control connection.
//!
//! The wire protocol is delegated to [`suppaftp`] behind the
//! [`FtpTransport`] seam, which covers exactly the command set the
//! capability contract consumes (`NLST`, `RETR`, `STOR`, `MKD`, `RMD`,
//! `DELE`, `CWD`, `PWD`, `MDTM`, `SIZE`). Tests substitute an in-memory
//! transport. Transport error classification (transient vs permanent)
//! happens in this module only.
//!
//! URL format: `ftp://[user[:password]@]host[:port]/path`. The path is kept
//! relative to the login point, the way the server reports it.

use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use secrecy::SecretString;
use suppaftp::{FtpError, FtpStream, Status};
use url::Url;

use crate::backend::{Backend, FileHandle, OpenMode, RemoteSink};
use crate::connection::{Credential, Session};
use crate::error::{Error, Result};
use crate::glob::{self, Listing, ListingSource};
use crate::pathstr;

pub const SCHEME: &str = "ftp";

/// Outcome of a `MKD` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkdOutcome {
    Created,
    /// The server refused (typically "already exists"). The caller decides
    /// whether that is tolerable.
    Refused,
}

/// Wire command set consumed by the FTP backend.
///
/// Implementations classify native errors: a "no such path" or "temporarily
/// unavailable" listing reply becomes [`Listing::Unavailable`]; `cwd` and
/// `mkd` report protocol refusals in-band; everything else is a permanent
/// [`Error::Protocol`].
pub trait FtpTransport: Send {
    /// `NLST`, unscoped when `path` is `None`.
    fn nlst(&mut self, path: Option<&str>) -> Result<Listing>;
    /// `RETR` into memory.
    fn retr(&mut self, path: &str) -> Result<Vec<u8>>;
    /// `STOR` from memory.
    fn stor(&mut self, path: &str, data: &[u8]) -> Result<()>;
    fn mkd(&mut self, path: &str) -> Result<MkdOutcome>;
    fn rmd(&mut self, path: &str) -> Result<()>;
    fn dele(&mut self, path: &str) -> Result<()>;
    /// `CWD`; `Ok(false)` when the server refuses (not a directory).
    fn cwd(&mut self, path: &str) -> Result<bool>;
    fn pwd(&mut self) -> Result<String>;
    /// `MDTM`; modification time is the only timestamp FTP offers.
    fn mdtm(&mut self, path: &str) -> Result<SystemTime>;
    /// `SIZE`.
    fn size(&mut self, path: &str) -> Result<u64>;
}

/// Production transport over a blocking [`suppaftp::FtpStream`].
struct SuppaftpTransport {
    stream: FtpStream,
}

fn classify(err: &FtpError) -> Error {
    Error::Protocol(err.to_string())
}

/// "No such path" replies during listing: 450 (transient refusal) and 550
/// (path absence). Both mean "no match", per the listing contract.
fn is_unlistable(err: &FtpError) -> bool {
    matches!(
        err,
        FtpError::UnexpectedResponse(resp)
            if resp.status == Status::RequestFileActionIgnored
                || resp.status == Status::FileUnavailable
    )
}

impl FtpTransport for SuppaftpTransport {
    fn nlst(&mut self, path: Option<&str>) -> Result<Listing> {
        match self.stream.nlst(path) {
            Ok(entries) => Ok(Listing::Entries(entries)),
            Err(err) if is_unlistable(&err) => Ok(Listing::Unavailable),
            Err(err) => Err(classify(&err)),
        }
    }

    fn retr(&mut self, path: &str) -> Result<Vec<u8>> {
        tracing::debug!(%path, "RETR");
        self.stream
            .retr_as_buffer(path)
            .map(Cursor::into_inner)
            .map_err(|e| classify(&e))
    }

    fn stor(&mut self, path: &str, data: &[u8]) -> Result<()> {
        tracing::debug!(%path, bytes = data.len(), "STOR");
        self.stream
            .put_file(path, &mut Cursor::new(data))
            .map(|_| ())
            .map_err(|e| classify(&e))
    }

    fn mkd(&mut self, path: &str) -> Result<MkdOutcome> {
        match self.stream.mkdir(path) {
            Ok(()) => Ok(MkdOutcome::Created),
            Err(FtpError::UnexpectedResponse(_)) => Ok(MkdOutcome::Refused),
            Err(err) => Err(classify(&err)),
        }
    }

    fn rmd(&mut self, path: &str) -> Result<()> {
        self.stream.rmdir(path).map_err(|e| classify(&e))
    }

    fn dele(&mut self, path: &str) -> Result<()> {
        self.stream.rm(path).map_err(|e| classify(&e))
    }

    fn cwd(&mut self, path: &str) -> Result<bool> {
        match self.stream.cwd(path) {
            Ok(()) => Ok(true),
            Err(FtpError::UnexpectedResponse(_)) => Ok(false),
            Err(err) => Err(classify(&err)),
        }
    }

    fn pwd(&mut self) -> Result<String> {
        self.stream.pwd().map_err(|e| classify(&e))
    }

    fn mdtm(&mut self, path: &str) -> Result<SystemTime> {
        let stamp = self.stream.mdtm(path).map_err(|e| classify(&e))?;
        let secs = stamp.and_utc().timestamp();
        Ok(if secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
        })
    }

    fn size(&mut self, path: &str) -> Result<u64> {
        self.stream
            .size(path)
            .map(|s| s as u64)
            .map_err(|e| classify(&e))
    }
}

/// One live FTP session: the transport plus the identity it was opened
/// under, used to detect mismatched path strings.
pub struct FtpSession {
    transport: Mutex<Box<dyn FtpTransport>>,
    host: String,
    user: String,
    // retained for the lifetime of the session, never rendered
    #[allow(dead_code)]
    password: Option<SecretString>,
}

impl FtpSession {
    /// Connect and log in. Login is attempted only when a user is present,
    /// matching servers that accept unauthenticated sessions.
    pub fn connect(
        host: &str,
        port: u16,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Arc<Self>> {
        let addr = format!("{host}:{port}");
        tracing::debug!(%addr, "opening ftp session");
        let mut stream = FtpStream::connect(&addr).map_err(|e| classify(&e))?;
        if let Some(user) = user {
            stream
                .login(user, password.unwrap_or(""))
                .map_err(|e| classify(&e))?;
        }
        Ok(Arc::new(Self {
            transport: Mutex::new(Box::new(SuppaftpTransport { stream })),
            host: host.to_string(),
            user: user.unwrap_or("").to_string(),
            password: password.map(|p| SecretString::new(p.to_string())),
        }))
    }

    /// Wrap an already-open transport supplied by the caller. The session
    /// lifecycle stays with the caller; `host`/`user` tag the session for
    /// mismatch detection.
    pub fn from_transport(
        transport: Box<dyn FtpTransport>,
        host: impl Into<String>,
        user: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport: Mutex::new(transport),
            host: host.into(),
            user: user.into(),
            password: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn FtpTransport>>> {
        self.transport
            .lock()
            .map_err(|_| Error::Protocol("ftp session lock poisoned".to_string()))
    }

    pub(crate) fn retrieve(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()?.retr(path)
    }

    pub(crate) fn store(&self, path: &str, data: &[u8]) -> Result<()> {
        self.lock()?.stor(path, data)
    }
}

/// Verify a path string against the session it is being combined with.
///
/// Plain relative paths pass through. A URL naming a host must name this
/// session's host (and user, when present); anything else raises
/// [`Error::ConnectionMismatch`] instead of silently reconnecting. Returns
/// the login-relative path.
fn strip_foreign(session: &FtpSession, input: &str) -> Result<String> {
    let Ok(url) = Url::parse(input) else {
        return Ok(input.to_string());
    };
    let Some(host) = url.host_str() else {
        return Ok(input.to_string());
    };
    if host != session.host {
        return Err(Error::ConnectionMismatch {
            expected: session.host.clone(),
            found: host.to_string(),
        });
    }
    let user = pathstr::decode_component(url.username());
    if !user.is_empty() && user != session.user {
        return Err(Error::ConnectionMismatch {
            expected: session.user.clone(),
            found: user,
        });
    }
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Directory handler bound to one login-relative directory of a session.
pub struct FtpBackend {
    session: Arc<FtpSession>,
    root: String,
}

impl FtpBackend {
    pub fn new(session: Arc<FtpSession>, root: impl Into<String>) -> Self {
        Self {
            session,
            root: tidy_root(&root.into()),
        }
    }

    /// Registry factory: reuse a supplied session, or parse the URL and open
    /// a fresh connection, logging in when the URL carries a user.
    pub(crate) fn factory(input: &str, credential: Option<Credential>) -> Result<Arc<dyn Backend>> {
        if let Some(cred) = credential {
            let Session::Ftp(session) = cred.session().clone() else {
                return Err(Error::ConnectionMismatch {
                    expected: SCHEME.to_string(),
                    found: cred.scheme().to_string(),
                });
            };
            let root = strip_foreign(&session, input)?;
            return Ok(Arc::new(Self::new(session, root)));
        }

        let url = Url::parse(input).map_err(|source| Error::InvalidUrl {
            input: input.to_string(),
            source,
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Protocol(format!("ftp url '{input}' has no host")))?;
        let port = url.port().unwrap_or(21);
        let user = pathstr::decode_component(url.username());
        let password = url.password().map(pathstr::decode_component);
        let session = FtpSession::connect(
            host,
            port,
            (!user.is_empty()).then_some(user.as_str()),
            password.as_deref(),
        )?;
        let root = url.path().trim_start_matches('/').to_string();
        Ok(Arc::new(Self::new(session, root)))
    }

    fn server_path(&self, rel: &str) -> String {
        pathstr::join(&self.root, rel)
    }

    fn unsupported(operation: &'static str) -> Error {
        Error::Unsupported {
            backend: SCHEME,
            operation,
        }
    }
}

fn tidy_root(root: &str) -> String {
    let root = pathstr::normalize(root);
    if root == "." {
        String::new()
    } else {
        root
    }
}

/// Single-level listing over the transport, root-relative on both sides.
struct FtpSource<'a> {
    transport: &'a mut dyn FtpTransport,
    root: &'a str,
}

impl FtpSource<'_> {
    fn relativize(&self, entry: &str, prefix: &str) -> String {
        let rel = pathstr::strip_root(entry, self.root).to_string();
        // some servers echo bare names instead of full paths
        if prefix.is_empty() || rel.starts_with(prefix) {
            rel
        } else {
            pathstr::join(prefix, pathstr::final_component(&rel))
        }
    }
}

impl ListingSource for FtpSource<'_> {
    fn list(&mut self, prefix: &str) -> Result<Listing> {
        let server = pathstr::join(self.root, prefix);
        let arg = (!server.is_empty()).then_some(server.as_str());
        match self.transport.nlst(arg)? {
            Listing::Unavailable => Ok(Listing::Unavailable),
            Listing::Entries(entries) => Ok(Listing::Entries(
                entries
                    .iter()
                    .map(|e| self.relativize(e, prefix))
                    .collect(),
            )),
        }
    }

    fn probe(&mut self, path: &str) -> Result<bool> {
        // membership in the parent's listing, the only probe NLST offers
        let server = pathstr::join(self.root, path);
        let (dir, name) = pathstr::split_last(&server);
        match self.transport.nlst((!dir.is_empty()).then_some(dir))? {
            Listing::Unavailable => Ok(false),
            Listing::Entries(entries) => Ok(entries
                .iter()
                .any(|e| e == &server || pathstr::final_component(e) == name)),
        }
    }
}

/// Exact-path file test: an `NLST` of a file returns exactly one entry equal
/// to the path itself.
fn is_file_at(transport: &mut dyn FtpTransport, path: &str) -> Result<bool> {
    match transport.nlst(Some(path))? {
        Listing::Unavailable => Ok(false),
        Listing::Entries(entries) => Ok(entries.len() == 1 && entries[0] == path),
    }
}

/// `CWD` enterability probe; always returns to the original directory.
fn is_enterable(transport: &mut dyn FtpTransport, path: &str) -> Result<bool> {
    let origin = transport.pwd()?;
    if transport.cwd(path)? {
        transport.cwd(&origin)?;
        return Ok(true);
    }
    Ok(false)
}

/// Segment-by-segment `MKD`, tolerating segments that already exist as
/// directories. Same descent shape as the glob resolver, with a creating
/// action per node.
fn make_segmented(transport: &mut dyn FtpTransport, target: &str) -> Result<()> {
    if target.is_empty() || target == "." || target == "/" {
        return Ok(());
    }
    let absolute = target.starts_with('/');
    let mut current = String::new();
    for segment in target
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
    {
        current = if current.is_empty() && absolute {
            format!("/{segment}")
        } else {
            pathstr::join(&current, segment)
        };
        match transport.mkd(&current)? {
            MkdOutcome::Created => {
                tracing::debug!(path = %current, "MKD");
            }
            MkdOutcome::Refused => {
                if is_file_at(transport, &current)? {
                    return Err(Error::ConflictingEntry(current));
                }
                // already a directory: idempotent success
            }
        }
    }
    Ok(())
}

/// Depth-first subtree deletion: children enterable via `CWD` recurse as
/// directories, everything else is deleted as a file, then the now-empty
/// directory is removed. A permanent error stops the recursion where it is.
fn remove_tree_rec(transport: &mut dyn FtpTransport, path: &str) -> Result<()> {
    let entries = match transport.nlst(Some(path))? {
        Listing::Entries(entries) => entries,
        Listing::Unavailable => Vec::new(),
    };

    if entries.len() == 1 && entries[0] == path {
        // the path is a file, not a directory
        transport.dele(path)?;
        return Ok(());
    }

    let origin = transport.pwd()?;
    for entry in entries {
        let leaf = pathstr::final_component(&entry);
        if leaf == "." || leaf == ".." {
            continue;
        }
        let full = if entry.contains('/') {
            entry.clone()
        } else {
            pathstr::join(path, &entry)
        };
        if transport.cwd(&full)? {
            // never delete the directory we stand in
            transport.cwd(&origin)?;
            remove_tree_rec(transport, &full)?;
        } else {
            tracing::debug!(path = %full, "DELE");
            transport.dele(&full)?;
        }
    }
    tracing::debug!(path = %path, "RMD");
    transport.rmd(path)
}

impl Backend for FtpBackend {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn credential(&self) -> Credential {
        Credential::ftp(Arc::clone(&self.session))
    }

    fn render_root(&self) -> String {
        let user = self.session.user();
        if user.is_empty() {
            format!("ftp://{}/{}", self.session.host(), self.root)
        } else {
            format!("ftp://{}@{}/{}", user, self.session.host(), self.root)
        }
    }

    fn cd(&self, rel: &str) -> Arc<dyn Backend> {
        Arc::new(Self::new(
            Arc::clone(&self.session),
            pathstr::join(&self.root, rel),
        ))
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = strip_foreign(&self.session, pattern)?;
        let mut guard = self.session.lock()?;
        let mut source = FtpSource {
            transport: guard.as_mut(),
            root: &self.root,
        };
        glob::resolve(&mut source, &pattern)
    }

    fn open(&self, rel: &str, mode: OpenMode) -> Result<FileHandle> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        let content = match mode {
            OpenMode::Read | OpenMode::Append => self.session.retrieve(&path)?,
            OpenMode::Write => Vec::new(),
        };
        let sink = (mode != OpenMode::Read).then(|| RemoteSink::Ftp {
            session: Arc::clone(&self.session),
        });
        Ok(FileHandle::buffered(content, sink, path, mode))
    }

    fn make_directories(&self, rel: &str) -> Result<()> {
        let rel = strip_foreign(&self.session, rel)?;
        let target = tidy_root(&self.server_path(&rel));
        make_segmented(self.session.lock()?.as_mut(), &target)
    }

    fn remove_tree(&self, rel: &str) -> Result<()> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        remove_tree_rec(self.session.lock()?.as_mut(), &path)
    }

    fn exists(&self) -> Result<bool> {
        if self.root.is_empty() {
            // the login point always exists
            return Ok(true);
        }
        let mut guard = self.session.lock()?;
        if is_file_at(guard.as_mut(), &self.root)? {
            return Ok(true);
        }
        is_enterable(guard.as_mut(), &self.root)
    }

    fn has(&self, rel: &str) -> Result<bool> {
        let rel = strip_foreign(&self.session, rel)?;
        let mut guard = self.session.lock()?;
        let mut source = FtpSource {
            transport: guard.as_mut(),
            root: &self.root,
        };
        source.probe(&rel)
    }

    fn is_file(&self, rel: &str) -> Result<bool> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        is_file_at(self.session.lock()?.as_mut(), &path)
    }

    fn is_dir(&self, rel: &str) -> Result<bool> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        if path.is_empty() {
            return Ok(true);
        }
        is_enterable(self.session.lock()?.as_mut(), &path)
    }

    fn modified(&self, rel: &str) -> Result<SystemTime> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        self.session.lock()?.mdtm(&path)
    }

    fn accessed(&self, _rel: &str) -> Result<SystemTime> {
        Err(Self::unsupported("access time"))
    }

    fn created(&self, _rel: &str) -> Result<SystemTime> {
        Err(Self::unsupported("creation time"))
    }

    fn size(&self, rel: &str) -> Result<u64> {
        let rel = strip_foreign(&self.session, rel)?;
        let path = self.server_path(&rel);
        self.session.lock()?.size(&path)
    }
}
