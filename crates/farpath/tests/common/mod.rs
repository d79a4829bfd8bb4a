//! In-memory FTP transport for integration tests.
//!
//! Models the observable behavior of a plain FTP server well enough for the
//! backend: `NLST` of a directory returns full child paths, `NLST` of a file
//! echoes the single path back, `CWD` only enters directories, and deletions
//! are recorded in the order the server received them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use farpath::{Error, FtpSession, FtpTransport, Listing, MkdOutcome, Result};

static TRACE: Once = Once::new();

/// Route protocol round-trip logs into captured test output.
fn init_tracing() {
    TRACE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
pub struct State {
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
    /// Every `DELE`/`RMD` target, in arrival order.
    pub deleted: Vec<String>,
    pub cwd: String,
}

impl State {
    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let child_of = |p: &String| {
            p.strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        };
        self.dirs
            .iter()
            .filter(|p| child_of(p))
            .chain(self.files.keys().filter(|p| child_of(p)))
            .cloned()
            .collect()
    }
}

pub struct MemoryFtp {
    state: Arc<Mutex<State>>,
}

impl MemoryFtp {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl FtpTransport for MemoryFtp {
    fn nlst(&mut self, path: Option<&str>) -> Result<Listing> {
        let state = self.state();
        let path = path.unwrap_or("");
        if state.files.contains_key(path) {
            return Ok(Listing::Entries(vec![path.to_string()]));
        }
        if path.is_empty() || state.dirs.contains(path) {
            return Ok(Listing::Entries(state.children(path)));
        }
        Ok(Listing::Unavailable)
    }

    fn retr(&mut self, path: &str) -> Result<Vec<u8>> {
        self.state()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("550 {path}: no such file")))
    }

    fn stor(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.state().files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn mkd(&mut self, path: &str) -> Result<MkdOutcome> {
        let mut state = self.state();
        if state.dirs.contains(path) || state.files.contains_key(path) {
            return Ok(MkdOutcome::Refused);
        }
        state.dirs.insert(path.to_string());
        Ok(MkdOutcome::Created)
    }

    fn rmd(&mut self, path: &str) -> Result<()> {
        let mut state = self.state();
        if !state.dirs.contains(path) {
            return Err(Error::Protocol(format!("550 {path}: not a directory")));
        }
        if !state.children(path).is_empty() {
            return Err(Error::Protocol(format!("550 {path}: directory not empty")));
        }
        state.dirs.remove(path);
        state.deleted.push(path.to_string());
        Ok(())
    }

    fn dele(&mut self, path: &str) -> Result<()> {
        let mut state = self.state();
        if state.files.remove(path).is_none() {
            return Err(Error::Protocol(format!("550 {path}: no such file")));
        }
        state.deleted.push(path.to_string());
        Ok(())
    }

    fn cwd(&mut self, path: &str) -> Result<bool> {
        let mut state = self.state();
        if path == "/" || path.is_empty() || state.dirs.contains(path) {
            state.cwd = path.to_string();
            return Ok(true);
        }
        Ok(false)
    }

    fn pwd(&mut self) -> Result<String> {
        let state = self.state();
        Ok(if state.cwd.is_empty() {
            "/".to_string()
        } else {
            state.cwd.clone()
        })
    }

    fn mdtm(&mut self, path: &str) -> Result<SystemTime> {
        if self.state().files.contains_key(path) {
            Ok(UNIX_EPOCH + Duration::from_secs(1_600_000_000))
        } else {
            Err(Error::Protocol(format!("550 {path}: no such file")))
        }
    }

    fn size(&mut self, path: &str) -> Result<u64> {
        self.state()
            .files
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| Error::Protocol(format!("550 {path}: no such file")))
    }
}

/// A logged-in session over a fresh in-memory server, plus a handle on its
/// state for assertions.
pub fn memory_session(
    dirs: &[&str],
    files: &[(&str, &[u8])],
) -> (Arc<FtpSession>, Arc<Mutex<State>>) {
    init_tracing();
    let state = Arc::new(Mutex::new(State {
        dirs: dirs.iter().map(|d| (*d).to_string()).collect(),
        files: files
            .iter()
            .map(|(p, c)| ((*p).to_string(), c.to_vec()))
            .collect(),
        deleted: Vec::new(),
        cwd: String::new(),
    }));
    let transport = MemoryFtp {
        state: Arc::clone(&state),
    };
    let session = FtpSession::from_transport(Box::new(transport), "host", "user");
    (session, state)
}
