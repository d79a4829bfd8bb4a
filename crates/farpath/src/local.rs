//! Local filesystem backend - the default when a path carries no scheme.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::{Backend, FileHandle, OpenMode};
use crate::connection::Credential;
use crate::error::{Error, Result};
use crate::glob::{self, Listing, ListingSource};
use crate::pathstr;

pub const SCHEME: &str = "file";

/// Handler over the host filesystem rooted at one directory string.
pub struct LocalBackend {
    root: String,
}

impl LocalBackend {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: pathstr::normalize(&root.into()),
        }
    }

    /// Registry factory. A supplied credential is accepted only when local;
    /// the local session carries no state so there is nothing to reuse.
    pub(crate) fn factory(input: &str, credential: Option<Credential>) -> Result<Arc<dyn Backend>> {
        if let Some(cred) = credential {
            if !matches!(cred.session(), crate::connection::Session::Local) {
                return Err(Error::ConnectionMismatch {
                    expected: SCHEME.to_string(),
                    found: cred.scheme().to_string(),
                });
            }
        }
        let rel = input.strip_prefix("file://").unwrap_or(input);
        Ok(Arc::new(Self::new(rel)))
    }

    fn fs_path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            // joining "" appends a trailing separator, which breaks stat
            // calls on files
            PathBuf::from(&self.root)
        } else {
            Path::new(&self.root).join(rel)
        }
    }
}

struct LocalSource<'a> {
    root: &'a Path,
}

impl ListingSource for LocalSource<'_> {
    fn list(&mut self, prefix: &str) -> Result<Listing> {
        let dir = self.root.join(prefix);
        if dir.is_file() {
            // mirror list-only servers: a file lists as itself
            return Ok(Listing::Entries(vec![prefix.to_string()]));
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // a missing or non-directory prefix is "no match", not an error
            Err(_) => return Ok(Listing::Unavailable),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push(pathstr::join(prefix, &name));
        }
        Ok(Listing::Entries(out))
    }

    fn probe(&mut self, path: &str) -> Result<bool> {
        Ok(self.root.join(path).exists())
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn credential(&self) -> Credential {
        Credential::local()
    }

    fn render_root(&self) -> String {
        self.root.clone()
    }

    fn cd(&self, rel: &str) -> Arc<dyn Backend> {
        Arc::new(Self::new(pathstr::join(&self.root, rel)))
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let mut source = LocalSource {
            root: Path::new(&self.root),
        };
        glob::resolve(&mut source, pattern)
    }

    fn open(&self, rel: &str, mode: OpenMode) -> Result<FileHandle> {
        let path = self.fs_path(rel);
        let file = match mode {
            OpenMode::Read => fs::File::open(&path)?,
            OpenMode::Write => fs::File::create(&path)?,
            OpenMode::Append => fs::File::options().create(true).append(true).open(&path)?,
        };
        Ok(FileHandle::local(file))
    }

    fn make_directories(&self, rel: &str) -> Result<()> {
        // segment by segment so a conflicting file is reported as such
        // rather than as an opaque io error
        let target = pathstr::normalize(&pathstr::join(&self.root, rel));
        let mut current = PathBuf::from(if target.starts_with('/') { "/" } else { "" });
        for segment in target
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
        {
            current.push(segment);
            if current.exists() {
                if !current.is_dir() {
                    return Err(Error::ConflictingEntry(current.display().to_string()));
                }
            } else {
                fs::create_dir(&current)?;
            }
        }
        Ok(())
    }

    fn remove_tree(&self, rel: &str) -> Result<()> {
        let path = self.fs_path(rel);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(Path::new(&self.root).exists())
    }

    fn has(&self, rel: &str) -> Result<bool> {
        Ok(self.fs_path(rel).exists())
    }

    fn is_file(&self, rel: &str) -> Result<bool> {
        Ok(self.fs_path(rel).is_file())
    }

    fn is_dir(&self, rel: &str) -> Result<bool> {
        Ok(self.fs_path(rel).is_dir())
    }

    fn modified(&self, rel: &str) -> Result<SystemTime> {
        Ok(fs::metadata(self.fs_path(rel))?.modified()?)
    }

    fn accessed(&self, rel: &str) -> Result<SystemTime> {
        Ok(fs::metadata(self.fs_path(rel))?.accessed()?)
    }

    fn created(&self, rel: &str) -> Result<SystemTime> {
        Ok(fs::metadata(self.fs_path(rel))?.created()?)
    }

    fn size(&self, rel: &str) -> Result<u64> {
        Ok(fs::metadata(self.fs_path(rel))?.len())
    }
}
