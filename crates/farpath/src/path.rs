//! Path value model: immutable, composable directory and file values.
//!
//! A [`DirPath`] is a record of `(name, optional parent, bound handler)`,
//! not a string with attributes. The rendered text is derived on demand by
//! walking the parent chain; equality is rendered text plus credential
//! identity, never textual comparison alone. Deriving children performs no
//! I/O and shares the parent's session.

use std::fmt;
use std::io::Write as _;
use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::{Backend, FileHandle, OpenMode};
use crate::connection::Credential;
use crate::error::{Error, Result};
use crate::pathstr;
use crate::registry::SchemeRegistry;

/// One node visited by [`DirPath::walk`].
#[derive(Clone)]
pub enum Entry {
    Dir(DirPath),
    File(FilePath),
}

/// An immutable directory value bound to a storage handler.
#[derive(Clone)]
pub struct DirPath {
    name: String,
    parent: Option<Arc<DirPath>>,
    backend: Arc<dyn Backend>,
}

impl DirPath {
    /// Root value for a path string, connecting if the scheme requires it.
    pub fn new(registry: &SchemeRegistry, path: &str) -> Result<Self> {
        Ok(Self::root(registry.resolve(path, None)?))
    }

    /// Root value reusing an already-open session. The path string must
    /// agree with the credential's host and user.
    pub fn with_credential(
        registry: &SchemeRegistry,
        path: &str,
        credential: Credential,
    ) -> Result<Self> {
        Ok(Self::root(registry.resolve(path, Some(credential))?))
    }

    fn root(backend: Arc<dyn Backend>) -> Self {
        Self {
            name: backend.render_root(),
            parent: None,
            backend,
        }
    }

    /// Final path segment (or the rendered root for a root value).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&DirPath> {
        self.parent.as_deref()
    }

    /// Credential shared by every value derived from this one.
    pub fn connection(&self) -> Credential {
        self.backend.credential()
    }

    /// Rendered path, recomputed by walking the parent chain. Passwords
    /// never appear in the rendered form.
    pub fn full_path(&self) -> String {
        match &self.parent {
            Some(parent) => pathstr::join(&parent.full_path(), &self.name),
            None => self.name.clone(),
        }
    }

    /// Rebind to another directory over the same session. Pure, no parent
    /// link, no I/O.
    pub fn cd(&self, rel: &str) -> DirPath {
        Self::root(self.backend.cd(rel))
    }

    /// Child directory value; `parent` points back here. Pure.
    pub fn dir(&self, name: &str) -> DirPath {
        DirPath {
            name: name.to_string(),
            parent: Some(Arc::new(self.clone())),
            backend: self.backend.cd(name),
        }
    }

    /// Child file value; files never have children of their own. Pure.
    pub fn file(&self, name: &str) -> FilePath {
        FilePath {
            name: name.to_string(),
            parent: self.clone(),
        }
    }

    /// Relative names matching a glob pattern, in the backend's native
    /// listing order.
    pub fn list(&self, pattern: &str) -> Result<Vec<String>> {
        self.backend.list(pattern)
    }

    /// Like [`DirPath::list`], passing every name through `wrap`.
    pub fn list_with<T>(&self, pattern: &str, mut wrap: impl FnMut(&str) -> T) -> Result<Vec<T>> {
        Ok(self.list(pattern)?.iter().map(|n| wrap(n)).collect())
    }

    /// Matching names wrapped as child directory values.
    pub fn dirs(&self, pattern: &str) -> Result<Vec<DirPath>> {
        self.list_with(pattern, |n| self.dir(n))
    }

    /// Matching names wrapped as child file values.
    pub fn files(&self, pattern: &str) -> Result<Vec<FilePath>> {
        self.list_with(pattern, |n| self.file(n))
    }

    /// Ensure this directory exists, creating missing intermediates.
    /// Idempotent; fails only when a non-directory entry occupies a
    /// segment.
    pub fn build(&self) -> Result<()> {
        self.backend.make_directories("")
    }

    /// Create a subdirectory and its intermediates.
    pub fn make_dirs(&self, rel: &str) -> Result<()> {
        self.backend.make_directories(rel)
    }

    /// Recursively delete this directory and everything below it.
    pub fn remove_tree(&self) -> Result<()> {
        self.backend.remove_tree("")
    }

    pub fn exists(&self) -> Result<bool> {
        self.backend.exists()
    }

    pub fn is_dir(&self) -> Result<bool> {
        self.backend.is_dir("")
    }

    pub fn is_file(&self) -> Result<bool> {
        self.backend.is_file("")
    }

    pub fn modified(&self) -> Result<SystemTime> {
        self.backend.modified("")
    }

    pub fn size(&self) -> Result<u64> {
        self.backend.size("")
    }

    /// Depth-first traversal. Directories are visited before their
    /// contents; an error from `visit` or the backend stops the walk.
    pub fn walk(&self, visit: &mut dyn FnMut(&Entry) -> Result<()>) -> Result<()> {
        for name in self.list("*")? {
            if self.backend.is_dir(&name)? {
                let dir = self.dir(&name);
                visit(&Entry::Dir(dir.clone()))?;
                dir.walk(visit)?;
            } else {
                visit(&Entry::File(self.file(&name)))?;
            }
        }
        Ok(())
    }

    /// Copy every file matching `pattern` into `into`, flattened to final
    /// components. The destination is created first. Returns the created
    /// file values.
    pub fn fetch(&self, pattern: &str, into: &DirPath) -> Result<Vec<FilePath>> {
        into.build()?;
        let mut out = Vec::new();
        for src in self.files(pattern)? {
            let dest = into.file(pathstr::final_component(src.name()));
            src.copy_to(&dest)?;
            out.push(dest);
        }
        Ok(out)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

impl fmt::Debug for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirPath")
            .field("path", &self.full_path())
            .field("scheme", &self.backend.scheme())
            .finish()
    }
}

impl PartialEq for DirPath {
    fn eq(&self, other: &Self) -> bool {
        self.full_path() == other.full_path() && self.connection() == other.connection()
    }
}

/// An immutable file value; a leaf, never a parent.
#[derive(Clone)]
pub struct FilePath {
    name: String,
    parent: DirPath,
}

impl FilePath {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &DirPath {
        &self.parent
    }

    pub fn connection(&self) -> Credential {
        self.parent.connection()
    }

    pub fn full_path(&self) -> String {
        pathstr::join(&self.parent.full_path(), &self.name)
    }

    /// `(owning directory, final segment)`.
    pub fn split(&self) -> (DirPath, &str) {
        (self.parent.clone(), &self.name)
    }

    /// Extension of the name, leading dot included; empty when none.
    pub fn ext(&self) -> &str {
        pathstr::extension(&self.name)
    }

    /// Sibling value with the extension replaced. `ext` may be given with
    /// or without the leading dot.
    pub fn with_ext(&self, ext: &str) -> FilePath {
        let stem = &self.name[..self.name.len() - self.ext().len()];
        let dot = if ext.is_empty() || ext.starts_with('.') {
            ""
        } else {
            "."
        };
        self.parent.file(&format!("{stem}{dot}{ext}"))
    }

    /// Open as a scoped resource. Remote write handles flush exactly once,
    /// in [`FileHandle::close`].
    pub fn open(&self, mode: OpenMode) -> Result<FileHandle> {
        self.parent.backend().open(&self.name, mode)
    }

    /// Whole content as bytes.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut handle = self.open(OpenMode::Read)?;
        let data = handle.read_to_end()?;
        handle.close()?;
        Ok(data)
    }

    /// Whole content as UTF-8 text.
    pub fn read_text(&self) -> Result<String> {
        let mut handle = self.open(OpenMode::Read)?;
        let text = handle.read_to_string()?;
        handle.close()?;
        Ok(text)
    }

    /// Replace the content with `data`.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut handle = self.open(OpenMode::Write)?;
        handle.write_all(data)?;
        handle.close()
    }

    /// Create the parent chain and write `data`. Refuses to overwrite an
    /// existing file unless `clobber` is set.
    pub fn create(&self, data: &[u8], clobber: bool) -> Result<()> {
        if !clobber && self.exists()? {
            return Err(Error::AlreadyExists(self.full_path()));
        }
        self.build()?;
        self.write(data)
    }

    /// Copy this file's content into `dest`, which may live on another
    /// backend.
    pub fn copy_to(&self, dest: &FilePath) -> Result<()> {
        let data = self.read()?;
        dest.write(&data)
    }

    /// Ensure the parent directory chain exists.
    pub fn build(&self) -> Result<()> {
        self.parent.build()
    }

    pub fn exists(&self) -> Result<bool> {
        self.parent.backend().has(&self.name)
    }

    pub fn is_file(&self) -> Result<bool> {
        self.parent.backend().is_file(&self.name)
    }

    pub fn is_dir(&self) -> Result<bool> {
        self.parent.backend().is_dir(&self.name)
    }

    pub fn modified(&self) -> Result<SystemTime> {
        self.parent.backend().modified(&self.name)
    }

    pub fn accessed(&self) -> Result<SystemTime> {
        self.parent.backend().accessed(&self.name)
    }

    pub fn created(&self) -> Result<SystemTime> {
        self.parent.backend().created(&self.name)
    }

    pub fn size(&self) -> Result<u64> {
        self.parent.backend().size(&self.name)
    }

    /// Delete the file.
    pub fn remove(&self) -> Result<()> {
        self.parent.backend().remove_tree(&self.name)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePath")
            .field("path", &self.full_path())
            .finish()
    }
}

impl PartialEq for FilePath {
    fn eq(&self, other: &Self) -> bool {
        self.full_path() == other.full_path() && self.connection() == other.connection()
    }
}
