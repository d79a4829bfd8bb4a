//! Read-only HTTP backend.
//!
//! HTTP has no native directory protocol, so "listing" a directory means
//! fetching the page at that URL and scraping its outbound references
//! (`href` and `src` attributes), filtered to the session's own host.
//! Scraped listings are cached per directory for the lifetime of the
//! session. Writes and directory mutation are refused before any network
//! traffic happens.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use globset::GlobBuilder;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::backend::{Backend, FileHandle, OpenMode};
use crate::connection::{Credential, Session};
use crate::error::{Error, Result};
use crate::pathstr;

pub const SCHEME: &str = "http";

static ANCHORS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("static selector")
});
static SOURCES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[src]").expect("static selector")
});

/// Extract same-host references from an HTML page, as host-relative paths,
/// de-duplicated in document order.
fn extract_refs(html: &str, host: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let raw = doc
        .select(&ANCHORS)
        .filter_map(|el| el.value().attr("href"))
        .chain(doc.select(&SOURCES).filter_map(|el| el.value().attr("src")));
    for r in raw {
        if let Some(path) = same_host_path(r, host) {
            if !path.is_empty() && seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    out
}

/// Reduce one reference to a host-relative path, or `None` when it points
/// off-host (foreign origin, `mailto:`, fragment-only).
fn same_host_path(raw: &str, host: &str) -> Option<String> {
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        // protocol-relative: keep only when it names our host
        let path = rest.strip_prefix(host)?;
        return Some(trim_query(path).trim_matches('/').to_string());
    }
    match Url::parse(raw) {
        Ok(url) => (url.host_str() == Some(host))
            .then(|| url.path().trim_matches('/').to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Some(trim_query(raw).trim_matches('/').to_string())
        }
        Err(_) => None,
    }
}

fn trim_query(r: &str) -> &str {
    let end = r.find(['?', '#']).unwrap_or(r.len());
    &r[..end]
}

fn wire_err(err: &reqwest::Error) -> Error {
    Error::Protocol(err.to_string())
}

/// One HTTP origin: the client, the host it is pinned to and the scraped
/// listing cache keyed by directory path.
pub struct HttpSession {
    client: Client,
    origin: String,
    host: String,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl HttpSession {
    /// Build a session for the origin of `url` (scheme, host, port).
    pub fn new(url: &str) -> Result<Arc<Self>> {
        let parsed = Url::parse(url).map_err(|source| Error::InvalidUrl {
            input: url.to_string(),
            source,
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Protocol(format!("http url '{url}' has no host")))?
            .to_string();
        let mut origin = format!("{}://{host}", parsed.scheme());
        if let Some(port) = parsed.port() {
            origin.push_str(&format!(":{port}"));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| wire_err(&e))?;
        Ok(Arc::new(Self {
            client,
            origin,
            host,
            cache: Mutex::new(HashMap::new()),
        }))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn page_url(&self, dir: &str) -> String {
        if dir.is_empty() {
            format!("{}/", self.origin)
        } else {
            format!("{}/{}/", self.origin, dir.trim_matches('/'))
        }
    }

    /// Scraped references of one directory page, served from cache after the
    /// first fetch.
    fn refs(&self, dir: &str) -> Result<Vec<String>> {
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| Error::Protocol("http cache lock poisoned".to_string()))?;
            if let Some(hit) = cache.get(dir) {
                return Ok(hit.clone());
            }
        }
        let url = self.page_url(dir);
        tracing::debug!(%url, "fetching directory page");
        let body = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| wire_err(&e))?
            .text()
            .map_err(|e| wire_err(&e))?;
        let refs = extract_refs(&body, &self.host);
        self.cache
            .lock()
            .map_err(|_| Error::Protocol("http cache lock poisoned".to_string()))?
            .insert(dir.to_string(), refs.clone());
        Ok(refs)
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.origin, path.trim_start_matches('/'));
        tracing::debug!(%url, "GET");
        let body = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| wire_err(&e))?
            .bytes()
            .map_err(|e| wire_err(&e))?;
        Ok(body.to_vec())
    }
}

/// Reject path strings naming a different host; return the origin-relative
/// path.
fn strip_foreign(session: &HttpSession, input: &str) -> Result<String> {
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
    Ok(url.path().trim_matches('/').to_string())
}

/// Directory handler over one origin-relative path of an HTTP session.
pub struct HttpBackend {
    session: Arc<HttpSession>,
    root: String,
}

impl HttpBackend {
    pub fn new(session: Arc<HttpSession>, root: impl Into<String>) -> Self {
        Self {
            session,
            root: root.into().trim_matches('/').to_string(),
        }
    }

    pub(crate) fn factory(input: &str, credential: Option<Credential>) -> Result<Arc<dyn Backend>> {
        if let Some(cred) = credential {
            let Session::Http(session) = cred.session().clone() else {
                return Err(Error::ConnectionMismatch {
                    expected: SCHEME.to_string(),
                    found: cred.scheme().to_string(),
                });
            };
            let root = strip_foreign(&session, input)?;
            return Ok(Arc::new(Self::new(session, root)));
        }
        let session = HttpSession::new(input)?;
        let url = Url::parse(input).map_err(|source| Error::InvalidUrl {
            input: input.to_string(),
            source,
        })?;
        let root = url.path().trim_matches('/').to_string();
        Ok(Arc::new(Self::new(session, root)))
    }

    fn unsupported(operation: &'static str) -> Error {
        Error::Unsupported {
            backend: SCHEME,
            operation,
        }
    }
}

impl Backend for HttpBackend {
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
        Credential::http(Arc::clone(&self.session))
    }

    fn render_root(&self) -> String {
        format!("{}/{}", self.session.origin(), self.root)
    }

    fn cd(&self, rel: &str) -> Arc<dyn Backend> {
        Arc::new(Self::new(
            Arc::clone(&self.session),
            pathstr::join(&self.root, rel),
        ))
    }

    /// Scraped references of the directory page matching the pattern.
    ///
    /// Scraped references are not a real directory tree, so the pattern is
    /// matched against whole references, `/` included, rather than resolved
    /// segment by segment.
    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = strip_foreign(&self.session, pattern)?;
        let refs = self.session.refs(&self.root)?;
        // scraped refs mix page-relative and host-relative forms; reduce
        // both to root-relative names so derived children resolve to the
        // URLs the listing named
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for r in &refs {
            let name = pathstr::strip_root(r, &self.root).to_string();
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        if pattern.is_empty() || pattern == "*" {
            return Ok(names);
        }
        let matcher = GlobBuilder::new(&pattern)
            .build()?
            .compile_matcher();
        Ok(names
            .into_iter()
            .filter(|r| matcher.is_match(r.as_str()))
            .collect())
    }

    fn open(&self, rel: &str, mode: OpenMode) -> Result<FileHandle> {
        if mode != OpenMode::Read {
            // refuse before any network traffic
            return Err(Self::unsupported("writing"));
        }
        let rel = strip_foreign(&self.session, rel)?;
        let path = pathstr::join(&self.root, &rel);
        let content = self.session.fetch(&path)?;
        Ok(FileHandle::buffered(content, None, path, mode))
    }

    fn make_directories(&self, _rel: &str) -> Result<()> {
        Err(Self::unsupported("creating directories"))
    }

    fn remove_tree(&self, _rel: &str) -> Result<()> {
        Err(Self::unsupported("deleting"))
    }

    // HTTP cannot distinguish a missing resource from a present one without
    // fetching it; existence is assumed and files are the only entry kind,
    // so reads fail at fetch time instead.
    fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    fn has(&self, _rel: &str) -> Result<bool> {
        Ok(true)
    }

    fn is_file(&self, _rel: &str) -> Result<bool> {
        Ok(true)
    }

    fn is_dir(&self, _rel: &str) -> Result<bool> {
        Ok(false)
    }

    fn modified(&self, _rel: &str) -> Result<SystemTime> {
        Err(Self::unsupported("modification time"))
    }

    fn accessed(&self, _rel: &str) -> Result<SystemTime> {
        Err(Self::unsupported("access time"))
    }

    fn created(&self, _rel: &str) -> Result<SystemTime> {
        Err(Self::unsupported("creation time"))
    }

    fn size(&self, _rel: &str) -> Result<u64> {
        Err(Self::unsupported("size"))
    }
}

#[cfg(test)]
impl HttpSession {
    fn prime(&self, dir: &str, refs: Vec<String>) {
        self.cache.lock().unwrap().insert(dir.to_string(), refs);
    }
}
