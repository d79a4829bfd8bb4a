//! Connection credentials shared along a path chain.
//!
//! A [`Credential`] pairs a scheme token with the live backend session.
//! Every node derived from one root carries a clone of the same credential,
//! so descendant paths reuse the session instead of reconnecting. Equality
//! is scheme plus *session identity* (the same shared handle), never textual
//! path equality.

use std::fmt;
use std::sync::Arc;

use crate::ftp::FtpSession;
use crate::http::HttpSession;

/// Native session handle carried by a credential.
#[derive(Clone)]
pub enum Session {
    /// Local disk access; no session state.
    Local,
    /// A live FTP control connection.
    Ftp(Arc<FtpSession>),
    /// An HTTP origin with its client and per-directory listing cache.
    Http(Arc<HttpSession>),
}

/// `(scheme, native session)` pair propagated along a path's ancestry.
#[derive(Clone)]
pub struct Credential {
    scheme: String,
    session: Session,
}

impl Credential {
    pub fn local() -> Self {
        Self {
            scheme: crate::local::SCHEME.to_string(),
            session: Session::Local,
        }
    }

    pub fn ftp(session: Arc<FtpSession>) -> Self {
        Self {
            scheme: crate::ftp::SCHEME.to_string(),
            session: Session::Ftp(session),
        }
    }

    pub fn http(session: Arc<HttpSession>) -> Self {
        Self {
            scheme: crate::http::SCHEME.to_string(),
            session: Session::Http(session),
        }
    }

    /// Scheme token this credential belongs to (`file`, `ftp`, `http`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True when both credentials wrap the same native session. Two local
    /// credentials always share the (stateless) local session.
    pub fn shares_session(&self, other: &Self) -> bool {
        match (&self.session, &other.session) {
            (Session::Local, Session::Local) => true,
            (Session::Ftp(a), Session::Ftp(b)) => Arc::ptr_eq(a, b),
            (Session::Http(a), Session::Http(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.shares_session(other)
    }
}

impl fmt::Debug for Credential {
    // never render session internals; they may retain a password
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}
