//! Error taxonomy shared by every backend.
//!
//! Backend adapters translate native transport errors into these variants at
//! the handler boundary; the path layer never inspects transport error codes.

/// Library error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL scheme not present in the registry.
    #[error("unknown scheme '{0}'")]
    UnknownScheme(String),

    /// Input could not be parsed as a path or URL.
    #[error("invalid path or url '{input}': {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    /// A path string names a host or user that disagrees with the session it
    /// is being combined with. Raised instead of silently reconnecting.
    #[error("connection mismatch: expected '{expected}', got '{found}'")]
    ConnectionMismatch { expected: String, found: String },

    /// Operation the backend cannot perform (write on HTTP, access time on
    /// FTP, ...). Does not affect credential state.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Backend reported "temporarily unable to list". Treated as zero
    /// matches during glob resolution, never surfaced from a listing call.
    #[error("transient listing failure at '{0}'")]
    TransientListing(String),

    /// Any other backend protocol error. Aborts the in-flight operation.
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// A non-directory entry occupies a path segment that `build` or
    /// `make_dirs` expected to be a directory.
    #[error("conflicting entry at '{0}': exists but is not a directory")]
    ConflictingEntry(String),

    /// Refusal to clobber an existing file without `clobber = true`.
    #[error("file already exists: '{0}'")]
    AlreadyExists(String),

    /// Local filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed glob pattern.
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
