//! Scheme registry: maps a scheme token to a backend factory.
//!
//! Scheme detection happens once, when a root path value is constructed.
//! The chosen handler is carried by the value afterwards; no per-operation
//! scheme inspection happens anywhere downstream. Registries are explicit
//! objects so embedders can register their own schemes or replace the
//! defaults.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::backend::Backend;
use crate::connection::Credential;
use crate::error::{Error, Result};
use crate::{ftp, http, local};

/// Builds a bound handler from a path string and an optional live
/// credential to reuse.
pub type HandlerFactory =
    Box<dyn Fn(&str, Option<Credential>) -> Result<Arc<dyn Backend>> + Send + Sync>;

pub struct SchemeRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl SchemeRegistry {
    /// An empty registry with no schemes at all.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The stock registry: `file` (also the fallback for scheme-less
    /// paths), `ftp`, and `http`/`https`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(local::SCHEME, Box::new(local::LocalBackend::factory));
        registry.register(ftp::SCHEME, Box::new(ftp::FtpBackend::factory));
        registry.register(http::SCHEME, Box::new(http::HttpBackend::factory));
        registry.register("https", Box::new(http::HttpBackend::factory));
        registry
    }

    pub fn register(&mut self, scheme: impl Into<String>, factory: HandlerFactory) {
        self.factories.insert(scheme.into(), factory);
    }

    /// Registered scheme tokens, in no particular order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the handler for a path string.
    ///
    /// With a credential, its scheme selects the factory and the live
    /// session is handed to it for reuse. Otherwise the scheme is read off
    /// the string itself; strings that are not URLs are local paths.
    pub fn resolve(
        &self,
        input: &str,
        credential: Option<Credential>,
    ) -> Result<Arc<dyn Backend>> {
        let scheme = match &credential {
            Some(cred) => cred.scheme().to_string(),
            None => detect_scheme(input)?,
        };
        let factory = self
            .factories
            .get(&scheme)
            .ok_or(Error::UnknownScheme(scheme))?;
        factory(input, credential)
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn detect_scheme(input: &str) -> Result<String> {
    match Url::parse(input) {
        Ok(url) => Ok(url.scheme().to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(local::SCHEME.to_string()),
        Err(source) => Err(Error::InvalidUrl {
            input: input.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_fall_back_to_local() {
        let registry = SchemeRegistry::with_defaults();
        let backend = registry.resolve("data/2021", None).unwrap();
        assert_eq!(backend.scheme(), "file");
        assert!(!backend.is_remote());

        let backend = registry.resolve("/var/tmp", None).unwrap();
        assert_eq!(backend.root(), "/var/tmp");
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let registry = SchemeRegistry::with_defaults();
        let err = registry.resolve("sftp://host/dir", None).err();
        assert!(matches!(err, Some(Error::UnknownScheme(s)) if s == "sftp"));
    }

    #[test]
    fn malformed_urls_are_reported_as_such() {
        let registry = SchemeRegistry::with_defaults();
        let err = registry.resolve("http://", None).err();
        assert!(matches!(err, Some(Error::InvalidUrl { .. })));
    }

    #[test]
    fn credential_scheme_overrides_detection() {
        let registry = SchemeRegistry::with_defaults();
        // a local credential routes even a bare string to the local factory
        let backend = registry
            .resolve("anywhere", Some(Credential::local()))
            .unwrap();
        assert_eq!(backend.scheme(), "file");
    }

    #[test]
    fn custom_schemes_can_be_registered() {
        let mut registry = SchemeRegistry::new();
        registry.register(
            "mem",
            Box::new(|input, _cred| {
                Ok(Arc::new(local::LocalBackend::new(
                    input.strip_prefix("mem://").unwrap_or(input),
                )) as Arc<dyn Backend>)
            }),
        );
        let backend = registry.resolve("mem://scratch", None).unwrap();
        assert_eq!(backend.root(), "scratch");
        assert!(registry.resolve("file.txt", None).is_err());
    }
}
