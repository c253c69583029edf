//! Parsed backend targets.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use url::Url;

/// Error returned when a backend URL cannot be used as a target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid backend URL {url:?}: {source}")]
    Parse { url: String, source: url::ParseError },

    #[error("backend URL {0:?} has no host")]
    MissingHost(String),

    #[error("unsupported scheme in backend URL {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("invalid authority in backend URL {0:?}")]
    Authority(String),
}

/// Scheme and authority of a backend, fixed at startup.
///
/// Path, query and fragment of the configured URL are ignored; requests keep
/// their own path when they are re-targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    scheme: Scheme,
    authority: Authority,
}

impl BackendTarget {
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Build a URI on this backend for the given path and query.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl FromStr for BackendTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let url = Url::parse(raw).map_err(|source| TargetError::Parse {
            url: raw.to_string(),
            source,
        })?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            _ => return Err(TargetError::UnsupportedScheme(raw.to_string())),
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TargetError::MissingHost(raw.to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority =
            Authority::from_str(&authority).map_err(|_| TargetError::Authority(raw.to_string()))?;

        Ok(Self { scheme, authority })
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
