//! API endpoint derivation
//!
//! The REST base URL is the single source of truth; stream URLs are derived
//! from it by upgrading the scheme to its real-time equivalent.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Stream resource carrying the current address
pub const ADDRESS_STREAM: &str = "stream/address";

/// Stream resource carrying the list of managed records
pub const RECORD_STREAM: &str = "stream/record";

/// Availability endpoint used by health probes
pub const INFO_RESOURCE: &str = "info";

/// Stream resource carrying resolution results for one record
pub fn resolve_stream(record_id: u64) -> String {
    format!("stream/resolve/{}", record_id)
}

/// Base URL of an hdns API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    base: Url,
}

impl ApiEndpoint {
    /// Parse a base URL
    ///
    /// Accepts `http`, `https`, `ws` and `wss`. A trailing slash is added to
    /// the path so that resources are resolved below it.
    pub fn parse(base: &str) -> Result<Self> {
        let mut url = Url::parse(base.trim())?;

        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_url(format!(
                    "unsupported scheme '{}' in {}",
                    other, base
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(Error::invalid_url(format!("missing host in {}", base)));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { base: url })
    }

    /// The normalized base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of a REST resource below the base
    pub fn http_url(&self, resource: &str) -> Result<Url> {
        let mut url = self.join(resource)?;
        let scheme = match url.scheme() {
            "ws" => Some("http"),
            "wss" => Some("https"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            set_scheme(&mut url, scheme)?;
        }
        Ok(url)
    }

    /// URL of a real-time stream resource below the base
    ///
    /// Query pairs with a `None` value are omitted.
    pub fn stream_url(&self, resource: &str, query: &[(&str, Option<String>)]) -> Result<Url> {
        let mut url = self.join(resource)?;
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            set_scheme(&mut url, scheme)?;
        }

        let present: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }

        Ok(url)
    }

    fn join(&self, resource: &str) -> Result<Url> {
        let resource = resource.trim_start_matches('/');
        if resource.is_empty() {
            return Err(Error::invalid_input("resource name cannot be empty"));
        }
        Ok(self.base.join(resource)?)
    }
}

impl FromStr for ApiEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)
    }
}

fn set_scheme(url: &mut Url, scheme: &str) -> Result<()> {
    url.set_scheme(scheme)
        .map_err(|_| Error::invalid_url(format!("cannot switch {} to {}", url, scheme)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrades_http_to_ws_and_keeps_host_and_port() {
        let endpoint = ApiEndpoint::parse("http://localhost:8080/api/").unwrap();
        let url = endpoint.stream_url(ADDRESS_STREAM, &[]).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/api/stream/address");
    }

    #[test]
    fn upgrades_https_to_wss() {
        let endpoint = ApiEndpoint::parse("https://dns.example.org/api").unwrap();
        let url = endpoint.stream_url(&resolve_stream(7), &[]).unwrap();
        assert_eq!(url.as_str(), "wss://dns.example.org/api/stream/resolve/7");
    }

    #[test]
    fn omits_absent_query_values() {
        let endpoint = ApiEndpoint::parse("http://10.0.0.2:9000/api/").unwrap();
        let url = endpoint
            .stream_url(
                RECORD_STREAM,
                &[("zone", Some("abc".to_string())), ("token", None)],
            )
            .unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.2:9000/api/stream/record?zone=abc");

        let bare = endpoint
            .stream_url(RECORD_STREAM, &[("token", None)])
            .unwrap();
        assert_eq!(bare.query(), None);
    }

    #[test]
    fn rest_urls_stay_on_http() {
        let endpoint = ApiEndpoint::parse("ws://localhost:8080/api/").unwrap();
        let url = endpoint.http_url(INFO_RESOURCE).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/info");
    }

    #[test]
    fn rejects_unsupported_schemes() {
        assert!(ApiEndpoint::parse("ftp://example.org/api/").is_err());
        assert!(ApiEndpoint::parse("not a url").is_err());
    }

    #[test]
    fn rejects_empty_resource() {
        let endpoint = ApiEndpoint::parse("http://localhost:8080/api/").unwrap();
        assert!(endpoint.stream_url("/", &[]).is_err());
    }
}
