//! Canonical hostname extraction from request headers.
//!
//! ```rust
//! use tenantry_core::host::resolve_host;
//!
//! let headers = [("host", "Acme.Example.com:3000")];
//! assert_eq!(resolve_host(&headers[..]).unwrap(), "acme.example.com");
//! ```

use std::collections::HashMap;

use http::HeaderMap;

use crate::error::{TenancyError, TenancyResult};

/// Header set by reverse proxies carrying the client-facing host.
pub const FORWARDED_HOST: &str = "x-forwarded-host";

/// The standard HTTP host header.
pub const HOST: &str = "host";

/// Read access to request headers by lower-case name.
pub trait HeaderLookup {
    /// Get the first value of a header, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }
}

impl HeaderLookup for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderLookup for [(K, V)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }
}

/// Resolve the canonical hostname of a request.
///
/// Prefers `x-forwarded-host` over `host`, keeps only the first entry of a
/// forwarded chain, strips any `:port` suffix and lower-cases the result.
pub fn resolve_host<H: HeaderLookup + ?Sized>(headers: &H) -> TenancyResult<String> {
    let raw = non_blank(headers.header(FORWARDED_HOST))
        .and_then(|v| non_blank(v.split(',').next()))
        .or_else(|| non_blank(headers.header(HOST)))
        .ok_or(TenancyError::MissingHost)?;

    let host = strip_port(raw);
    if host.is_empty() {
        return Err(TenancyError::MissingHost);
    }
    Ok(host.to_ascii_lowercase())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn strip_port(host: &str) -> &str {
    // [v6]:port keeps its brackets
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.split_once(':') {
        Some((name, _port)) => name,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_host_header() {
        let headers = [("host", "example.com")];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "example.com");
    }

    #[test]
    fn test_forwarded_host_wins() {
        let headers = [
            ("Host", "internal.local:8080"),
            ("X-Forwarded-Host", "acme.example.com"),
        ];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "acme.example.com");
    }

    #[test]
    fn test_port_and_case() {
        let headers = [("host", "Example.COM:3000")];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "example.com");

        let plain = [("host", "example.com")];
        assert_eq!(
            resolve_host(&headers[..]).unwrap(),
            resolve_host(&plain[..]).unwrap()
        );
    }

    #[test]
    fn test_forwarded_chain() {
        let headers = [("x-forwarded-host", " Beta.Example.com:443 , proxy.internal")];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "beta.example.com");
    }

    #[test]
    fn test_blank_forwarded_falls_back() {
        let headers = [("x-forwarded-host", "  "), ("host", "acme.example.com")];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "acme.example.com");
    }

    #[test]
    fn test_ipv6_literal() {
        let headers = [("host", "[::1]:8080")];
        assert_eq!(resolve_host(&headers[..]).unwrap(), "[::1]");
    }

    #[test]
    fn test_missing_host() {
        let headers: [(&str, &str); 0] = [];
        assert!(matches!(
            resolve_host(&headers[..]),
            Err(TenancyError::MissingHost)
        ));

        let only_port = [("host", ":3000")];
        assert!(matches!(
            resolve_host(&only_port[..]),
            Err(TenancyError::MissingHost)
        ));
    }

    #[test]
    fn test_header_map() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("crm.example.com:80"));
        assert_eq!(resolve_host(&headers).unwrap(), "crm.example.com");
    }

    #[test]
    fn test_hash_map() {
        let mut headers = HashMap::new();
        headers.insert("Host".to_string(), "CRM.example.com".to_string());
        assert_eq!(resolve_host(&headers).unwrap(), "crm.example.com");
    }
}
