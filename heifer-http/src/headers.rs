//! Parsing of the caching-related request and response headers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::{AGE, CACHE_CONTROL, HeaderName, PRAGMA};
use http::{HeaderMap, HeaderValue};
use tracing::warn;

pub use heifer_core::date::{format_http_date, parse_http_date};

/// Name of the diagnostic response header.
pub const DIAGNOSTIC_HEADER: HeaderName = HeaderName::from_static("x-cachecow");

/// `max-stale` request directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStale {
    /// Any staleness is acceptable.
    Any,
    /// Staleness up to the limit is acceptable.
    Limit(Duration),
}

/// Parsed `Cache-Control` header.
///
/// Unknown directives are ignored, as are known directives with malformed
/// arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<Duration>,
    pub s_maxage: Option<Duration>,
    pub max_stale: Option<MaxStale>,
    pub min_fresh: Option<Duration>,
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub public: bool,
    pub private: bool,
}

impl CacheControl {
    /// Parses one header value.
    pub fn parse(value: &str) -> Self {
        let mut cache_control = CacheControl::default();
        cache_control.merge(value);
        cache_control
    }

    /// Parses every `Cache-Control` value of the map.
    ///
    /// Returns `None` when the header is absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let mut values = headers.get_all(CACHE_CONTROL).iter().peekable();
        values.peek()?;
        let mut cache_control = CacheControl::default();
        for value in values {
            match value.to_str() {
                Ok(value) => cache_control.merge(value),
                Err(_) => warn!("non-visible characters in Cache-Control, skipping value"),
            }
        }
        Some(cache_control)
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive, None),
            };
            let seconds = || argument.and_then(|a| a.parse::<u64>().ok()).map(Duration::from_secs);
            match name.to_ascii_lowercase().as_str() {
                "max-age" => self.max_age = seconds().or(self.max_age),
                "s-maxage" => self.s_maxage = seconds().or(self.s_maxage),
                "min-fresh" => self.min_fresh = seconds().or(self.min_fresh),
                "max-stale" => {
                    self.max_stale = match argument {
                        None => Some(MaxStale::Any),
                        Some(_) => seconds().map(MaxStale::Limit).or(self.max_stale),
                    }
                }
                "no-cache" => self.no_cache = true,
                "no-store" => self.no_store = true,
                "must-revalidate" => self.must_revalidate = true,
                "proxy-revalidate" => self.proxy_revalidate = true,
                "public" => self.public = true,
                "private" => self.private = true,
                _ => {}
            }
        }
    }

    /// Whether any of `max-age` / `s-maxage` is present.
    pub fn has_max_age(&self) -> bool {
        self.max_age.is_some() || self.s_maxage.is_some()
    }

    /// `must-revalidate` or `proxy-revalidate`.
    pub fn requires_revalidation(&self) -> bool {
        self.must_revalidate || self.proxy_revalidate
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut directives: Vec<String> = Vec::new();
        if self.public {
            directives.push("public".into());
        }
        if self.private {
            directives.push("private".into());
        }
        if self.no_cache {
            directives.push("no-cache".into());
        }
        if self.no_store {
            directives.push("no-store".into());
        }
        if let Some(max_age) = self.max_age {
            directives.push(format!("max-age={}", max_age.as_secs()));
        }
        if let Some(s_maxage) = self.s_maxage {
            directives.push(format!("s-maxage={}", s_maxage.as_secs()));
        }
        match self.max_stale {
            Some(MaxStale::Any) => directives.push("max-stale".into()),
            Some(MaxStale::Limit(limit)) => directives.push(format!("max-stale={}", limit.as_secs())),
            None => {}
        }
        if let Some(min_fresh) = self.min_fresh {
            directives.push(format!("min-fresh={}", min_fresh.as_secs()));
        }
        if self.must_revalidate {
            directives.push("must-revalidate".into());
        }
        if self.proxy_revalidate {
            directives.push("proxy-revalidate".into());
        }
        f.write_str(&directives.join(", "))
    }
}

/// First value of the header as a string, if visible ASCII.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Header parsed as an HTTP-date.
pub fn header_date(headers: &HeaderMap, name: &HeaderName) -> Option<DateTime<Utc>> {
    header_str(headers, name).and_then(parse_http_date)
}

/// `Age` in seconds.
pub fn age(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, &AGE)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// `Pragma: no-cache`.
pub fn pragma_no_cache(headers: &HeaderMap) -> bool {
    headers
        .get_all(PRAGMA)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache")))
}

/// Inserts a header, skipping values that are not valid header values.
pub fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = %name, value, "value cannot be represented as a header, skipping"),
    }
}

/// Sets an HTTP-date header.
pub fn set_date_header(headers: &mut HeaderMap, name: HeaderName, value: DateTime<Utc>) {
    set_header(headers, name, &format_http_date(value));
}
