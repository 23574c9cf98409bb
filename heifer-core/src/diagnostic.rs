//! Per-request diagnostic record.
//!
//! The client pipeline records what it did with each request and serializes
//! the record into a response header:
//!
//! ```
//! use heifer_core::Diagnostic;
//!
//! let mut diagnostic = Diagnostic::default();
//! diagnostic.did_not_exist = Some(true);
//! diagnostic.retrieved_from_cache = Some(false);
//!
//! let header = diagnostic.to_string();
//! assert_eq!(header, "1.0;did-not-exist=true;retrieved-from-cache=false");
//! assert_eq!(header.parse::<Diagnostic>().unwrap(), diagnostic);
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

const WAS_STALE: &str = "was-stale";
const DID_NOT_EXIST: &str = "did-not-exist";
const NOT_CACHEABLE: &str = "not-cacheable";
const CACHE_VALIDATION_APPLIED: &str = "cache-validation-applied";
const RETRIEVED_FROM_CACHE: &str = "retrieved-from-cache";

/// Version written when none is set.
pub const DIAGNOSTIC_VERSION: &str = "1.0";

/// Tri-state flags describing the cache's handling of one request.
///
/// `None` means unknown and is omitted from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Format version.
    pub version: SmolStr,
    /// The stored entry had expired.
    pub was_stale: Option<bool>,
    /// Nothing was stored for the identity.
    pub did_not_exist: Option<bool>,
    /// The response may not be cached.
    pub not_cacheable: Option<bool>,
    /// A conditional request was made to the origin.
    pub cache_validation_applied: Option<bool>,
    /// The body came from the store.
    pub retrieved_from_cache: Option<bool>,
}

impl Default for Diagnostic {
    fn default() -> Self {
        Self {
            version: SmolStr::new_static(DIAGNOSTIC_VERSION),
            was_stale: None,
            did_not_exist: None,
            not_cacheable: None,
            cache_validation_applied: None,
            retrieved_from_cache: None,
        }
    }
}

impl Diagnostic {
    fn flags(&self) -> [(&'static str, Option<bool>); 5] {
        [
            (WAS_STALE, self.was_stale),
            (DID_NOT_EXIST, self.did_not_exist),
            (NOT_CACHEABLE, self.not_cacheable),
            (CACHE_VALIDATION_APPLIED, self.cache_validation_applied),
            (RETRIEVED_FROM_CACHE, self.retrieved_from_cache),
        ]
    }

    fn flag_mut(&mut self, name: &str) -> Option<&mut Option<bool>> {
        match name {
            WAS_STALE => Some(&mut self.was_stale),
            DID_NOT_EXIST => Some(&mut self.did_not_exist),
            NOT_CACHEABLE => Some(&mut self.not_cacheable),
            CACHE_VALIDATION_APPLIED => Some(&mut self.cache_validation_applied),
            RETRIEVED_FROM_CACHE => Some(&mut self.retrieved_from_cache),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)?;
        for (name, value) in self.flags() {
            if let Some(value) = value {
                write!(f, ";{name}={value}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Diagnostic {
    type Err = Infallible;

    /// Lenient: unknown flags and malformed segments are skipped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split(';').map(str::trim);
        let mut diagnostic = Diagnostic::default();
        if let Some(version) = segments.next().filter(|v| !v.is_empty() && !v.contains('=')) {
            diagnostic.version = SmolStr::new(version);
        }
        for segment in segments {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<bool>() else {
                continue;
            };
            if let Some(slot) = diagnostic.flag_mut(name.trim()) {
                *slot = Some(value);
            }
        }
        Ok(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_flag_combination_roundtrips() {
        let states = [None, Some(true), Some(false)];
        for was_stale in states {
            for did_not_exist in states {
                for not_cacheable in states {
                    for cache_validation_applied in states {
                        for retrieved_from_cache in states {
                            let diagnostic = Diagnostic {
                                version: SmolStr::new("1.0"),
                                was_stale,
                                did_not_exist,
                                not_cacheable,
                                cache_validation_applied,
                                retrieved_from_cache,
                            };
                            let parsed: Diagnostic = diagnostic.to_string().parse().unwrap();
                            assert_eq!(parsed, diagnostic);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_unknown_and_broken_segments_are_ignored() {
        let parsed: Diagnostic = "2.1;was-stale=true;colour=blue;did-not-exist;not-cacheable=maybe"
            .parse()
            .unwrap();
        assert_eq!(parsed.version, "2.1");
        assert_eq!(parsed.was_stale, Some(true));
        assert_eq!(parsed.did_not_exist, None);
        assert_eq!(parsed.not_cacheable, None);
    }

    #[test]
    fn test_missing_version() {
        let parsed: Diagnostic = "".parse().unwrap();
        assert_eq!(parsed, Diagnostic::default());
    }
}
