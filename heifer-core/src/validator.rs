//! Resource validators.
//!
//! A [`Validator`] is the smallest piece of resource state a server hands out
//! so that clients can later ask "has this changed?". It is exactly one of an
//! entity tag or a last-modified timestamp:
//!
//! ```
//! use heifer_core::{EntityTag, Validator};
//!
//! let validator: Validator = "W/\"abc\"".parse().unwrap();
//! assert_eq!(validator.as_etag(), Some(&EntityTag::weak("abc")));
//! assert_eq!(validator.to_string(), "W/\"abc\"");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::date::{format_http_date, parse_http_date, truncate_to_seconds};

/// Error produced when a validator or entity tag cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidatorParseError {
    /// The input was empty.
    #[error("empty validator")]
    Empty,
    /// The entity tag is not a valid (optionally weak) quoted string.
    #[error("malformed entity tag: {0}")]
    MalformedTag(String),
    /// Neither an entity tag nor an HTTP-date.
    #[error("value is neither an entity tag nor an HTTP-date: {0}")]
    Unrecognized(String),
}

/// An entity tag as carried by `ETag`, `If-Match` and `If-None-Match`.
///
/// The opaque tag is stored without quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTag {
    tag: SmolStr,
    weak: bool,
}

impl EntityTag {
    /// Creates an entity tag.
    pub fn new(tag: impl Into<SmolStr>, weak: bool) -> Self {
        Self {
            tag: tag.into(),
            weak,
        }
    }

    /// Creates a strong entity tag.
    pub fn strong(tag: impl Into<SmolStr>) -> Self {
        Self::new(tag, false)
    }

    /// Creates a weak entity tag.
    pub fn weak(tag: impl Into<SmolStr>) -> Self {
        Self::new(tag, true)
    }

    /// Derives a strong tag from a timestamp.
    ///
    /// Collections whose newest member did not change can still differ in
    /// membership; folding a `salt` such as the item count into the tag keeps
    /// those states apart.
    pub fn from_timestamp(timestamp: DateTime<Utc>, salt: Option<u64>) -> Self {
        let millis = timestamp.timestamp_millis();
        match salt {
            Some(salt) => Self::strong(format!("{millis:x}-{salt:x}")),
            None => Self::strong(format!("{millis:x}")),
        }
    }

    /// The opaque tag, without quotes or weakness prefix.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether the tag carries the `W/` prefix.
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Strong comparison: both tags strong and byte-equal.
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: tags byte-equal regardless of weakness.
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.tag == other.tag
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.tag)
        } else {
            write!(f, "\"{}\"", self.tag)
        }
    }
}

impl FromStr for EntityTag {
    type Err = ValidatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidatorParseError::Empty);
        }
        let (weak, rest) = match s.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let tag = match rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            Some(tag) => tag,
            // Lenient: some origins send unquoted tags.
            None if !weak && !rest.contains('"') => rest,
            None => return Err(ValidatorParseError::MalformedTag(s.to_owned())),
        };
        if tag.contains('"') {
            return Err(ValidatorParseError::MalformedTag(s.to_owned()));
        }
        Ok(Self::new(tag, weak))
    }
}

/// Parsed value of `If-Match` / `If-None-Match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityTagList {
    /// `*`
    Any,
    /// A comma separated list of tags.
    Tags(Vec<EntityTag>),
}

impl EntityTagList {
    /// True when any listed tag (or `*`) matches using weak comparison.
    pub fn weak_match(&self, candidate: &EntityTag) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => tags.iter().any(|t| t.weak_eq(candidate)),
        }
    }

    /// True when any listed tag (or `*`) matches using strong comparison.
    pub fn strong_match(&self, candidate: &EntityTag) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => tags.iter().any(|t| t.strong_eq(candidate)),
        }
    }
}

impl FromStr for EntityTagList {
    type Err = ValidatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::Any);
        }
        let tags = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(EntityTag::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if tags.is_empty() {
            return Err(ValidatorParseError::Empty);
        }
        Ok(Self::Tags(tags))
    }
}

/// Either an entity tag or a last-modified timestamp, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validator {
    /// Entity tag validator.
    ETag(EntityTag),
    /// Last-modified validator, second precision.
    LastModified(DateTime<Utc>),
}

impl Validator {
    /// Creates an entity tag validator.
    pub fn etag(tag: EntityTag) -> Self {
        Self::ETag(tag)
    }

    /// Creates a last-modified validator; sub-second precision is dropped.
    pub fn last_modified(timestamp: DateTime<Utc>) -> Self {
        Self::LastModified(truncate_to_seconds(timestamp))
    }

    /// Entity tag, if this is an entity tag validator.
    pub fn as_etag(&self) -> Option<&EntityTag> {
        match self {
            Self::ETag(tag) => Some(tag),
            Self::LastModified(_) => None,
        }
    }

    /// Timestamp, if this is a last-modified validator.
    pub fn as_last_modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ETag(_) => None,
            Self::LastModified(timestamp) => Some(*timestamp),
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ETag(tag) => tag.fmt(f),
            Self::LastModified(timestamp) => f.write_str(&format_http_date(*timestamp)),
        }
    }
}

impl FromStr for Validator {
    type Err = ValidatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidatorParseError::Empty);
        }
        if s.starts_with("W/") || s.starts_with('"') {
            return EntityTag::from_str(s).map(Self::ETag);
        }
        parse_http_date(s)
            .map(Self::last_modified)
            .ok_or_else(|| ValidatorParseError::Unrecognized(s.to_owned()))
    }
}

impl From<EntityTag> for Validator {
    fn from(tag: EntityTag) -> Self {
        Self::ETag(tag)
    }
}

impl From<DateTime<Utc>> for Validator {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Self::last_modified(timestamp)
    }
}
