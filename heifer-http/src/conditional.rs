//! Server-side conditional request protocol.
//!
//! The pre-check runs before the handler:
//!
//! | Request kind                  | Validator missing | Mismatch | Match    |
//! |-------------------------------|-------------------|----------|----------|
//! | GET + `If-Modified-Since`     | continue          | continue | 304      |
//! | GET + `If-None-Match`         | continue          | continue | 304      |
//! | Mutate + `If-Unmodified-Since`| continue          | 412      | continue |
//! | Mutate + `If-Match`           | continue          | 412      | continue |
//!
//! Comparing a tag list against a last-modified validator, or a date against
//! an entity tag, is indeterminate and continues, except for `*` which
//! matches any present validator.

use chrono::{DateTime, Utc};
use heifer::ProtocolConflict;
use heifer_core::{ConditionalKind, EntityTagList, Validator};
use http::header::{IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE};
use http::{HeaderMap, Method};
use tracing::debug;

use crate::headers::{header_date, header_str};

/// Classified conditional request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
    /// No usable `If-*` header.
    #[default]
    None,
    IfNoneMatch(EntityTagList),
    IfModifiedSince(DateTime<Utc>),
    IfMatch(EntityTagList),
    IfUnmodifiedSince(DateTime<Utc>),
}

impl Precondition {
    pub fn kind(&self) -> ConditionalKind {
        match self {
            Precondition::None => ConditionalKind::None,
            Precondition::IfNoneMatch(_) => ConditionalKind::GetIfNoneMatch,
            Precondition::IfModifiedSince(_) => ConditionalKind::GetIfModifiedSince,
            Precondition::IfMatch(_) => ConditionalKind::MutateIfMatch,
            Precondition::IfUnmodifiedSince(_) => ConditionalKind::MutateIfUnmodifiedSince,
        }
    }
}

/// Result of matching a precondition against the current validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Run the handler.
    Continue,
    /// Answer `304 Not Modified`.
    NotModified,
    /// Answer `412 Precondition Failed`.
    PreconditionFailed,
}

/// Whether requests with this method are answered with `304`.
pub fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Whether requests with this method change the resource.
pub fn is_mutation(method: &Method) -> bool {
    method == Method::PUT || method == Method::PATCH || method == Method::DELETE || method == Method::POST
}

/// Classifies the request's conditional headers.
///
/// Contradictory headers are rejected for every method. Headers that fail to
/// parse are ignored.
pub fn classify(method: &Method, headers: &HeaderMap) -> Result<Precondition, ProtocolConflict> {
    if headers.contains_key(IF_MATCH) && headers.contains_key(IF_NONE_MATCH) {
        return Err(ProtocolConflict::MatchAndNoneMatch);
    }
    if headers.contains_key(IF_MODIFIED_SINCE) && headers.contains_key(IF_UNMODIFIED_SINCE) {
        return Err(ProtocolConflict::ModifiedAndUnmodifiedSince);
    }

    let tags = |name| {
        header_str(headers, &name).and_then(|value| match value.parse::<EntityTagList>() {
            Ok(list) => Some(list),
            Err(error) => {
                debug!(header = %name, %error, "ignoring malformed conditional header");
                None
            }
        })
    };

    let precondition = if is_read(method) {
        tags(IF_NONE_MATCH)
            .map(Precondition::IfNoneMatch)
            .or_else(|| header_date(headers, &IF_MODIFIED_SINCE).map(Precondition::IfModifiedSince))
    } else if is_mutation(method) {
        tags(IF_MATCH)
            .map(Precondition::IfMatch)
            .or_else(|| header_date(headers, &IF_UNMODIFIED_SINCE).map(Precondition::IfUnmodifiedSince))
    } else {
        None
    };
    Ok(precondition.unwrap_or_default())
}

/// Matches a precondition against the current validator.
pub fn check(precondition: &Precondition, current: Option<&Validator>) -> Verdict {
    let Some(current) = current else {
        return Verdict::Continue;
    };
    match (precondition, current) {
        (Precondition::None, _) => Verdict::Continue,

        (Precondition::IfNoneMatch(list), Validator::ETag(tag)) if list.weak_match(tag) => {
            Verdict::NotModified
        }
        (Precondition::IfNoneMatch(EntityTagList::Any), Validator::LastModified(_)) => {
            Verdict::NotModified
        }
        (Precondition::IfNoneMatch(_), _) => Verdict::Continue,

        (Precondition::IfModifiedSince(since), Validator::LastModified(modified))
            if modified <= since =>
        {
            Verdict::NotModified
        }
        (Precondition::IfModifiedSince(_), _) => Verdict::Continue,

        (Precondition::IfMatch(list), Validator::ETag(tag)) if !list.strong_match(tag) => {
            Verdict::PreconditionFailed
        }
        (Precondition::IfMatch(_), _) => Verdict::Continue,

        (Precondition::IfUnmodifiedSince(since), Validator::LastModified(modified))
            if modified > since =>
        {
            Verdict::PreconditionFailed
        }
        (Precondition::IfUnmodifiedSince(_), _) => Verdict::Continue,
    }
}
