//! Client-side freshness evaluation of stored responses.
//!
//! [`evaluate`] classifies a stored (or just received) response into a
//! [`FreshnessOutcome`]; [`staleness_acceptable`] decides whether a stale
//! entry may still be served given the request's `max-stale`, `min-fresh`
//! and `max-age` directives.

use chrono::{DateTime, TimeDelta, Utc};
use heifer_core::FreshnessOutcome;
use http::header::{DATE, EXPIRES};
use http::{HeaderMap, StatusCode};
use std::time::Duration;

use crate::headers::{CacheControl, MaxStale, age, header_date, header_str, set_date_header};

/// Status codes a stored response may carry.
pub const CACHEABLE_STATUSES: [u16; 6] = [200, 203, 206, 300, 301, 410];

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Classifies a response.
///
/// A missing `Date` is taken to be `now` and written back onto `headers`, so
/// that the stored copy and later evaluations agree on it.
pub fn evaluate(
    headers: &mut HeaderMap,
    status: StatusCode,
    has_body: bool,
    revalidate_by_default: bool,
    now: DateTime<Utc>,
) -> FreshnessOutcome {
    if !CACHEABLE_STATUSES.contains(&status.as_u16()) || !status.is_success() {
        return FreshnessOutcome::NotCacheable;
    }
    let Some(cache_control) = CacheControl::from_headers(headers) else {
        return FreshnessOutcome::NotCacheable;
    };
    if cache_control.no_store {
        return FreshnessOutcome::NotCacheable;
    }

    let date = match header_date(headers, &DATE) {
        Some(date) => date,
        None => {
            set_date_header(headers, DATE, now);
            now
        }
    };

    if !has_body || !(cache_control.has_max_age() || headers.contains_key(EXPIRES)) {
        return FreshnessOutcome::NotCacheable;
    }
    if cache_control.no_cache {
        return FreshnessOutcome::MustRevalidate;
    }

    match expiry(headers, &cache_control, date) {
        Some(expires_at) if expires_at <= now => {
            if cache_control.requires_revalidation() || revalidate_by_default {
                FreshnessOutcome::MustRevalidate
            } else {
                FreshnessOutcome::Stale
            }
        }
        _ => FreshnessOutcome::Ok,
    }
}

/// Point in time the response stops being fresh.
///
/// `max-age` and `s-maxage` count from `date` minus `Age`; the earliest one
/// wins. Without either, `Expires` is used, and an unparseable `Expires`
/// means already expired.
pub fn expiry(
    headers: &HeaderMap,
    cache_control: &CacheControl,
    date: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let age = delta(age(headers).unwrap_or_default());
    let by_max_age = [cache_control.max_age, cache_control.s_maxage]
        .into_iter()
        .flatten()
        .map(|window| {
            let end = after(date, window);
            end.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
        .min();
    if by_max_age.is_some() {
        return by_max_age;
    }
    header_str(headers, &EXPIRES).map(|_| header_date(headers, &EXPIRES).unwrap_or(date))
}

/// Whether the request tolerates serving a stale entry.
///
/// `staleness` is `now - expires_at`; negative means still fresh. A request
/// `max-age` is measured against the entry's age, `now - (date - age)`, so an
/// advertised `Age` counts even when `date` is recent.
pub fn staleness_acceptable(
    request: &CacheControl,
    expires_at: DateTime<Utc>,
    date: DateTime<Utc>,
    age: Duration,
    now: DateTime<Utc>,
) -> bool {
    let staleness = now - expires_at;
    if let Some(min_fresh) = request.min_fresh {
        return -staleness > delta(min_fresh);
    }
    match request.max_stale {
        Some(MaxStale::Any) => return true,
        Some(MaxStale::Limit(limit)) => return staleness < delta(limit),
        None => {}
    }
    if let Some(max_age) = request.max_age {
        let generated = date
            .checked_sub_signed(delta(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        return after(generated, max_age) > now;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::format_http_date;
    use http::HeaderValue;
    use http::header::{AGE, CACHE_CONTROL};

    fn headers(cache_control: &str, date: DateTime<Utc>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_str(cache_control).unwrap());
        headers.insert(DATE, HeaderValue::from_str(&format_http_date(date)).unwrap());
        headers
    }

    #[test]
    fn test_missing_date_is_written_back() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=10"));
        let outcome = evaluate(&mut headers, StatusCode::OK, true, false, now);
        assert_eq!(outcome, FreshnessOutcome::Ok);
        assert!(headers.contains_key(DATE));
    }

    #[test]
    fn test_expires_without_max_age() {
        let now = Utc::now();
        let mut stored = headers("public", now);
        stored.insert(
            EXPIRES,
            HeaderValue::from_str(&format_http_date(now - TimeDelta::seconds(5))).unwrap(),
        );
        assert_eq!(
            evaluate(&mut stored, StatusCode::OK, true, false, now),
            FreshnessOutcome::Stale
        );
    }

    #[test]
    fn test_invalid_expires_is_expired() {
        let now = Utc::now();
        let mut stored = headers("public", now - TimeDelta::seconds(1));
        stored.insert(EXPIRES, HeaderValue::from_static("0"));
        assert_eq!(
            evaluate(&mut stored, StatusCode::OK, true, false, now),
            FreshnessOutcome::Stale
        );
    }

    #[test]
    fn test_staleness_rules() {
        let now = Utc::now();
        let date = now - TimeDelta::seconds(100);
        let expired = now - TimeDelta::seconds(10);
        let accepts = |directives: &str| {
            staleness_acceptable(&CacheControl::parse(directives), expired, date, Duration::ZERO, now)
        };

        assert!(accepts("max-stale"));
        assert!(accepts("max-stale=20"));
        assert!(!accepts("max-stale=5"));
        assert!(!accepts("min-fresh=1, max-stale"));
        assert!(accepts("max-age=200"));
        assert!(!accepts("max-age=50"));
        assert!(!staleness_acceptable(&CacheControl::default(), expired, date, Duration::ZERO, now));
    }

    #[test]
    fn test_request_max_age_counts_advertised_age() {
        let now = Utc::now();
        let mut stored = headers("max-age=5", now - TimeDelta::seconds(10));
        stored.insert(AGE, HeaderValue::from_static("100"));
        assert_eq!(
            evaluate(&mut stored, StatusCode::OK, true, false, now),
            FreshnessOutcome::Stale
        );

        let cache_control = CacheControl::from_headers(&stored).unwrap();
        let date = now - TimeDelta::seconds(10);
        let expires_at = expiry(&stored, &cache_control, date).unwrap();
        let request = CacheControl::parse("max-age=60");
        let age = Duration::from_secs(100);
        assert!(!staleness_acceptable(&request, expires_at, date, age, now));
        assert!(staleness_acceptable(&request, expires_at, date, Duration::ZERO, now));
        assert!(staleness_acceptable(
            &CacheControl::parse("max-age=120"),
            expires_at,
            date,
            age,
            now
        ));
    }

    struct Row {
        name: &'static str,
        status: StatusCode,
        cache_control: &'static str,
        /// Seconds between `Date` and now.
        date_age: i64,
        age: Option<&'static str>,
        /// `Expires` relative to now, in seconds.
        expires_in: Option<i64>,
        has_body: bool,
        revalidate_by_default: bool,
        expected: FreshnessOutcome,
    }

    const ROW: Row = Row {
        name: "",
        status: StatusCode::OK,
        cache_control: "max-age=60",
        date_age: 0,
        age: None,
        expires_in: None,
        has_body: true,
        revalidate_by_default: false,
        expected: FreshnessOutcome::Ok,
    };

    #[test]
    fn test_evaluate_table() {
        let rows = [
            Row { name: "max-age within window", date_age: 30, ..ROW },
            Row {
                name: "max-age elapsed",
                date_age: 90,
                expected: FreshnessOutcome::Stale,
                ..ROW
            },
            Row {
                name: "max-age elapsed, revalidate by default",
                date_age: 90,
                revalidate_by_default: true,
                expected: FreshnessOutcome::MustRevalidate,
                ..ROW
            },
            Row {
                name: "revalidate by default leaves fresh entries alone",
                date_age: 30,
                revalidate_by_default: true,
                ..ROW
            },
            Row {
                name: "must-revalidate",
                cache_control: "max-age=60, must-revalidate",
                date_age: 90,
                expected: FreshnessOutcome::MustRevalidate,
                ..ROW
            },
            Row {
                name: "proxy-revalidate",
                cache_control: "max-age=60, proxy-revalidate",
                date_age: 90,
                expected: FreshnessOutcome::MustRevalidate,
                ..ROW
            },
            Row {
                name: "response no-cache",
                cache_control: "no-cache, max-age=60",
                expected: FreshnessOutcome::MustRevalidate,
                ..ROW
            },
            Row {
                name: "404",
                status: StatusCode::NOT_FOUND,
                expected: FreshnessOutcome::NotCacheable,
                ..ROW
            },
            Row {
                name: "302",
                status: StatusCode::FOUND,
                expected: FreshnessOutcome::NotCacheable,
                ..ROW
            },
            Row {
                name: "no-store",
                cache_control: "no-store, max-age=60",
                expected: FreshnessOutcome::NotCacheable,
                ..ROW
            },
            Row {
                name: "empty body",
                has_body: false,
                expected: FreshnessOutcome::NotCacheable,
                ..ROW
            },
            Row {
                name: "no freshness information",
                cache_control: "public",
                expected: FreshnessOutcome::NotCacheable,
                ..ROW
            },
            Row {
                name: "max-age overrides a later Expires",
                date_age: 90,
                expires_in: Some(3_600),
                expected: FreshnessOutcome::Stale,
                ..ROW
            },
            Row {
                name: "Expires alone in the future",
                cache_control: "public",
                expires_in: Some(3_600),
                ..ROW
            },
            Row {
                name: "Age beyond max-age",
                age: Some("120"),
                expected: FreshnessOutcome::Stale,
                ..ROW
            },
            Row {
                name: "Age within max-age",
                age: Some("30"),
                date_age: 10,
                ..ROW
            },
        ];

        let now = Utc::now();
        for row in rows {
            let mut stored = headers(row.cache_control, now - TimeDelta::seconds(row.date_age));
            if let Some(age) = row.age {
                stored.insert(AGE, HeaderValue::from_static(age));
            }
            if let Some(expires_in) = row.expires_in {
                let expires = format_http_date(now + TimeDelta::seconds(expires_in));
                stored.insert(EXPIRES, HeaderValue::from_str(&expires).unwrap());
            }
            let outcome = evaluate(
                &mut stored,
                row.status,
                row.has_body,
                row.revalidate_by_default,
                now,
            );
            assert_eq!(outcome, row.expected, "{}", row.name);
        }
    }
}
