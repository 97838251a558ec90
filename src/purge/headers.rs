//! Cache-control headers for a decided response.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use time::{Duration, OffsetDateTime, format_description::FormatItem, macros::format_description};

use super::decision::CacheDecision;

/// Debug header naming the rule behind the decision.
pub const DECISION_HEADER: HeaderName = HeaderName::from_static("x-edge-cache-decision");

const HTTP_DATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

const NOT_CACHEABLE: &str = "no-cache, max-age=0, s-maxage=0";

/// Replace any cache-control headers with the ones `decision` calls for.
pub fn apply_decision(headers: &mut HeaderMap, decision: &CacheDecision, now: OffsetDateTime) {
    headers.remove(header::CACHE_CONTROL);
    headers.remove(header::EXPIRES);
    headers.remove(header::PRAGMA);

    if decision.cacheable {
        let ttl = decision.ttl_seconds;
        let directives = format!("public, max-age={ttl}, s-maxage={ttl}");
        if let Ok(value) = HeaderValue::from_str(&directives) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if let Some(value) = http_date(now + Duration::seconds(i64::from(ttl))) {
            headers.insert(header::EXPIRES, value);
        }
    } else {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NOT_CACHEABLE));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    }

    headers.insert(
        DECISION_HEADER,
        HeaderValue::from_static(decision.reason.as_str()),
    );
}

fn http_date(at: OffsetDateTime) -> Option<HeaderValue> {
    let formatted = at.to_offset(time::UtcOffset::UTC).format(HTTP_DATE).ok()?;
    HeaderValue::from_str(&formatted).ok()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::purge::decision::TriggerReason;

    #[test]
    fn cacheable_response_gets_public_directives_and_expiry() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

        let decision = CacheDecision::cacheable(600, TriggerReason::CacheableType);
        apply_decision(&mut headers, &decision, datetime!(1994-11-06 08:49:37 UTC));

        assert_eq!(
            headers[header::CACHE_CONTROL],
            "public, max-age=600, s-maxage=600"
        );
        assert_eq!(headers[header::EXPIRES], "Sun, 06 Nov 1994 08:59:37 GMT");
        assert!(headers.get(header::PRAGMA).is_none());
        assert_eq!(headers[DECISION_HEADER], "cacheable-type");
    }

    #[test]
    fn uncacheable_response_forces_zero_ttl() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("tomorrow"));

        let decision = CacheDecision::not_cacheable(TriggerReason::MixedArchive);
        apply_decision(&mut headers, &decision, OffsetDateTime::now_utc());

        assert_eq!(headers[header::CACHE_CONTROL], NOT_CACHEABLE);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert!(headers.get(header::EXPIRES).is_none());
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }
}
