use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;

use crate::{
    analytics,
    clock::Clock,
    error::{AppError, StoreError},
    id::IdGenerator,
    models::{LinkAnalytics, LinkRecord, ShortLink, VisitEvent},
    store::LinkStore,
};

/// Generation attempts before create gives up.
const MAX_ID_ATTEMPTS: usize = 10;

/// ISO-8601 layouts with a zone designator (`Z`, `+hh`, `+hhmm`, `+hh:mm`)
/// that RFC 3339 parsing does not cover.
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

/// Naive date-time layouts accepted for `expirationDate`, read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
];

/// Who followed a short link, as presented by the transport.
#[derive(Debug, Clone)]
pub struct Visitor {
    pub client_address: String,
    pub user_agent: String,
}

/// Creates, resolves and reports on short links. Every state change goes
/// through the [`LinkStore`].
pub struct LinkRegistry {
    store: LinkStore,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl LinkRegistry {
    pub fn new(
        store: LinkStore,
        ids: Box<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ids,
            clock,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    /// Shorten `original_url`, optionally expiring at `expiration_date`.
    pub fn create(
        &self,
        original_url: Option<&str>,
        expiration_date: Option<&str>,
    ) -> Result<ShortLink, AppError> {
        let original_url = original_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(normalize_url)
            .ok_or_else(|| AppError::invalid("Invalid or missing originalUrl."))?;
        let original_url = original_url.as_str();

        let expires_at = expiration_date
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_expiration)
            .transpose()?;

        let created_at = self.clock.now();

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let short_id = self.ids.generate();
            let record = LinkRecord::new(&short_id, original_url, created_at, expires_at)?;

            match self.store.insert(&short_id, record, created_at) {
                Ok(()) => {
                    tracing::info!(
                        short_id = %short_id,
                        url = %original_url,
                        expires_at = ?expires_at,
                        records = self.store.len(),
                        "Link created"
                    );
                    return Ok(ShortLink {
                        short_url: format!("{}/{}", self.base_url, short_id),
                        short_id,
                    });
                }
                Err(StoreError::Conflict) => {
                    tracing::warn!(short_id = %short_id, attempt, "Short id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "no free short id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    /// Resolve `token` to its original URL and record the visit.
    ///
    /// An expired record is purged and reported as `Gone`; after that the
    /// token is `NotFound`.
    pub fn resolve(&self, token: &str, visitor: Visitor) -> Result<String, AppError> {
        let now = self.clock.now();

        let resolved = self.store.mutate(token, |record| {
            if record.is_expired_at(now) {
                return None;
            }
            record.record_visit(VisitEvent {
                client_address: visitor.client_address,
                timestamp: now,
                user_agent: visitor.user_agent,
            });
            Some(record.original_url.clone())
        });

        match resolved {
            Ok(Some(url)) => {
                tracing::debug!(short_id = %token, "Link resolved");
                Ok(url)
            }
            Ok(None) => {
                // Only purge what we saw expire; a record re-created under the
                // same token in the meantime is live and stays.
                if self
                    .store
                    .remove_if(token, |record| record.is_expired_at(now))
                    .is_some()
                {
                    tracing::info!(short_id = %token, "Purged expired link");
                }
                Err(AppError::Gone)
            }
            Err(StoreError::NotFound) => {
                tracing::debug!(short_id = %token, "Short id not found");
                Err(AppError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of one record and its visit log. Never mutates or purges;
    /// an expired record that has not been purged yet is reported with
    /// `expired: true`.
    pub fn analytics(&self, token: &str) -> Result<LinkAnalytics, AppError> {
        let record = self.store.get(token)?;
        let now = self.clock.now();

        Ok(LinkAnalytics {
            expired: record.is_expired_at(now),
            click_count: record.click_count(),
            summary: analytics::summarize(record.visits()),
            visits: record.visits().to_vec(),
            original_url: record.original_url,
            short_id: record.short_id,
            created_at: record.created_at,
            expiration_date: record.expires_at,
        })
    }
}

/// Parse an absolute URL with a scheme and a host and return its serialized
/// form. That form is what gets stored and served: it is pure ASCII with
/// stray tabs and newlines removed, so it is always a valid `Location`.
fn normalize_url(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .map(String::from)
}

/// Parse an ISO-8601 style expiration. Offsets are honoured; values without
/// one are taken as UTC, and a bare date means midnight UTC.
fn parse_expiration(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::invalid("Invalid expirationDate."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        id::RandomIdGenerator,
        models::{UNKNOWN_CLIENT_ADDRESS, UNKNOWN_USER_AGENT},
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    const BASE: &str = "http://localhost:3000";

    /// Hands out a fixed sequence of ids, repeating the last one.
    struct ScriptedIds(Mutex<Vec<&'static str>>);

    impl ScriptedIds {
        fn new(ids: &[&'static str]) -> Self {
            let mut ids = ids.to_vec();
            ids.reverse();
            Self(Mutex::new(ids))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn generate(&self) -> String {
            let mut ids = self.0.lock().unwrap();
            if ids.len() > 1 {
                ids.pop().unwrap().to_owned()
            } else {
                ids[0].to_owned()
            }
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (LinkRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let registry = LinkRegistry::new(
            LinkStore::new(),
            Box::new(RandomIdGenerator::default()),
            clock.clone(),
            BASE,
        );
        (registry, clock)
    }

    fn visitor(ip: &str) -> Visitor {
        Visitor {
            client_address: ip.into(),
            user_agent: UNKNOWN_USER_AGENT.into(),
        }
    }

    fn rfc3339(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    #[test]
    fn create_returns_base_url_plus_id() {
        let (registry, _) = setup();
        let link = registry.create(Some("https://example.com/path"), None).unwrap();

        assert_eq!(link.short_id.len(), 8);
        assert_eq!(link.short_url, format!("{BASE}/{}", link.short_id));
        assert_eq!(registry.store().len(), 1);
    }

    #[test]
    fn create_rejects_bad_urls() {
        let (registry, _) = setup();
        for bad in [None, Some(""), Some("   "), Some("not-a-url"), Some("mailto:a@b.test")] {
            let err = registry.create(bad, None).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{bad:?} -> {err:?}");
        }
        assert!(registry.store().is_empty());
    }

    #[test]
    fn create_checks_expiration_against_now() {
        let (registry, _) = setup();
        let past = rfc3339(start() - Duration::seconds(1));
        let now = rfc3339(start());
        let future = rfc3339(start() + Duration::hours(1));

        assert!(matches!(
            registry.create(Some("https://a.test"), Some(&past)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.create(Some("https://a.test"), Some(&now)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(registry.create(Some("https://a.test"), Some(&future)).is_ok());
        assert_eq!(registry.store().len(), 1);
    }

    #[test]
    fn stored_url_is_normalized_and_resolvable() {
        let (registry, _) = setup();
        let link = registry
            .create(Some("https://a.test/a\nb\tc\r"), None)
            .unwrap();

        let url = registry.resolve(&link.short_id, visitor("10.0.0.1")).unwrap();
        assert_eq!(url, "https://a.test/abc");
        assert!(axum::http::HeaderValue::from_str(&url).is_ok());
        assert_eq!(registry.analytics(&link.short_id).unwrap().original_url, url);

        let link = registry
            .create(Some("HTTPS://Bücher.test/straße?q=a b"), None)
            .unwrap();
        let url = registry.resolve(&link.short_id, visitor("10.0.0.1")).unwrap();
        assert_eq!(url, "https://xn--bcher-kva.test/stra%C3%9Fe?q=a%20b");
    }

    #[test]
    fn create_rejects_unparseable_expiration() {
        let (registry, _) = setup();
        let err = registry
            .create(Some("https://a.test"), Some("next tuesday"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn blank_expiration_means_none() {
        let (registry, _) = setup();
        let link = registry.create(Some("https://a.test"), Some("")).unwrap();
        assert!(registry.analytics(&link.short_id).unwrap().expiration_date.is_none());
    }

    #[test]
    fn parses_iso_variants() {
        let expected = Utc.with_ymd_and_hms(2031, 6, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_expiration("2031-06-01T08:30:00Z").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01T10:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01T08:30:00.000").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01 08:30:00").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01T08:30").unwrap(), expected);
        assert_eq!(
            parse_expiration("2031-06-01").unwrap(),
            Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(parse_expiration("2031-06-01T08:30Z").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01T10:30+02:00").unwrap(), expected);
        assert_eq!(parse_expiration("2031-06-01T10:30:00+0200").unwrap(), expected);
        assert_eq!(
            parse_expiration("2031-06-01T10:30:00.250+02").unwrap(),
            expected + Duration::milliseconds(250)
        );
        assert_eq!(parse_expiration("20310601T083000Z").unwrap(), expected);
        assert_eq!(parse_expiration("20310601T103000+0200").unwrap(), expected);
        assert_eq!(parse_expiration("20310601T083000").unwrap(), expected);
        assert!(parse_expiration("2031-13-01").is_err());
        assert!(parse_expiration("2031-06-01T08:30+25:00").is_err());
    }

    #[test]
    fn collision_retries_instead_of_overwriting() {
        let clock = Arc::new(ManualClock::new(start()));
        let registry = LinkRegistry::new(
            LinkStore::new(),
            Box::new(ScriptedIds::new(&["AAAAAAAA", "AAAAAAAA", "BBBBBBBB"])),
            clock,
            BASE,
        );

        let first = registry.create(Some("https://first.test"), None).unwrap();
        let second = registry.create(Some("https://second.test"), None).unwrap();

        assert_eq!(first.short_id, "AAAAAAAA");
        assert_eq!(second.short_id, "BBBBBBBB");
        assert_eq!(
            registry.analytics("AAAAAAAA").unwrap().original_url,
            "https://first.test/"
        );
    }

    #[test]
    fn exhausted_ids_is_internal_error() {
        let clock = Arc::new(ManualClock::new(start()));
        let registry = LinkRegistry::new(
            LinkStore::new(),
            Box::new(ScriptedIds::new(&["AAAAAAAA"])),
            clock,
            BASE,
        );

        registry.create(Some("https://first.test"), None).unwrap();
        let err = registry.create(Some("https://second.test"), None).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(registry.store().len(), 1);
    }

    #[test]
    fn resolve_counts_each_visit() {
        let (registry, clock) = setup();
        let expires = rfc3339(start() + Duration::hours(1));
        let link = registry.create(Some("https://a.test"), Some(&expires)).unwrap();

        for n in 1..=3 {
            clock.advance(Duration::seconds(1));
            let url = registry.resolve(&link.short_id, visitor("10.0.0.1")).unwrap();
            assert_eq!(url, "https://a.test/");
            assert_eq!(registry.analytics(&link.short_id).unwrap().click_count, n);
        }
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let (registry, _) = setup();
        assert!(matches!(
            registry.resolve("zzzzzzzz", visitor("10.0.0.1")),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn expired_link_is_gone_then_not_found() {
        let (registry, clock) = setup();
        let expires = rfc3339(start() + Duration::minutes(5));
        let link = registry.create(Some("https://a.test"), Some(&expires)).unwrap();

        clock.advance(Duration::minutes(5));
        assert!(registry.resolve(&link.short_id, visitor("10.0.0.1")).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            registry.resolve(&link.short_id, visitor("10.0.0.1")),
            Err(AppError::Gone)
        ));
        assert!(matches!(
            registry.resolve(&link.short_id, visitor("10.0.0.1")),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            registry.analytics(&link.short_id),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn analytics_reports_expired_without_purging() {
        let (registry, clock) = setup();
        let expires = rfc3339(start() + Duration::minutes(5));
        let link = registry.create(Some("https://a.test"), Some(&expires)).unwrap();
        registry.resolve(&link.short_id, visitor("10.0.0.1")).unwrap();

        clock.advance(Duration::hours(1));
        let snapshot = registry.analytics(&link.short_id).unwrap();
        assert!(snapshot.expired);
        assert_eq!(snapshot.click_count, 1);
        assert_eq!(registry.store().len(), 1);
    }

    #[test]
    fn analytics_scenario_two_clients_in_order() {
        let (registry, clock) = setup();
        let link = registry.create(Some("https://a.test"), None).unwrap();

        let before = registry.analytics(&link.short_id).unwrap();
        assert_eq!(before.click_count, 0);
        assert!(before.visits.is_empty());
        assert!(!before.expired);

        registry.resolve(&link.short_id, visitor("10.0.0.1")).unwrap();
        clock.advance(Duration::seconds(1));
        registry
            .resolve(
                &link.short_id,
                Visitor {
                    client_address: UNKNOWN_CLIENT_ADDRESS.into(),
                    user_agent: "curl/8.0".into(),
                },
            )
            .unwrap();

        let after = registry.analytics(&link.short_id).unwrap();
        assert_eq!(after.click_count, 2);
        assert_eq!(after.visits.len(), 2);
        assert_eq!(after.visits[0].client_address, "10.0.0.1");
        assert_eq!(after.visits[0].timestamp, start());
        assert_eq!(after.visits[1].user_agent, "curl/8.0");
        assert_eq!(after.visits[1].timestamp, start() + Duration::seconds(1));
        assert_eq!(after.created_at, start());
    }

    #[test]
    fn analytics_unknown_is_not_found() {
        let (registry, _) = setup();
        assert!(matches!(
            registry.analytics("zzzzzzzz"),
            Err(AppError::NotFound)
        ));
    }
}
