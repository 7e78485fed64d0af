use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Recorded in place of a user agent when the client sent none.
pub const UNKNOWN_USER_AGENT: &str = "unknown";

/// Recorded in place of a client address when the transport supplied none.
pub const UNKNOWN_CLIENT_ADDRESS: &str = "unknown";

/// One shortened link and its visit log.
///
/// `click_count` and `visits` are only ever changed together through
/// [`LinkRecord::record_visit`], so `click_count == visits.len()` holds for
/// every value of this type.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub original_url: String,
    pub short_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    click_count: u64,
    visits: Vec<VisitEvent>,
}

impl LinkRecord {
    /// Build a fresh record with no visits. Fails if `expires_at` is not
    /// strictly after `created_at`.
    pub fn new(
        short_id: impl Into<String>,
        original_url: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        if let Some(expires_at) = expires_at {
            if expires_at <= created_at {
                return Err(AppError::invalid("Expiration date must be in the future."));
            }
        }

        Ok(Self {
            original_url: original_url.into(),
            short_id: short_id.into(),
            created_at,
            expires_at,
            click_count: 0,
            visits: Vec::new(),
        })
    }

    pub fn click_count(&self) -> u64 {
        self.click_count
    }

    /// Visits in the order they were recorded.
    pub fn visits(&self) -> &[VisitEvent] {
        &self.visits
    }

    /// `true` once `now` is past the expiration instant. A record without an
    /// expiration never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn record_visit(&mut self, visit: VisitEvent) {
        self.click_count += 1;
        self.visits.push(visit);
    }
}

/// A single successful resolution of a short link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitEvent {
    #[serde(rename = "ip")]
    pub client_address: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "useragent")]
    pub user_agent: String,
}

// ── Wire types ─────────────────────────────────────────────────────────────

/// Body of `POST /shorten`. Both fields are optional at the type level so a
/// missing URL is reported as invalid input rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub original_url: Option<String>,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenResponse {
    pub shortened_url: String,
}

/// A newly created short link.
#[derive(Debug, Clone)]
pub struct ShortLink {
    pub short_id: String,
    pub short_url: String,
}

/// Read-only snapshot returned by `GET /analytics/:id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAnalytics {
    pub original_url: String,
    pub short_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Set when the record is past its expiration but no resolve has purged
    /// it yet.
    pub expired: bool,
    pub click_count: u64,
    pub visits: Vec<VisitEvent>,
    pub summary: VisitSummary,
}

/// Aggregates derived from the visit log at read time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitSummary {
    pub unique_visitors: usize,
    pub browsers: Vec<Breakdown>,
    pub operating_systems: Vec<Breakdown>,
    pub devices: Vec<Breakdown>,
}

/// One row of a breakdown: a label, how many visits carried it and its
/// share of all visits in whole percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub name: String,
    pub count: u64,
    pub percent: u64,
}
