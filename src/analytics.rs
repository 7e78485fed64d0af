use std::collections::{HashMap, HashSet};
use woothee::parser::Parser;

use crate::models::{Breakdown, VisitEvent, VisitSummary, UNKNOWN_CLIENT_ADDRESS};

/// Rows kept per breakdown.
const TOP_N: usize = 10;

/// Summarise a visit log: distinct client addresses plus browser / OS /
/// device breakdowns parsed from the recorded user agents. Visits are stored
/// verbatim; parsing only happens here, at read time.
pub fn summarize(visits: &[VisitEvent]) -> VisitSummary {
    let parser = Parser::new();
    let parsed: Vec<(Option<String>, Option<String>, Option<String>)> = visits
        .iter()
        .map(|v| parse_user_agent(&parser, &v.user_agent))
        .collect();

    let unique_visitors = visits
        .iter()
        .map(|v| v.client_address.as_str())
        .filter(|ip| *ip != UNKNOWN_CLIENT_ADDRESS)
        .collect::<HashSet<_>>()
        .len();

    let total = visits.len() as u64;

    VisitSummary {
        unique_visitors,
        browsers: with_pct(count_field(parsed.iter().map(|p| p.0.as_deref())), total),
        operating_systems: with_pct(count_field(parsed.iter().map(|p| p.1.as_deref())), total),
        devices: with_pct(count_field(parsed.iter().map(|p| p.2.as_deref())), total),
    }
}

/// Parse a User-Agent string using woothee and return
/// `(browser_name, os_name, device_category)`.
fn parse_user_agent(
    parser: &Parser,
    ua: &str,
) -> (Option<String>, Option<String>, Option<String>) {
    if ua.is_empty() {
        return (None, None, None);
    }

    let known = |s: &str| (!s.is_empty() && s != "UNKNOWN").then(|| s.to_owned());

    match parser.parse(ua) {
        Some(result) => (known(result.name), known(result.os), known(result.category)),
        None => (None, None, None),
    }
}

/// Tally occurrences of each non-None value, sort descending by count (ties
/// by name, so output is stable), and keep the top rows.
fn count_field<'a>(iter: impl Iterator<Item = Option<&'a str>>) -> Vec<(String, u64)> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for val in iter.flatten() {
        *counts.entry(val.to_owned()).or_insert(0) += 1;
    }
    let mut sorted: Vec<(String, u64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(TOP_N);
    sorted
}

/// Attach a percentage-of-total column to each breakdown row.
fn with_pct(items: Vec<(String, u64)>, total: u64) -> Vec<Breakdown> {
    items
        .into_iter()
        .map(|(name, count)| {
            let percent = if total > 0 { count * 100 / total } else { 0 };
            Breakdown {
                name,
                count,
                percent,
            }
        })
        .collect()
}
