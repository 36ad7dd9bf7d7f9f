#![forbid(unsafe_code)]

use crate::model::ItemSummary;

/// End-of-list detection. The external list advertises no length, so the
/// only available signal is "advancing did not change what the summary
/// view shows". Two logically distinct adjacent items with an identical
/// triple would stop a walk early; the surface exposes nothing that
/// could tell them apart.
pub fn is_repeat_of_previous(prev: &ItemSummary, current: &ItemSummary) -> bool {
    prev == current
}

/// Creation-date policy: the summary view's legacy date, when present,
/// comes from the service's original import metadata and wins verbatim.
/// The info-panel date is the fallback, normalized first.
pub fn resolve_creation_date(legacy: Option<&str>, detail: &str) -> String {
    match legacy {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => normalize_detail_date(detail),
    }
}

/// The info panel renders its timestamp as `M/D/YYYY, H:MM:SS AM` while
/// the legacy source omits the comma. Stored values must agree on one
/// format, so the comma form loses its separator.
pub fn normalize_detail_date(raw: &str) -> String {
    raw.replacen(", ", " ", 1)
}
