// Advisory check on how old the exported data is.  Never fails a run.

use jiff::Timestamp;
use log::{info, warn};
use thiserror::Error;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// At most one hour old.
    Fresh,
    /// More than one hour old.
    Stale,
    /// More than 24 hours old.
    VeryStale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessReport {
    pub age_hours: f64,
    pub freshness: Freshness,
}

#[derive(Error, Debug)]
pub enum FreshnessError {
    #[error("lastUpdated is not a string")]
    NotAString,

    #[error("cannot parse lastUpdated '{value}': {source}")]
    Parse {
        value: String,
        #[source]
        source: jiff::Error,
    },
}

impl Freshness {
    pub fn from_age_hours(age_hours: f64) -> Freshness {
        if age_hours > 24.0 {
            Freshness::VeryStale
        } else if age_hours > 1.0 {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

/// Age of the document's `lastUpdated` field relative to `now`.
/// Returns `Ok(None)` if the document has no `lastUpdated`.
///
/// The timestamp needs an explicit offset (`Z` or `+hh:mm`); a civil
/// datetime without one can't be compared to `now` and is an error.
pub fn assess(doc: &Document, now: Timestamp) -> Result<Option<FreshnessReport>, FreshnessError> {
    let Some(value) = doc.last_updated() else {
        return Ok(None);
    };
    let s = value.as_str().ok_or(FreshnessError::NotAString)?;
    let last_updated: Timestamp = s.parse().map_err(|source| FreshnessError::Parse {
        value: s.to_string(),
        source,
    })?;
    let age_hours = now.duration_since(last_updated).as_secs_f64() / 3600.0;
    Ok(Some(FreshnessReport {
        age_hours,
        freshness: Freshness::from_age_hours(age_hours),
    }))
}

/// Log how fresh the data is.  Problems are logged and swallowed.
pub fn verify_data_freshness(doc: &Document) -> Option<FreshnessReport> {
    match assess(doc, Timestamp::now()) {
        Ok(Some(report)) => {
            info!("Data age: {:.1} hours", report.age_hours);
            match report.freshness {
                Freshness::VeryStale => warn!("Data is more than 24 hours old"),
                Freshness::Stale => warn!("Data is more than 1 hour old"),
                Freshness::Fresh => info!("Data is fresh"),
            }
            Some(report)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Could not verify data freshness: {}", e);
            None
        }
    }
}
