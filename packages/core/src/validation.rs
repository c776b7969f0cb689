//! Argument validation and datestamp handling.
//!
//! OAI-PMH arguments arrive as free-form strings. This module decides which
//! of them are well formed, and turns `from`/`until` into [`Datestamp`]s that
//! can be compared against the datestamps a store reports.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use regex::Regex;
use thiserror::Error;

use crate::types::Granularity;

/// Errors returned when a protocol argument is malformed.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0:?} is not a valid datestamp; expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ")]
    InvalidDatestamp(String),

    #[error("from and until must have the same granularity")]
    MixedGranularity,

    #[error("datestamp {0:?} is finer than the repository granularity {1}")]
    TooFine(String, Granularity),

    #[error("from ({from}) must not be later than until ({until})")]
    InvertedRange { from: String, until: String },

    #[error("metadataPrefix {0:?} contains characters outside the allowed set")]
    InvalidMetadataPrefix(String),

    #[error("set {0:?} is not a valid setSpec")]
    InvalidSetSpec(String),

    #[error("identifier must not be empty")]
    EmptyIdentifier,

    #[error("{0:?} is not a valid admin email address")]
    InvalidEmail(String),
}

/// A datestamp at one of the two protocol granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datestamp {
    Day(NaiveDate),
    Second(DateTime<Utc>),
}

impl Datestamp {
    /// Parse a protocol argument. Only the two exact OAI-PMH forms are accepted.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDatestamp(s.to_string());
        match s.len() {
            10 => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Datestamp::Day)
                .map_err(|_| invalid()),
            20 => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
                .map(|dt| Datestamp::Second(dt.and_utc()))
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    /// Parse a datestamp reported by a store.
    ///
    /// Stores are not bound by the protocol grammar: RDF data carries
    /// `xsd:date`, `xsd:dateTime` with offsets or fractional seconds, and
    /// naive datetimes (read as UTC). Returns `None` when nothing matches.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(d) = Self::parse(s) {
            return Some(d);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Datestamp::Second(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(Datestamp::Second(dt.and_utc()));
        }
        // xsd:date with a UTC timezone marker
        NaiveDate::parse_from_str(s.strip_suffix('Z')?, "%Y-%m-%d")
            .ok()
            .map(Datestamp::Day)
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Datestamp::Day(_) => Granularity::Day,
            Datestamp::Second(_) => Granularity::Second,
        }
    }

    /// First instant covered by this datestamp.
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            Datestamp::Day(d) => d.and_time(NaiveTime::MIN).and_utc(),
            Datestamp::Second(dt) => *dt,
        }
    }

    /// Last instant covered by this datestamp (end of the day or second).
    pub fn end(&self) -> DateTime<Utc> {
        match self {
            Datestamp::Day(_) => self.start() + TimeDelta::days(1) - TimeDelta::nanoseconds(1),
            Datestamp::Second(dt) => *dt + TimeDelta::seconds(1) - TimeDelta::nanoseconds(1),
        }
    }

    /// Render for a repository of the given granularity.
    ///
    /// Second-granularity values are truncated to the day for a day-granular
    /// repository; day values are padded to midnight UTC for a
    /// second-granular one.
    pub fn to_wire(&self, repository: Granularity) -> String {
        match (self, repository) {
            (Datestamp::Day(d), Granularity::Day) => d.format("%Y-%m-%d").to_string(),
            (Datestamp::Day(d), Granularity::Second) => d.format("%Y-%m-%dT00:00:00Z").to_string(),
            (Datestamp::Second(dt), Granularity::Day) => dt.format("%Y-%m-%d").to_string(),
            (Datestamp::Second(dt), Granularity::Second) => {
                dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
        }
    }
}

impl fmt::Display for Datestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire(self.granularity()))
    }
}

/// An inclusive `[from, until]` selection, either side optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<Datestamp>,
    pub until: Option<Datestamp>,
}

impl DateRange {
    /// Validate the `from`/`until` arguments of a list request.
    pub fn parse(
        from: Option<&str>,
        until: Option<&str>,
        repository: Granularity,
    ) -> Result<Self, ValidationError> {
        let from = from.map(Datestamp::parse).transpose()?;
        let until = until.map(Datestamp::parse).transpose()?;

        for d in from.iter().chain(until.iter()) {
            if d.granularity() > repository {
                return Err(ValidationError::TooFine(d.to_string(), repository));
            }
        }
        if let (Some(f), Some(u)) = (&from, &until) {
            if f.granularity() != u.granularity() {
                return Err(ValidationError::MixedGranularity);
            }
            if f.start() > u.end() {
                return Err(ValidationError::InvertedRange {
                    from: f.to_string(),
                    until: u.to_string(),
                });
            }
        }
        Ok(Self { from, until })
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.until.is_none()
    }

    /// Whether a store datestamp lies inside the range.
    ///
    /// An unbounded range admits everything, including unparseable
    /// datestamps; a bounded range rejects what it cannot place.
    pub fn admits(&self, datestamp: &str) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(d) = Datestamp::parse_lenient(datestamp) else {
            return false;
        };
        let instant = d.start();
        self.from.map_or(true, |f| instant >= f.start())
            && self.until.map_or(true, |u| instant <= u.end())
    }
}

/// Validate a `metadataPrefix` argument against the schema pattern.
pub fn validate_metadata_prefix(prefix: &str) -> Result<(), ValidationError> {
    if METADATA_PREFIX_RE.is_match(prefix) {
        Ok(())
    } else {
        Err(ValidationError::InvalidMetadataPrefix(prefix.to_string()))
    }
}

/// Validate a `set` argument against the setSpec pattern.
pub fn validate_set_spec(spec: &str) -> Result<(), ValidationError> {
    if SET_SPEC_RE.is_match(spec) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSetSpec(spec.to_string()))
    }
}

pub fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
    if identifier.trim().is_empty() {
        Err(ValidationError::EmptyIdentifier)
    } else {
        Ok(())
    }
}

pub fn validate_admin_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

// --- patterns ----------------------------------------------------------------

static METADATA_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\-_.!~*'()]+$").expect("invalid metadataPrefix regex")
});

static SET_SPEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\-_.!~*'()]+(:[A-Za-z0-9\-_.!~*'()]+)*$")
        .expect("invalid setSpec regex")
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@(\S+\.)+\S+$").expect("invalid email regex"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_protocol_granularities() {
        assert_eq!(
            Datestamp::parse("2025-08-14").unwrap().granularity(),
            Granularity::Day
        );
        assert_eq!(
            Datestamp::parse("2025-08-14T10:00:00Z").unwrap().granularity(),
            Granularity::Second
        );
    }

    #[test]
    fn rejects_malformed_arguments() {
        for bad in ["2025-8-14", "14.08.2025", "2025-08-14T10:00:00", "2025-13-01", ""] {
            assert!(
                matches!(Datestamp::parse(bad), Err(ValidationError::InvalidDatestamp(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn lenient_parse_accepts_store_formats() {
        let cases = [
            "2024-12-30T18:01:13.000",
            "2024-12-30T18:01:13+02:00",
            "2024-12-30T18:01:13.5Z",
            "2024-12-30Z",
        ];
        for s in cases {
            assert!(Datestamp::parse_lenient(s).is_some(), "{s:?}");
        }
        assert!(Datestamp::parse_lenient("").is_none());
        assert!(Datestamp::parse_lenient("yesterday").is_none());

        let d = Datestamp::parse_lenient("2024-12-30T18:01:13+02:00").unwrap();
        assert_eq!(d.to_wire(Granularity::Second), "2024-12-30T16:01:13Z");
        assert_eq!(d.to_wire(Granularity::Day), "2024-12-30");
    }

    #[test]
    fn day_values_are_padded_for_second_granularity() {
        let d = Datestamp::parse("2025-08-14").unwrap();
        assert_eq!(d.to_wire(Granularity::Second), "2025-08-14T00:00:00Z");
        assert_eq!(d.to_wire(Granularity::Day), "2025-08-14");
        assert_eq!(d.to_string(), "2025-08-14");
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let range = DateRange::parse(Some("2025-08-11"), Some("2025-08-20"), Granularity::Second)
            .unwrap();
        assert!(range.admits("2025-08-11"));
        assert!(range.admits("2025-08-14"));
        assert!(range.admits("2025-08-20"));
        assert!(range.admits("2025-08-20T23:59:59Z"));
        assert!(!range.admits("2025-08-10"));
        assert!(!range.admits("2025-08-21T00:00:00Z"));
        assert!(!range.admits("not a date"));
    }

    #[test]
    fn open_ended_ranges() {
        let from_only = DateRange::parse(Some("2025-08-11"), None, Granularity::Day).unwrap();
        assert!(from_only.admits("2030-01-01"));
        assert!(!from_only.admits("2025-08-10"));

        let until_only = DateRange::parse(None, Some("2025-08-11"), Granularity::Day).unwrap();
        assert!(until_only.admits("1999-01-01"));
        assert!(!until_only.admits("2025-08-12"));

        let unbounded = DateRange::default();
        assert!(unbounded.admits("garbage"));
    }

    #[test]
    fn range_argument_errors() {
        assert_eq!(
            DateRange::parse(Some("2025-08-11"), Some("2025-08-20T00:00:00Z"), Granularity::Second),
            Err(ValidationError::MixedGranularity)
        );
        assert!(matches!(
            DateRange::parse(Some("2025-08-11T00:00:00Z"), None, Granularity::Day),
            Err(ValidationError::TooFine(_, Granularity::Day))
        ));
        assert!(matches!(
            DateRange::parse(Some("2025-08-20"), Some("2025-08-11"), Granularity::Day),
            Err(ValidationError::InvertedRange { .. })
        ));
        assert!(DateRange::parse(Some("2025-08-11"), Some("2025-08-11"), Granularity::Day).is_ok());
    }

    #[test]
    fn pattern_checks() {
        assert!(validate_metadata_prefix("oai_dc").is_ok());
        assert!(validate_metadata_prefix("rdf").is_ok());
        assert!(validate_metadata_prefix("oai dc").is_err());
        assert!(validate_metadata_prefix("").is_err());

        assert!(validate_set_spec("music:jazz").is_ok());
        assert!(validate_set_spec("music:").is_err());

        assert!(validate_identifier("record1").is_ok());
        assert!(validate_identifier("  ").is_err());

        assert!(validate_admin_email("admin@example.org").is_ok());
        assert!(validate_admin_email("admin@localhost").is_err());
    }
}
