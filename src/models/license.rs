// src/models/license.rs

//! License tables derived from holdings.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::HoldingsError;
use crate::models::{Entitlement, Holding};

/// One entitlement attached to the ISSN it belongs to.
///
/// Range ends and delay are computed once, on construction.
#[derive(Debug, Clone, Serialize)]
pub struct License {
    pub issn: String,
    pub entitlement: Entitlement,
    from: String,
    to: String,
    #[serde(skip)]
    delay: TimeDelta,
}

impl License {
    /// Build a license, rejecting unusable delays and over-wide datums.
    pub fn new(
        issn: impl Into<String>,
        entitlement: Entitlement,
        title: &str,
    ) -> Result<Self, HoldingsError> {
        let delay = entitlement.delay().map_err(|source| HoldingsError::Delay {
            title: title.to_string(),
            source,
        })?;
        if let Some((field, value)) = entitlement.overflowing_field() {
            return Err(HoldingsError::DatumOverflow {
                title: title.to_string(),
                field,
                value: value.to_string(),
            });
        }
        Ok(Self {
            issn: issn.into(),
            from: entitlement.from_datum(),
            to: entitlement.to_datum(),
            delay,
            entitlement,
        })
    }

    /// Whether `signature` lies within the licensed range, ends included.
    pub fn covers(&self, signature: &str) -> bool {
        self.from.as_str() <= signature && signature <= self.to.as_str()
    }

    /// The moving wall as seen from `reference`.
    pub fn wall(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        reference + self.delay
    }

    pub fn delay(&self) -> TimeDelta {
        self.delay
    }

    /// Serialized range, used to suppress duplicate licenses.
    pub fn range(&self) -> String {
        if self.delay.is_zero() {
            format!("{}-{}", self.from, self.to)
        } else {
            format!("{}-{}:{}", self.from, self.to, self.delay.num_days())
        }
    }
}

/// Licenses keyed by ISSN.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Licenses(HashMap<String, Vec<License>>);

impl Licenses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a license under its ISSN. Returns false for a duplicate range.
    pub fn add(&mut self, license: License) -> bool {
        let entries = self.0.entry(license.issn.clone()).or_default();
        let range = license.range();
        if entries.iter().any(|existing| existing.range() == range) {
            return false;
        }
        entries.push(license);
        true
    }

    pub fn get(&self, issn: &str) -> Option<&[License]> {
        self.0.get(issn).map(Vec::as_slice)
    }

    pub fn issn_count(&self) -> usize {
        self.0.len()
    }

    pub fn license_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Maps an ISSN to the authoritative holding for it.
pub type IssnHolding = HashMap<String, Holding>;

/// Maps an ISIL to that institution's ISSN table.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IsilIssnHolding(HashMap<String, IssnHolding>);

impl IsilIssnHolding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, isil: impl Into<String>, holdings: IssnHolding) {
        self.0.insert(isil.into(), holdings);
    }

    pub fn get(&self, isil: &str) -> Option<&IssnHolding> {
        self.0.get(isil)
    }

    /// Available ISILs, sorted.
    pub fn isils(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DelayError;
    use crate::models::{HIGH_DATUM, LOW_DATUM, combine_datum};

    fn entitlement(from: (&str, &str, &str), to: (&str, &str, &str)) -> Entitlement {
        Entitlement {
            from_year: from.0.into(),
            from_volume: from.1.into(),
            from_issue: from.2.into(),
            to_year: to.0.into(),
            to_volume: to.1.into(),
            to_issue: to.2.into(),
            ..Entitlement::default()
        }
    }

    #[test]
    fn test_covers_inclusive_range() {
        let license = License::new(
            "1234-5678",
            entitlement(("2000", "1", "1"), ("2020", "50", "12")),
            "Journal",
        )
        .unwrap();

        assert!(license.covers(&combine_datum("2010", "10", "5", "")));
        assert!(license.covers(&combine_datum("2000", "1", "1", "")));
        assert!(license.covers(&combine_datum("2020", "50", "12", "")));
        assert!(!license.covers(&combine_datum("2021", "51", "1", "")));
        assert!(!license.covers(&combine_datum("1999", "", "", "")));
    }

    #[test]
    fn test_open_ended_range() {
        let open = entitlement(("", "", ""), ("", "", ""));
        let license = License::new("1234-5678", open, "J").unwrap();
        assert_eq!(license.range(), format!("{LOW_DATUM}-{HIGH_DATUM}"));
        assert!(license.covers(&combine_datum("1850", "1", "1", "")));
        assert!(license.covers(&combine_datum("2099", "", "", "")));
    }

    #[test]
    fn test_new_rejects_mismatched_delay() {
        let mut e = entitlement(("2000", "", ""), ("", "", ""));
        e.from_delay = "-1Y".into();
        e.to_delay = "-2Y".into();
        let err = License::new("1234-5678", e, "Journal").unwrap_err();
        assert!(matches!(
            err,
            HoldingsError::Delay {
                source: DelayError::Mismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_new_rejects_wide_components() {
        let e = entitlement(("20000", "", ""), ("", "", ""));
        let err = License::new("1234-5678", e, "Journal").unwrap_err();
        assert_eq!(
            err,
            HoldingsError::DatumOverflow {
                title: "Journal".into(),
                field: "begin year",
                value: "20000".into(),
            }
        );
    }

    #[test]
    fn test_wall() {
        let mut e = entitlement(("2000", "", ""), ("", "", ""));
        e.to_delay = "-1Y".into();
        let license = License::new("1234-5678", e, "Journal").unwrap();
        let now = Utc::now();
        assert_eq!(license.wall(now), now - TimeDelta::days(360));
        assert!(license.range().ends_with(":-360"));
    }

    #[test]
    fn test_licenses_suppress_duplicates() {
        let mut licenses = Licenses::new();
        let e = entitlement(("2000", "1", "1"), ("2020", "", ""));
        assert!(licenses.add(License::new("1234-5678", e.clone(), "A").unwrap()));
        assert!(!licenses.add(License::new("1234-5678", e.clone(), "B").unwrap()));
        assert!(licenses.add(License::new("8765-4321", e, "A").unwrap()));

        let other = entitlement(("2021", "", ""), ("", "", ""));
        assert!(licenses.add(License::new("1234-5678", other, "A").unwrap()));

        assert_eq!(licenses.issn_count(), 2);
        assert_eq!(licenses.license_count(), 3);
        assert_eq!(licenses.get("1234-5678").map(<[License]>::len), Some(2));
        assert!(licenses.get("0000-0000").is_none());
    }

    #[test]
    fn test_isils_sorted() {
        let mut iih = IsilIssnHolding::new();
        iih.insert("DE-15", IssnHolding::new());
        iih.insert("DE-14", IssnHolding::new());
        assert_eq!(iih.isils(), vec!["DE-14", "DE-15"]);
        assert!(iih.get("DE-15").is_some());
    }
}
