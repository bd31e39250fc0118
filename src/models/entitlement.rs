// src/models/entitlement.rs

//! Holdings and entitlements as found in OVID style holdings files.
//!
//! An entitlement describes one licensed coverage range of a serial. The
//! range ends are turned into a *datum*, a fixed width string of year,
//! volume and issue, so containment checks are plain string comparisons.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DelayError;

/// Lowest datum, used for ranges without a start.
pub const LOW_DATUM: &str = "0000000000000000";

/// Highest datum, used for ranges without an end.
pub const HIGH_DATUM: &str = "ZZZZZZZZZZZZZZZZ";

/// Padding widths of year, volume and issue inside a datum.
pub const YEAR_WIDTH: usize = 4;
pub const VOLUME_WIDTH: usize = 6;
pub const ISSUE_WIDTH: usize = 6;

const DAYS_PER_MONTH: i64 = 30;
const DAYS_PER_YEAR: i64 = 12 * DAYS_PER_MONTH;

/// Moving walls are written like `-1Y` or `-6M`.
static DELAY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-\d+)(M|Y)$").expect("valid delay pattern"));

/// Canonical form of an ISSN.
pub static ISSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d\d\d-\d\d\d\d$").expect("valid ISSN pattern"));

/// Check whether a trimmed value is a canonical ISSN.
pub fn is_issn(value: &str) -> bool {
    ISSN_PATTERN.is_match(value)
}

/// Parse a delay string like `-1M` or `-3Y` into a (negative) duration.
///
/// A month counts 30 days, a year 12 such months.
pub fn parse_delay(s: &str) -> Result<TimeDelta, DelayError> {
    let caps = DELAY_PATTERN
        .captures(s)
        .ok_or_else(|| DelayError::UnknownFormat(s.to_string()))?;

    let value: i64 = caps[1]
        .parse()
        .map_err(|_| DelayError::UnknownFormat(s.to_string()))?;

    let days_per_unit = match &caps[2] {
        "Y" => DAYS_PER_YEAR,
        "M" => DAYS_PER_MONTH,
        unit => return Err(DelayError::UnknownUnit(unit.to_string())),
    };

    value
        .checked_mul(days_per_unit)
        .and_then(TimeDelta::try_days)
        .ok_or_else(|| DelayError::UnknownFormat(s.to_string()))
}

/// Combine year, volume and issue into a single order preserving value.
///
/// Order is preserved as long as year, volume and issue do not exceed
/// 4, 6 and 6 characters. If all parts are empty and `empty` is given,
/// `empty` is returned instead.
pub fn combine_datum(year: &str, volume: &str, issue: &str, empty: &str) -> String {
    if year.is_empty() && volume.is_empty() && issue.is_empty() && !empty.is_empty() {
        return empty.to_string();
    }
    format!(
        "{year:0>yw$}{volume:0>vw$}{issue:0>iw$}",
        yw = YEAR_WIDTH,
        vw = VOLUME_WIDTH,
        iw = ISSUE_WIDTH
    )
}

/// A single holding: one serial with its licensed entitlements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Holding {
    /// EZB identifier from the `ezb_id` attribute
    #[serde(rename = "ezbid")]
    pub ezb_id: Option<u64>,

    pub title: String,

    pub publishers: String,

    /// Print ISSNs, as listed (untrimmed, unvalidated)
    #[serde(rename = "pissn")]
    pub print_issns: Vec<String>,

    /// Electronic ISSNs, as listed
    #[serde(rename = "eissn")]
    pub electronic_issns: Vec<String>,

    pub entitlements: Vec<Entitlement>,
}

impl Holding {
    /// All listed ISSNs that are canonical after trimming, e-ISSNs first.
    pub fn valid_issns(&self) -> impl Iterator<Item = &str> {
        self.electronic_issns
            .iter()
            .chain(self.print_issns.iter())
            .map(|issn| issn.trim())
            .filter(|issn| is_issn(issn))
    }
}

/// A single licensed coverage range.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Entitlement {
    pub status: String,
    pub url: String,
    pub anchor: String,
    pub from_year: String,
    pub from_volume: String,
    pub from_issue: String,
    pub from_delay: String,
    pub to_year: String,
    pub to_volume: String,
    pub to_issue: String,
    pub to_delay: String,
}

impl Entitlement {
    /// The moving wall of this entitlement, zero if none is given.
    ///
    /// Start and end delay must agree when both are present; the start
    /// delay wins otherwise.
    pub fn delay(&self) -> Result<TimeDelta, DelayError> {
        if !self.from_delay.is_empty() && !self.to_delay.is_empty() && self.from_delay != self.to_delay
        {
            return Err(DelayError::Mismatch {
                start: self.from_delay.clone(),
                end: self.to_delay.clone(),
            });
        }
        if !self.from_delay.is_empty() {
            return parse_delay(&self.from_delay);
        }
        if !self.to_delay.is_empty() {
            return parse_delay(&self.to_delay);
        }
        Ok(TimeDelta::zero())
    }

    /// Most recent instant the moving wall permits access to, as of now.
    pub fn boundary(&self) -> Result<DateTime<Utc>, DelayError> {
        self.boundary_at(Utc::now())
    }

    /// Most recent instant the moving wall permits access to, as of `reference`.
    pub fn boundary_at(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>, DelayError> {
        Ok(reference + self.delay()?)
    }

    /// Lower end of the covered range.
    pub fn from_datum(&self) -> String {
        combine_datum(&self.from_year, &self.from_volume, &self.from_issue, LOW_DATUM)
    }

    /// Upper end of the covered range.
    pub fn to_datum(&self) -> String {
        combine_datum(&self.to_year, &self.to_volume, &self.to_issue, HIGH_DATUM)
    }

    /// The first range component too wide for its datum slot, if any.
    pub fn overflowing_field(&self) -> Option<(&'static str, &str)> {
        [
            ("begin year", self.from_year.as_str(), YEAR_WIDTH),
            ("begin volume", self.from_volume.as_str(), VOLUME_WIDTH),
            ("begin issue", self.from_issue.as_str(), ISSUE_WIDTH),
            ("end year", self.to_year.as_str(), YEAR_WIDTH),
            ("end volume", self.to_volume.as_str(), VOLUME_WIDTH),
            ("end issue", self.to_issue.as_str(), ISSUE_WIDTH),
        ]
        .into_iter()
        .find(|(_, value, width)| value.chars().count() > *width)
        .map(|(field, value, _)| (field, value))
    }
}
