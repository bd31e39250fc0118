// src/models/schema.rs

//! The intermediate schema every source format is converted into.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::models::{ISSUE_WIDTH, VOLUME_WIDTH, YEAR_WIDTH, combine_datum};
use crate::services::MemberNames;

/// An author of a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    #[serde(rename = "rft.aufirst", default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,

    #[serde(rename = "rft.aulast", default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

/// Normalized record, annotated with the institutions it is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntermediateSchema {
    #[serde(rename = "finc.record_id")]
    pub record_id: String,

    #[serde(rename = "finc.source_id")]
    pub source_id: String,

    #[serde(rename = "finc.mega_collection", default)]
    pub mega_collection: String,

    #[serde(rename = "finc.format", default)]
    pub format: String,

    #[serde(rename = "rft.genre", default)]
    pub genre: String,

    #[serde(default)]
    pub doi: String,

    #[serde(rename = "rft.atitle", default)]
    pub article_title: String,

    #[serde(rename = "rft.jtitle", default)]
    pub journal_title: String,

    #[serde(rename = "rft.issn", default)]
    pub issn: Vec<String>,

    #[serde(rename = "rft.eissn", default)]
    pub eissn: Vec<String>,

    #[serde(rename = "rft.volume", default)]
    pub volume: String,

    #[serde(rename = "rft.issue", default)]
    pub issue: String,

    #[serde(rename = "rft.spage", default)]
    pub start_page: String,

    #[serde(rename = "rft.epage", default)]
    pub end_page: String,

    #[serde(rename = "rft.pages", default)]
    pub pages: String,

    #[serde(rename = "rft.pub", default)]
    pub publishers: Vec<String>,

    /// Publication date
    #[serde(rename = "x.date")]
    pub date: NaiveDate,

    #[serde(default)]
    pub url: Vec<String>,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(rename = "x.subjects", default)]
    pub subjects: Vec<String>,

    /// ISILs of the institutions this record is attached to
    #[serde(rename = "x.labels", default)]
    pub labels: Vec<String>,
}

impl IntermediateSchema {
    /// An otherwise empty record with identity and date set.
    pub fn new(
        record_id: impl Into<String>,
        source_id: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            source_id: source_id.into(),
            mega_collection: String::new(),
            format: String::new(),
            genre: String::new(),
            doi: String::new(),
            article_title: String::new(),
            journal_title: String::new(),
            issn: Vec::new(),
            eissn: Vec::new(),
            volume: String::new(),
            issue: String::new(),
            start_page: String::new(),
            end_page: String::new(),
            pages: String::new(),
            publishers: Vec::new(),
            date,
            url: Vec::new(),
            authors: Vec::new(),
            subjects: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Print and electronic ISSNs.
    pub fn issns(&self) -> impl Iterator<Item = &str> {
        self.issn.iter().chain(self.eissn.iter()).map(String::as_str)
    }

    /// Position of this record for range comparisons.
    ///
    /// `None` when year, volume or issue is wider than its datum field, as
    /// such a datum would not order correctly.
    pub fn datum(&self) -> Option<String> {
        let year = self.date.year().to_string();
        let fits = [
            (year.as_str(), YEAR_WIDTH),
            (self.volume.as_str(), VOLUME_WIDTH),
            (self.issue.as_str(), ISSUE_WIDTH),
        ]
        .iter()
        .all(|(value, width)| value.chars().count() <= *width);
        fits.then(|| combine_datum(&year, &self.volume, &self.issue, ""))
    }

    /// Attach institutions, replacing any previous labels.
    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.labels = labels;
    }
}

/// Source documents that can be converted into an intermediate schema.
pub trait Importer {
    fn to_intermediate_schema(
        &self,
        members: &MemberNames,
    ) -> Result<IntermediateSchema, TransformError>;
}
