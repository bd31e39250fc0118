// src/models/crossref.rs

//! Crossref work documents, as found in API dumps.

use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::TransformError;
use crate::models::{Author, Importer, IntermediateSchema};
use crate::services::MemberNames;

/// Source identifier of Crossref records.
pub const SOURCE_ID: &str = "49";

/// Work types that never become records.
const SKIPPED_TYPES: &[&str] = &[
    "journal",
    "journal-issue",
    "journal-volume",
    "book-series",
    "book-set",
    "proceedings",
    "component",
];

/// A single Crossref work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(rename = "DOI", default)]
    pub doi: String,

    #[serde(rename = "ISSN", default)]
    pub issn: Vec<String>,

    #[serde(rename = "issn-type", default)]
    pub issn_type: Vec<TypedIssn>,

    #[serde(rename = "URL", default)]
    pub url: String,

    #[serde(default)]
    pub author: Vec<CrossrefAuthor>,

    #[serde(rename = "container-title", default)]
    pub container_title: Vec<String>,

    #[serde(default)]
    pub title: Vec<String>,

    #[serde(default)]
    pub issue: String,

    #[serde(default)]
    pub volume: String,

    #[serde(default)]
    pub page: String,

    #[serde(default)]
    pub publisher: String,

    /// Member URL, e.g. `http://id.crossref.org/member/78`
    #[serde(default)]
    pub member: String,

    #[serde(default)]
    pub subject: Vec<String>,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub issued: DateField,
}

/// An ISSN with its print/electronic qualifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypedIssn {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefAuthor {
    #[serde(default)]
    pub given: String,
    #[serde(default)]
    pub family: String,
}

/// Crossref style partial date: `{"date-parts": [[2010, 5, 1]]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateField {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<i64>>>,
}

impl DateField {
    /// First date, month and day default to 1.
    pub fn date(&self) -> Option<NaiveDate> {
        let parts = self.date_parts.first()?;
        let year = i32::try_from((*parts.first()?)?).ok()?;
        let month = parts.get(1).copied().flatten().unwrap_or(1);
        let day = parts.get(2).copied().flatten().unwrap_or(1);
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    }
}

impl Document {
    /// Canonical DOI link.
    pub fn doi_url(&self) -> String {
        format!("http://dx.doi.org/{}", self.doi)
    }

    /// Stable record identifier derived from the DOI.
    pub fn record_id(&self) -> String {
        let digest = Sha256::digest(self.doi_url().as_bytes());
        format!("ai-{}-{}", SOURCE_ID, hex::encode(digest))
    }

    /// Numeric member id from the member URL.
    pub fn member_id(&self) -> Option<i64> {
        self.member.rsplit('/').next()?.parse().ok()
    }

    /// Print and electronic ISSNs; untyped ISSNs count as print.
    fn split_issns(&self) -> (Vec<String>, Vec<String>) {
        let mut print = Vec::new();
        let mut electronic = Vec::new();
        if self.issn_type.is_empty() {
            print.extend(self.issn.iter().map(|s| s.trim().to_string()));
        }
        for typed in &self.issn_type {
            let value = typed.value.trim().to_string();
            match typed.kind.as_str() {
                "electronic" => electronic.push(value),
                _ => print.push(value),
            }
        }
        print.retain(|s| !s.is_empty());
        electronic.retain(|s| !s.is_empty());
        (print, electronic)
    }

    fn genre_and_format(&self) -> (&'static str, &'static str) {
        match self.kind.as_str() {
            "journal-article" => ("article", "ElectronicArticle"),
            "proceedings-article" => ("proceeding", "ElectronicArticle"),
            "book-chapter" | "book-section" | "book-part" => ("bookitem", "ElectronicBookPart"),
            "book" | "monograph" | "edited-book" | "reference-book" => ("book", "ElectronicBook"),
            _ => ("unknown", "ElectronicArticle"),
        }
    }
}

fn first_nonempty(values: &[String]) -> String {
    values
        .iter()
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

impl Importer for Document {
    fn to_intermediate_schema(
        &self,
        members: &MemberNames,
    ) -> Result<IntermediateSchema, TransformError> {
        if SKIPPED_TYPES.contains(&self.kind.as_str()) {
            return Err(TransformError::skip(format!("type {}", self.kind)));
        }
        if self.doi.trim().is_empty() {
            return Err(TransformError::invalid("missing DOI"));
        }
        let date = self
            .issued
            .date()
            .ok_or_else(|| TransformError::invalid(format!("{}: no usable issued date", self.doi)))?;

        let title = first_nonempty(&self.title);
        if title.is_empty() {
            return Err(TransformError::skip(format!("{}: no title", self.doi)));
        }

        let mut is = IntermediateSchema::new(self.record_id(), SOURCE_ID, date);
        let (genre, format) = self.genre_and_format();
        is.genre = genre.to_string();
        is.format = format.to_string();
        is.doi = self.doi.clone();
        is.article_title = title;
        is.journal_title = first_nonempty(&self.container_title);
        (is.issn, is.eissn) = self.split_issns();
        is.volume = self.volume.trim().to_string();
        is.issue = self.issue.trim().to_string();

        let page = self.page.trim();
        if let Some((start, end)) = page.split_once('-') {
            is.start_page = start.trim().to_string();
            is.end_page = end.trim().to_string();
        } else {
            is.start_page = page.to_string();
        }
        is.pages = page.to_string();

        let publisher = self
            .member_id()
            .and_then(|id| members.lookup(id))
            .map(str::to_string)
            .unwrap_or_else(|| self.publisher.trim().to_string());
        is.mega_collection = if publisher.is_empty() {
            "X-U (CrossRef)".to_string()
        } else {
            format!("{publisher} (CrossRef)")
        };
        if !publisher.is_empty() {
            is.publishers.push(publisher);
        }

        is.url.push(if self.url.is_empty() {
            self.doi_url()
        } else {
            self.url.clone()
        });

        is.authors = self
            .author
            .iter()
            .filter(|a| !a.given.is_empty() || !a.family.is_empty())
            .map(|a| Author {
                first_name: a.given.trim().to_string(),
                last_name: a.family.trim().to_string(),
            })
            .collect();
        is.subjects = self.subject.clone();

        Ok(is)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Document {
        serde_json::from_str(json).unwrap()
    }

    const ARTICLE: &str = r#"{
        "DOI": "10.1234/abc",
        "ISSN": ["1234-5678"],
        "title": ["  An   Article "],
        "container-title": ["Journal of Tests"],
        "issued": {"date-parts": [[2010, 5]]},
        "volume": "10",
        "issue": "5",
        "page": "1-10",
        "publisher": "Test Press",
        "member": "http://id.crossref.org/member/78",
        "author": [{"given": "Ada", "family": "Lovelace"}, {}],
        "type": "journal-article"
    }"#;

    #[test]
    fn test_article_conversion() {
        let doc = parse(ARTICLE);
        let is = doc.to_intermediate_schema(&MemberNames::default()).unwrap();

        assert_eq!(is.source_id, "49");
        assert!(is.record_id.starts_with("ai-49-"));
        assert_eq!(is.record_id.len(), "ai-49-".len() + 64);
        assert_eq!(is.article_title, "An Article");
        assert_eq!(is.journal_title, "Journal of Tests");
        assert_eq!(is.date, NaiveDate::from_ymd_opt(2010, 5, 1).unwrap());
        assert_eq!(is.issn, vec!["1234-5678"]);
        assert!(is.eissn.is_empty());
        assert_eq!((is.start_page.as_str(), is.end_page.as_str()), ("1", "10"));
        assert_eq!(is.publishers, vec!["Test Press"]);
        assert_eq!(is.mega_collection, "Test Press (CrossRef)");
        assert_eq!(is.url, vec!["http://dx.doi.org/10.1234/abc"]);
        assert_eq!(is.authors.len(), 1);
        assert_eq!(is.genre, "article");
        assert!(is.labels.is_empty());
    }

    #[test]
    fn test_member_name_overrides_publisher() {
        let doc = parse(ARTICLE);
        let members = MemberNames::from_entries([(78, "Member Name Ltd".to_string())]);
        let is = doc.to_intermediate_schema(&members).unwrap();
        assert_eq!(is.publishers, vec!["Member Name Ltd"]);
    }

    #[test]
    fn test_typed_issns() {
        let doc = parse(
            r#"{"DOI": "10.1/x", "title": ["T"], "issued": {"date-parts": [[2001]]},
                "ISSN": ["1111-1111", "2222-2222"],
                "issn-type": [{"value": "1111-1111", "type": "print"},
                              {"value": "2222-2222", "type": "electronic"}]}"#,
        );
        let is = doc.to_intermediate_schema(&MemberNames::default()).unwrap();
        assert_eq!(is.issn, vec!["1111-1111"]);
        assert_eq!(is.eissn, vec!["2222-2222"]);
        assert_eq!(is.date, NaiveDate::from_ymd_opt(2001, 1, 1).unwrap());
    }

    #[test]
    fn test_conversion_errors() {
        let members = MemberNames::default();

        let no_doi = parse(r#"{"title": ["T"], "issued": {"date-parts": [[2001]]}}"#);
        assert!(matches!(
            no_doi.to_intermediate_schema(&members),
            Err(TransformError::Invalid(_))
        ));

        let no_date = parse(r#"{"DOI": "10.1/x", "title": ["T"], "issued": {"date-parts": [[null]]}}"#);
        assert!(matches!(
            no_date.to_intermediate_schema(&members),
            Err(TransformError::Invalid(_))
        ));

        let bad_date = parse(r#"{"DOI": "10.1/x", "title": ["T"], "issued": {"date-parts": [[2001, 13]]}}"#);
        assert!(bad_date.to_intermediate_schema(&members).is_err());

        let no_title = parse(r#"{"DOI": "10.1/x", "title": [" "], "issued": {"date-parts": [[2001]]}}"#);
        assert!(matches!(
            no_title.to_intermediate_schema(&members),
            Err(TransformError::Skip(_))
        ));

        let issue = parse(r#"{"DOI": "10.1/x", "type": "journal-issue"}"#);
        assert!(matches!(
            issue.to_intermediate_schema(&members),
            Err(TransformError::Skip(_))
        ));
    }

    #[test]
    fn test_member_id() {
        let doc = parse(r#"{"member": "http://id.crossref.org/member/311"}"#);
        assert_eq!(doc.member_id(), Some(311));
        assert_eq!(Document::default().member_id(), None);
    }
}
