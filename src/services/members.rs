//! Crossref member name cache.
//!
//! Loaded once from a line delimited JSON file, one member per line.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct Member {
    id: i64,
    #[serde(rename = "primary-name")]
    primary_name: String,
}

/// Member id to primary name lookup table.
#[derive(Debug, Clone, Default)]
pub struct MemberNames {
    names: HashMap<i64, String>,
}

impl MemberNames {
    pub fn from_entries(entries: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            names: entries.into_iter().collect(),
        }
    }

    /// Load members from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let members = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "Loaded {} member names from {}",
            members.len(),
            path.as_ref().display()
        );
        Ok(members)
    }

    /// Read members, one JSON object per line. Blank lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut names = HashMap::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let member: Member = serde_json::from_str(&line).map_err(|e| {
                AppError::validation(format!("member line {}: {}", index + 1, e))
            })?;
            names.insert(member.id, member.primary_name);
        }
        Ok(Self { names })
    }

    pub fn lookup(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
