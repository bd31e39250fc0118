// src/pipeline/validate.rs

use crate::config::{load_holdings_filter, load_members};
use crate::error::{AppError, Result};
use crate::models::{Config, FilterSpec};
use crate::services::ListFilter;

/// Holdings counts for one institution's holdings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingsReport {
    pub isil: String,
    pub issns: usize,
    pub licenses: usize,
    pub errors: usize,
}

/// Validate configuration and every file it points to.
///
/// All holdings files are parsed and reported; the run fails on the first
/// file that produced parse errors.
pub fn run_validate(config: &Config) -> Result<Vec<HoldingsReport>> {
    log::info!("Validating configuration...");
    config.validate()?;
    log::info!("✓ Config OK ({} institutions)", config.isils.len());

    if config.members.is_some() {
        let members = load_members(config)?;
        log::info!("✓ Member names OK ({} entries)", members.len());
    }

    let mut reports = Vec::new();
    let mut failure = None;

    for (isil, specs) in &config.isils {
        for spec in specs {
            match spec {
                FilterSpec::Any | FilterSpec::Source { .. } => {}
                FilterSpec::List { path } => {
                    let file = std::fs::File::open(path).map_err(|e| {
                        AppError::config(format!("cannot open {}: {}", path.display(), e))
                    })?;
                    let list = ListFilter::from_reader(std::io::BufReader::new(file))?;
                    log::info!("  - {}: {} list entries in {}", isil, list.len(), path.display());
                }
                FilterSpec::Holdings { path } => {
                    let (filter, errors) = load_holdings_filter(path)?;
                    let report = HoldingsReport {
                        isil: isil.clone(),
                        issns: filter.table().issn_count(),
                        licenses: filter.table().license_count(),
                        errors: errors.len(),
                    };
                    log::info!(
                        "  - {}: {} ISSNs, {} licenses, {} errors in {}",
                        report.isil,
                        report.issns,
                        report.licenses,
                        report.errors,
                        path.display()
                    );
                    if report.errors > 0 && failure.is_none() {
                        failure = Some(AppError::Holdings {
                            path: path.clone(),
                            count: report.errors,
                        });
                    }
                    reports.push(report);
                }
            }
        }
    }

    match failure {
        Some(e) => {
            log::error!("Validation failed: {}", e);
            Err(e)
        }
        None => {
            log::info!("All validations passed!");
            Ok(reports)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn holdings_file(delay: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<institutional_holdings>
  <holding ezb_id="7">
    <title>Validated</title>
    <EZBIssns><p-issn>1234-5678</p-issn><e-issn>8765-4321</e-issn></EZBIssns>
    <entitlements>
      <entitlement status="subscribed">
        <begin><year>2000</year><delay>{delay}</delay></begin>
        <end><year>2020</year></end>
      </entitlement>
    </entitlements>
  </holding>
</institutional_holdings>"#
        )
        .unwrap();
        file
    }

    fn config_with(isil: &str, file: &NamedTempFile) -> Config {
        let mut config = Config::default();
        config.isils.insert(
            isil.into(),
            vec![
                FilterSpec::Any,
                FilterSpec::Holdings {
                    path: file.path().to_path_buf(),
                },
            ],
        );
        config
    }

    #[test]
    fn test_validate_reports_counts() {
        let file = holdings_file("-1Y");
        let reports = run_validate(&config_with("DE-15", &file)).unwrap();
        assert_eq!(
            reports,
            vec![HoldingsReport {
                isil: "DE-15".into(),
                issns: 2,
                licenses: 2,
                errors: 0,
            }]
        );
    }

    #[test]
    fn test_validate_fails_on_holdings_errors() {
        let file = holdings_file("soon");
        let err = run_validate(&config_with("DE-15", &file)).unwrap_err();
        assert!(matches!(err, AppError::Holdings { count: 1, .. }));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(matches!(run_validate(&config), Err(AppError::Validation(_))));
    }
}
