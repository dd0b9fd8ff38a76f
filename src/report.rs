//! Tidy tables over fitted models and their CSV output.

use crate::error::Result;
use crate::pipeline::{FitRecord, PipelineReport};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TidyRow {
    pub cohort: String,
    pub locus: String,
    pub model: String,
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VarianceRow {
    pub cohort: String,
    pub locus: String,
    pub model: String,
    pub group: String,
    pub term: String,
    pub variance: f64,
    pub std_dev: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AugmentRow {
    pub cohort: String,
    pub locus: String,
    pub model: String,
    pub row: usize,
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// One-line model summary
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GlanceRow {
    pub cohort: String,
    pub locus: String,
    pub model: String,
    pub formula: String,
    pub nobs: usize,
    pub ngroups: usize,
    pub sigma: f64,
    pub reml_criterion: f64,
    pub log_lik: f64,
    pub converged: bool,
    pub singular: bool,
    pub dropped_terms: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailureRow {
    pub cohort: String,
    pub locus: String,
    pub model: String,
    pub error: String,
}

pub fn tidy(record: &FitRecord) -> Vec<TidyRow> {
    record
        .model
        .coefficients
        .iter()
        .map(|c| TidyRow {
            cohort: record.key.cohort.to_string(),
            locus: record.key.locus.clone(),
            model: record.key.model.clone(),
            term: c.term.clone(),
            estimate: c.estimate,
            std_error: c.std_error,
            statistic: c.statistic,
            df: c.df,
            p_value: c.p_value,
        })
        .collect()
}

pub fn variance_components(record: &FitRecord) -> Vec<VarianceRow> {
    record
        .model
        .variance_components
        .iter()
        .map(|v| VarianceRow {
            cohort: record.key.cohort.to_string(),
            locus: record.key.locus.clone(),
            model: record.key.model.clone(),
            group: v.group.clone(),
            term: v.term.clone(),
            variance: v.variance,
            std_dev: v.std_dev(),
        })
        .collect()
}

pub fn augment(record: &FitRecord) -> Vec<AugmentRow> {
    record
        .model
        .fitted
        .iter()
        .map(|f| AugmentRow {
            cohort: record.key.cohort.to_string(),
            locus: record.key.locus.clone(),
            model: record.key.model.clone(),
            row: f.row,
            observed: f.observed,
            fitted: f.fitted,
            residual: f.residual,
        })
        .collect()
}

pub fn glance(record: &FitRecord) -> GlanceRow {
    let m = &record.model;
    GlanceRow {
        cohort: record.key.cohort.to_string(),
        locus: record.key.locus.clone(),
        model: record.key.model.clone(),
        formula: m.formula.clone(),
        nobs: m.n_obs,
        ngroups: m.n_groups,
        sigma: m.sigma,
        reml_criterion: m.reml_criterion,
        log_lik: m.log_likelihood,
        converged: m.converged,
        singular: m.singular,
        dropped_terms: m.dropped_terms.join(";"),
    }
}

/// A row of one output table, with the column names its table starts with
pub trait TableRow: Serialize {
    const HEADER: &'static [&'static str];
}

impl TableRow for TidyRow {
    const HEADER: &'static [&'static str] = &[
        "cohort", "locus", "model", "term", "estimate", "std_error", "statistic", "df", "p_value",
    ];
}

impl TableRow for VarianceRow {
    const HEADER: &'static [&'static str] =
        &["cohort", "locus", "model", "group", "term", "variance", "std_dev"];
}

impl TableRow for AugmentRow {
    const HEADER: &'static [&'static str] =
        &["cohort", "locus", "model", "row", "observed", "fitted", "residual"];
}

impl TableRow for GlanceRow {
    const HEADER: &'static [&'static str] = &[
        "cohort",
        "locus",
        "model",
        "formula",
        "nobs",
        "ngroups",
        "sigma",
        "reml_criterion",
        "log_lik",
        "converged",
        "singular",
        "dropped_terms",
    ];
}

impl TableRow for FailureRow {
    const HEADER: &'static [&'static str] = &["cohort", "locus", "model", "error"];
}

/// Writes the header even when `rows` is empty.
fn write_rows<P: AsRef<Path>, T: TableRow>(path: P, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(T::HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the coefficient, variance, glance, augment and failure tables into `out_dir`.
pub fn write_report<P: AsRef<Path>>(report: &PipelineReport, out_dir: P) -> Result<()> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    write_rows(out_dir.join("coefficients.csv"), report.fits.iter().flat_map(tidy))?;
    write_rows(
        out_dir.join("variance_components.csv"),
        report.fits.iter().flat_map(variance_components),
    )?;
    write_rows(out_dir.join("glance.csv"), report.fits.iter().map(glance))?;
    write_rows(out_dir.join("augment.csv"), report.fits.iter().flat_map(augment))?;

    let failures = report
        .locus_failures
        .iter()
        .map(|f| FailureRow {
            cohort: String::new(),
            locus: f.locus.clone(),
            model: String::new(),
            error: f.error.to_string(),
        })
        .chain(report.failures.iter().map(|f| FailureRow {
            cohort: f.key.cohort.to_string(),
            locus: f.key.locus.clone(),
            model: f.key.model.clone(),
            error: f.error.to_string(),
        }));
    write_rows(out_dir.join("failures.csv"), failures)?;

    info!("Wrote report tables to {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::lmm::{Coefficient, Fitted, FittedModel, VarianceComponent};
    use crate::pipeline::{FitKey, LocusFailure, TaskFailure};
    use crate::Cohort;

    fn record() -> FitRecord {
        FitRecord {
            key: FitKey {
                cohort: Cohort::Nh,
                locus: "L1".into(),
                model: "vanilla".into(),
            },
            model: FittedModel {
                formula: "mo_da ~ d_add + (1 | year)".into(),
                coefficients: vec![Coefficient {
                    term: "d_add".into(),
                    estimate: 2.0,
                    std_error: 0.5,
                    statistic: 4.0,
                    df: 10.0,
                    p_value: 0.0025,
                }],
                variance_components: vec![VarianceComponent {
                    group: "year".into(),
                    term: "(Intercept)".into(),
                    variance: 4.0,
                }],
                dropped_terms: vec!["d_dom_with_s".into()],
                converged: true,
                singular: false,
                theta: 1.0,
                reml_criterion: 20.0,
                log_likelihood: -10.0,
                sigma: 2.0,
                n_obs: 12,
                n_groups: 3,
                random_effects: vec![],
                fitted: vec![Fitted {
                    row: 0,
                    observed: 1.0,
                    fitted: 1.5,
                    residual: -0.5,
                }],
            },
        }
    }

    #[test]
    fn test_tidy_and_glance() {
        let r = record();
        let rows = tidy(&r);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cohort, "NH");
        assert_eq!(rows[0].term, "d_add");
        assert_eq!(variance_components(&r)[0].std_dev, 2.0);
        assert_eq!(augment(&r)[0].residual, -0.5);
        assert_eq!(glance(&r).dropped_terms, "d_dom_with_s");
    }

    /// Header `csv` derives from the serde field names of `row`
    fn derived_header<T: TableRow>(row: T) -> String {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(row).unwrap();
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().lines().next().unwrap().to_owned()
    }

    #[test]
    fn test_headers_match_row_fields() {
        let r = record();
        assert_eq!(derived_header(tidy(&r).remove(0)), TidyRow::HEADER.join(","));
        assert_eq!(
            derived_header(variance_components(&r).remove(0)),
            VarianceRow::HEADER.join(",")
        );
        assert_eq!(derived_header(augment(&r).remove(0)), AugmentRow::HEADER.join(","));
        assert_eq!(derived_header(glance(&r)), GlanceRow::HEADER.join(","));
        let failure = FailureRow {
            cohort: "CV".into(),
            locus: "L2".into(),
            model: "sex".into(),
            error: "boom".into(),
        };
        assert_eq!(derived_header(failure), FailureRow::HEADER.join(","));
    }

    #[test]
    fn test_empty_report_keeps_headers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_report(&PipelineReport::default(), dir.path())?;
        for (file, header) in [
            ("coefficients.csv", TidyRow::HEADER),
            ("variance_components.csv", VarianceRow::HEADER),
            ("glance.csv", GlanceRow::HEADER),
            ("augment.csv", AugmentRow::HEADER),
            ("failures.csv", FailureRow::HEADER),
        ] {
            let content = fs::read_to_string(dir.path().join(file))?;
            assert_eq!(content, format!("{}\n", header.join(",")), "{}", file);
        }
        Ok(())
    }

    #[test]
    fn test_write_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let report = PipelineReport {
            fits: vec![record()],
            failures: vec![TaskFailure {
                key: FitKey {
                    cohort: Cohort::Cv,
                    locus: "L2".into(),
                    model: "sex".into(),
                },
                error: Error::model_fit("grouping factor year needs at least 2 levels, found 1"),
            }],
            monomorphic: vec![],
            locus_failures: vec![LocusFailure {
                locus: "L3".into(),
                error: Error::InvalidLocus {
                    locus: "L3".into(),
                    alleles: vec![],
                },
            }],
        };
        write_report(&report, dir.path())?;

        let coefficients = fs::read_to_string(dir.path().join("coefficients.csv"))?;
        let mut lines = coefficients.lines();
        assert_eq!(
            lines.next(),
            Some("cohort,locus,model,term,estimate,std_error,statistic,df,p_value")
        );
        assert!(lines.next().unwrap().starts_with("NH,L1,vanilla,d_add,2.0,0.5"));

        let failures = fs::read_to_string(dir.path().join("failures.csv"))?;
        assert_eq!(failures.lines().count(), 3);
        assert!(failures.contains("CV,L2,sex,"));
        assert!(dir.path().join("glance.csv").exists());
        Ok(())
    }
}
