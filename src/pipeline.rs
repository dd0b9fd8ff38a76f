//! Orchestration of the enrich, nest, expand and fit stages.

use crate::enrich::{enrich, EnrichOptions, EnrichedRecord};
use crate::error::{Error, Result};
use crate::expand::expand;
use crate::formula::ModelSpec;
use crate::genetics::{possible_genos, GenotypeCatalog};
use crate::lmm::{fit, FitOptions, FittedModel};
use crate::nest::{by_cohort_locus, by_locus, nest};
use crate::{Cohort, Observation};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub enrich: EnrichOptions,
    pub fit: FitOptions,
    pub models: Vec<ModelSpec>,
    /// Fit tasks on the rayon pool instead of the calling thread
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrich: EnrichOptions::default(),
            fit: FitOptions::default(),
            models: ModelSpec::catalog(),
            parallel: true,
        }
    }
}

/// Identifies a fit task and its result
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FitKey {
    pub cohort: Cohort,
    pub locus: String,
    pub model: String,
}

impl fmt::Display for FitKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cohort, self.locus, self.model)
    }
}

/// One (cohort, locus) subset paired with one model.
#[derive(Clone, Debug)]
pub struct FitTask {
    pub key: FitKey,
    pub subset: Arc<Vec<EnrichedRecord>>,
    pub catalog: GenotypeCatalog,
    pub model: Arc<ModelSpec>,
}

impl FitTask {
    pub fn run(&self, options: &FitOptions) -> Result<FittedModel> {
        fit(
            &self.key.locus,
            &self.subset,
            &self.catalog,
            &self.model.formula,
            options,
        )
    }
}

#[derive(Debug)]
pub struct LocusFailure {
    pub locus: String,
    pub error: Error,
}

/// Everything decided before any model is fitted
#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<FitTask>,
    /// Catalogs of the polymorphic loci
    pub catalogs: BTreeMap<String, GenotypeCatalog>,
    pub monomorphic: Vec<String>,
    pub locus_failures: Vec<LocusFailure>,
}

#[derive(Clone, Debug)]
pub struct FitRecord {
    pub key: FitKey,
    pub model: FittedModel,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub key: FitKey,
    pub error: Error,
}

/// Outcome of a whole run, sorted by key.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub fits: Vec<FitRecord>,
    pub failures: Vec<TaskFailure>,
    pub monomorphic: Vec<String>,
    pub locus_failures: Vec<LocusFailure>,
}

impl PipelineReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            succeeded: self.fits.len(),
            failed: self.failures.iter().map(|f| (f.key.clone(), f.error.to_string())).collect(),
            invalid_loci: self
                .locus_failures
                .iter()
                .map(|f| (f.locus.clone(), f.error.to_string()))
                .collect(),
            monomorphic: self.monomorphic.len(),
        }
    }
}

/// Counts and failing keys of a run, printable for the user
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: Vec<(FitKey, String)>,
    pub invalid_loci: Vec<(String, String)>,
    pub monomorphic: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} fits: {} succeeded, {} failed ({} monomorphic and {} invalid loci skipped)",
            self.succeeded + self.failed.len(),
            self.succeeded,
            self.failed.len(),
            self.monomorphic,
            self.invalid_loci.len()
        )?;
        for (locus, error) in &self.invalid_loci {
            writeln!(f, "  invalid locus {}: {}", locus, error)?;
        }
        for (key, error) in &self.failed {
            writeln!(f, "  failed {}: {}", key, error)?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the fit tasks for enriched records.
    ///
    /// Catalogs are built per locus across both cohorts, so every cohort
    /// shares the genotype coding of a locus. Monomorphic loci and loci
    /// with an invalid allele count produce no tasks.
    pub fn plan(&self, enriched: &[EnrichedRecord]) -> Plan {
        let mut plan = Plan::default();
        for (locus, rows) in nest(enriched.iter(), by_locus) {
            match possible_genos(&locus, rows.iter().map(|r| r.raw.genotype.as_ref())) {
                Ok(catalog) if catalog.is_polymorphic() => {
                    plan.catalogs.insert(locus, catalog);
                }
                Ok(_) => plan.monomorphic.push(locus),
                Err(error) => {
                    warn!("Skipping locus {}: {}", locus, error);
                    plan.locus_failures.push(LocusFailure { locus, error });
                }
            }
        }

        let subsets: Vec<(Cohort, String, Arc<Vec<EnrichedRecord>>, GenotypeCatalog)> =
            nest(enriched.iter().cloned(), by_cohort_locus)
                .into_iter()
                .filter_map(|((cohort, locus), rows)| {
                    let catalog = plan.catalogs.get(&locus)?.clone();
                    Some((cohort, locus, Arc::new(rows), catalog))
                })
                .collect();
        let models: Vec<Arc<ModelSpec>> = self.config.models.iter().cloned().map(Arc::new).collect();

        plan.tasks = expand(&subsets, &models)
            .into_iter()
            .map(|((cohort, locus, subset, catalog), model)| FitTask {
                key: FitKey {
                    cohort,
                    locus,
                    model: model.name.clone(),
                },
                subset,
                catalog,
                model,
            })
            .collect();

        info!(
            "Planned {} fit tasks: {} polymorphic loci, {} monomorphic, {} invalid, {} subsets, {} models",
            plan.tasks.len(),
            plan.catalogs.len(),
            plan.monomorphic.len(),
            plan.locus_failures.len(),
            subsets.len(),
            models.len()
        );
        plan
    }

    /// Fits every task, a failing task never stops the others.
    pub fn fit_tasks(&self, tasks: &[FitTask]) -> (Vec<FitRecord>, Vec<TaskFailure>) {
        let options = &self.config.fit;
        let outcomes: Vec<(FitKey, Result<FittedModel>)> = if self.config.parallel {
            tasks
                .par_iter()
                .map(|task| (task.key.clone(), task.run(options)))
                .collect()
        } else {
            tasks
                .iter()
                .map(|task| (task.key.clone(), task.run(options)))
                .collect()
        };

        let mut fits = vec![];
        let mut failures = vec![];
        for (key, outcome) in outcomes {
            match outcome {
                Ok(model) => {
                    if !model.converged {
                        warn!("{} did not converge in {} iterations", key, options.max_iters);
                    }
                    fits.push(FitRecord { key, model });
                }
                Err(error) => {
                    warn!("Fit {} failed: {}", key, error);
                    failures.push(TaskFailure { key, error });
                }
            }
        }
        fits.sort_by(|a, b| a.key.cmp(&b.key));
        failures.sort_by(|a, b| a.key.cmp(&b.key));
        (fits, failures)
    }

    pub fn run(&self, observations: &[Observation]) -> PipelineReport {
        let enriched = enrich(observations, &self.config.enrich);
        let plan = self.plan(&enriched);
        let (fits, failures) = self.fit_tasks(&plan.tasks);
        info!("Fitted {} models, {} failed", fits.len(), failures.len());
        PipelineReport {
            fits,
            failures,
            monomorphic: plan.monomorphic,
            locus_failures: plan.locus_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::JoinPolicy;
    use crate::genetics::Genotype;

    fn observation(cohort: &str, locus: &str, genotype: &str, year: &str, mo_da: f64) -> Observation {
        Observation {
            id: None,
            mo_da: Some(mo_da),
            cohort_label: cohort.into(),
            locus: Some(locus.into()),
            genotype: Genotype::parse(genotype, "/"),
            sex: Some("F".into()),
            age_spawn: Some("4".into()),
            year: Some(year.into()),
        }
    }

    /// Two cohorts, four years, three fish per genotype and year.
    fn locus_rows(locus: &str, genotypes: &[&str]) -> Vec<Observation> {
        let mut rows = vec![];
        for cohort in ["NH", "CV"] {
            for (y, year) in ["2010", "2011", "2012", "2013"].iter().enumerate() {
                for (k, g) in genotypes.iter().enumerate() {
                    for rep in 0..3 {
                        let mo_da = 5.0 + k as f64 + y as f64 * 0.7 + 0.05 * ((rep * 5 + k + y) as f64).cos();
                        rows.push(observation(cohort, locus, g, year, mo_da));
                    }
                }
            }
        }
        rows
    }

    #[test]
    fn test_plan_skips_monomorphic_and_invalid_loci() {
        let mut obs = locus_rows("L1", &["A/A", "A/G", "G/G"]);
        obs.extend(locus_rows("L2", &["C/C"]));
        obs.extend(locus_rows("L3", &["A/C", "G/G"]));
        let pipeline = Pipeline::new(PipelineConfig::default());
        let plan = pipeline.plan(&enrich(&obs, &EnrichOptions::default()));

        assert_eq!(plan.tasks.len(), 2 * 3);
        assert_eq!(plan.monomorphic, vec!["L2"]);
        assert_eq!(plan.locus_failures.len(), 1);
        assert_eq!(plan.locus_failures[0].locus, "L3");
        assert!(plan.tasks.iter().all(|t| t.key.locus == "L1"));
        assert_eq!(plan.tasks[0].key.to_string(), "CV/L1/vanilla");
    }

    #[test]
    fn test_catalog_is_shared_across_cohorts() {
        // NH only ever shows A/A, but CV shows G, so NH is coded biallelic too
        let mut obs = vec![];
        for year in ["2010", "2011"] {
            obs.push(observation("NH", "L1", "A/A", year, 1.0));
            obs.push(observation("CV", "L1", "G/G", year, 2.0));
        }
        let plan = Pipeline::new(PipelineConfig::default()).plan(&enrich(&obs, &EnrichOptions::default()));
        assert_eq!(plan.tasks.len(), 6);
        assert!(plan
            .tasks
            .iter()
            .all(|t| t.catalog == GenotypeCatalog::Biallelic("A".into(), "G".into())));
    }

    #[test]
    fn test_run_isolates_failing_tasks() {
        let mut obs = locus_rows("L1", &["A/A", "A/G", "G/G"]);
        // L4 has a single year in CV, which cannot support a random year intercept
        obs.extend(
            locus_rows("L4", &["T/T", "C/T", "C/C"])
                .into_iter()
                .filter(|o| o.cohort_label == "NH" || o.year.as_deref() == Some("2010")),
        );
        for parallel in [true, false] {
            let config = PipelineConfig {
                parallel,
                ..PipelineConfig::default()
            };
            let report = Pipeline::new(config).run(&obs);
            assert_eq!(report.fits.len(), 9);
            assert_eq!(report.failures.len(), 3);
            assert!(report
                .failures
                .iter()
                .all(|f| f.key.cohort == Cohort::Cv && f.key.locus == "L4"));

            let summary = report.summary();
            assert_eq!(summary.succeeded, 9);
            assert!(summary.to_string().starts_with("12 fits: 9 succeeded, 3 failed"));
            assert!(summary.to_string().contains("failed CV/L4/age"));
        }
    }

    #[test]
    fn test_join_mismatch_fails_only_its_tasks() {
        let mut obs = locus_rows("L1", &["A/A", "A/G", "G/G"]);
        obs.extend(locus_rows("L2", &["C/C", "C/T", "T/T"]));
        let config = PipelineConfig {
            fit: FitOptions {
                join_policy: JoinPolicy::Reject,
                ..FitOptions::default()
            },
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config);
        let mut tasks = pipeline.plan(&enrich(&obs, &EnrichOptions::default())).tasks;
        // A catalog that does not know the T allele
        for task in tasks.iter_mut().filter(|t| t.key.locus == "L2") {
            task.catalog = GenotypeCatalog::Biallelic("C".into(), "G".into());
        }

        let (fits, failures) = pipeline.fit_tasks(&tasks);
        assert_eq!(fits.len(), 6);
        assert!(fits.iter().all(|f| f.key.locus == "L1"));
        assert_eq!(failures.len(), 6);
        assert!(failures
            .iter()
            .all(|f| matches!(&f.error, Error::JoinMismatch { locus, .. } if locus == "L2")));
    }

    #[test]
    fn test_run_survives_non_finite_responses() {
        let mut obs = locus_rows("L1", &["A/A", "A/G", "G/G"]);
        // A NaN response is missing data and only drops its row
        obs[0].mo_da = Some(f64::NAN);
        let mut l5 = locus_rows("L5", &["C/C", "C/T", "T/T"]);
        let nh = l5.iter().position(|o| o.cohort_label == "NH").unwrap();
        l5[nh].mo_da = Some(f64::INFINITY);
        obs.extend(l5);

        let report = Pipeline::new(PipelineConfig::default()).run(&obs);
        assert_eq!(report.fits.len(), 9);
        assert_eq!(report.failures.len(), 3);
        assert!(report
            .failures
            .iter()
            .all(|f| f.key.cohort == Cohort::Nh && f.key.locus == "L5"));
        let nh_l1 = report
            .fits
            .iter()
            .find(|f| f.key.to_string() == "NH/L1/vanilla")
            .unwrap();
        assert_eq!(nh_l1.model.n_obs, 35);
    }
}
