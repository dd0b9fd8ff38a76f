use crate::{Cohort, Observation};
use log::debug;

/// How raw labels map onto derived categories
#[derive(Clone, Debug)]
pub struct EnrichOptions {
    /// Raw collection label that marks the NH cohort, every other label is CV
    pub nh_label: String,
    /// Raw sex value meaning "not recorded"
    pub sex_missing: String,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            nh_label: "NH".to_owned(),
            sex_missing: "?".to_owned(),
        }
    }
}

/// An observation with its derived grouping fields.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedRecord {
    pub raw: Observation,
    pub sex: Option<String>,
    pub year: Option<String>,
    pub age_spawn: Option<String>,
    pub cohort: Cohort,
}

impl EnrichedRecord {
    pub fn from_observation(raw: Observation, options: &EnrichOptions) -> Self {
        let sex = raw.sex.clone().filter(|s| *s != options.sex_missing);
        let cohort = if raw.cohort_label == options.nh_label {
            Cohort::Nh
        } else {
            Cohort::Cv
        };
        Self {
            sex,
            year: raw.year.clone(),
            age_spawn: raw.age_spawn.clone(),
            cohort,
            raw,
        }
    }

    pub fn locus(&self) -> Option<&str> {
        self.raw.locus.as_deref()
    }
}

/// Derives categorical fields for every observation, keeping row count and order.
pub fn enrich(observations: &[Observation], options: &EnrichOptions) -> Vec<EnrichedRecord> {
    let enriched: Vec<EnrichedRecord> = observations
        .iter()
        .cloned()
        .map(|obs| EnrichedRecord::from_observation(obs, options))
        .collect();
    debug!(
        "Enriched {} records, {} in NH",
        enriched.len(),
        enriched.iter().filter(|r| r.cohort == Cohort::Nh).count()
    );
    enriched
}
