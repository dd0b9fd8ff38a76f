#![crate_name = "locusfit"]
//! Split-apply-combine fitting of per-locus genotype effects.
//!
//! A table of per-fish [`Observation`]s is enriched with grouping fields,
//! nested by (cohort, locus), joined to a per-locus genotype design and
//! expanded against a small catalog of mixed models. Every resulting task
//! is fitted by REML and collected into a [`pipeline::PipelineReport`].
//!
//! ```no_run
//! use locusfit::prelude::*;
//!
//! # fn main() -> locusfit::Result<()> {
//! let observations = load_observations("fish.csv")?;
//! let report = Pipeline::new(PipelineConfig::default()).run(&observations);
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod design;
pub mod enrich;
pub mod error;
pub mod expand;
pub mod formula;
pub mod genetics;
pub mod lmm;
pub mod nest;
pub mod observable;
pub mod pipeline;
pub mod report;

use std::fmt;

pub use error::{Error, Result};
use genetics::Genotype;

/// One row of the input table: one fish observed in one locus context.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Optional fish identifier, carried through unchanged
    pub id: Option<String>,
    /// Migration timing, the model response
    pub mo_da: Option<f64>,
    /// Raw collection label the binary cohort is derived from
    pub cohort_label: String,
    pub locus: Option<String>,
    pub genotype: Option<Genotype>,
    /// Raw sex value, missing sentinel included
    pub sex: Option<String>,
    pub age_spawn: Option<String>,
    pub year: Option<String>,
}

/// Binary cohort of origin.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cohort {
    Cv,
    Nh,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cv => "CV",
            Self::Nh => "NH",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
