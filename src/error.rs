//! Error types for every pipeline stage.
//!
//! Load errors are fatal to a run. Locus and fit errors are scoped to the
//! locus or task that raised them and are collected by the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Input table missing a column, or holding a value that cannot be parsed
    #[error("data load error{}: {message}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    DataLoad { line: Option<u64>, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A locus whose observed alleles are not one or two
    #[error("locus {locus} has {} alleles ({}), expected 1 or 2", .alleles.len(), .alleles.join(","))]
    InvalidLocus { locus: String, alleles: Vec<String> },

    /// A design matrix was requested for a locus with a single allele
    #[error("locus {locus} is monomorphic, no genotype design can be built")]
    MonomorphicLocus { locus: String },

    /// A genotype absent from the locus catalog under a rejecting join policy
    #[error("genotype {genotype} at locus {locus} is not in the genotype catalog")]
    JoinMismatch { locus: String, genotype: String },

    #[error("model fit failed: {message}")]
    ModelFit { message: String },

    #[error("invalid formula `{formula}`: {message}")]
    Formula { formula: String, message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn data_load(line: Option<u64>, message: impl Into<String>) -> Self {
        Self::DataLoad {
            line,
            message: message.into(),
        }
    }

    pub fn model_fit(message: impl Into<String>) -> Self {
        Self::ModelFit {
            message: message.into(),
        }
    }

    pub fn formula(formula: &str, message: impl Into<String>) -> Self {
        Self::Formula {
            formula: formula.to_owned(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for errors that should abort a whole run rather than one locus or task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DataLoad { .. } | Self::Io(_) | Self::Csv(_) | Self::Config { .. }
        )
    }
}
