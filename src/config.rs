//! Command line configuration of a batch run.

use clap::{Parser, ValueEnum};
use locusfit::design::JoinPolicy;
use locusfit::enrich::EnrichOptions;
use locusfit::error::{Error, Result};
use locusfit::formula::ModelSpec;
use locusfit::lmm::FitOptions;
use locusfit::pipeline::PipelineConfig;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum JoinArg {
    /// Genotypes outside the locus catalog get missing design codes
    Fill,
    /// Genotypes outside the locus catalog fail the fit
    Reject,
}

impl From<JoinArg> for JoinPolicy {
    fn from(arg: JoinArg) -> Self {
        match arg {
            JoinArg::Fill => JoinPolicy::NullFill,
            JoinArg::Reject => JoinPolicy::Reject,
        }
    }
}

/// Fit per-locus genotype mixed models for every cohort
#[derive(Parser, Debug)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,)]
pub struct Config {
    /// Observation table (CSV)
    pub input: PathBuf,

    /// Directory the result tables are written to
    #[arg(short, long, default_value = "locusfit_out")]
    pub out_dir: PathBuf,

    /// Field delimiter of the input table
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Collection label that marks the NH cohort
    #[arg(long, default_value = "NH")]
    pub nh_label: String,

    /// Sex value meaning "not recorded"
    #[arg(long, default_value = "?")]
    pub sex_missing: String,

    /// Handling of genotypes absent from the locus catalog
    #[arg(long, value_enum, default_value_t = JoinArg::Fill)]
    pub join: JoinArg,

    /// Optimizer iteration cap per fit
    #[arg(long, default_value_t = 500)]
    pub max_iters: u64,

    /// Worker threads, 0 uses every core
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,
}

impl Config {
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::data_load(
                None,
                format!("input file {} does not exist", self.input.display()),
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(Error::config("delimiter must be a single ASCII character"));
        }
        if self.max_iters == 0 {
            return Err(Error::config("max-iters must be positive"));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            enrich: EnrichOptions {
                nh_label: self.nh_label.clone(),
                sex_missing: self.sex_missing.clone(),
            },
            fit: FitOptions {
                join_policy: self.join.into(),
                max_iters: self.max_iters,
                ..FitOptions::default()
            },
            models: ModelSpec::catalog(),
            parallel: self.threads != 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_maps_to_pipeline() {
        let config = Config::parse_from([
            "locusfit",
            "fish.csv",
            "--nh-label",
            "Nimbus",
            "--join",
            "reject",
            "--threads",
            "1",
        ]);
        let pipeline = config.pipeline();
        assert_eq!(pipeline.enrich.nh_label, "Nimbus");
        assert_eq!(pipeline.fit.join_policy, JoinPolicy::Reject);
        assert!(!pipeline.parallel);
        assert_eq!(pipeline.models.len(), 3);
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let config = Config::parse_from(["locusfit", "/no/such/file.csv"]);
        assert!(config.validate().is_err());
    }
}
