pub use crate::design::{DesignMatrix, FitRow, JoinPolicy};
pub use crate::enrich::{enrich, EnrichOptions, EnrichedRecord};
pub use crate::error::{Error, Result};
pub use crate::expand::expand;
pub use crate::formula::{Formula, ModelSpec, Variable};
pub use crate::genetics::{possible_genos, Genotype, GenotypeCatalog};
pub use crate::lmm::{fit, FitOptions, FittedModel};
pub use crate::nest::{by_cohort_locus, by_locus, nest, Nested};
pub use crate::observable::{load_observations, Csv, CsvBuilder};
pub use crate::pipeline::{FitKey, FitRecord, FitTask, Pipeline, PipelineConfig, PipelineReport};
pub use crate::{Cohort, Observation};
