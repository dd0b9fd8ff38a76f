//! Per-locus genotype design and its join onto subset rows.

use crate::enrich::EnrichedRecord;
use crate::error::{Error, Result};
use crate::formula::Variable;
use crate::genetics::{Genotype, GenotypeCatalog};
use log::debug;
use ndarray::{array, Array2};

/// Column positions in `DesignMatrix::codes`
pub const D_REF: usize = 0;
pub const D_ADD: usize = 1;
pub const D_DOM_WITH_S: usize = 2;

/// Numeric codes of the genotypes of one biallelic locus.
///
/// Rows follow the catalog order `a1/a1, a1/a2, a2/a2`. Columns are a
/// constant reference code, the additive dosage of `a2` and the
/// heterozygote (dominance) indicator.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignMatrix {
    locus: String,
    genotypes: Vec<Genotype>,
    codes: Array2<f64>,
}

impl DesignMatrix {
    /// Builds the design of a biallelic locus, monomorphic catalogs have none.
    pub fn from_catalog(locus: &str, catalog: &GenotypeCatalog) -> Result<Self> {
        if !catalog.is_polymorphic() {
            return Err(Error::MonomorphicLocus {
                locus: locus.to_owned(),
            });
        }
        Ok(Self {
            locus: locus.to_owned(),
            genotypes: catalog.labels(),
            codes: array![[1.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 2.0, 0.0]],
        })
    }

    pub fn locus(&self) -> &str {
        &self.locus
    }

    pub fn genotypes(&self) -> &[Genotype] {
        &self.genotypes
    }

    pub fn codes(&self) -> &Array2<f64> {
        &self.codes
    }

    /// The `[d_ref, d_add, d_dom_with_s]` codes of a genotype in the catalog
    pub fn lookup(&self, genotype: &Genotype) -> Option<[f64; 3]> {
        let row = self.genotypes.iter().position(|g| g == genotype)?;
        Some([
            self.codes[[row, D_REF]],
            self.codes[[row, D_ADD]],
            self.codes[[row, D_DOM_WITH_S]],
        ])
    }
}

/// What the join does with a genotype the catalog does not contain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Keep the row with missing design codes
    #[default]
    NullFill,
    /// Fail with `Error::JoinMismatch`
    Reject,
}

/// A subset row with its genotype codes attached.
#[derive(Clone, Debug)]
pub struct FitRow<'a> {
    pub record: &'a EnrichedRecord,
    pub codes: Option<[f64; 3]>,
}

impl<'a> FitRow<'a> {
    pub fn numeric(&self, var: Variable) -> Option<f64> {
        match var {
            Variable::MoDa => self.record.raw.mo_da,
            Variable::DRef => self.codes.map(|c| c[D_REF]),
            Variable::DAdd => self.codes.map(|c| c[D_ADD]),
            Variable::DDomWithS => self.codes.map(|c| c[D_DOM_WITH_S]),
            _ => None,
        }
    }

    pub fn factor(&self, var: Variable) -> Option<String> {
        match var {
            Variable::Sex => self.record.sex.clone(),
            Variable::AgeSpawn => self.record.age_spawn.clone(),
            Variable::Year => self.record.year.clone(),
            Variable::Cohort => Some(self.record.cohort.to_string()),
            Variable::Genotype => self.record.raw.genotype.as_ref().map(|g| g.to_string()),
            _ => None,
        }
    }
}

/// Left-joins `subset` onto `design` by genotype.
///
/// Every row is kept. Rows with a missing genotype get no codes under
/// either policy. A genotype that is present but not in the catalog gets
/// no codes under `NullFill` and is an error under `Reject`.
pub fn join<'a>(
    subset: &'a [EnrichedRecord],
    design: &DesignMatrix,
    policy: JoinPolicy,
) -> Result<Vec<FitRow<'a>>> {
    let mut unmatched = 0;
    let rows = subset
        .iter()
        .map(|record| {
            let codes = match &record.raw.genotype {
                None => None,
                Some(g) => match design.lookup(g) {
                    Some(codes) => Some(codes),
                    None if policy == JoinPolicy::Reject => {
                        return Err(Error::JoinMismatch {
                            locus: design.locus.clone(),
                            genotype: g.to_string(),
                        })
                    }
                    None => {
                        unmatched += 1;
                        None
                    }
                },
            };
            Ok(FitRow { record, codes })
        })
        .collect::<Result<Vec<_>>>()?;
    if unmatched > 0 {
        debug!(
            "{} rows at locus {} have genotypes outside the catalog",
            unmatched, design.locus
        );
    }
    Ok(rows)
}
