use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Separator between the two alleles of a genotype string
pub const SEPARATOR: char = '/';

/// A diploid genotype at one locus.
///
/// Alleles are always held in sorted order, so `G/A` and `A/G` are the
/// same genotype.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Genotype {
    first: String,
    second: String,
}

impl Genotype {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                first: a.into(),
                second: b.into(),
            }
        } else {
            Self {
                first: b.into(),
                second: a.into(),
            }
        }
    }

    pub fn homozygous(allele: &str) -> Self {
        Self::new(allele, allele)
    }

    /// Parses `"<allele><sep><allele>"`, returning `None` unless there are
    /// exactly two non-empty tokens.
    pub fn parse(s: &str, separator: &str) -> Option<Self> {
        let mut tokens = s.trim().split(separator);
        let a = tokens.next()?.trim();
        let b = tokens.next()?.trim();
        if tokens.next().is_some() || a.is_empty() || b.is_empty() {
            return None;
        }
        Some(Self::new(a, b))
    }

    pub fn alleles(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }

    pub fn is_homozygous(&self) -> bool {
        self.first == self.second
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.first, SEPARATOR, self.second)
    }
}

/// The genotypes that can be formed from the alleles seen at a locus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenotypeCatalog {
    /// A single observed allele
    Monomorphic(String),
    /// Two observed alleles, the first sorting before the second
    Biallelic(String, String),
}

impl GenotypeCatalog {
    /// Catalog genotypes in fixed order: `a1/a1, a1/a2, a2/a2`.
    pub fn labels(&self) -> Vec<Genotype> {
        match self {
            Self::Monomorphic(a) => vec![Genotype::homozygous(a)],
            Self::Biallelic(a1, a2) => vec![
                Genotype::homozygous(a1),
                Genotype::new(a1, a2),
                Genotype::homozygous(a2),
            ],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Monomorphic(_) => 1,
            Self::Biallelic(..) => 3,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Self::Biallelic(..))
    }
}

/// Builds the genotype catalog of a locus from its observed genotypes.
///
/// Missing genotypes are ignored. The result depends only on the set of
/// distinct alleles, so row order and multiplicity do not matter. A locus
/// with no alleles or more than two is an [`Error::InvalidLocus`].
pub fn possible_genos<'a, I>(locus: &str, genotypes: I) -> Result<GenotypeCatalog>
where
    I: IntoIterator<Item = Option<&'a Genotype>>,
{
    let alleles: BTreeSet<&str> = genotypes
        .into_iter()
        .flatten()
        .flat_map(|g| g.alleles())
        .collect();

    let mut iter = alleles.iter();
    match (iter.next(), iter.next(), alleles.len()) {
        (Some(a), None, 1) => Ok(GenotypeCatalog::Monomorphic(a.to_string())),
        (Some(a1), Some(a2), 2) => Ok(GenotypeCatalog::Biallelic(a1.to_string(), a2.to_string())),
        _ => Err(Error::InvalidLocus {
            locus: locus.to_owned(),
            alleles: alleles.iter().map(|a| a.to_string()).collect(),
        }),
    }
}
