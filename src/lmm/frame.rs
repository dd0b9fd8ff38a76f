use super::linalg;
use crate::design::FitRow;
use crate::error::{Error, Result};
use crate::formula::{Formula, Kind, Variable};
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeSet;

/// Relative pivot below which a fixed-effect column counts as aliased
const ALIAS_TOL: f64 = 1e-9;

/// One fixed-effect column of the design
enum Column {
    Intercept,
    Numeric(Variable),
    /// Treatment-coded indicator of one factor level
    Level(Variable, String),
}

impl Column {
    fn name(&self) -> String {
        match self {
            Self::Intercept => "(Intercept)".to_owned(),
            Self::Numeric(var) => var.name().to_owned(),
            Self::Level(var, level) => format!("{}{}", var, level),
        }
    }

    fn value(&self, row: &FitRow) -> f64 {
        match self {
            Self::Intercept => 1.0,
            Self::Numeric(var) => row.numeric(*var).unwrap_or(f64::NAN),
            Self::Level(var, level) => {
                if row.factor(*var).as_deref() == Some(level.as_str()) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Numeric form of a formula over the complete rows of a subset.
#[derive(Clone, Debug)]
pub struct ModelFrame {
    pub y: Array1<f64>,
    pub x: Array2<f64>,
    pub terms: Vec<String>,
    /// Terms removed because they were linear combinations of earlier ones
    pub dropped: Vec<String>,
    /// Random-effect level index of each row
    pub groups: Vec<usize>,
    pub group_levels: Vec<String>,
    /// Position of each frame row in the joined subset
    pub rows: Vec<usize>,
}

impl ModelFrame {
    pub fn build(rows: &[FitRow], formula: &Formula) -> Result<Self> {
        let complete: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                formula.variables().into_iter().all(|v| match v.kind() {
                    Kind::Numeric => row.numeric(v).map_or(false, |x| !x.is_nan()),
                    Kind::Factor => row.factor(v).is_some(),
                })
            })
            .map(|(i, _)| i)
            .collect();
        if complete.is_empty() {
            return Err(Error::model_fit("no rows with complete data"));
        }

        let levels = |var: Variable| -> Vec<String> {
            complete
                .iter()
                .filter_map(|&i| rows[i].factor(var))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        let mut columns: Vec<Column> = vec![];
        if formula.intercept {
            columns.push(Column::Intercept);
        }
        let mut full_rank_factor = !formula.intercept;
        for &var in &formula.fixed {
            match var.kind() {
                Kind::Numeric => columns.push(Column::Numeric(var)),
                Kind::Factor => {
                    // Without an intercept the first factor keeps its reference level
                    let skip = if full_rank_factor { 0 } else { 1 };
                    full_rank_factor = false;
                    columns.extend(
                        levels(var)
                            .into_iter()
                            .skip(skip)
                            .map(|level| Column::Level(var, level)),
                    );
                }
            }
        }

        let mut x = Array2::<f64>::zeros((complete.len(), columns.len()));
        for (r, &i) in complete.iter().enumerate() {
            for (c, column) in columns.iter().enumerate() {
                x[[r, c]] = column.value(&rows[i]);
            }
        }

        let kept = linalg::independent_columns(&x.t().dot(&x), ALIAS_TOL);
        let dropped = (0..columns.len())
            .filter(|c| !kept.contains(c))
            .map(|c| columns[c].name())
            .collect();
        let terms = kept.iter().map(|&c| columns[c].name()).collect();
        let x = x.select(Axis(1), &kept);

        let y = complete
            .iter()
            .map(|&i| rows[i].numeric(formula.response).unwrap_or(f64::NAN))
            .collect::<Array1<f64>>();

        let group_levels = levels(formula.group);
        let groups = complete
            .iter()
            .map(|&i| {
                let level = rows[i].factor(formula.group);
                group_levels
                    .iter()
                    .position(|l| Some(l) == level.as_ref())
                    .unwrap_or_default()
            })
            .collect();

        Ok(Self {
            y,
            x,
            terms,
            dropped,
            groups,
            group_levels,
            rows: complete,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_fixed(&self) -> usize {
        self.x.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{join, DesignMatrix, JoinPolicy};
    use crate::enrich::{enrich, EnrichOptions, EnrichedRecord};
    use crate::genetics::{Genotype, GenotypeCatalog};
    use crate::Observation;

    fn records(rows: &[(&str, Option<f64>, Option<&str>, &str)]) -> Vec<EnrichedRecord> {
        let obs: Vec<Observation> = rows
            .iter()
            .map(|(g, mo_da, sex, year)| Observation {
                id: None,
                mo_da: *mo_da,
                cohort_label: "NH".into(),
                locus: Some("L1".into()),
                genotype: Genotype::parse(g, "/"),
                sex: sex.map(String::from),
                age_spawn: Some("4".into()),
                year: Some(year.to_string()),
            })
            .collect();
        enrich(&obs, &EnrichOptions::default())
    }

    #[test]
    fn test_frame_drops_incomplete_and_codes_factors() -> Result<()> {
        let subset = records(&[
            ("A/A", Some(1.0), Some("F"), "2010"),
            ("A/G", Some(2.0), Some("M"), "2011"),
            ("G/G", None, Some("F"), "2010"),
            ("A/G", Some(3.0), Some("?"), "2011"),
            ("G/G", Some(4.0), Some("M"), "2012"),
        ]);
        let design = DesignMatrix::from_catalog("L1", &GenotypeCatalog::Biallelic("A".into(), "G".into()))?;
        let joined = join(&subset, &design, JoinPolicy::NullFill)?;
        let formula: Formula = "mo_da ~ d_add + sex + (1 | year)".parse()?;
        let frame = ModelFrame::build(&joined, &formula)?;

        assert_eq!(frame.rows, vec![0, 1, 4]);
        assert_eq!(frame.terms, vec!["(Intercept)", "d_add", "sexM"]);
        assert_eq!(frame.y.to_vec(), vec![1.0, 2.0, 4.0]);
        assert_eq!(frame.x.column(2).to_vec(), vec![0.0, 1.0, 1.0]);
        assert_eq!(frame.group_levels, vec!["2010", "2011", "2012"]);
        assert_eq!(frame.groups, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_frame_drops_aliased_dominance() -> Result<()> {
        let subset = records(&[
            ("A/A", Some(1.0), Some("F"), "2010"),
            ("G/G", Some(2.0), Some("M"), "2011"),
            ("A/A", Some(3.0), Some("F"), "2012"),
        ]);
        let design = DesignMatrix::from_catalog("L1", &GenotypeCatalog::Biallelic("A".into(), "G".into()))?;
        let joined = join(&subset, &design, JoinPolicy::NullFill)?;
        let formula: Formula = "mo_da ~ d_add + d_dom_with_s + (1 | year)".parse()?;
        let frame = ModelFrame::build(&joined, &formula)?;
        assert_eq!(frame.terms, vec!["(Intercept)", "d_add"]);
        assert_eq!(frame.dropped, vec!["d_dom_with_s"]);
        Ok(())
    }
}
