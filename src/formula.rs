//! Model formulas and the fixed catalog of models fitted per subset.
//!
//! Formulas use the usual mixed-model notation restricted to what the
//! fitter supports: `response ~ term + term + (1 | group)`, with exactly
//! one random intercept. A `0` term removes the fixed intercept.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Whether a variable enters the model as a number or as treatment-coded levels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Numeric,
    Factor,
}

/// Columns of a joined subset row that formulas can refer to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Variable {
    MoDa,
    DRef,
    DAdd,
    DDomWithS,
    Sex,
    AgeSpawn,
    Year,
    Cohort,
    Genotype,
}

impl Variable {
    pub fn kind(&self) -> Kind {
        match self {
            Self::MoDa | Self::DRef | Self::DAdd | Self::DDomWithS => Kind::Numeric,
            Self::Sex | Self::AgeSpawn | Self::Year | Self::Cohort | Self::Genotype => Kind::Factor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MoDa => "mo_da",
            Self::DRef => "d_ref",
            Self::DAdd => "d_add",
            Self::DDomWithS => "d_dom_with_s",
            Self::Sex => "sex",
            Self::AgeSpawn => "age_spawn",
            Self::Year => "year",
            Self::Cohort => "cohort",
            Self::Genotype => "genotype",
        }
    }
}

impl FromStr for Variable {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        Ok(match s {
            "mo_da" => Self::MoDa,
            "d_ref" => Self::DRef,
            "d_add" => Self::DAdd,
            "d_dom_with_s" => Self::DDomWithS,
            "sex" => Self::Sex,
            "age_spawn" => Self::AgeSpawn,
            "year" => Self::Year,
            "cohort" => Self::Cohort,
            "genotype" => Self::Genotype,
            other => return Err(format!("unknown variable `{}`", other)),
        })
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed random-intercept model formula
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    pub response: Variable,
    pub intercept: bool,
    pub fixed: Vec<Variable>,
    /// Grouping factor of the random intercept
    pub group: Variable,
}

impl Formula {
    /// Every variable a row must have for it to enter the model
    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = vec![self.response];
        vars.extend(self.fixed.iter().copied());
        vars.push(self.group);
        vars
    }
}

impl FromStr for Formula {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lhs, rhs) = match s.split_once('~') {
            Some(parts) if !parts.1.contains('~') => parts,
            _ => return Err(Error::formula(s, "expected exactly one `~`")),
        };
        let variable = |name: &str| name.trim().parse::<Variable>().map_err(|e| Error::formula(s, e));

        let response = variable(lhs)?;
        if response.kind() != Kind::Numeric {
            return Err(Error::formula(s, format!("response `{}` is not numeric", response)));
        }

        let mut intercept = true;
        let mut fixed = vec![];
        let mut group = None;
        for term in rhs.split('+').map(str::trim) {
            if let Some(inner) = term.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                let (slope, grouping) = inner
                    .split_once('|')
                    .ok_or_else(|| Error::formula(s, format!("random term `{}` has no `|`", term)))?;
                if slope.trim() != "1" {
                    return Err(Error::formula(s, "only random intercepts `(1 | g)` are supported"));
                }
                let g = variable(grouping)?;
                if g.kind() != Kind::Factor {
                    return Err(Error::formula(s, format!("grouping variable `{}` is not a factor", g)));
                }
                if group.replace(g).is_some() {
                    return Err(Error::formula(s, "more than one random term"));
                }
            } else if term == "1" {
                intercept = true;
            } else if term == "0" {
                intercept = false;
            } else {
                let v = variable(term)?;
                if v == response || fixed.contains(&v) {
                    return Err(Error::formula(s, format!("`{}` appears twice", v)));
                }
                fixed.push(v);
            }
        }

        let group = group.ok_or_else(|| Error::formula(s, "missing random intercept `(1 | g)`"))?;
        if fixed.contains(&group) {
            return Err(Error::formula(s, format!("`{}` is both fixed and random", group)));
        }

        Ok(Self {
            response,
            intercept,
            fixed,
            group,
        })
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ~ ", self.response)?;
        if !self.intercept {
            write!(f, "0 + ")?;
        }
        for v in &self.fixed {
            write!(f, "{} + ", v)?;
        }
        write!(f, "(1 | {})", self.group)
    }
}

/// A named model fitted to every subset
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub formula: Formula,
}

impl ModelSpec {
    pub fn new(name: &str, formula: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            formula: formula.parse()?,
        })
    }

    /// The three models compared at every locus: genotype codes alone,
    /// then with sex, then with age at spawning.
    pub fn catalog() -> Vec<ModelSpec> {
        [
            ("vanilla", None),
            ("sex", Some(Variable::Sex)),
            ("age", Some(Variable::AgeSpawn)),
        ]
        .iter()
        .map(|(name, covariate)| {
            let mut fixed = vec![Variable::DAdd, Variable::DDomWithS];
            fixed.extend(*covariate);
            ModelSpec {
                name: name.to_string(),
                formula: Formula {
                    response: Variable::MoDa,
                    intercept: true,
                    fixed,
                    group: Variable::Year,
                },
            }
        })
        .collect()
    }
}
