//! Random-intercept linear mixed models fitted by REML.
//!
//! The model is `y = Xb + Zu + e` with one intercept `u_j ~ N(0, s2 * lambda)`
//! per level of the grouping factor and `e ~ N(0, s2)`. With `lambda`
//! fixed, `s2` and `b` have closed forms, so the REML deviance is profiled
//! down to the single relative scale `theta = sqrt(lambda)` and minimised
//! with Nelder-Mead.

pub mod frame;
pub mod linalg;

use crate::design::{join, DesignMatrix, JoinPolicy};
use crate::enrich::EnrichedRecord;
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::genetics::GenotypeCatalog;
use argmin::core::{CostFunction, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use frame::ModelFrame;
use log::debug;
use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::f64::consts::PI;

/// Knobs of a single model fit
#[derive(Clone, Debug)]
pub struct FitOptions {
    pub join_policy: JoinPolicy,
    /// Iteration cap of the optimizer, hitting it marks the fit unconverged
    pub max_iters: u64,
    /// Starting value of the relative random-effect scale
    pub theta_start: f64,
    /// Fits with a smaller relative scale are on the boundary
    pub singular_tol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            join_policy: JoinPolicy::NullFill,
            max_iters: 500,
            theta_start: 1.0,
            singular_tol: 1e-4,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarianceComponent {
    /// Grouping factor, or `Residual`
    pub group: String,
    pub term: String,
    pub variance: f64,
}

impl VarianceComponent {
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Fitted value and residual of one row that entered the model
#[derive(Clone, Debug, PartialEq)]
pub struct Fitted {
    /// Position of the row in the subset it was fitted on
    pub row: usize,
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// Everything kept from a model fit.
#[derive(Clone, Debug, PartialEq)]
pub struct FittedModel {
    pub formula: String,
    pub coefficients: Vec<Coefficient>,
    pub variance_components: Vec<VarianceComponent>,
    /// Fixed-effect terms removed as linear combinations of others
    pub dropped_terms: Vec<String>,
    pub converged: bool,
    pub singular: bool,
    pub theta: f64,
    pub reml_criterion: f64,
    pub log_likelihood: f64,
    pub sigma: f64,
    pub n_obs: usize,
    pub n_groups: usize,
    /// Predicted random intercept per grouping level
    pub random_effects: Vec<(String, f64)>,
    pub fitted: Vec<Fitted>,
}

impl FittedModel {
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }
}

/// Fits `formula` to the rows of one locus subset.
///
/// The subset is joined to the genotype design of `catalog` first, so
/// the catalog must be biallelic.
pub fn fit(
    locus: &str,
    subset: &[EnrichedRecord],
    catalog: &GenotypeCatalog,
    formula: &Formula,
    options: &FitOptions,
) -> Result<FittedModel> {
    let design = DesignMatrix::from_catalog(locus, catalog)?;
    let rows = join(subset, &design, options.join_policy)?;
    let frame = ModelFrame::build(&rows, formula)?;
    fit_frame(&frame, formula, options)
}

/// Per-group sums the REML deviance is computed from
#[derive(Clone)]
struct Moments {
    xtx: Array2<f64>,
    xty: Array1<f64>,
    yty: f64,
    /// Per group: size, column sums of X, sum of y
    groups: Vec<(f64, Array1<f64>, f64)>,
}

/// GLS quantities for one value of theta
struct Profile {
    beta: Array1<f64>,
    chol: linalg::Factor,
    sigma2: f64,
    deviance: f64,
    lambda: f64,
}

impl Moments {
    fn new(frame: &ModelFrame) -> Self {
        let p = frame.n_fixed();
        let mut groups = vec![(0.0, Array1::<f64>::zeros(p), 0.0); frame.group_levels.len()];
        for (i, &g) in frame.groups.iter().enumerate() {
            let entry = &mut groups[g];
            entry.0 += 1.0;
            entry.1 += &frame.x.row(i);
            entry.2 += frame.y[i];
        }
        Self {
            xtx: frame.x.t().dot(&frame.x),
            xty: frame.x.t().dot(&frame.y),
            yty: frame.y.dot(&frame.y),
            groups,
        }
    }

    fn n(&self) -> f64 {
        self.groups.iter().map(|g| g.0).sum()
    }

    /// Shrinkage weight `lambda / (1 + lambda * n_j)` of each group
    fn weight(lambda: f64, n_j: f64) -> f64 {
        lambda / (1.0 + lambda * n_j)
    }

    fn profile(&self, theta: f64) -> Option<Profile> {
        let lambda = theta * theta;
        let mut xthx = self.xtx.clone();
        let mut xthy = self.xty.clone();
        let mut ythy = self.yty;
        let mut log_det_h = 0.0;
        for (n_j, sx, sy) in &self.groups {
            let c = Self::weight(lambda, *n_j);
            for a in 0..sx.len() {
                for b in 0..sx.len() {
                    xthx[[a, b]] -= c * sx[a] * sx[b];
                }
                xthy[a] -= c * sx[a] * sy;
            }
            ythy -= c * sy * sy;
            log_det_h += (1.0 + lambda * n_j).ln();
        }

        let chol = linalg::Factor::new(&xthx)?;
        let beta = chol.solve(&xthy);
        let dof = self.n() - beta.len() as f64;
        let rss = ythy - beta.dot(&xthy);
        if !rss.is_finite() || !(rss > 0.0) {
            return None;
        }
        let sigma2 = rss / dof;
        let deviance = dof * sigma2.ln() + log_det_h + chol.ln_determinant() + dof * (1.0 + (2.0 * PI).ln());
        if !deviance.is_finite() || beta.iter().any(|b| !b.is_finite()) {
            return None;
        }
        Some(Profile {
            beta,
            chol,
            sigma2,
            deviance,
            lambda,
        })
    }
}

impl CostFunction for Moments {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self
            .profile(param[0])
            .map(|p| p.deviance)
            .unwrap_or(f64::INFINITY))
    }
}

/// Fits an already built model frame.
pub fn fit_frame(frame: &ModelFrame, formula: &Formula, options: &FitOptions) -> Result<FittedModel> {
    let n = frame.n_obs();
    let p = frame.n_fixed();
    let n_groups = frame.group_levels.len();
    if n_groups < 2 {
        return Err(Error::model_fit(format!(
            "grouping factor {} needs at least 2 levels, found {}",
            formula.group, n_groups
        )));
    }
    if n_groups >= n {
        return Err(Error::model_fit(format!(
            "{} levels of {} for {} observations leave no residual variance",
            n_groups, formula.group, n
        )));
    }
    if p == 0 || n <= p {
        return Err(Error::model_fit(format!(
            "{} observations cannot estimate {} fixed effects",
            n, p
        )));
    }

    let moments = Moments::new(frame);
    let start = options.theta_start;
    let simplex = vec![vec![start], vec![start + 0.5]];
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-10)
        .map_err(|e| Error::model_fit(e.to_string()))?;
    let res = Executor::new(moments.clone(), solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run()
        .map_err(|e| Error::model_fit(e.to_string()))?;

    let iters = res.state().get_iter();
    let theta = res
        .state()
        .best_param
        .as_ref()
        .map(|p| p[0].abs())
        .ok_or_else(|| Error::model_fit("optimizer returned no parameters"))?;
    let converged = matches!(
        res.state().get_termination_reason(),
        Some(TerminationReason::SolverConverged)
    );
    let profile = moments
        .profile(theta)
        .ok_or_else(|| Error::model_fit(format!("REML criterion is undefined at theta {:.5}", theta)))?;
    debug!(
        "{}: theta {:.5} after {} iterations, REML deviance {:.4}",
        formula, theta, iters, profile.deviance
    );

    let df = (n - p) as f64;
    let t_dist = StudentsT::new(0.0, 1.0, df).map_err(|e| Error::model_fit(e.to_string()))?;
    let covariance = profile.chol.inverse() * profile.sigma2;
    let mut coefficients = Vec::with_capacity(frame.terms.len());
    for (i, term) in frame.terms.iter().enumerate() {
        let estimate = profile.beta[i];
        let std_error = covariance[[i, i]].sqrt();
        let statistic = estimate / std_error;
        if !statistic.is_finite() {
            return Err(Error::model_fit(format!(
                "{} has estimate {} with standard error {}",
                term, estimate, std_error
            )));
        }
        coefficients.push(Coefficient {
            term: term.clone(),
            estimate,
            std_error,
            statistic,
            df,
            p_value: 2.0 * t_dist.sf(statistic.abs()),
        });
    }

    let random_effects: Vec<(String, f64)> = moments
        .groups
        .iter()
        .zip(&frame.group_levels)
        .map(|((n_j, sx, sy), level)| {
            let u = Moments::weight(profile.lambda, *n_j) * (sy - sx.dot(&profile.beta));
            (level.clone(), u)
        })
        .collect();

    let linear = frame.x.dot(&profile.beta);
    let fitted = frame
        .rows
        .iter()
        .enumerate()
        .map(|(i, &row)| {
            let value = linear[i] + random_effects[frame.groups[i]].1;
            Fitted {
                row,
                observed: frame.y[i],
                fitted: value,
                residual: frame.y[i] - value,
            }
        })
        .collect();

    Ok(FittedModel {
        formula: formula.to_string(),
        coefficients,
        variance_components: vec![
            VarianceComponent {
                group: formula.group.to_string(),
                term: "(Intercept)".to_owned(),
                variance: profile.lambda * profile.sigma2,
            },
            VarianceComponent {
                group: "Residual".to_owned(),
                term: String::new(),
                variance: profile.sigma2,
            },
        ],
        dropped_terms: frame.dropped.clone(),
        converged,
        singular: theta < options.singular_tol,
        theta,
        reml_criterion: profile.deviance,
        log_likelihood: -profile.deviance / 2.0,
        sigma: profile.sigma2.sqrt(),
        n_obs: n,
        n_groups,
        random_effects,
        fitted,
    })
}
