use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{offset::OffsetRecord, Error};

/// Fewer records than this cannot constrain the quadratic.
pub const MIN_FIT_RECORDS: usize = 3;

/// The ambient-augmented model has four parameters, so it needs one record
/// more; fewer downgrade the fit to the plain quadratic.
pub const MIN_AMBIENT_FIT_RECORDS: usize = 4;

/// Starting point carried over from the historical calibration runs. The
/// model is linear in its parameters, so the guess only matters on the
/// explicit degraded path of [`fit_correction_or_initial`].
#[derive(Clone, Copy, Debug)]
pub struct InitialGuess {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub ambient_coeff: f64,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            a: 0.003,
            b: -0.3,
            c: 6.0,
            ambient_coeff: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FitOptions {
    /// Fit the ambient-augmented model
    /// `offset(x) = a·x² + b·x + c + d·(ambient − ambient_ref)`.
    pub use_ambient: bool,
    /// Reference ambient temperature, °C.
    pub ambient_ref: f64,
    pub initial: InitialGuess,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            use_ambient: false,
            ambient_ref: 20.0,
            initial: InitialGuess::default(),
        }
    }
}

/// Quadratic offset model, the value type the control loop consumes and the
/// config store persists. Updating parameters means building a new model and
/// swapping it at the control-loop boundary; nothing here mutates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CorrectionModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub use_ambient: bool,
    pub ambient_ref: Option<f64>,
    pub ambient_coeff: Option<f64>,
}

impl CorrectionModel {
    /// Expected steady-state liquid offset at holder setpoint `x`.
    pub fn predict_offset(&self, x: f64, ambient_temp: Option<f64>) -> f64 {
        let mut offset = self.a * x * x + self.b * x + self.c;
        if self.use_ambient {
            if let (Some(ambient), Some(reference), Some(coeff)) =
                (ambient_temp, self.ambient_ref, self.ambient_coeff)
            {
                offset += coeff * (ambient - reference);
            }
        }
        offset
    }
}

/// A fitted model together with its uncertainties and fit quality.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CorrectionFit {
    pub model: CorrectionModel,
    pub a_err: f64,
    pub b_err: f64,
    pub c_err: f64,
    pub ambient_coeff_err: Option<f64>,
    pub r_squared: f64,
    pub rmse: f64,
    /// `false` only for the degraded result of
    /// [`fit_correction_or_initial`], which carries the initial guess
    /// instead of fitted parameters.
    pub fitted: bool,
}

/// Least-squares fit of the correction model to a set of offset records.
///
/// Both model variants are linear in their parameters, so the optimum of the
/// squared-residual objective is found by a single SVD solve; the result is
/// what an iterative optimizer would converge to and does not depend on the
/// record order. If ambient correction is requested but any record lacks an
/// ambient reading, or there are fewer than [`MIN_AMBIENT_FIT_RECORDS`]
/// records, the fit falls back to the plain quadratic and says so — it never
/// quietly fits a half-defined or under-determined model.
pub fn fit_correction(records: &[OffsetRecord], opts: &FitOptions) -> Result<CorrectionFit, Error> {
    if records.len() < MIN_FIT_RECORDS {
        return Err(Error::FitFailure(format!(
            "{} offset records, need at least {}",
            records.len(),
            MIN_FIT_RECORDS
        )));
    }

    let use_ambient = if opts.use_ambient {
        let missing = records.iter().filter(|r| r.ambient_mean.is_none()).count();
        if missing > 0 {
            tracing::warn!(
                "ambient correction requested but {missing} of {} records carry no \
                 ambient reading, ambient correction disabled for this fit",
                records.len()
            );
            false
        } else if records.len() < MIN_AMBIENT_FIT_RECORDS {
            tracing::warn!(
                "ambient correction needs at least {MIN_AMBIENT_FIT_RECORDS} records, \
                 got {}, ambient correction disabled for this fit",
                records.len()
            );
            false
        } else {
            true
        }
    } else {
        false
    };

    let n = records.len();
    let p = if use_ambient { 4 } else { 3 };

    let mut design = DMatrix::<f64>::zeros(n, p);
    let mut observed = DVector::<f64>::zeros(n);
    for (i, record) in records.iter().enumerate() {
        let x = record.reference_temp;
        design[(i, 0)] = x * x;
        design[(i, 1)] = x;
        design[(i, 2)] = 1.0;
        if use_ambient {
            design[(i, 3)] = record.ambient_mean.unwrap() - opts.ambient_ref;
        }
        observed[i] = record.liquid_offset;
    }

    let params = solve_least_squares(&design, &observed).ok_or_else(|| {
        Error::FitFailure(format!("least-squares solve failed over {n} records"))
    })?;

    // Parameter covariance σ²·(XᵀX)⁻¹, σ² = SSR/(n−p). With n == p the
    // errors come out non-finite, same as scipy reports them.
    let xtx = design.transpose() * &design;
    let cov_unscaled = xtx
        .try_inverse()
        .ok_or_else(|| Error::FitFailure("singular parameter covariance".into()))?;
    let residuals = &observed - &design * &params;
    let ss_residual = residuals.norm_squared();
    let dof = n as f64 - p as f64;
    let sigma2 = ss_residual / dof;
    let errors: Vec<f64> = (0..p)
        .map(|j| (cov_unscaled[(j, j)] * sigma2).sqrt())
        .collect();

    let mean_observed = observed.mean();
    let ss_total: f64 = observed.iter().map(|y| (y - mean_observed).powi(2)).sum();
    let r_squared = if ss_total > 0.0 {
        1.0 - ss_residual / ss_total
    } else if ss_residual <= f64::EPSILON {
        1.0
    } else {
        f64::NAN
    };
    let rmse = (ss_residual / n as f64).sqrt();

    let model = CorrectionModel {
        a: params[0],
        b: params[1],
        c: params[2],
        use_ambient,
        ambient_ref: use_ambient.then_some(opts.ambient_ref),
        ambient_coeff: use_ambient.then(|| params[3]),
    };

    tracing::info!(
        "fitted parameters{}:",
        if use_ambient {
            " with ambient correction"
        } else {
            ""
        }
    );
    tracing::info!("  a = {:.6} ± {:.6}", model.a, errors[0]);
    tracing::info!("  b = {:.6} ± {:.6}", model.b, errors[1]);
    tracing::info!("  c = {:.6} ± {:.6}", model.c, errors[2]);
    if use_ambient {
        tracing::info!(
            "  ambient_coeff = {:.6} ± {:.6}",
            params[3],
            errors[3]
        );
    }
    tracing::info!("  R² = {r_squared:.4}, RMSE = {rmse:.4} °C");

    Ok(CorrectionFit {
        model,
        a_err: errors[0],
        b_err: errors[1],
        c_err: errors[2],
        ambient_coeff_err: use_ambient.then(|| errors[3]),
        r_squared,
        rmse,
        fitted: true,
    })
}

/// Documented degraded path: when fitting fails, hand back the initial guess
/// marked `fitted = false` instead of an error. Callers that cannot tolerate
/// default parameters use [`fit_correction`] directly.
pub fn fit_correction_or_initial(records: &[OffsetRecord], opts: &FitOptions) -> CorrectionFit {
    match fit_correction(records, opts) {
        Ok(fit) => fit,
        Err(err) => {
            tracing::warn!("{err}; returning initial parameters, marked unfitted");
            CorrectionFit {
                model: CorrectionModel {
                    a: opts.initial.a,
                    b: opts.initial.b,
                    c: opts.initial.c,
                    use_ambient: opts.use_ambient,
                    ambient_ref: opts.use_ambient.then_some(opts.ambient_ref),
                    ambient_coeff: opts.use_ambient.then_some(opts.initial.ambient_coeff),
                },
                a_err: f64::NAN,
                b_err: f64::NAN,
                c_err: f64::NAN,
                ambient_coeff_err: opts.use_ambient.then_some(f64::NAN),
                r_squared: f64::NAN,
                rmse: f64::NAN,
                fitted: false,
            }
        }
    }
}

/// SVD solve with progressively looser tolerances; `None` when the system is
/// too ill-conditioned to trust.
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(params) = svd.solve(y, tol) {
            if params.iter().all(|v| v.is_finite()) {
                return Some(params);
            }
        }
    }
    None
}
