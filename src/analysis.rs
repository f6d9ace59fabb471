use serde::Serialize;

use crate::{
    fit::{fit_correction, fit_correction_or_initial, CorrectionFit, FitOptions},
    interp::{build_interpolation, InterpolationModel},
    offset::{extract_offset, OffsetRecord},
    segment::{split_steps, StepPlan},
    Error, Sample,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct AnalysisOptions {
    /// Programmed step plan; inferred from the target channel when absent.
    pub plan: Option<StepPlan>,
    pub fit: FitOptions,
    pub build_interpolation: bool,
    /// Accept the initial parameters, marked unfitted, when fitting fails.
    pub accept_initial: bool,
}

/// Everything one calibration run produces.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub steps_total: usize,
    pub steps_used: usize,
    pub offsets: Vec<OffsetRecord>,
    pub fit: CorrectionFit,
    pub interpolation: Option<InterpolationModel>,
}

/// Run the whole calibration pipeline over a measurement series: split into
/// steps, extract steady-state offsets, fit the correction model and
/// optionally build the interpolation alternative.
///
/// Short steps and steps without a usable stable window are logged and
/// skipped; only a dataset too small to fit is fatal.
pub fn analyze_series(samples: &[Sample], opts: &AnalysisOptions) -> Result<AnalysisReport, Error> {
    if samples.is_empty() {
        return Err(Error::InputData("empty measurement series".into()));
    }

    let plan = opts.plan.or_else(|| {
        let inferred = StepPlan::infer(samples);
        if let Some(plan) = &inferred {
            tracing::info!(
                "inferred plan: {:.2}..{:.2} °C in {:.2} °C increments",
                plan.start_temp,
                plan.stop_temp,
                plan.increment
            );
        }
        inferred
    });

    let steps = split_steps(samples, plan.as_ref());
    let steps_total = steps.len();

    let mut offsets = Vec::with_capacity(steps.len());
    for step in &steps {
        if step.is_short() {
            tracing::warn!(
                "step {}: only {} samples, skipped",
                step.index() + 1,
                step.len()
            );
            continue;
        }
        match extract_offset(step) {
            Ok(record) => offsets.push(record),
            Err(e) => tracing::warn!("{e}, step skipped"),
        }
    }
    let steps_used = offsets.len();
    tracing::info!("{steps_used} of {steps_total} steps produced offset records");

    let fit = if opts.accept_initial {
        fit_correction_or_initial(&offsets, &opts.fit)
    } else {
        fit_correction(&offsets, &opts.fit)?
    };

    let interpolation = if opts.build_interpolation && offsets.len() >= 2 {
        Some(build_interpolation(&offsets)?)
    } else {
        if opts.build_interpolation {
            tracing::warn!("too few offset records for an interpolation model");
        }
        None
    };

    Ok(AnalysisReport {
        steps_total,
        steps_used,
        offsets,
        fit,
        interpolation,
    })
}

impl std::fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Steps: {} used of {}", self.steps_used, self.steps_total)?;

        writeln!(f, "Offsets:")?;
        writeln!(f, "  Reference\t| Holder\t| Liquid\t| Offset")?;
        writeln!(f, "  ---------\t| ------\t| ------\t| ------")?;
        for record in &self.offsets {
            writeln!(
                f,
                "  {:.2}\t| {:.2} ± {:.3}\t| {:.2} ± {:.3}\t| {:.3}",
                record.reference_temp,
                record.holder_mean,
                record.holder_std,
                record.liquid_mean,
                record.liquid_std,
                record.liquid_offset
            )?;
        }

        writeln!(f, "Fit:")?;
        if !self.fit.fitted {
            writeln!(f, "  (unfitted, initial parameters)")?;
        }
        writeln!(f, "  a: {:.6} ± {:.6}", self.fit.model.a, self.fit.a_err)?;
        writeln!(f, "  b: {:.6} ± {:.6}", self.fit.model.b, self.fit.b_err)?;
        writeln!(f, "  c: {:.6} ± {:.6}", self.fit.model.c, self.fit.c_err)?;
        if let (Some(coeff), Some(err)) = (self.fit.model.ambient_coeff, self.fit.ambient_coeff_err)
        {
            writeln!(f, "  AmbientCoeff: {coeff:.6} ± {err:.6}")?;
        }
        writeln!(f, "  R²: {:.4}", self.fit.r_squared)?;
        writeln!(f, "  RMSE: {:.4} °C", self.fit.rmse)?;

        if let Some(interp) = &self.interpolation {
            writeln!(f, "Interpolation:")?;
            writeln!(f, "  Kind: {}", interp.kind)?;
            writeln!(f, "  Points: {}", interp.target_temps().len())?;
            writeln!(f, "  Domain: {:.2}..{:.2} °C", interp.temp_min, interp.temp_max)?;
        }
        Ok(())
    }
}
