use serde::Serialize;

use crate::{fit::CorrectionModel, interp::InterpolationModel, Error};

/// Physically valid holder setpoint range, °C.
pub const DEFAULT_OPERATING_RANGE: (f64, f64) = (0.0, 100.0);

/// Setpoint scan resolution of the interpolation-based inversion, °C.
const SCAN_RESOLUTION_C: f64 = 0.01;

/// Below this the quadratic term is treated as absent and the model is
/// inverted linearly (exactly, not as a fallback).
const QUADRATIC_EPS: f64 = 1e-12;

/// Ways a solve can deliver a usable but approximate answer. Always
/// reported next to the numeric result, never an error and never swallowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Degradation {
    /// Negative discriminant; an approximate setpoint was used.
    LinearFallback,
    /// The coefficients leave the produced temperature (nearly) independent
    /// of the setpoint; the target was passed through unchanged.
    IllConditioned,
    /// Both quadratic roots fall outside the operating range; the "+" root
    /// is returned anyway.
    OutOfRange,
    /// The interpolant was evaluated outside the measured domain.
    Extrapolated,
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::LinearFallback => {
                write!(f, "no real solution, approximate setpoint used")
            }
            Degradation::IllConditioned => {
                write!(f, "correction model has no usable inverse")
            }
            Degradation::OutOfRange => {
                write!(f, "setpoint outside the physical operating range")
            }
            Degradation::Extrapolated => {
                write!(f, "extrapolated beyond the measured temperature domain")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CorrectedTarget {
    pub setpoint: f64,
    pub degraded: Option<Degradation>,
}

#[derive(Clone, Copy, Debug)]
pub struct SolveOptions {
    pub operating_range: (f64, f64),
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            operating_range: DEFAULT_OPERATING_RANGE,
        }
    }
}

/// Holder setpoint expected to produce the desired liquid temperature.
///
/// The model stores the steady-state offset as a function of the setpoint,
/// so setpoint `x` produces a liquid temperature of `x + offset(x)` and we
/// solve `a·x² + (b + 1)·x + (c − y) = 0`. (The historical LabVIEW formula
/// solved `a·x² + b·x + (c − y) = 0` with a `b` fitted against the full
/// holder→liquid curve; with offset-fitted coefficients that linear term is
/// off by exactly one.)
///
/// Root choice: the "+" root unless it leaves the operating range while the
/// "−" root does not. Preferring "+" when both are in range is the
/// historical convention, kept deliberately.
pub fn correct_target(
    model: &CorrectionModel,
    desired_liquid_temp: f64,
    ambient_temp: Option<f64>,
    opts: &SolveOptions,
) -> CorrectedTarget {
    let mut adjusted = desired_liquid_temp;
    if model.use_ambient {
        if let (Some(ambient), Some(reference), Some(coeff)) =
            (ambient_temp, model.ambient_ref, model.ambient_coeff)
        {
            let correction = coeff * (ambient - reference);
            tracing::debug!(
                "ambient correction {correction:.3} °C (ambient {ambient:.2} °C)"
            );
            adjusted -= correction;
        }
    }

    let linear = model.b + 1.0;
    let constant = model.c - adjusted;

    if model.a.abs() < QUADRATIC_EPS {
        // b near −1 cancels the setpoint's own contribution; no finite
        // setpoint is distinguished, so pass the target through
        if linear.abs() < QUADRATIC_EPS {
            tracing::warn!(
                "coefficients leave the liquid temperature independent of the \
                 setpoint, passing {adjusted:.2} °C through"
            );
            return CorrectedTarget {
                setpoint: adjusted,
                degraded: Some(Degradation::IllConditioned),
            };
        }
        return CorrectedTarget {
            setpoint: -constant / linear,
            degraded: None,
        };
    }

    let discriminant = linear * linear - 4.0 * model.a * constant;
    if discriminant < 0.0 {
        // with the linear term cancelled the parabola vertex is the
        // closest approach
        let setpoint = if linear.abs() < QUADRATIC_EPS {
            -linear / (2.0 * model.a)
        } else {
            -constant / linear
        };
        tracing::warn!(
            "no real solution for desired {desired_liquid_temp:.2} °C, \
             using approximate setpoint {setpoint:.2} °C"
        );
        return CorrectedTarget {
            setpoint,
            degraded: Some(Degradation::LinearFallback),
        };
    }

    let root = discriminant.sqrt();
    let plus = (-linear + root) / (2.0 * model.a);
    let minus = (-linear - root) / (2.0 * model.a);

    let (lo, hi) = opts.operating_range;
    let in_range = |x: f64| (lo..=hi).contains(&x);

    if in_range(plus) {
        CorrectedTarget {
            setpoint: plus,
            degraded: None,
        }
    } else if in_range(minus) {
        tracing::info!("using alternative root {minus:.2} °C instead of {plus:.2} °C");
        CorrectedTarget {
            setpoint: minus,
            degraded: None,
        }
    } else {
        tracing::warn!(
            "both roots ({plus:.2} °C, {minus:.2} °C) are outside {lo:.0}..{hi:.0} °C"
        );
        CorrectedTarget {
            setpoint: plus,
            degraded: Some(Degradation::OutOfRange),
        }
    }
}

/// Invert the interpolation model by scanning candidate setpoints across the
/// operating range and picking the one whose predicted liquid temperature
/// lands closest to the desired value.
pub fn correct_target_interp(
    model: &InterpolationModel,
    desired_liquid_temp: f64,
    opts: &SolveOptions,
) -> Result<CorrectedTarget, Error> {
    let (lo, hi) = opts.operating_range;
    let count = ((hi - lo) / SCAN_RESOLUTION_C).ceil() as usize + 1;
    let grid: Vec<f64> = (0..count)
        .map(|i| (lo + i as f64 * SCAN_RESOLUTION_C).min(hi))
        .collect();
    let offsets = model.offsets_at(&grid)?;

    let mut best_miss = f64::INFINITY;
    let mut setpoint = lo;
    for (&x, offset) in grid.iter().zip(offsets) {
        let produced = x + offset;
        let miss = (produced - desired_liquid_temp).abs();
        if miss < best_miss {
            best_miss = miss;
            setpoint = x;
        }
    }

    let degraded = if model.is_extrapolated(setpoint) {
        tracing::warn!(
            "setpoint {setpoint:.2} °C lies outside the measured domain \
             {:.2}..{:.2} °C",
            model.temp_min,
            model.temp_max
        );
        Some(Degradation::Extrapolated)
    } else {
        None
    };

    Ok(CorrectedTarget { setpoint, degraded })
}
