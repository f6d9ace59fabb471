pub mod analysis;
pub mod config;
pub mod fit;
pub mod ingest;
pub mod interp;
pub mod offset;
pub mod segment;
pub mod solve;

pub use analysis::{analyze_series, AnalysisOptions, AnalysisReport};
pub use config::CorrectionSettings;
pub use fit::{fit_correction, CorrectionFit, CorrectionModel, FitOptions};
pub use interp::{build_interpolation, InterpKind, InterpolationModel};
pub use offset::{extract_offset, OffsetRecord};
pub use segment::{split_steps, Step, StepPlan};
pub use solve::{correct_target, CorrectedTarget, Degradation, SolveOptions};

/// One sensor reading row of a measurement log.
///
/// The core only accepts already-normalized samples; mapping the historical
/// log column names onto these channels is the job of [`ingest`].
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct Sample {
    /// Seconds since the start of the series, non-decreasing.
    pub time: f64,
    /// Programmed holder target temperature, °C.
    pub target_temp: f64,
    /// Measured holder temperature, °C.
    pub holder_temp: f64,
    /// Measured liquid temperature, °C. Missing in some logs.
    pub liquid_temp: Option<f64>,
    /// Desired liquid temperature, °C, when the log records it explicitly.
    pub desired_temp: Option<f64>,
    /// Room temperature, °C.
    pub ambient_temp: Option<f64>,
    /// TEC power draw, W.
    pub power: Option<f64>,
}

impl Sample {
    pub fn new(time: f64, target_temp: f64, holder_temp: f64) -> Self {
        Self {
            time,
            target_temp,
            holder_temp,
            liquid_temp: None,
            desired_temp: None,
            ambient_temp: None,
            power: None,
        }
    }

    pub fn with_liquid(mut self, liquid_temp: f64) -> Self {
        self.liquid_temp = Some(liquid_temp);
        self
    }

    pub fn with_desired(mut self, desired_temp: f64) -> Self {
        self.desired_temp = Some(desired_temp);
        self
    }

    pub fn with_ambient(mut self, ambient_temp: f64) -> Self {
        self.ambient_temp = Some(ambient_temp);
        self
    }
}

/// Recoverable failures of the analysis pipeline. None of these should take
/// down a surrounding control loop; a failed fit leaves the previously
/// persisted model in effect.
#[derive(Debug)]
pub enum Error {
    /// Missing required channel or too few usable samples. Callers skip the
    /// offending step or file and continue with the rest of the batch.
    InputData(String),
    /// Least-squares solve failed, the parameter covariance is singular, or
    /// there are too few offset records to fit.
    FitFailure(String),
    /// The parameter store could not be written. The in-memory model is
    /// left untouched.
    ConfigPersistence(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InputData(msg) => write!(f, "input data error: {msg}"),
            Error::FitFailure(msg) => write!(f, "fit failure: {msg}"),
            Error::ConfigPersistence(err) => write!(f, "config persistence error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigPersistence(err) => Some(err),
            _ => None,
        }
    }
}
