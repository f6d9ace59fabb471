use std::path::PathBuf;

use clap::Parser;

/// Compute the holder setpoint that produces a desired liquid temperature.
#[derive(Parser)]
pub struct Cli {
    /// Desired liquid temperature, °C
    pub desired_temp: f64,

    /// Current ambient temperature, °C
    #[clap(short, long)]
    pub ambient: Option<f64>,

    /// Correction settings file, defaults to the user config directory
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Use an interpolation model file instead of the quadratic coefficients
    #[clap(short, long)]
    pub interpolation_file: Option<PathBuf>,

    /// Lower bound of the physical setpoint range, °C
    #[clap(long, default_value_t = 0.0)]
    pub range_min: f64,

    /// Upper bound of the physical setpoint range, °C
    #[clap(long, default_value_t = 100.0)]
    pub range_max: f64,
}
