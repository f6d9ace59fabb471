use std::path::PathBuf;

use clap::Parser;

/// Analyze a measurement log: extract per-step offsets and fit the
/// temperature correction model.
#[derive(Parser)]
pub struct Cli {
    /// Measurement log (CSV)
    pub data_file: PathBuf,

    /// Programmed start temperature, °C
    #[clap(long)]
    pub start_temp: Option<f64>,

    /// Programmed stop temperature, °C
    #[clap(long)]
    pub stop_temp: Option<f64>,

    /// Programmed temperature increment, °C
    #[clap(long)]
    pub increment: Option<f64>,

    /// Fit the ambient-augmented model
    #[clap(long)]
    pub with_ambient: bool,

    /// Reference ambient temperature, °C
    #[clap(long, default_value_t = 20.0)]
    pub ambient_ref: f64,

    /// Build the interpolation model and write it next to the config
    #[clap(short, long)]
    pub interpolation: Option<PathBuf>,

    /// Write the fitted coefficients into the correction settings
    #[clap(short, long)]
    pub update_config: bool,

    /// Correction settings file, defaults to the user config directory
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Export the offset records as CSV
    #[clap(short, long)]
    pub offsets_out: Option<PathBuf>,
}
