use anyhow::Context;
use clap::Parser;
use tracing_subscriber::prelude::*;

use tec_temp_correction::{
    config::CorrectionSettings,
    solve::{correct_target, correct_target_interp, SolveOptions},
    InterpolationModel,
};

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "correct_target=info,tec_temp_correction=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = cli::Cli::parse();

    anyhow::ensure!(
        args.range_min < args.range_max,
        "--range-min must be below --range-max"
    );
    let opts = SolveOptions {
        operating_range: (args.range_min, args.range_max),
    };

    let result = if let Some(path) = &args.interpolation_file {
        let model = InterpolationModel::load_json(path)
            .with_context(|| format!("loading {}", path.display()))?;
        correct_target_interp(&model, args.desired_temp, &opts)?
    } else {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => CorrectionSettings::default_path()
                .context("no user config directory available, pass --config")?,
        };
        let settings = CorrectionSettings::load(&path);
        correct_target(&settings.model(), args.desired_temp, args.ambient, &opts)
    };

    match result.degraded {
        Some(flag) => println!("{:.2} ({flag})", result.setpoint),
        None => println!("{:.2}", result.setpoint),
    }

    Ok(())
}
