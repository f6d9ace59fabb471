use anyhow::Context;
use clap::Parser;
use tracing_subscriber::prelude::*;

use tec_temp_correction::{
    analyze_series, config::CorrectionSettings, fit::FitOptions, ingest, AnalysisOptions, StepPlan,
};

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "analyze_offsets=info,tec_temp_correction=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = cli::Cli::parse();

    let samples = ingest::read_measurement_csv(&args.data_file)
        .with_context(|| format!("reading {}", args.data_file.display()))?;

    let plan = match (args.start_temp, args.stop_temp, args.increment) {
        (Some(start_temp), Some(stop_temp), Some(increment)) => Some(StepPlan {
            start_temp,
            stop_temp,
            increment,
        }),
        (None, None, None) => None,
        _ => anyhow::bail!("--start-temp, --stop-temp and --increment must be given together"),
    };

    let opts = AnalysisOptions {
        plan,
        fit: FitOptions {
            use_ambient: args.with_ambient,
            ambient_ref: args.ambient_ref,
            ..Default::default()
        },
        build_interpolation: args.interpolation.is_some(),
        accept_initial: false,
    };

    let report = analyze_series(&samples, &opts)?;
    println!("{report}");

    if let Some(path) = &args.offsets_out {
        ingest::write_offsets_csv(path, &report.offsets)?;
    }

    if let Some(path) = &args.interpolation {
        if let Some(interp) = &report.interpolation {
            interp.save_json(path)?;
        }
    }

    if args.update_config {
        if !report.fit.fitted {
            anyhow::bail!("refusing to store unfitted parameters");
        }
        let path = match &args.config {
            Some(path) => path.clone(),
            None => CorrectionSettings::default_path()
                .context("no user config directory available, pass --config")?,
        };
        let mut settings = CorrectionSettings::load(&path);
        settings.apply_fit(&report.fit);
        settings.save(&path)?;
        println!("{settings}");
    }

    Ok(())
}
