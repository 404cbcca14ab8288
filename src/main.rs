//! TireTune CLI - analyzes a ride-data file and prints a pressure
//! recommendation for each protocol it finds enough runs for.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tiretune::config::{load_config, BikeType};
use tiretune::result::AnalysisResult;
use tiretune::{ingest, Pipeline};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: tiretune <ride-file.jsonl> [bike-type]");
        return ExitCode::FAILURE;
    };
    let bike_type = match args.get(2).map(String::as_str) {
        Some("road") | None => BikeType::Road,
        Some("time_trial") => BikeType::TimeTrial,
        Some("gravel") => BikeType::Gravel,
        Some("mountain") => BikeType::Mountain,
        Some(other) => {
            eprintln!("unknown bike type: {other}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("loading ride data from {}", path.display());
    let session = match ingest(&path) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("failed to read {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("could not load saved config, using defaults: {e}");
            tiretune::AnalysisConfig::default()
        }
    };
    let pipeline = Pipeline::new(&config);

    let mut any_succeeded = false;
    for (label, result) in [
        ("constant power", pipeline.run_constant_power(&session, bike_type)),
        ("lap efficiency", pipeline.run_circle(&session, bike_type)),
        ("coast-down", pipeline.run_coast_down(&session, bike_type, None)),
    ] {
        match result {
            Ok(result) => {
                any_succeeded = true;
                print_result(label, &result);
            }
            Err(e) => {
                tracing::info!("{label}: {e}");
            }
        }
    }

    if any_succeeded {
        ExitCode::SUCCESS
    } else {
        eprintln!("no protocol had enough usable runs in {}", path.display());
        ExitCode::FAILURE
    }
}

fn print_result(label: &str, result: &AnalysisResult) {
    println!("== {label} ({} points, {:?} confidence) ==", result.points.len(), result.regression.confidence);
    println!(
        "  recommended rear: {:.1} psi, front: {:.1} psi",
        result.recommended.rear, result.recommended.front
    );
    println!("  fit r^2: {:.3}", result.regression.r_squared);
    if let Some(warning) = &result.regression.warning {
        println!("  warning: {warning}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
}
