//! elements-analyze [--machines] <frames-dir> [output.json] [config.json5]
//!
//! `--machines` drives the configured hardware while analysing.

use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use elements_env::api::EnvironmentAnalyzer;
use elements_env::core::config::EnvironmentConfig;
use elements_env::core::scheduler::StatusEvent;

fn main() -> ExitCode {
    elements_env::init_logging();

    let (flags, positional): (Vec<String>, Vec<String>) =
        std::env::args().skip(1).partition(|arg| arg.starts_with("--"));
    let drive_machines = flags.iter().any(|f| f == "--machines");
    if let Some(unknown) = flags.iter().find(|f| *f != "--machines") {
        eprintln!("unknown option: {}", unknown);
        return ExitCode::from(2);
    }

    let mut args = positional.into_iter();
    let Some(source) = args.next().map(PathBuf::from) else {
        eprintln!("usage: elements-analyze [--machines] <frames-dir> [output.json] [config.json5]");
        return ExitCode::from(2);
    };
    let output = args.next().map(PathBuf::from);

    let config = match args.next() {
        Some(path) => match EnvironmentConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("❌ {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => EnvironmentConfig::default(),
    };

    let mut analyzer = EnvironmentAnalyzer::create(config);
    if drive_machines {
        if let Err(e) = analyzer.setup_machines() {
            error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    }
    let events = match analyzer.start(&source, output) {
        Ok(events) => events,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    for event in events {
        match event {
            StatusEvent::Progress { frames, total_frames } => match total_frames {
                Some(total) => info!("{}/{} frames", frames, total),
                None => info!("{} frames", frames),
            },
            StatusEvent::Completed { frames, output } => {
                info!("✅ Done: {} frames -> {:?}", frames, output);
            }
            StatusEvent::Failed { message } => error!("❌ {}", message),
            _ => {}
        }
    }

    let code = match analyzer.wait() {
        Ok(outcome) if matches!(outcome.export, Some(Ok(_))) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    };
    if !analyzer.cleanup_machines().is_empty() {
        return ExitCode::FAILURE;
    }
    code
}
