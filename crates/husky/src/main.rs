//! husky CLI: provision, bulk-load and reconcile warehouse tables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use husky::dataset::{LocalDirectorySource, stage_dataset};
use husky::{
    CliArgs, Command, Config, LoadPlan, RunReport, StorageProvider, init_tracing, reject_config,
    run_config, shutdown_signal,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.log_format);

    let config = match args.command.load_config() {
        Ok(c) => c,
        Err(e) => {
            if let Command::Load { json, .. } = args.command {
                return print_report(&reject_config(e), json);
            }
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let work = async {
        match args.command {
            Command::Load { json, .. } => load(&config, json).await,
            Command::Stage {
                from,
                keep_existing,
                ..
            } => stage(&config, from, keep_existing).await,
            Command::Check { .. } => check(&config),
        }
    };

    tokio::select! {
        code = work => code,
        _ = shutdown_signal() => {
            warn!("Interrupted, releasing the warehouse connection");
            eprintln!("Error: interrupted");
            ExitCode::FAILURE
        }
    }
}

async fn load(config: &Config, json: bool) -> ExitCode {
    info!("Starting husky load with {} table(s)", config.table_count());

    let report = run_config(config).await;
    print_report(&report, json)
}

fn print_report(report: &RunReport, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to encode report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else if report.success {
        println!("{report}");
    } else {
        eprintln!("{report}");
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn stage(config: &Config, from: Option<PathBuf>, keep_existing: bool) -> ExitCode {
    let Some(root) = from.or_else(|| config.dataset.path.clone()) else {
        eprintln!("Error: no dataset directory given, pass --from or set dataset.path");
        return ExitCode::FAILURE;
    };

    let bucket_url = config.stage.bucket_url();
    let options: HashMap<String, String> = config.stage.storage_options.clone();
    let storage = match StorageProvider::for_url_with_options(&bucket_url, options).await {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Error: failed to open bucket {bucket_url}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let source = LocalDirectorySource::new(root).with_files(config.dataset.files.clone());
    let clean_existing = config.dataset.clean_existing && !keep_existing;
    match stage_dataset(&source, &storage, &config.dataset.prefix, clean_existing).await {
        Ok(keys) => {
            for key in &keys {
                println!("{}/{key}", storage.canonical_url().trim_end_matches('/'));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check(config: &Config) -> ExitCode {
    match LoadPlan::from_config(config) {
        Ok(plan) => {
            for statement in plan.statements() {
                println!("{};", statement.to_sql());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
