// Main CLI entry point for version-hunter
// Uses clap for argument parsing

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use version_hunter::reporting::{export_csv, export_markdown};
use version_hunter::traffic::{HarParser, RawRequestParser, TrafficParser};
use version_hunter::{
    FileStateStore, HostScope, HunterConfig, Observation, ResultEvent, VersionHunter,
};

/// Pick a traffic parser from the input path
fn select_parser(input: &str, secure: bool) -> Result<Box<dyn TrafficParser>, String> {
    if Path::new(input).is_dir() {
        Ok(Box::new(RawRequestParser { secure }))
    } else if input.ends_with(".har") || input.ends_with(".json") {
        Ok(Box::new(HarParser))
    } else {
        Err(format!(
            "Unsupported input type: {}. Use a HAR export or a directory of raw .http/.req files.",
            input
        ))
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_selection_by_extension() {
        assert!(select_parser("capture.har", false).is_ok());
        assert!(select_parser("capture.json", false).is_ok());
        assert!(select_parser("capture.pcap", false).is_err());
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let matches = Command::new("version-hunter")
        .version(clap::crate_version!())
        .author("Jake Abendroth")
        .about("Finds versioned API endpoints in captured traffic and probes sibling versions")
        .after_help("EXAMPLES:\n  version-hunter --traffic session.har --scope '*.example.com'\n  version-hunter -t requests/ --https --state hunt.json --csv-report --markdown-report")
        .arg(Arg::new("traffic")
            .short('t')
            .long("traffic")
            .required(true)
            .num_args(1)
            .help("HAR export or directory of raw .http/.req request files"))
        .arg(Arg::new("state")
            .short('s')
            .long("state")
            .num_args(1)
            .default_value("version_hunter_state.json")
            .help("File used to persist results between runs"))
        .arg(Arg::new("scope")
            .long("scope")
            .num_args(1)
            .action(ArgAction::Append)
            .help("In-scope host pattern (repeatable, e.g. api.example.com or *.example.com). Default: everything"))
        .arg(Arg::new("https")
            .long("https")
            .action(ArgAction::SetTrue)
            .help("Treat raw origin-form requests as HTTPS"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .num_args(1)
            .help("JSON configuration file"))
        .arg(Arg::new("log_level")
            .long("log-level")
            .num_args(1)
            .default_value("info")
            .help("Log level when RUST_LOG is not set"))
        .arg(Arg::new("csv_report")
            .long("csv-report")
            .action(ArgAction::SetTrue)
            .help("Write a CSV report"))
        .arg(Arg::new("markdown_report")
            .long("markdown-report")
            .action(ArgAction::SetTrue)
            .help("Write a Markdown report"))
        .arg(Arg::new("out_dir")
            .long("out-dir")
            .num_args(1)
            .default_value(".")
            .help("Directory for reports"))
        .get_matches();

    let log_level = matches.get_one::<String>("log_level").map(String::as_str).unwrap_or("info");
    init_logging(log_level)?;

    let traffic = matches
        .get_one::<String>("traffic")
        .ok_or_else(|| anyhow!("--traffic is required"))?;
    let state_path = matches
        .get_one::<String>("state")
        .map(String::as_str)
        .unwrap_or("version_hunter_state.json");
    let out_dir = matches.get_one::<String>("out_dir").map(String::as_str).unwrap_or(".");
    let secure = matches.get_flag("https");
    let scopes: Vec<String> = matches
        .get_many::<String>("scope")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let config = match matches.get_one::<String>("config") {
        Some(path) => HunterConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => HunterConfig::default(),
    };

    let mut hunter = VersionHunter::connect(config).context("Failed to create HTTP client")?;
    if !scopes.is_empty() {
        hunter = hunter.with_scope(HostScope::new(&scopes));
    }

    let store = FileStateStore::new(state_path);
    let restored = hunter.load_state(&store);
    if restored > 0 {
        println!("Restored {} results from {}.", restored, state_path);
    }

    // Live view of new results, standing in for a results table
    let mut events = hunter.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ResultEvent::Added { host, outcome }) => println!(
                    "[{}] {:<3} {:<7} {}{} -> {} ({} bytes)",
                    outcome.kind,
                    outcome.version,
                    outcome.method,
                    host,
                    outcome.path,
                    outcome.status_code,
                    outcome.body_length
                ),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "result printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let parser = select_parser(traffic, secure).map_err(anyhow::Error::msg)?;
    let requests = parser.parse(traffic).map_err(anyhow::Error::msg)?;
    println!("Loaded {} requests.", requests.len());

    let mut dispatched = 0;
    for request in &requests {
        if let Observation::Dispatched(_) = hunter.observe(request) {
            dispatched += 1;
        }
    }
    println!("Dispatched {} version sweeps.", dispatched);

    let summaries = hunter.wait_idle().await;
    let failed: usize = summaries.iter().map(|s| s.failed).sum();
    let recorded: usize = summaries.iter().map(|s| s.recorded).sum();
    println!("Recorded {} new results ({} probes failed).", recorded, failed);

    hunter
        .save_state(&store)
        .with_context(|| format!("Failed to save state to {}", state_path))?;

    let snapshot = hunter.snapshot();
    if matches.get_flag("csv_report") {
        let path = export_csv(&snapshot, Path::new(out_dir)).context("Failed to write CSV report")?;
        println!("CSV report: {}", path.display());
    }
    if matches.get_flag("markdown_report") {
        let path = export_markdown(&snapshot, Path::new(out_dir)).context("Failed to write Markdown report")?;
        println!("Markdown report: {}", path.display());
    }

    // Closing the event channel lets the printer drain and stop.
    drop(hunter);
    let _ = printer.await;
    Ok(())
}
