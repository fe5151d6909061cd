//! bidi-har CLI

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use bidi_har::adapters::{CollectionExporter, LiveRecorder};
use bidi_har::config::CollectionExporterConfig;
use bidi_har::transport::WebSocketDriver;
use bidi_har::{Event, Har, LiveConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "export" => match args.get(2) {
            Some(path) => export(Path::new(path)),
            None => {
                eprintln!("Usage: bidi-har export <events.json>");
                process::exit(1);
            }
        },
        "record" => record(&args[2..]).await,
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'bidi-har' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("bidi-har v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: bidi-har <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  export <events.json>                      Export a JSON array of events as HAR");
    eprintln!("  record <ws-url> [--config <file>] [ctx]   Record a live session until Ctrl-C");
}

fn export(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("Expected a JSON array of events")?;

    let events = values
        .into_iter()
        .map(Event::from_value)
        .collect::<Result<Vec<_>, _>>()?;

    let har = CollectionExporter::new(CollectionExporterConfig::default(), events).export(None, None)?;
    print_har(&har)
}

async fn record(args: &[String]) -> anyhow::Result<()> {
    let Some((url, rest)) = args.split_first() else {
        bail!("Usage: bidi-har record <ws-url> [--config <file>] [context-id...]");
    };

    let mut config_path: Option<PathBuf> = None;
    let mut contexts = Vec::new();
    let mut rest = rest.iter();
    while let Some(arg) = rest.next() {
        if arg == "--config" {
            let path = rest.next().context("--config expects a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            contexts.push(arg.clone());
        }
    }

    let mut config = match config_path {
        Some(path) => LiveConfig::from_file(&path)?,
        None => LiveConfig::new(Vec::new()),
    };
    if !contexts.is_empty() {
        config.browsing_context_ids = contexts;
    }

    let driver = Arc::new(WebSocketDriver::connect(url).await?);
    let mut recorder = LiveRecorder::new(driver, config)?;

    recorder.start(None).await?;
    eprintln!("Recording, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    match recorder.stop(None).await? {
        Some(har) => print_har(&har),
        None => bail!("HAR export failed"),
    }
}

fn print_har(har: &Har) -> anyhow::Result<()> {
    println!("{}", har.to_json_pretty()?);
    Ok(())
}
