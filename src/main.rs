//! Book Cover Scanner CLI
//!
//! Command-line front end for the capture session: scans covers from a
//! camera, a still image or a mock source, and talks to the
//! identification service directly for uploads, reports and health.

use clap::{Parser, Subcommand};
use cover_scan::{
    capture::{CaptureBackend, MockBackend, ScannerConfig, StillImageBackend},
    identification::{IdentificationClient, IdentificationOutcome},
    metrics::MetricsRegistry,
    presenter::Presenter,
    session::{CaptureSessionController, SessionEvent},
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cover-scan")]
#[command(about = "Identify books by photographing their covers")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print outcomes as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture session and identify what the camera sees
    Scan {
        /// Frame source: mock, still:<path> or camera:<index>
        #[arg(short, long, default_value = "mock")]
        source: Source,

        /// Number of captures (0 runs until Ctrl+C; default from config)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Seconds between captures
        #[arg(short, long, default_value = "1")]
        interval: u64,

        /// Serve Prometheus metrics on this port (default from config)
        #[arg(long)]
        metrics_port: Option<u16>,
    },

    /// Submit an image file for identification
    Identify {
        /// Image to upload
        path: PathBuf,
    },

    /// Print the capture profile negotiation order
    Profiles,

    /// Report an incorrect match
    Report {
        /// Catalogue id of the wrongly matched book
        book_id: i64,

        /// Free-text feedback
        #[arg(short, long, default_value = "")]
        feedback: String,
    },

    /// Check the identification service
    Health,
}

/// Where frames come from.
#[derive(Debug, Clone)]
enum Source {
    Mock,
    Still(PathBuf),
    Camera(u32),
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "mock" => Ok(Self::Mock),
            Some(("still", path)) if !path.is_empty() => Ok(Self::Still(PathBuf::from(path))),
            Some(("camera", index)) => index
                .parse()
                .map(Self::Camera)
                .map_err(|_| format!("invalid camera index '{index}'")),
            _ => Err(format!(
                "unknown source '{s}' (expected mock, still:<path> or camera:<index>)"
            )),
        }
    }
}

/// Writes outcomes to stdout and session changes to stderr.
struct ConsolePresenter {
    json: bool,
}

impl Presenter for ConsolePresenter {
    fn session_changed(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Idle => eprintln!("Camera stopped"),
            SessionEvent::Active { profile, settings } => eprintln!(
                "Camera ready: {} (profile {}: {})",
                settings.resolution, profile.index, profile.profile
            ),
            SessionEvent::Error(error) => eprintln!("Camera error: {error}"),
        }
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        if self.json {
            match serde_json::to_string(outcome) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to serialize outcome: {}", e),
            }
            return;
        }

        match outcome {
            IdentificationOutcome::Success(book) => {
                println!("{}", book.title);
                println!(
                    "  similarity {:.1}% ({} confidence: {})",
                    book.similarity_score,
                    book.tier(),
                    book.tier().advisory()
                );
                if let Some(url) = &book.url {
                    println!("  {url}");
                }
                if let Some(id) = book.id {
                    println!("  id {id}");
                }
                if let Some(warning) = &book.warning {
                    println!("  warning: {warning}");
                }
            }
            IdentificationOutcome::UnknownBook { suggestion } => {
                println!("Book not recognised. {suggestion}");
            }
            IdentificationOutcome::Failure { message } => {
                println!("Identification failed: {message}");
            }
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let config = match &cli.config {
        Some(path) => ScannerConfig::from_file(path)?,
        None => ScannerConfig::default(),
    };
    let presenter = ConsolePresenter { json: cli.json };

    match cli.command {
        Commands::Scan {
            source,
            count,
            interval,
            metrics_port,
        } => {
            let count = count.unwrap_or(config.output.captures);
            let port = metrics_port.unwrap_or(config.output.metrics_port);
            let interval = Duration::from_secs(interval);
            match source {
                Source::Mock => scan(MockBackend::new(), &config, presenter, count, interval, port).await,
                Source::Still(path) => {
                    scan(StillImageBackend::new(path), &config, presenter, count, interval, port).await
                }
                Source::Camera(index) => scan_camera(index, &config, presenter, count, interval, port).await,
            }
        }
        Commands::Identify { path } => {
            let client = IdentificationClient::new(config.identification)?;
            let outcome = client.submit_file(&path).await?;
            presenter.outcome(&outcome);
            Ok(())
        }
        Commands::Profiles => {
            for (index, profile) in config.capture.profiles().iter().enumerate() {
                println!("{index}: {profile}");
            }
            Ok(())
        }
        Commands::Report { book_id, feedback } => {
            let client = IdentificationClient::new(config.identification)?;
            let ack = client.report_incorrect_match(book_id, &feedback).await?;
            println!("{}", if ack.is_empty() { "Report sent" } else { ack.as_str() });
            Ok(())
        }
        Commands::Health => {
            let client = IdentificationClient::new(config.identification)?;
            let health = client.health().await?;
            println!("status: {}", health.status);
            if let Some(db) = &health.database {
                println!("database connected: {}", db.connected);
                println!("books: {}", db.book_count);
            }
            if let Some(error) = &health.error {
                println!("error: {error}");
            }
            if health.is_healthy() {
                Ok(())
            } else {
                Err("service is unhealthy".into())
            }
        }
    }
}

#[cfg(feature = "camera")]
async fn scan_camera(
    index: u32,
    config: &ScannerConfig,
    presenter: ConsolePresenter,
    count: u32,
    interval: Duration,
    port: u16,
) -> CliResult {
    let backend = cover_scan::capture::NokhwaBackend::new(index);
    scan(backend, config, presenter, count, interval, port).await
}

#[cfg(not(feature = "camera"))]
async fn scan_camera(
    _index: u32,
    _config: &ScannerConfig,
    _presenter: ConsolePresenter,
    _count: u32,
    _interval: Duration,
    _port: u16,
) -> CliResult {
    Err("built without camera support (enable the `camera` feature)".into())
}

async fn scan<B: CaptureBackend>(
    backend: B,
    config: &ScannerConfig,
    presenter: ConsolePresenter,
    count: u32,
    interval: Duration,
    port: u16,
) -> CliResult {
    let registry = Arc::new(MetricsRegistry::new()?);
    serve_metrics(port, &registry);

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let client = IdentificationClient::new(config.identification.clone())?;
    let controller = CaptureSessionController::from_config(
        backend,
        client,
        (presenter, Arc::clone(&registry)),
        &config.capture,
    );

    info!("Cover scanner v{}", cover_scan::VERSION);
    controller.start().await?;

    let mut taken = 0;
    while count == 0 || taken < count {
        if stop_flag.load(Ordering::SeqCst) {
            info!("Interrupted, stopping");
            break;
        }

        match controller.capture().await {
            Ok(Some(_)) => taken += 1,
            Ok(None) => {}
            Err(e) => {
                controller.stop();
                return Err(e.into());
            }
        }

        if count == 0 || taken < count {
            tokio::time::sleep(interval).await;
        }
    }

    controller.stop();
    info!(
        captures = taken,
        identified = registry.outcomes("success"),
        "Scan finished"
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn serve_metrics(port: u16, registry: &Arc<MetricsRegistry>) {
    use cover_scan::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), Arc::clone(registry));
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!("Metrics server stopped: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics"))]
fn serve_metrics(port: u16, _registry: &Arc<MetricsRegistry>) {
    if port != 0 {
        warn!(port, "Built without the metrics feature, not serving metrics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        assert!(matches!("mock".parse::<Source>(), Ok(Source::Mock)));
        assert!(matches!(
            "still:covers/dune.jpg".parse::<Source>(),
            Ok(Source::Still(p)) if p == PathBuf::from("covers/dune.jpg")
        ));
        assert!(matches!("camera:2".parse::<Source>(), Ok(Source::Camera(2))));
        assert!("camera:front".parse::<Source>().is_err());
        assert!("still:".parse::<Source>().is_err());
        assert!("webcam".parse::<Source>().is_err());
    }

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from(["cover-scan", "-v", "scan", "--source", "camera:0", "-n", "0"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Scan { source: Source::Camera(0), count: Some(0), .. }
        ));
    }
}
