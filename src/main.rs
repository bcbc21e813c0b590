use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use hamster_tracker::alerts::{AlertManager, AlertSink, LogAlertSink};
use hamster_tracker::config::Config;
use hamster_tracker::error::ConfigError;
use hamster_tracker::monitoring::IngestionMonitor;
use hamster_tracker::report::{DailyReport, DailyReporter, ReportGenerator};
use hamster_tracker::sweeper::{InactivitySweeper, SweepSettings};
use hamster_tracker::tracker::ActivityTracker;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Command-line arguments for the hamster activity tracker
#[derive(Parser)]
#[command(
    name = "hamster-tracker",
    about = "Hamster wheel activity tracker - live occupancy, round counting and inactivity alerts",
    long_about = "Reads newline-delimited JSON sensor events from a file or stdin, tracks which \
                  hamster sits in which wheel, credits wheel rounds, raises alerts for failed or \
                  silent sensors and idle hamsters, and prints the daily report on exit."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Event source, stdin when omitted
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Newline-delimited JSON event file (defaults to stdin)"
    )]
    input: Option<PathBuf>,

    /// Date printed on the report
    #[arg(
        short,
        long,
        value_name = "YYYY-MM-DD",
        help = "Report date (defaults to today, UTC)"
    )]
    date: Option<NaiveDate>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// Missing config files are allowed (defaults are used); a missing input
    /// file is not.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if config_path.extension().map_or(true, |ext| ext != "toml") {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if let Some(ref input_path) = self.input {
            if !input_path.is_file() {
                return Err(format!(
                    "Input path is not a readable file: {}",
                    input_path.display()
                ));
            }
        }

        Ok(())
    }
}

/// Ingestion totals for one input stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct IngestSummary {
    accepted: u64,
    rejected: u64,
}

/// Wires the tracker, sweeper, alert dispatch and event input together
struct HamsterMonitor {
    config: Config,

    tracker: Arc<ActivityTracker>,

    /// Rate-limited dispatch in front of the log sink
    alert_manager: Arc<AlertManager>,

    sweeper: InactivitySweeper,

    reporter: DailyReporter,

    /// Shutdown signal, fired by Ctrl-C or end of input
    shutdown_sender: Sender<()>,
    shutdown_receiver: Receiver<()>,

    /// Shutdown senders for the notification thread
    shutdown_senders: Vec<Sender<()>>,

    thread_handles: Vec<JoinHandle<()>>,

    /// Input reader; may stay blocked on stdin after shutdown
    ingest_handle: Option<JoinHandle<IngestSummary>>,
    reads_stdin: bool,

    /// Tells the input reader to stop after the current line
    ingest_running: Arc<AtomicBool>,
}

impl HamsterMonitor {
    fn new(config: Config) -> Self {
        info!("Initializing HamsterMonitor with configuration");

        let (shutdown_sender, shutdown_receiver) = mpsc::channel();

        let monitor = Arc::new(IngestionMonitor::new());
        let alert_manager = Arc::new(
            AlertManager::from_config(Box::new(LogAlertSink), &config.alerts)
                .with_monitor(Arc::clone(&monitor)),
        );
        let sink: Arc<dyn AlertSink> = alert_manager.clone();
        let tracker = Arc::new(ActivityTracker::with_monitor(sink, monitor));

        let sweeper = InactivitySweeper::new(
            Arc::clone(&tracker),
            SweepSettings::from(&config.sweeper),
        );
        let reporter = DailyReporter::new(Arc::clone(&tracker), config.report.active_threshold);

        Self {
            config,
            tracker,
            alert_manager,
            sweeper,
            reporter,
            shutdown_sender,
            shutdown_receiver,
            shutdown_senders: Vec::new(),
            thread_handles: Vec::new(),
            ingest_handle: None,
            reads_stdin: false,
            ingest_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load configuration from file or use defaults
    ///
    /// Unreadable or invalid files are reported and replaced by the defaults.
    fn load_config(config_path: Option<&PathBuf>) -> Config {
        match config_path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Config::from_file(path) {
                    Ok(config) => config,
                    Err(ConfigError::ReadError(_)) => {
                        warn!(
                            "Configuration file '{}' not found or unreadable, using defaults",
                            path.display()
                        );
                        Config::default()
                    }
                    Err(e) => {
                        error!("Configuration error in '{}': {}", path.display(), e);
                        warn!("Using default configuration due to invalid config file");
                        Config::default()
                    }
                }
            }
            None => {
                info!("Using default configuration");
                Config::default()
            }
        }
    }

    /// Start all background work and begin reading events
    fn start(&mut self, input: Option<&PathBuf>) -> Result<()> {
        info!("Starting HamsterMonitor components");

        let notification_thread = self.spawn_notification_thread()?;
        self.thread_handles.push(notification_thread);

        self.sweeper
            .start()
            .context("Failed to start inactivity sweeper")?;

        let reader: Box<dyn BufRead + Send> = match input {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open input file {}", path.display()))?;
                info!("Reading events from {}", path.display());
                Box::new(BufReader::new(file))
            }
            None => {
                info!("Reading events from stdin");
                self.reads_stdin = true;
                Box::new(BufReader::new(io::stdin()))
            }
        };
        self.ingest_handle = Some(self.spawn_ingest_thread(reader)?);

        info!(
            "All HamsterMonitor components started (sweep every {}s)",
            self.config.sweeper.interval_seconds
        );
        Ok(())
    }

    /// Block until Ctrl-C or end of input
    fn wait_for_shutdown(&self) -> Result<()> {
        info!("Waiting for shutdown signal...");
        self.shutdown_receiver
            .recv()
            .context("Shutdown channel closed unexpectedly")?;
        info!("Shutdown signal received");
        Ok(())
    }

    /// Stop background threads and flush whatever alerts the rate limit allows
    fn stop(&mut self) -> Result<()> {
        info!("Stopping HamsterMonitor components");

        self.sweeper
            .stop()
            .context("Failed to stop inactivity sweeper")?;

        self.ingest_running.store(false, Ordering::SeqCst);

        for sender in &self.shutdown_senders {
            if let Err(e) = sender.send(()) {
                error!("Failed to send shutdown signal to thread: {}", e);
            }
        }

        for handle in self.thread_handles.drain(..) {
            if let Err(e) = handle.join() {
                error!("Thread failed to join: {:?}", e);
            }
        }

        if let Some(handle) = self.ingest_handle.take() {
            if handle.is_finished() || !self.reads_stdin {
                match handle.join() {
                    Ok(summary) => info!(
                        "Ingested {} events, rejected {} lines",
                        summary.accepted, summary.rejected
                    ),
                    Err(e) => error!("Ingest thread failed to join: {:?}", e),
                }
            } else {
                warn!("Input still open, leaving reader thread behind");
            }
        }

        self.alert_manager.tick();
        let queued = self.alert_manager.queued_alert_count();
        if queued > 0 {
            warn!("{} alerts still held back by the rate limit at shutdown", queued);
        }

        self.tracker.monitor().collect_metrics();
        info!("HamsterMonitor stopped successfully");
        Ok(())
    }

    fn report(&self, date: Option<NaiveDate>) -> DailyReport {
        self.reporter.daily_report(date)
    }

    /// Spawn the thread that submits every input line to the tracker
    ///
    /// Signals shutdown when the input ends.
    fn spawn_ingest_thread(
        &self,
        reader: Box<dyn BufRead + Send>,
    ) -> Result<JoinHandle<IngestSummary>> {
        let tracker = Arc::clone(&self.tracker);
        let shutdown_sender = self.shutdown_sender.clone();
        let running = Arc::clone(&self.ingest_running);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("event-ingest".to_string())
            .spawn(move || {
                info!("Ingest thread started");
                let summary = ingest_lines(&tracker, reader, &running);
                info!("End of input reached");
                if shutdown_sender.send(()).is_err() {
                    debug!("Shutdown already in progress");
                }
                summary
            })
            .context("Failed to spawn ingest thread")?;

        Ok(handle)
    }

    /// Spawn the notification thread that flushes queued alerts
    fn spawn_notification_thread(&mut self) -> Result<JoinHandle<()>> {
        let (shutdown_sender, shutdown_receiver) = mpsc::channel();
        self.shutdown_senders.push(shutdown_sender);

        let alert_manager = Arc::clone(&self.alert_manager);

        let handle = thread::Builder::new()
            .name("alert-notifier".to_string())
            .spawn(move || {
                info!("Notification thread started");

                loop {
                    match shutdown_receiver.recv_timeout(Duration::from_millis(500)) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("Notification thread received shutdown signal");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            alert_manager.tick();
                        }
                    }
                }

                info!("Notification thread stopped");
            })
            .context("Failed to spawn notification thread")?;

        Ok(handle)
    }
}

/// Submit each non-blank line as one JSON event
///
/// Stops early once `running` is cleared.
fn ingest_lines(
    tracker: &ActivityTracker,
    reader: impl BufRead,
    running: &AtomicBool,
) -> IngestSummary {
    let mut summary = IngestSummary::default();

    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            info!("Input reading stopped after {} lines", index);
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match tracker.submit_json(&line) {
            Ok(outcome) => {
                debug!("Line {}: {:?}", index + 1, outcome);
                summary.accepted += 1;
            }
            Err(e) => {
                warn!("Rejected line {}: {}", index + 1, e);
                summary.rejected += 1;
            }
        }
    }

    summary
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting hamster activity tracker");

    if let Err(e) = cli.validate() {
        anyhow::bail!("Invalid arguments: {}", e);
    }

    let config = HamsterMonitor::load_config(cli.config.as_ref());
    let mut monitor = HamsterMonitor::new(config);

    let shutdown_sender = monitor.shutdown_sender.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    monitor
        .start(cli.input.as_ref())
        .context("Failed to start HamsterMonitor")?;

    if let Err(e) = monitor.wait_for_shutdown() {
        error!("Error during shutdown wait: {}", e);
    }

    monitor.stop()?;

    let report = monitor.report(cli.date);
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);

    info!("HamsterMonitor shutdown complete");
    Ok(())
}
