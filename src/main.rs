//! Pulse Sentinel CLI
//!
//! Online heart-rate anomaly monitor.

use clap::{Parser, Subcommand};
use pulse_sentinel::{
    config::{Config, StorageBackend},
    core::{ClassifierManager, ClassifierState, LoadOutcome, ThresholdPolicy},
    monitor::{LogActuator, LoopExit, Monitor},
    source::ReaderLineSource,
    store::{open_backends, PredictionSource},
    telemetry::{create_shared_stats_with_persistence, SessionStats},
    LabelingPolicy, DISCLAIMER, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pulse-sentinel")]
#[command(version = VERSION)]
#[command(about = "Online heart-rate anomaly monitor", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring the sensor stream
    Run {
        /// Input device or file to read lines from (`-` for stdin)
        #[arg(long, short)]
        input: Option<String>,

        /// Readings above this BPM are labeled abnormal
        #[arg(long)]
        threshold: Option<i32>,

        /// Retrain every N accumulated readings
        #[arg(long)]
        retrain_interval: Option<usize>,

        /// Delay between loop iterations in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Storage backend (local, remote or memory)
        #[arg(long)]
        backend: Option<StorageBackend>,

        /// Base URL of the remote store
        #[arg(long)]
        remote_url: Option<String>,
    },

    /// Show configuration, model and last session status
    Status,

    /// Classify one reading with the persisted model
    Predict {
        /// Heart rate in BPM
        #[arg(long)]
        value: i32,
    },

    /// Show configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },

    /// Display the usage notice
    Disclaimer,
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Run {
            input,
            threshold,
            retrain_interval,
            poll_ms,
            backend,
            remote_url,
        } => {
            let mut config = load_config(&config_path);
            if let Some(input) = input {
                config.input = input;
            }
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            if let Some(interval) = retrain_interval {
                config.retrain_interval = interval;
            }
            if let Some(ms) = poll_ms {
                config.poll_delay = Duration::from_millis(ms);
            }
            if let Some(backend) = backend {
                config.storage.backend = backend;
            }
            if remote_url.is_some() {
                config.storage.remote_url = remote_url;
            }
            cmd_run(config);
        }
        Commands::Status => {
            cmd_status(&load_config(&config_path));
        }
        Commands::Predict { value } => {
            cmd_predict(&load_config(&config_path), value);
        }
        Commands::Config { init } => {
            cmd_config(&config_path, init);
        }
        Commands::Disclaimer => {
            println!("{DISCLAIMER}");
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse_sentinel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &std::path::Path) -> Config {
    match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Could not load configuration from {path:?}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_run(config: Config) {
    println!("Pulse Sentinel v{VERSION}");
    println!("{DISCLAIMER}");

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    // The only fatal startup condition: the input cannot be opened.
    let source = match ReaderLineSource::open(&config.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let (models, events) = match open_backends(&config) {
        Ok(backends) => backends,
        Err(e) => {
            eprintln!("Error: Could not open storage: {e}");
            std::process::exit(1);
        }
    };

    println!("Starting monitor...");
    println!("  Input: {}", config.input);
    println!("  Threshold: {} bpm", config.threshold);
    println!("  Retrain interval: {} readings", config.retrain_interval);
    println!("  Poll delay: {}ms", config.poll_delay.as_millis());
    println!("  Storage: {:?}", config.storage.backend);
    println!("  Model key: {}", config.storage.model_key);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let mut monitor = Monitor::from_config(&config, source, models, events)
        .with_actuator(LogActuator)
        .with_stats(stats.clone());

    match monitor.initialize() {
        LoadOutcome::Loaded { training_set_size } => {
            println!("Loaded persisted model (trained on {training_set_size} readings)")
        }
        LoadOutcome::Missing => println!("No persisted model yet; using the label rule"),
        LoadOutcome::Rejected(e) => {
            println!("Persisted model unusable ({e}); using the label rule")
        }
    }

    // Set up Ctrl+C handler
    let stop = Arc::new(AtomicBool::new(false));
    ctrlc_handler(stop.clone());

    let summary = monitor.run(&stop);

    println!();
    match summary.exit {
        LoopExit::Stopped => println!("Stopping monitor..."),
        LoopExit::SourceFailed(e) => println!("Input ended: {e}"),
    }
    println!("Buffer: {}", monitor.buffer().summary());

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

fn cmd_status(config: &Config) {
    println!("Pulse Sentinel Status");
    println!("=====================");
    println!();

    println!("Configuration:");
    println!("  Threshold: {} bpm", config.threshold);
    println!("  Retrain interval: {} readings", config.retrain_interval);
    println!("  Poll delay: {}ms", config.poll_delay.as_millis());
    println!("  Input: {}", config.input);
    println!("  Storage: {:?}", config.storage.backend);
    println!();

    println!("Model:");
    match open_backends(config) {
        Ok((models, _)) => {
            let mut manager = ClassifierManager::new(config.manager_settings());
            match manager.load_from_store(models.as_ref()) {
                LoadOutcome::Loaded { .. } => {
                    if let ClassifierState::Trained(ref model) = manager.state() {
                        println!("  Key: {}", config.storage.model_key);
                        println!("  Trained on: {} readings", model.training_set_size);
                        println!("  Trained at: {}", model.trained_at);
                        println!("  Trees: {}", model.forest.n_trees());
                    }
                }
                LoadOutcome::Missing => println!("  No model stored yet"),
                LoadOutcome::Rejected(e) => println!("  Stored model unusable: {e}"),
            }
        }
        Err(e) => println!("  Storage unavailable: {e}"),
    }
    println!();

    match SessionStats::load_snapshot(&config.stats_path()) {
        Ok(snapshot) => {
            println!("Last session ({}):", snapshot.session_start.format("%Y-%m-%d %H:%M:%S"));
            println!("{snapshot}");
        }
        Err(_) => println!("No previous session recorded."),
    }
}

fn cmd_predict(config: &Config, value: i32) {
    let (models, _) = match open_backends(config) {
        Ok(backends) => backends,
        Err(e) => {
            eprintln!("Error: Could not open storage: {e}");
            std::process::exit(1);
        }
    };

    let mut manager = ClassifierManager::new(config.manager_settings());
    manager.load_from_store(models.as_ref());

    let label = ThresholdPolicy::new(config.threshold).label(value);
    let prediction = manager.predict_or_fallback(value, label);
    let verdict = if prediction.abnormal {
        "Abnormal"
    } else {
        "Normal"
    };

    match prediction.source {
        PredictionSource::Model => println!("{value} bpm: {verdict} (model)"),
        PredictionSource::Fallback => {
            println!("{value} bpm: {verdict} (label rule, no usable model)")
        }
    }
}

fn cmd_config(path: &std::path::Path, init: bool) {
    if init {
        if path.exists() {
            eprintln!("Error: {path:?} already exists");
            std::process::exit(1);
        }
        if let Err(e) = Config::default().save_to(path) {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        }
        println!("Wrote default configuration to {path:?}");
        return;
    }

    let config = load_config(path);
    println!("Configuration file: {path:?}");
    println!();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing config: {e}"),
    }
}

fn ctrlc_handler(stop: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
