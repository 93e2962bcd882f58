// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::RwLock;

use lingocap::app_config::{Config, LogLevel};
use lingocap::audio_extractor::{AudioExtractor, StubExtractor};
use lingocap::engines::mock::MockEngineFactory;
use lingocap::lookup::LookupService;
use lingocap::model_manager::ModelManager;
use lingocap::pipeline::PipelineService;
use lingocap::server::{serve, AppState};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// LingoCap backend
///
/// Serves transcription, translation and dictionary lookups for a local
/// subtitle player over HTTP, streaming job progress as server-sent events.
#[derive(Parser, Debug)]
#[command(name = "lingocap")]
#[command(version = "0.1.0")]
#[command(about = "Subtitle generation and translation backend")]
struct CommandLineOptions {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Bind host, overrides the configured one
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the configured one
    #[arg(short, long)]
    port: Option<u16>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color code for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let color = Self::get_color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Some(cmd_log_level) = &cli.log_level {
        log::set_max_level(level_filter(cmd_log_level.clone().into()));
    }

    let config_path = std::path::PathBuf::from(&cli.config_path);
    let mut config = Config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_path))?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    config.validate().context("Configuration validation failed")?;

    // If log level was not set via command line, update it from config now
    if cli.log_level.is_none() {
        log::set_max_level(level_filter(config.log_level));
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let config = Arc::new(RwLock::new(config));

    // TODO: wire in a real engine factory once an on-device runtime lands,
    // and swap in FfmpegExtractor alongside it; until then the backend runs
    // on mock engines, so audio extraction is stubbed to match
    let factory = Arc::new(MockEngineFactory::working());
    let extractor: Arc<dyn AudioExtractor> = Arc::new(StubExtractor);

    let manager = Arc::new(ModelManager::new(
        factory,
        Arc::clone(&config),
        Some(config_path),
    ));
    let cache_capacity = config.read().lookup_cache_size;
    let lookup = Arc::new(LookupService::new(Arc::clone(&manager), cache_capacity));
    let pipeline = Arc::new(PipelineService::new(
        Arc::clone(&manager),
        extractor,
        Arc::clone(&config),
    ));
    let _sweeper = pipeline.spawn_retention_sweeper();

    info!("Starting lingocap backend");
    serve(
        AppState {
            pipeline,
            manager,
            lookup,
            config,
        },
        addr,
    )
    .await
}
