//! # Memory Queue CLI
//!
//! Command-line interface for exercising the in-memory queue.
//!
//! This module provides CLI commands for:
//! - Running a send/receive demo against a configured queue
//! - Validating and printing the resolved queue configuration

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use memory_queue::{
    ConfigurationError, InMemoryCounters, MemoryMessageQueue, MemoryQueueFactory, MessageEnvelope,
    MessageQueue, MessageReceiver, QueueConfig, QueueError, QueueName, QueueReferences,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Memory queue CLI - in-process message queue playground
#[derive(Parser, Debug)]
#[command(name = "memq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process message queue with broker delivery semantics")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send messages through a queue and consume them again
    Demo {
        /// Name of the demo queue
        #[arg(short, long, default_value = "demo")]
        queue: String,

        /// Number of messages to send
        #[arg(short, long, default_value = "3")]
        messages: usize,

        /// Consume through the listen loop instead of explicit receives
        #[arg(long)]
        listen: bool,

        /// How long to wait for each message, in milliseconds
        #[arg(short, long, default_value = "1000")]
        wait_ms: u64,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Could not render configuration: {message}")]
    Render { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Render { .. } => 1,
            Self::Queue(_) | Self::Io(_) => 2,
            Self::InvalidArgument { .. } => 3,
        }
    }
}

// ============================================================================
// Demo
// ============================================================================

/// Upper bound on how long the listen demo waits when the requested wait
/// does not fit in an instant
const MAX_LISTEN_WAIT: Duration = Duration::from_secs(86400);

/// Options of the `demo` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub queue: String,
    pub messages: usize,
    pub listen: bool,
    pub wait: Duration,
}

/// Outcome of a demo run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub queue: String,
    pub sent: usize,
    pub processed: usize,
    /// Counter values keyed `queue.<name>.<counter>`, sorted by key
    pub counters: Vec<(String, u64)>,
}

impl DemoReport {
    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "queue: {}", self.queue)?;
        writeln!(out, "sent: {}", self.sent)?;
        writeln!(out, "processed: {}", self.processed)?;
        for (key, value) in &self.counters {
            writeln!(out, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

/// Receiver that logs and completes every message
#[derive(Debug, Default)]
pub struct LoggingReceiver {
    processed: AtomicUsize,
}

impl LoggingReceiver {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageReceiver for LoggingReceiver {
    async fn receive_message(
        &self,
        envelope: &mut MessageEnvelope,
        queue: &dyn MessageQueue,
    ) -> anyhow::Result<()> {
        info!(
            queue = %queue.name(),
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Processing message {}",
            envelope
        );

        queue.complete(envelope).await?;
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Open a queue, push `messages` through it and report the counters
pub async fn run_demo(config: QueueConfig, options: &DemoOptions) -> Result<DemoReport, CliError> {
    if options.messages == 0 {
        return Err(CliError::InvalidArgument {
            arg: "messages".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    QueueName::new(options.queue.clone()).map_err(|e| CliError::InvalidArgument {
        arg: "queue".to_string(),
        message: e.to_string(),
    })?;

    let counters = Arc::new(InMemoryCounters::new());
    let references = QueueReferences::new().with_metrics(counters.clone());
    let factory = MemoryQueueFactory::new(config, references)?;

    let queue = factory.get_or_create(&options.queue)?;
    queue.open().await?;

    for sequence in 0..options.messages {
        queue
            .send_as_object(
                Some(format!("demo-{}", sequence)),
                "demo",
                &serde_json::json!({ "sequence": sequence }),
            )
            .await?;
    }
    info!(queue = %queue.name(), count = options.messages, "Sent demo messages");

    let processed = if options.listen {
        consume_by_listening(&queue, options).await?
    } else {
        consume_by_receiving(&queue, options).await?
    };

    queue.close().await?;

    if processed < options.messages {
        warn!(
            queue = %queue.name(),
            processed,
            expected = options.messages,
            "Not every demo message was processed"
        );
    }

    let mut counters: Vec<(String, u64)> = counters.snapshot().into_iter().collect();
    counters.sort();

    Ok(DemoReport {
        queue: queue.name().to_string(),
        sent: options.messages,
        processed,
        counters,
    })
}

async fn consume_by_receiving(
    queue: &MemoryMessageQueue,
    options: &DemoOptions,
) -> Result<usize, CliError> {
    let mut processed = 0;

    while processed < options.messages {
        let Some(mut message) = queue.receive(options.wait).await? else {
            break;
        };

        debug!(
            correlation_id = message.correlation_id().unwrap_or_default(),
            "Received message {}",
            message
        );
        queue.complete(&mut message).await?;
        processed += 1;
    }

    Ok(processed)
}

async fn consume_by_listening(
    queue: &MemoryMessageQueue,
    options: &DemoOptions,
) -> Result<usize, CliError> {
    let receiver = Arc::new(LoggingReceiver::default());
    let handle = queue.begin_listen(receiver.clone());

    // The loop pauses one listen interval after every message
    let per_message = queue.config().listen_interval().saturating_add(options.wait);
    let count = u32::try_from(options.messages).unwrap_or(u32::MAX);
    let now = tokio::time::Instant::now();
    let deadline = now
        .checked_add(per_message.saturating_mul(count))
        .unwrap_or(now + MAX_LISTEN_WAIT);

    while receiver.processed() < options.messages && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    queue.end_listen();
    if let Err(e) = handle.await {
        warn!(error = %e, "Listen task ended abnormally");
    }

    Ok(receiver.processed())
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Initialize logging based on CLI arguments
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::InvalidArgument {
        arg: "log-level".to_string(),
        message: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    // A subscriber installed earlier in the process stays in charge
    if let Err(e) = result {
        debug!(error = %e, "Logging was already initialized");
    }

    Ok(())
}

/// Load queue configuration from the file named on the command line, if any
pub fn load_configuration(cli: &Cli) -> Result<QueueConfig, CliError> {
    Ok(QueueConfig::load(cli.config.as_deref())?)
}

/// Execute the parsed command, writing user-facing output to `out`
pub async fn execute(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let config = load_configuration(cli)?;

    match &cli.command {
        Commands::Demo {
            queue,
            messages,
            listen,
            wait_ms,
        } => {
            let options = DemoOptions {
                queue: queue.clone(),
                messages: *messages,
                listen: *listen,
                wait: Duration::from_millis(*wait_ms),
            };
            let report = run_demo(config, &options).await?;
            report.write_to(out)?;
        }
        Commands::Config { show, format } => {
            if *show {
                out.write_all(render_config(&config, format)?.as_bytes())?;
            } else {
                writeln!(out, "Configuration is valid")?;
            }
        }
    }

    Ok(())
}

/// Render configuration in the requested format, with the password masked
pub fn render_config(config: &QueueConfig, format: &ConfigFormat) -> Result<String, CliError> {
    let mut config = config.clone();
    if config.credential.password.is_some() {
        config.credential.password = Some("<REDACTED>".to_string());
    }

    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&config).map_err(|e| CliError::Render {
            message: e.to_string(),
        }),
        ConfigFormat::Json => serde_json::to_string_pretty(&config)
            .map(|json| json + "\n")
            .map_err(|e| CliError::Render {
                message: e.to_string(),
            }),
    }
}

/// Main CLI entry point
pub async fn run_cli(cli: Cli) -> Result<(), CliError> {
    initialize_logging(&cli)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out).await
}
