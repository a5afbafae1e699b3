//! Command-line interface for rowq: manage a queue table and move messages through it.
//!
//! ## What
//!
//! - `create` / `destroy` manage the backing table.
//! - `publish`, `consume` and `stream` move messages.
//! - `metrics` reports row counts.
//!
//! ### Example
//!
//! ```sh
//! rowq --dsn sqlite://jobs.db --prefix jobs_ create
//! rowq --dsn sqlite://jobs.db --prefix jobs_ publish '{"task":"email"}' '{"task":"sms"}'
//! rowq --dsn sqlite://jobs.db --prefix jobs_ --lease-ttl-ms 30000 consume --batch 10 --commit
//! ```
use clap::{Parser, Subcommand};
use rowq::config::Config;
use rowq::{AnyQueue, Message, Queue, Receipt};

use std::process;
use std::time::Duration;
use tokio::sync::mpsc;

mod output;

use crate::output::OutputWriter;

#[derive(Parser)]
#[command(name = "rowq")]
#[command(about = "A message queue stored in a SQL table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (highest priority, overrides all other config sources)
    #[arg(long, short = 'd')]
    dsn: Option<String>,

    /// Queue table prefix; the table is named `<prefix>q`
    #[arg(long, short = 'p')]
    prefix: Option<String>,

    /// Config file path (overrides environment variables and defaults)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Lease in milliseconds after which an uncommitted message can be claimed again (0 disables)
    #[arg(long)]
    lease_ttl_ms: Option<u64>,

    /// Log destination: stderr or file path
    #[arg(long, default_value = "stderr")]
    log_dest: String,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output format: json, table
    #[arg(long, default_value = "table")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the queue table
    Create,
    /// Drop the queue table
    Destroy,
    /// Publish each argument as one message, in a single batch
    Publish {
        #[arg(required = true)]
        payloads: Vec<String>,
    },
    /// Claim one batch of messages
    Consume {
        /// Maximum messages to claim (defaults to the configured batch size)
        #[arg(long, short = 'b')]
        batch: Option<usize>,
        /// Commit the claimed messages as processed
        #[arg(long)]
        commit: bool,
    },
    /// Stream batches until interrupted or the limit is reached
    Stream {
        /// Maximum messages per batch (defaults to the configured batch size)
        #[arg(long, short = 'b')]
        batch: Option<usize>,
        /// Pause after an empty poll, in milliseconds (defaults to the configured pause)
        #[arg(long)]
        pause_ms: Option<u64>,
        /// Stop after receiving at least this many messages
        #[arg(long)]
        limit: Option<usize>,
        /// Commit each batch as processed
        #[arg(long)]
        commit: bool,
    },
    /// Show queue metrics
    Metrics,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let writer: Box<dyn Fn() -> Box<dyn std::io::Write + Send> + Send + Sync> =
        if cli.log_dest == "stderr" {
            Box::new(|| Box::new(std::io::stderr()))
        } else {
            let file = match std::fs::File::create(&cli.log_dest) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Failed to create log file '{}': {}", cli.log_dest, e);
                    process::exit(1);
                }
            };
            Box::new(move || match file.try_clone() {
                Ok(f) => Box::new(f),
                Err(_) => Box::new(std::io::stderr()),
            })
        };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }

    if let Err(e) = run_cli(cli).await {
        tracing::error!("Error: {}", e);
        process::exit(1);
    }
}

/// Load configuration, connect, and dispatch the subcommand.
///
/// Configuration priority:
/// 1. --dsn (other fields from environment or defaults)
/// 2. --config
/// 3. ROWQ_CONFIG_FILE, then ROWQ_* environment variables, then rowq.yaml / rowq.yml
///
/// --prefix and --lease-ttl-ms override whatever source was used.
async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_with_options(cli.dsn, cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(prefix) = cli.prefix {
        config = config.with_prefix(prefix);
    }
    if let Some(ms) = cli.lease_ttl_ms {
        config = config.with_lease_ttl(Duration::from_millis(ms));
    }

    let queue = rowq::connect_with_config(&config).await?;
    let writer = OutputWriter::from_format(&cli.format);
    let mut stdout = std::io::stdout();
    let out: &mut dyn std::io::Write = &mut stdout;

    match cli.command {
        Commands::Create => {
            tracing::info!("Creating queue table '{}' ...", queue.table_name());
            queue.create().await?;
            tracing::info!("Queue table created");
        }

        Commands::Destroy => {
            tracing::info!("Dropping queue table '{}' ...", queue.table_name());
            queue.destroy().await?;
            tracing::info!("Queue table dropped");
        }

        Commands::Publish { payloads } => {
            let messages: Vec<Message> = payloads.into_iter().map(Message::from).collect();
            queue.publish(&messages).await?;
            tracing::info!("Published {} messages", messages.len());
        }

        Commands::Consume { batch, commit } => {
            let size = batch.unwrap_or(config.default_batch_size);
            let messages = queue.consume_batch(size).await?;
            writer.write_list(&messages, out)?;
            if commit {
                let receipts: Vec<Receipt> = messages.iter().map(|m| m.ack()).collect();
                queue.commit(&receipts).await?;
                tracing::info!("Committed {} messages", receipts.len());
            }
        }

        Commands::Stream {
            batch,
            pause_ms,
            limit,
            commit,
        } => {
            let size = batch.unwrap_or(config.default_batch_size);
            let pause = pause_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.stream_pause());
            stream_messages(&queue, size, pause, limit, commit, &writer, out).await?;
        }

        Commands::Metrics => {
            let metrics = queue.metrics().await?;
            writer.write_item(&metrics, out)?;
        }
    }
    Ok(())
}

async fn stream_messages(
    queue: &AnyQueue,
    size: usize,
    pause: Duration,
    limit: Option<usize>,
    commit: bool,
    writer: &OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(1);
    let streamer = queue.clone();
    let handle = tokio::spawn(async move { streamer.stream(size, tx, pause).await });

    let mut received = 0usize;
    while let Some(batch) = rx.recv().await {
        received += batch.len();
        writer.write_list(&batch, out)?;

        if commit {
            let receipts: Vec<Receipt> = batch.iter().map(|m| m.ack()).collect();
            queue.commit(&receipts).await?;
        }

        if limit.is_some_and(|l| received >= l) && !queue.is_stopped() {
            tracing::info!("Received {} messages, stopping stream", received);
            queue.stop_consumer();
        }
    }

    handle.await?;
    Ok(())
}
