//! walrus-migrate CLI - bulk migration of S3 objects into Walrus.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use walrus_migrate::api::{self, AppState};
use walrus_migrate::{
    cost, BatchRequest, BlobStore, Config, LocalIndex, MigrateError, Orchestrator,
    ProgressSnapshot, S3Connector, S3Source, SourceCredentials, SourceStore, TransferFilter,
    WalrusClient,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code of a batch that finished with failed items.
const EXIT_ITEM_FAILURES: u8 = 5;

#[derive(Parser)]
#[command(name = "walrus-migrate")]
#[command(about = "Bulk migration of S3-compatible objects into Walrus")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: first of the standard locations]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    /// Source region, overriding AWS_REGION and the config file
    #[arg(long)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Object selection flags shared by the bucket commands.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only keys starting with this prefix
    #[arg(long, default_value = "")]
    prefix: String,

    /// Glob a key must match (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Glob that drops a key (repeatable, wins over --include)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Minimum object size in bytes
    #[arg(long, default_value = "0")]
    min_size: u64,

    /// Maximum object size in bytes (0 = unbounded)
    #[arg(long, default_value = "0")]
    max_size: u64,

    /// Only objects modified after this RFC 3339 timestamp
    #[arg(long)]
    modified_after: Option<DateTime<Utc>>,

    /// Only objects modified before this RFC 3339 timestamp
    #[arg(long)]
    modified_before: Option<DateTime<Utc>>,
}

impl From<FilterArgs> for TransferFilter {
    fn from(args: FilterArgs) -> Self {
        TransferFilter {
            prefix: args.prefix,
            include: args.include,
            exclude: args.exclude,
            min_size: args.min_size,
            max_size: args.max_size,
            modified_after: args.modified_after,
            modified_before: args.modified_before,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer every matching object of a bucket
    Transfer {
        /// Source bucket
        bucket: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Storage duration in epochs [default: from config]
        #[arg(long)]
        epochs: Option<u32>,

        /// Number of parallel workers (1-10)
        #[arg(long)]
        workers: Option<usize>,

        /// Mark stored names as encrypted
        #[arg(long)]
        encrypt: bool,

        /// Dry run: price the batch without transferring data
        #[arg(long)]
        dry_run: bool,
    },

    /// Estimate size and cost of a transfer
    Estimate {
        /// Source bucket
        bucket: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Storage duration in epochs [default: from config]
        #[arg(long)]
        epochs: Option<u32>,
    },

    /// List buckets visible to the credentials
    ListBuckets,

    /// List the objects of a bucket that match a filter
    ListObjects {
        /// Source bucket
        bucket: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Serve the HTTP API for the web front-end
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value_t = api::DEFAULT_PORT)]
        port: u16,
    },

    /// List files recorded in the local index
    List,

    /// Show index entry and blob status for a name or blob id
    Info {
        /// File name or blob id
        target: String,
    },

    /// Download a blob by name or blob id
    Download {
        /// File name or blob id
        target: String,

        /// Output path [default: the file name]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Estimate the storage cost of a payload size
    Cost {
        /// Payload size in bytes
        size: u64,

        /// Storage duration in epochs [default: 5]
        #[arg(long)]
        epochs: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    // Cost needs neither logging nor a config file
    if let Commands::Cost { size, epochs } = cli.command {
        let epochs = epochs.unwrap_or(walrus_migrate::WalrusConfig::default().epochs);
        print_cost(size, epochs, cli.output_json)?;
        return Ok(ExitCode::SUCCESS);
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::load_default()?,
    };

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Cost { .. } => unreachable!(), // Handled above
        Commands::Transfer {
            bucket,
            filter,
            epochs,
            workers,
            encrypt,
            dry_run,
        } => {
            let mut config = config.with_auto_tuning();
            if let Some(w) = workers {
                config.transfer.concurrency = Some(w);
            }

            let source = open_source(&config, cli.region.clone())?;
            let destination = Arc::new(WalrusClient::from_config(&config)?);
            let index = Arc::new(LocalIndex::open(config.transfer.get_index_path()));

            let mut orchestrator = Orchestrator::new(source, destination)
                .with_index(index)
                .with_concurrency(config.transfer.get_concurrency())
                .with_buffer_threshold(config.transfer.get_buffer_threshold_bytes())
                .with_dry_run(dry_run);

            let printer = if cli.progress {
                let (tx, rx) = mpsc::unbounded_channel();
                orchestrator = orchestrator.with_progress_sink(tx);
                Some(tokio::spawn(print_progress(rx)))
            } else {
                None
            };

            let request = BatchRequest {
                bucket,
                filter: filter.into(),
                epochs: epochs.unwrap_or(config.walrus.epochs),
                encrypt,
            };
            let progress = orchestrator.run_batch(&request, &cancel_token).await?;
            drop(orchestrator);
            if let Some(printer) = printer {
                let _ = printer.await;
            }

            let summary = progress.summary();
            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\n{}", summary);
            }

            if progress.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            if summary.failed > 0 {
                return Ok(ExitCode::from(EXIT_ITEM_FAILURES));
            }
        }

        Commands::Estimate {
            bucket,
            filter,
            epochs,
        } => {
            let source = open_source(&config, cli.region.clone())?;
            let filter: TransferFilter = filter.into();
            let epochs = epochs.unwrap_or(config.walrus.epochs);

            let destination = Arc::new(WalrusClient::from_config(&config)?);
            let estimate = Orchestrator::new(source, destination)
                .estimate_batch(&bucket, &filter, epochs)
                .await?;
            info!(
                "Matched {} objects ({} bytes)",
                estimate.object_count, estimate.total_bytes
            );

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&estimate)?);
            } else {
                println!("Transfer Estimate:");
                println!("  Files: {}", estimate.object_count);
                println!(
                    "  Total Size: {:.2} MB",
                    estimate.total_bytes as f64 / (1024.0 * 1024.0)
                );
                println!("  Epochs: {}", epochs);
                println!("  Estimated Cost: {}", estimate.total_cost);
            }
        }

        Commands::ListBuckets => {
            let source = open_source(&config, cli.region.clone())?;
            let buckets = source.list_buckets().await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            } else {
                for name in buckets {
                    println!("{}", name);
                }
            }
        }

        Commands::ListObjects { bucket, filter } => {
            let source = open_source(&config, cli.region.clone())?;
            let objects = source.list_objects(&bucket, &TransferFilter::from(filter)).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&objects)?);
            } else {
                for obj in &objects {
                    println!(
                        "{:>12}  {}  {}",
                        obj.size,
                        obj.last_modified.format("%Y-%m-%d %H:%M:%S"),
                        obj.key
                    );
                }
                println!("\n{} objects", objects.len());
            }
        }

        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .map_err(|e| MigrateError::Config(format!("invalid bind address: {}", e)))?;

            let state = AppState::new(
                Arc::new(S3Connector::new(config.source.clone())),
                Arc::new(WalrusClient::from_config(&config)?),
                Arc::new(LocalIndex::open(config.transfer.get_index_path())),
                config.walrus.epochs,
            )
            .with_shutdown(cancel_token);

            api::serve(addr, state).await?;
        }

        Commands::List => {
            let index = LocalIndex::open(config.transfer.get_index_path());
            let files = index.list_all();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else if files.is_empty() {
                println!("No files in index {}", index.path().display());
            } else {
                for (name, entry) in &files {
                    println!(
                        "{:<40} {:>12}  {}  expires {}  {}",
                        name,
                        entry.size,
                        entry.mod_time.format("%Y-%m-%d %H:%M"),
                        entry.expiry_epoch,
                        entry.blob_id
                    );
                }
                println!("\n{} files", files.len());
            }
        }

        Commands::Info { target } => {
            let index = LocalIndex::open(config.transfer.get_index_path());
            let (name, entry) = match index.get(&target) {
                Some(entry) => (Some(target.clone()), Some(entry)),
                None => match index.find_by_blob_id(&target) {
                    Some((name, entry)) => (Some(name), Some(entry)),
                    None => (None, None),
                },
            };
            let blob_id = entry
                .as_ref()
                .map(|e| e.blob_id.clone())
                .unwrap_or_else(|| target.clone());

            let client = WalrusClient::from_config(&config)?;
            let metadata = client.status(&blob_id).await?;

            if cli.output_json {
                let value = serde_json::json!({
                    "name": name,
                    "entry": entry,
                    "status": metadata,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Blob: {}", metadata.blob_id);
                if let Some(name) = name {
                    println!("  Name: {}", name);
                }
                if let Some(entry) = entry {
                    println!("  Size: {} bytes", entry.size);
                    println!("  Uploaded: {}", entry.mod_time);
                    println!("  Expiry Epoch: {}", entry.expiry_epoch);
                }
                if let Some(content_type) = metadata.content_type {
                    println!("  Content-Type: {}", content_type);
                }
                if let Some(size) = metadata.size {
                    println!("  Stored Size: {} bytes", size);
                }
            }
        }

        Commands::Download { target, output } => {
            let index = LocalIndex::open(config.transfer.get_index_path());
            let (blob_id, default_name) = match index.get(&target) {
                Some(entry) => (entry.blob_id, target.clone()),
                None => match index.find_by_blob_id(&target) {
                    Some((name, entry)) => (entry.blob_id, name),
                    None => (target.clone(), target.clone()),
                },
            };
            let output = output.unwrap_or_else(|| PathBuf::from(default_name));

            let client = WalrusClient::from_config(&config)?;
            let data = client.fetch(&blob_id).await?;
            tokio::fs::write(&output, &data).await?;
            println!(
                "Downloaded {} ({} bytes) to {}",
                blob_id,
                data.len(),
                output.display()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_source(
    config: &Config,
    region: Option<String>,
) -> Result<Arc<dyn SourceStore>, MigrateError> {
    let mut credentials = SourceCredentials::from_env();
    if region.is_some() {
        credentials.region = region;
    }
    Ok(Arc::new(S3Source::new(&credentials, &config.source)?))
}

fn print_cost(size: u64, epochs: u32, json: bool) -> Result<(), MigrateError> {
    let estimate = cost::estimate(size, epochs);
    if json {
        let value = serde_json::json!({
            "sizeBytes": size,
            "encodedBytes": cost::encoded_size(size),
            "epochs": epochs,
            "frost": estimate.frost,
            "wal": estimate.as_wal(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Storage Cost:");
        println!("  Size: {} bytes", size);
        println!("  Encoded Size: {} bytes", cost::encoded_size(size));
        println!("  Epochs: {}", epochs);
        println!("  Cost: {} ({} FROST)", estimate, estimate.frost);
    }
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<ProgressSnapshot>) {
    while let Some(snapshot) = rx.recv().await {
        match serde_json::to_string(&snapshot) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Cannot encode progress: {}", e),
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Shutting down gracefully...", name);
                    token.cancel();
                }
                Err(e) => warn!("Cannot install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    cancel_token
}
