//! Command-line interface for relq: administer queues and run workers.
//!
//! ## Example
//!
//! ```sh
//! relq --dsn sqlite:queue.db install
//! relq --dsn sqlite:queue.db put jobs '{"kind": "demo"}' --priority 5
//! relq --dsn sqlite:queue.db work jobs --poll-interval 2
//! ```

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relq::tasks::{HandlerRegistry, Worker};
use relq::{store, Queues};
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "relq")]
#[command(about = "A relational-store work queue CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store DSN: postgres://... or sqlite:path
    #[arg(long, short = 'd')]
    dsn: String,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the entry and response tables
    Install,
    /// Enqueue a raw JSON payload
    Put {
        /// Queue name
        queue: String,
        /// JSON payload
        payload: String,
        /// Claim priority; higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Delay visibility by this many seconds
        #[arg(long)]
        delay: Option<i64>,
    },
    /// Print the number of entries in a queue
    Qsize {
        /// Queue name
        queue: String,
    },
    /// Delete all entries and responses, for one queue or store-wide
    Clear {
        /// Queue name; omit to clear every queue
        queue: Option<String>,
    },
    /// Print the responses delivered for an entry, as JSON lines
    Responses {
        /// Queue name
        queue: String,
        /// Originating entry id
        entry_id: i64,
    },
    /// Ensure the schema exists, then run a worker until interrupted
    Work {
        /// Queue name
        queue: String,
        /// Idle-poll interval in seconds
        #[arg(long, default_value_t = 1.0)]
        poll_interval: f64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to info", other);
            tracing::Level::INFO
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        error!("{err}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> relq::Result<()> {
    let store = store::connect(&cli.dsn).await?;
    let queues = Queues::new(store);

    match cli.command {
        Commands::Install => {
            queues.create_all().await?;
            println!("schema created");
        }
        Commands::Put {
            queue,
            payload,
            priority,
            delay,
        } => {
            let value: serde_json::Value = serde_json::from_str(&payload)?;
            let receipt = queues
                .get(&queue)
                .put_with(
                    &value,
                    relq::PutOptions {
                        schedule_at: delay.map(|secs| {
                            chrono::Utc::now() + chrono::Duration::seconds(secs)
                        }),
                        priority,
                    },
                )
                .await?;
            println!("{}", receipt.entry_id);
        }
        Commands::Qsize { queue } => {
            println!("{}", queues.get(&queue).qsize().await?);
        }
        Commands::Clear { queue } => match queue {
            Some(name) => queues.get(&name).clear().await?,
            None => queues.clear().await?,
        },
        Commands::Responses { queue, entry_id } => {
            for response in queues.get(&queue).responses(entry_id).await? {
                println!("{}", serde_json::to_string(&response)?);
            }
        }
        Commands::Work {
            queue,
            poll_interval,
        } => {
            queues.create_all().await?;

            // Binaries embedding this crate register their own handlers;
            // with none, every claimed task fails terminally as
            // handler-not-found.
            let registry = Arc::new(HandlerRegistry::new());
            warn!("no task handlers registered; claimed tasks will fail");

            let worker = Worker::new(queues.get(&queue), registry)
                .poll_every(Duration::from_secs_f64(poll_interval));

            let shutdown = worker.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
            });

            worker.work().await?;
        }
    }

    Ok(())
}
