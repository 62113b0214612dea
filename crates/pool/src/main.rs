use std::sync::Arc;

use clap::{Parser, Subcommand};
use sa_pool::{PoolManager, DEFAULT_CONFIG_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sa-pool-manager", about = "Worker Pool Manager")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: String,
    #[arg(long, default_value = "logs", global = true)]
    logs_dir: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pool manager's HTTP API.
    Serve {
        #[arg(long, default_value_t = 9090)]
        port: u16,
    },
    /// Initialize the pool config.
    Init {
        #[arg(long)]
        hub_url: String,
        #[arg(long, default_value_t = 8081)]
        base_port: u16,
    },
    /// Add worker(s) to the pool.
    Add {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Remove worker(s) from the pool.
    Remove {
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Show status of all workers.
    Status,
    /// Stop all workers.
    StopAll,
    /// Scale the pool to a target size.
    Scale { target: usize },
}

fn init_tracing() {
    let format = std::env::var("HUB_LOG_FORMAT").unwrap_or_else(|_| "compact".into());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sa_pool=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let manager = PoolManager::load(&cli.config, &cli.logs_dir)?;

    match cli.command {
        Command::Serve { port } => {
            let manager = Arc::new(manager);
            let app = sa_pool::api::router(manager);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            tracing::info!(port, "worker pool manager listening");
            axum::serve(listener, app).await?;
        }
        Command::Init { hub_url, base_port } => {
            manager.set_config(hub_url.clone(), base_port)?;
            println!("Initialized pool config: hub_url={hub_url}, base_port={base_port}");
        }
        Command::Add { count } => {
            if manager.hub_url().is_empty() {
                eprintln!("Error: hub_url not configured. Run 'init' first.");
                std::process::exit(1);
            }
            for _ in 0..count {
                let entry = manager.add_worker()?;
                println!("Started worker {} on port {} (pid {})", entry.id, entry.port, entry.pid);
            }
        }
        Command::Remove { id, count } => {
            if let Some(id) = id {
                if manager.remove_worker(&id)? {
                    println!("Stopped worker {id}");
                } else {
                    println!("Worker {id} not found");
                    std::process::exit(1);
                }
            } else {
                let mut ids: Vec<String> = manager.workers().into_iter().map(|w| w.id).collect();
                ids.reverse();
                ids.truncate(count);
                for id in ids {
                    manager.remove_worker(&id)?;
                    println!("Stopped worker {id}");
                }
            }
        }
        Command::Status => {
            let workers = manager.workers();
            if workers.is_empty() {
                println!("No workers in pool");
                return Ok(());
            }
            let statuses = manager.get_all_status().await;
            println!("Worker Pool (hub: {})", manager.hub_url());
            println!("{:<6} {:<7} {:<8} {:<10} {}", "ID", "Port", "PID", "Process", "Health");
            for s in statuses {
                let alive_str = if s.alive { "alive" } else { "dead" };
                let pid_str = if s.alive { s.pid.to_string() } else { "--".into() };
                println!(
                    "{:<6} {:<7} {:<8} {:<10} {:?}",
                    s.id, s.port, pid_str, alive_str, s.health
                );
            }
        }
        Command::StopAll => {
            let count = manager.remove_all()?;
            println!("Stopped {count} worker(s)");
        }
        Command::Scale { target } => {
            if manager.hub_url().is_empty() {
                eprintln!("Error: hub_url not configured. Run 'init' first.");
                std::process::exit(1);
            }
            let result = manager.scale_to(target)?;
            for w in &result.added {
                println!("Started worker {} on port {} (pid {})", w.id, w.port, w.pid);
            }
            for id in &result.removed {
                println!("Stopped worker {id}");
            }
            println!("Pool now has {} worker(s)", result.total);
        }
    }

    Ok(())
}
