mod config;
mod serve_cmd;

use clap::{Parser, Subcommand};

use planscan_db::pool;
use planscan_db::queries::houses;

use config::PlanscanConfig;

#[derive(Parser)]
#[command(name = "planscan", about = "Floor-plan fire-safety analysis service")]
struct Cli {
    /// Database URL (overrides PLANSCAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a planscan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/planscan")]
        db_url: String,
        /// Gemini API key
        #[arg(long)]
        api_key: Option<String>,
        /// Object storage base URL
        #[arg(long)]
        storage_url: Option<String>,
        /// Object storage service key
        #[arg(long)]
        storage_key: Option<String>,
        /// Bucket holding uploaded plans
        #[arg(long)]
        bucket: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the planscan database (requires config file or env vars)
    DbInit,
    /// Start the analysis HTTP service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Execute the `planscan init` command: write config file.
fn cmd_init(
    db_url: &str,
    api_key: Option<String>,
    storage_url: Option<String>,
    storage_key: Option<String>,
    bucket: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let has_api_key = api_key.is_some();
    let has_storage_key = storage_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        model: config::ModelSection {
            api_key,
            ..Default::default()
        },
        storage: config::StorageSection {
            url: storage_url,
            service_key: storage_key,
            bucket,
        },
        http: config::HttpSection::default(),
    };

    config::save_config(&cfg)?;

    let set_or_missing = |set: bool| if set { "(set)" } else { "(not set)" };
    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  model.api_key {}", set_or_missing(has_api_key));
    println!(
        "  storage.url = {}",
        cfg.storage.url.as_deref().unwrap_or("(not set)")
    );
    println!("  storage.service_key {}", set_or_missing(has_storage_key));
    println!();
    println!("Next: run `planscan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `planscan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let file = config::load_config().ok();
    let db_config = config::resolve_db_config(cli_db_url, file.as_ref());

    println!("Initializing planscan database...");

    pool::ensure_database_exists(&db_config).await?;
    let db_pool = pool::create_pool(&db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let coverage = houses::analysis_coverage(&db_pool).await?;
    println!(
        "Database ready. houses: {} rows, {} analyzed",
        coverage.houses, coverage.analyzed
    );

    db_pool.close().await;

    println!("planscan db-init complete.");
    Ok(())
}

/// Execute the `planscan serve` command.
async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = PlanscanConfig::resolve(cli_db_url)?;
    tracing::debug!(config = ?resolved, "resolved configuration");

    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let state = serve_cmd::AppState::from_config(&resolved, db_pool.clone())?;
    let result = serve_cmd::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            api_key,
            storage_url,
            storage_key,
            bucket,
            force,
        } => {
            cmd_init(&db_url, api_key, storage_url, storage_key, bucket, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
