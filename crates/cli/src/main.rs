mod user_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anonka_common::{Role, UserId},
    anonka_config::AnonkaConfig,
    anonka_relay::{RelayEngine, RelayOptions, RetryPolicy},
    anonka_store::SqliteUserStore,
    anonka_telegram::TelegramConfig,
    anyhow::Context,
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "anonka", about = "Anonka: anonymous message relay bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of ./anonka.toml and ~/.config/anonka/).
    #[arg(long, global = true, env = "ANONKA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides `[database] path`).
    #[arg(long, global = true, env = "ANONKA_DB")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Print user and message totals.
    Stats,
    /// List users.
    Users {
        /// Only users with this role (standard, trusted, operator).
        #[arg(long)]
        role: Option<Role>,
    },
    /// Set a user's role.
    Promote {
        id: UserId,
        #[arg(long, default_value = "trusted")]
        role: Role,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AnonkaConfig> {
    let mut config = match &cli.config {
        Some(path) => anonka_config::load_config(path)?,
        None => anonka_config::discover_and_load(),
    };
    anonka_config::apply_env_overrides(&mut config);
    Ok(config)
}

/// `--db`, then `[database] path`, then the data directory default.
fn database_path(cli_db: Option<PathBuf>, config: &AnonkaConfig) -> PathBuf {
    cli_db
        .or_else(|| config.database.path.clone())
        .unwrap_or_else(anonka_config::default_database_path)
}

async fn open_store(path: &std::path::Path, config: &AnonkaConfig) -> anyhow::Result<SqliteUserStore> {
    let pool = anonka_store::open(path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(SqliteUserStore::new(pool).with_bootstrap_operators(config.operator_ids()))
}

async fn run(config: AnonkaConfig, store: SqliteUserStore) -> anyhow::Result<()> {
    let options = RelayOptions::from_config(&config.relay)
        .context("relay.operator is not set (config file or ANONKA_OPERATOR_ID)")?;
    let telegram = config
        .channels
        .telegram
        .clone()
        .context("[channels.telegram] is not configured (or set ANONKA_TELEGRAM_TOKEN)")?;
    let telegram = TelegramConfig::from_value(telegram)?;

    let cancel = CancellationToken::new();
    let channel = anonka_telegram::start_polling(telegram, cancel.clone()).await?;

    let engine = RelayEngine::new(
        Arc::new(store),
        Arc::new(channel.gateway),
        RetryPolicy::from(&config.delivery),
        options,
    );
    engine
        .seed_roles(&config.operator_ids(), &config.relay.trusted)
        .await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    engine.run(channel.events).await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "anonka starting");

    let config = load_config(&cli)?;
    let db_path = database_path(cli.db.clone(), &config);
    let store = open_store(&db_path, &config).await?;

    match cli.command {
        None | Some(Commands::Run) => run(config, store).await,
        Some(Commands::Stats) => user_commands::print_stats(&store).await,
        Some(Commands::Users { role }) => user_commands::list_users(&store, role).await,
        Some(Commands::Promote { id, role }) => user_commands::promote(&store, id, role).await,
    }
}
