//! Nest command line.
//!
//! # Usage
//!
//! ```bash
//! # Apply every pending migration
//! nest migrate
//!
//! # Migrate the owasp app to 0035 (unapplies 0036 if it is applied)
//! nest migrate owasp 0035
//!
//! # Unapply every owasp migration
//! nest migrate owasp zero
//!
//! # List migrations
//! nest showmigrations
//!
//! # Run the HTTP server
//! nest serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use nest_core::migrator::Migrator;
use nest_postgres::{PostgresChunkRepository, PostgresEventRepository, PostgresMigrationBackend};
use nest_server::{AppState, Config, build_router, commands, migrations};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nest", version, about = "Nest backend: schema migrations and HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply or unapply migrations
    Migrate {
        /// App to migrate; all apps when omitted
        app: Option<String>,
        /// Target migration name or unique prefix, or `zero` to unapply the app
        name: Option<String>,
        /// Print the plan without running it
        #[arg(long)]
        plan: bool,
    },
    /// List migrations and whether they are applied
    Showmigrations,
    /// Run the HTTP server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nest=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = nest_postgres::connect(&config.database.url, &config.database.pool_config())
        .await
        .context("Failed to connect to PostgreSQL")?;
    let migrator = Migrator::new(migrations::registry()?, PostgresMigrationBackend::new(pool.clone()));

    match cli.command {
        Command::Migrate { app, name, plan } => {
            let target = migrator.graph().target(app.as_deref(), name.as_deref())?;
            if plan {
                print!("{}", commands::render_plan(&migrator.plan(&target).await?));
            } else {
                let report = migrator.migrate(&target).await?;
                print!("{}", commands::render_report(&report));
            }
        }
        Command::Showmigrations => {
            print!("{}", commands::render_status(&migrator.status().await?));
        }
        Command::Serve => {
            let pending = migrator.plan(&nest_core::MigrationTarget::All).await?;
            if !pending.is_empty() {
                tracing::warn!(
                    pending = pending.steps.len(),
                    "Unapplied migrations; run `nest migrate`"
                );
            }
            if config.admin.operator_token.is_none() {
                tracing::warn!("ADMIN_OPERATOR_TOKEN is not set; the admin rejects every request");
            }

            let state = AppState::new(
                PostgresEventRepository::new(pool.clone()),
                PostgresChunkRepository::new(pool),
                &config.server.public_base_url,
                config.admin.clone(),
            );
            serve(&config, build_router(state)).await?;
        }
    }

    Ok(())
}

async fn serve(config: &Config, app: axum::Router) -> anyhow::Result<()> {
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!(address = %address, "Nest server listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .into_future(),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(());

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            timeout_secs = config.server.shutdown_timeout,
            "In-flight requests did not finish before the shutdown timeout"
        ),
    }

    Ok(())
}
