// Main entry point for the decision document bot

use anyhow::{Context, Result};
use bot_core::common::init_tracing;
use bot_core::config::{Config, ThreadsAppConfig};
use bot_core::domains::documents::FiaScraper;
use bot_core::domains::pipeline::{Orchestrator, PipelineSettings};
use bot_core::domains::publishing::Publisher;
use bot_core::domains::storage::{DocumentStore, PostgresStore};
use bot_core::kernel::{
    spawn_refresher, AccessToken, BotDeps, ConversionServiceRenderer, OpenAiSummarizer,
    PicsurClient, RefreshPolicy, ShortenerClient, ThreadsAdapter,
};
use bot_core::server::{self, AppState};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use threads_client::ThreadsClient;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "bot")]
#[command(about = "Publishes FIA decision documents to Threads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling daemon (default)
    Run,

    /// Print the Threads OAuth authorization URL
    AuthorizeUrl,

    /// Exchange an OAuth authorization code for a long-lived access token
    ExchangeCode { code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run().await,
        Commands::AuthorizeUrl => {
            let app = ThreadsAppConfig::from_env().context("Failed to load configuration")?;
            println!(
                "{}",
                ThreadsClient::authorization_url(&app.client_id, &app.redirect_uri)
            );
            Ok(())
        }
        Commands::ExchangeCode { code } => exchange_code(&code).await,
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);
    tracing::info!("Starting decision document bot");

    tracing::info!("Connecting to database...");
    let store = Arc::new(
        PostgresStore::connect(config.db.connect_options()?)
            .await
            .context("Failed to connect to database")?,
    );
    tracing::info!("Database connected");

    let cancel = CancellationToken::new();

    // Threads credentials
    let threads_client = ThreadsClient::new().with_base_url(&config.threads_api_url);
    let token = AccessToken::new(config.threads_access_token.clone());
    let refresher = spawn_refresher(
        threads_client.clone(),
        token.clone(),
        RefreshPolicy::every(config.token_refresh_interval),
        cancel.clone(),
    );

    let publisher = Publisher::new(
        Arc::new(ThreadsAdapter::new(
            threads_client,
            config.threads_user_id.clone(),
            token,
        )),
        Arc::new(PicsurClient::new(
            config.picsur_api.clone(),
            config.picsur_url.clone(),
        )?),
        Arc::new(ShortenerClient::new(
            config.shortener_api_key.clone(),
            config.shortener_url.clone(),
        )?),
    );

    let deps = BotDeps::new(
        Arc::new(FiaScraper::new(&config.fia_url)?),
        store.clone(),
        Arc::new(OpenAiSummarizer::new(
            config.summary_api_key.clone(),
            config.summary_api_url.clone(),
            config.summary_model.clone(),
        )),
        Arc::new(ConversionServiceRenderer::new(
            config.conversion_service_url.clone(),
        )?),
        Arc::new(publisher),
    );

    let orchestrator = Orchestrator::new(deps, PipelineSettings::from_config(&config));

    let health = config.health_port.map(|port| {
        let state = AppState::new(store.clone(), orchestrator.in_flight());
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(port, state, cancel).await {
                tracing::error!(error = %e, "Health server stopped");
            }
        })
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    orchestrator.run(cancel.clone()).await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), refresher).await;
    if let Some(health) = health {
        let _ = tokio::time::timeout(Duration::from_secs(5), health).await;
    }
    store.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn exchange_code(code: &str) -> Result<()> {
    let app = ThreadsAppConfig::from_env().context("Failed to load configuration")?;
    let client = ThreadsClient::new().with_base_url(&app.api_url);

    let short = client
        .exchange_code(
            &app.client_id,
            app.client_secret.expose(),
            &app.redirect_uri,
            code,
        )
        .await
        .context("Failed to exchange authorization code")?;

    let long = client
        .exchange_for_long_lived(app.client_secret.expose(), &short.access_token)
        .await
        .context("Failed to exchange for a long-lived token")?;

    if let Some(user_id) = &short.user_id {
        println!("THREADS_USER_ID={}", user_id);
    }
    println!("THREADS_ACCESS_TOKEN={}", long.access_token);
    println!("# expires in {} days", long.expires_in / 86_400);
    Ok(())
}
