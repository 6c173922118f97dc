use std::process::ExitCode;
use std::sync::Arc;

use autolander::config::Config;
use autolander::github::{CommitStatusRunner, GitHubBugTracker, OctocrabClient};
use autolander::landing::{LandingContext, LandingSettings};
use autolander::orchestrator::{Dispatcher, PollConfig};
use autolander::server::{AppState, build_router};
use autolander::table::FileTable;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autolander=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Autolander exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    info!(?config, "Starting autolander");

    let client = OctocrabClient::from_token(config.github_token.clone(), config.repo.clone())?;
    let bugs = GitHubBugTracker::new(client.clone(), config.checkin_label.clone());
    let ci = CommitStatusRunner::new(client.clone(), config.status_context.clone());

    let table = Arc::new(FileTable::new(config.tables_dir()));
    let settings = LandingSettings {
        task_graph_path: config.task_graph_path.clone(),
        status_context: config.status_context.clone(),
    };
    let ctx = LandingContext::new(client, bugs, ci, table, settings);
    ctx.init_stores().await?;
    let ctx = Arc::new(ctx);

    let dispatcher = Arc::new(Dispatcher::new(
        ctx,
        PollConfig::with_interval(config.poll_interval),
    ));
    let recovering = dispatcher.recover_all().await?;
    info!(branches = recovering, "Recovery started");

    let app = build_router(AppState::new(Arc::clone(&dispatcher)));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("listening on {}", config.bind);

    let shutdown = dispatcher.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    dispatcher.shutdown_all().await;
    Ok(())
}
