//! NextPlay: a finance-education Discord coach bot.
//!
//! `/chat` proxies to OpenAI chat completions with education-only
//! guardrails; `/coach` runs file_search over uploaded PDF/TXT documents and
//! resolves the returned quotes to page numbers with a locally-built page
//! index, so citations stay literal and verifiable.

mod coach;
mod commands;
mod config;
mod discord;
mod docs;
mod error;
mod openai;
mod ratelimit;
mod session;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "nextplay", version, about = "Finance-education Discord coach bot")]
struct Cli {
    /// Sync slash commands with Discord and exit without connecting to the
    /// gateway.
    #[arg(long)]
    register_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    if config.assistant_id.is_none() {
        tracing::warn!("NPF_ASSISTANT_ID not set; /coach will reply with a setup hint");
    }
    let state = Arc::new(AppState::new(config));

    let application_id = state
        .rest
        .current_application_id()
        .await
        .context("fetching application id")?;
    state.set_application_id(application_id.clone());
    state.rest.register_commands(&application_id).await?;

    if cli.register_only {
        info!("commands registered, exiting (--register-only)");
        return Ok(());
    }

    info!("starting gateway worker");
    tokio::select! {
        result = discord::gateway::run(state.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}
