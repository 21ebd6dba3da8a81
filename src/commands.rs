//! Slash-command handlers. Each interaction runs in its own task; every
//! failure path ends in a friendly chat reply rather than a crash.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::coach;
use crate::discord::types::Interaction;
use crate::error::BotError;
use crate::ratelimit::Mode;
use crate::state::AppState;

pub async fn dispatch(state: Arc<AppState>, interaction: Interaction) {
    let Some(user_id) = interaction.user_id().map(str::to_string) else {
        warn!("interaction without a user, ignoring");
        return;
    };
    let command = interaction.command_name().unwrap_or("").to_string();
    info!(user_id, command, "interaction received");

    let result = match command.as_str() {
        "health" => health(&state, &interaction).await,
        "chat" => chat_cmd(&state, &interaction, &user_id).await,
        "coach" => coach_cmd(&state, &interaction, &user_id).await,
        "reset" => reset_cmd(&state, &interaction, &user_id).await,
        other => {
            warn!(command = other, "unknown command");
            Ok(())
        }
    };
    if let Err(e) = result {
        error!(user_id, command, error = %e, "command handler failed");
        // Best effort: the user should still hear something.
        let _ = state
            .rest
            .respond_message(
                &interaction.id,
                &interaction.token,
                "⚠️ Sorry, something went wrong. Please try again.",
                true,
            )
            .await;
    }
}

async fn health(state: &AppState, interaction: &Interaction) -> Result<()> {
    state
        .rest
        .respond_message(&interaction.id, &interaction.token, "✅ Online (worker running).", false)
        .await
}

/// Route the command to its configured channel, replying ephemerally with a
/// redirect when used elsewhere. Returns false when redirected.
async fn check_channel(
    state: &AppState,
    interaction: &Interaction,
    allowed: &str,
    command: &str,
) -> Result<bool> {
    if interaction.channel_name() == Some(allowed) {
        return Ok(true);
    }
    state
        .rest
        .respond_message(
            &interaction.id,
            &interaction.token,
            &format!("Please use #{allowed} for /{command}."),
            true,
        )
        .await?;
    Ok(false)
}

/// Per-user sliding-window check, replying ephemerally when exhausted.
/// Returns false when the user is limited.
async fn check_ratelimit(
    state: &AppState,
    interaction: &Interaction,
    user_id: &str,
    mode: Mode,
) -> Result<bool> {
    let (allowed, remaining) = state.ratelimit.allow(user_id, mode);
    if allowed {
        tracing::debug!(user_id, mode = mode.as_str(), remaining, "rate limit ok");
        return Ok(true);
    }
    state
        .rest
        .respond_message(
            &interaction.id,
            &interaction.token,
            &BotError::RateLimited.user_message(),
            true,
        )
        .await?;
    Ok(false)
}

async fn chat_cmd(state: &Arc<AppState>, interaction: &Interaction, user_id: &str) -> Result<()> {
    if !check_channel(state, interaction, &state.config.chat_channel, "chat").await? {
        return Ok(());
    }
    if !check_ratelimit(state, interaction, user_id, Mode::Chat).await? {
        return Ok(());
    }
    let prompt = interaction
        .data
        .as_ref()
        .and_then(|d| d.str_option("prompt"))
        .unwrap_or("")
        .to_string();

    state.rest.respond_deferred(&interaction.id, &interaction.token).await?;
    let application_id = state.application_id().context("application id not known yet")?;

    let content = match state.openai.chat_fast(&prompt, user_id).await {
        Ok(reply) => format!("🗨️ **Chat:** {reply}"),
        Err(e) => {
            warn!(user_id, error = %e, "chat completion failed");
            e.user_message()
        }
    };
    state.rest.followup(application_id, &interaction.token, &content).await
}

async fn coach_cmd(state: &Arc<AppState>, interaction: &Interaction, user_id: &str) -> Result<()> {
    if !check_channel(state, interaction, &state.config.coach_channel, "coach").await? {
        return Ok(());
    }
    if !check_ratelimit(state, interaction, user_id, Mode::Coach).await? {
        return Ok(());
    }
    let data = interaction.data.as_ref();
    let question = data.and_then(|d| d.str_option("question")).map(str::to_string);
    let attachment = data.and_then(|d| d.attachment_option("file")).cloned();

    state.rest.respond_deferred(&interaction.id, &interaction.token).await?;
    let application_id = state.application_id().context("application id not known yet")?;

    let content =
        match coach::coach_answer(state, user_id, question.as_deref(), attachment.as_ref()).await {
            Ok(reply) => format!("🎓 **Coach:** {reply}"),
            Err(e) => {
                warn!(user_id, error = %e, "coach pipeline failed");
                e.user_message()
            }
        };
    state.rest.followup(application_id, &interaction.token, &content).await
}

async fn reset_cmd(state: &AppState, interaction: &Interaction, user_id: &str) -> Result<()> {
    let mode = interaction
        .data
        .as_ref()
        .and_then(|d| d.str_option("mode"))
        .unwrap_or("coach")
        .to_lowercase();

    if matches!(mode.as_str(), "coach" | "all") {
        // Drops the thread and page indexes and cancels any in-flight run.
        state.sessions.reset(user_id);
        state.ratelimit.reset(user_id, Some(Mode::Coach));
    }
    if matches!(mode.as_str(), "chat" | "all") {
        // Chat is stateless; only the rate bucket is cleared.
        state.ratelimit.reset(user_id, Some(Mode::Chat));
    }
    info!(user_id, mode, "reset completed");
    state
        .rest
        .respond_message(
            &interaction.id,
            &interaction.token,
            &format!("♻️ Reset completed for `{mode}`."),
            false,
        )
        .await
}
