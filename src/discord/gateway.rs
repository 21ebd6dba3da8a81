//! Discord gateway client: connect, identify, heartbeat, and dispatch of
//! INTERACTION_CREATE events. Each interaction is handled in its own task so
//! the read loop never blocks on handler work.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::commands;
use crate::discord::types::{
    GatewayEvent, Hello, Interaction, Ready, INTERACTION_TYPE_COMMAND, OP_DISPATCH,
    OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO, OP_IDENTIFY, OP_INVALID_SESSION, OP_RECONNECT,
};
use crate::state::AppState;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Run the gateway forever, reconnecting with exponential backoff when the
/// connection drops or Discord asks for a reconnect.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let mut backoff = Duration::from_secs(1);
    loop {
        match session(state.clone()).await {
            Ok(()) => {
                info!("gateway session ended, reconnecting");
                backoff = Duration::from_secs(1);
            }
            Err(e) => {
                warn!(error = %e, "gateway session failed, reconnecting in {backoff:?}");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// One gateway session: hello → identify → heartbeat/dispatch loop. Returns
/// Ok(()) when the server closed the session in a way that calls for a plain
/// reconnect.
async fn session(state: Arc<AppState>) -> Result<()> {
    let (mut ws, _) = connect_async(GATEWAY_URL).await.context("gateway connect")?;

    // First frame must be HELLO with our heartbeat interval.
    let hello = loop {
        let frame = ws.next().await.context("gateway closed before HELLO")??;
        if let Some(event) = decode(&frame) {
            if event.op == OP_HELLO {
                break serde_json::from_value::<Hello>(event.d)
                    .context("malformed HELLO")?;
            }
        }
    };
    let heartbeat_every = Duration::from_millis(hello.heartbeat_interval);
    debug!(?heartbeat_every, "gateway HELLO received");

    let identify = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": state.config.discord_token,
            "intents": 0,
            "properties": { "os": "linux", "browser": "nextplay", "device": "nextplay" },
        },
    });
    ws.send(Message::Text(identify.to_string().into()))
        .await
        .context("send IDENTIFY")?;

    // First beat at a fraction of the interval, per the gateway contract.
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + heartbeat_every.mul_f64(0.25),
        heartbeat_every,
    );
    let mut last_seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let beat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                ws.send(Message::Text(beat.to_string().into()))
                    .await
                    .context("send heartbeat")?;
            }
            frame = ws.next() => {
                let Some(frame) = frame else {
                    return Ok(()); // stream ended
                };
                match frame.context("gateway read")? {
                    Message::Close(reason) => {
                        info!(?reason, "gateway closed by server");
                        return Ok(());
                    }
                    Message::Ping(payload) => {
                        ws.send(Message::Pong(payload)).await.ok();
                    }
                    frame => {
                        let Some(event) = decode(&frame) else { continue };
                        if let Some(seq) = event.s {
                            last_seq = Some(seq);
                        }
                        match event.op {
                            OP_DISPATCH => handle_dispatch(&state, event),
                            OP_HEARTBEAT => {
                                let beat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
                                ws.send(Message::Text(beat.to_string().into()))
                                    .await
                                    .context("send requested heartbeat")?;
                            }
                            OP_RECONNECT | OP_INVALID_SESSION => {
                                info!(op = event.op, "gateway requested reconnect");
                                return Ok(());
                            }
                            OP_HEARTBEAT_ACK => {}
                            op => debug!(op, "ignoring gateway opcode"),
                        }
                    }
                }
            }
        }
    }
}

fn decode(frame: &Message) -> Option<GatewayEvent> {
    let text = frame.to_text().ok()?;
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "undecodable gateway frame");
            None
        }
    }
}

fn handle_dispatch(state: &Arc<AppState>, event: GatewayEvent) {
    match event.t.as_deref() {
        Some("READY") => match serde_json::from_value::<Ready>(event.d) {
            Ok(ready) => {
                info!(application_id = %ready.application.id, "gateway READY");
                state.set_application_id(ready.application.id);
            }
            Err(e) => warn!(error = %e, "malformed READY"),
        },
        Some("INTERACTION_CREATE") => {
            match serde_json::from_value::<Interaction>(event.d) {
                Ok(interaction) if interaction.kind == INTERACTION_TYPE_COMMAND => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        commands::dispatch(state, interaction).await;
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "malformed interaction"),
            }
        }
        _ => {}
    }
}
