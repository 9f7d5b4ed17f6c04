//! Sorcerer Player - headless runner.
//!
//! Connects to the game server, joins (or starts) a game and logs session and
//! game events until Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sorcerer_player::infrastructure::websocket::{Bridge, TungsteniteConnector};
use sorcerer_player::state::{
    app_reducer, logging_middleware, Action, AppState, Store, StoreHost,
};
use sorcerer_player::PlayerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sorcerer_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sorcerer Player");

    let config = PlayerConfig::from_env()?;
    tracing::info!(
        url = %config.ws_url,
        invite = ?config.invite_key,
        reconnect = ?config.reconnect,
        "Loaded configuration"
    );

    let store = Store::new(app_reducer, AppState::default());
    let announced = AtomicBool::new(false);
    store.subscribe(move |state: &AppState| {
        if let Some(join_key) = &state.session.join_key {
            if !announced.swap(true, Ordering::SeqCst) {
                tracing::info!(%join_key, "Share this join key to invite other players");
            }
        }
    });

    let host = Arc::new(StoreHost::new(&store, |state: &AppState| {
        state.session.clone()
    }));
    let (bridge, pump) = Bridge::with_reconnect_policy(
        config.bridge_config(),
        Arc::new(TungsteniteConnector::new(config.outbound_buffer)),
        host,
        config.reconnect.policy(),
    );
    store
        .apply_middleware(vec![logging_middleware(), bridge.as_dispatch_interceptor()])
        .context("Failed to install the connection bridge")?;

    let pump = tokio::spawn(pump.run());
    store.dispatch(Some(Action::connect()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    store.dispatch(Some(Action::disconnect()));
    bridge.shutdown();
    pump.await.context("Bridge event pump panicked")?;

    let stats = bridge.stats();
    tracing::info!(
        protocol_errors = stats.protocol_errors,
        usage_errors = stats.usage_errors,
        stale_events = stats.stale_events,
        "Sorcerer Player stopped"
    );
    Ok(())
}
