mod discovery;
mod game;
mod lobby;
mod session;

use crate::lobby::{AppState, GameHandle, reload_settings};
use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use knights_protocol::GameStatus;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
/// Activates tracing, loads the server settings, opens the configured games,
/// spawns the LAN discovery responder and a watchdog for dead game tasks,
/// then serves the websocket endpoint.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let app_state = Arc::new(AppState::default());
    if let Err(message) = reload_settings(&app_state).await {
        tracing::error!(message, "settings load error");
        panic!("Settings load error: {}", message);
    }

    // Open the configured games, one task each.
    let settings = app_state.settings.read().await.clone();
    {
        let mut games = app_state.games.lock().await;
        for entry in &settings.games {
            let (tx, rx) = mpsc::channel(256);
            games.insert(
                entry.name.clone(),
                GameHandle {
                    cmd: tx,
                    num_players: 0,
                    num_observers: 0,
                    status: GameStatus::SelectingQuest,
                },
            );
            tokio::spawn(game::run_game(
                entry.name.clone(),
                entry.max_players,
                app_state.clone(),
                rx,
            ));
        }
    }

    tokio::spawn(discovery::run_discovery(app_state.clone()));

    let watchdog_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1200)); // 20 Min
        loop {
            interval.tick().await;
            cleanup_dead_games(&watchdog_state).await;
        }
    });

    let app = Router::new()
        .route("/enlist", get(enlist_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .unwrap();
    tracing::info!(port = settings.port, "server listening");

    axum::serve(listener, app).await.unwrap();
}

/// Runs over all games and drops the ones whose task has died. This is a
/// fallback; game tasks are not expected to stop on their own.
async fn cleanup_dead_games(state: &Arc<AppState>) {
    let mut games = state.games.lock().await;
    games.retain(|name, handle| {
        let alive = !handle.cmd.is_closed();
        if !alive {
            tracing::info!(game = name, "removing dead game");
        }
        alive
    });
}

/// A plain-text game list, the operator's quick look into the server.
async fn enlist_handler(State(state): State<Arc<AppState>>) -> String {
    let games = state.games.lock().await;
    games
        .iter()
        .map(|(name, handle)| {
            format!(
                "Game: {:<30} Players: {:03} Observers: {:03} Status: {:?}",
                name, handle.num_players, handle.num_observers, handle.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Upgrades the request to a websocket and hands it to the session logic.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    session::websocket(stream, state).await;
}
