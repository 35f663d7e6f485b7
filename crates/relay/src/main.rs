//! Thin HTTP relay: forwards game-export requests to the upstream
//! game-history provider unmodified, adding permissive CORS headers so a
//! browser client can read the result.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

const LICHESS_EXPORT: &str = "https://lichess.org/game/export";

#[derive(Clone)]
struct AppState {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GameQuery {
    game: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let state = AppState {
        client: reqwest::Client::builder()
            .user_agent("Kibitz/1.0")
            .build()?,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/lichess", get(fetch_game))
        .layer(cors)
        .with_state(state);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "relay listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn fetch_game(State(state): State<AppState>, Query(query): Query<GameQuery>) -> Response {
    let Some(game_id) = query.game.filter(|g| !g.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query parameter \"game\" is required." })),
        )
            .into_response();
    };

    let url = format!("{LICHESS_EXPORT}/{game_id}?moves=1&clocks=0&tags=0&evals=0&opening=0");

    let upstream = match state
        .client
        .get(&url)
        .header(header::ACCEPT, "application/x-chess-pgn")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "upstream request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    // Pass the upstream status through on failure.
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        return (
            status,
            Json(json!({ "error": "Failed to fetch game from Lichess." })),
        )
            .into_response();
    }

    match upstream.text().await {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
