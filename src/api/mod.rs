pub mod error;
pub mod routes;

use crate::modules::invite_tracking::ledger::LedgerStore;
use crate::modules::invite_tracking::settings::SettingsStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Dashboard adapters share the same stores as the gateway handlers, so both
/// observe one cache and one ledger.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub ledger: Arc<LedgerStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/guild/:guild_id/invite-settings",
            get(routes::get_invite_settings).post(routes::update_invite_settings),
        )
        .route("/guild/:guild_id/reset-invites", post(routes::reset_invites))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: String, state: AppState) -> Result<(), crate::Error> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Dashboard API listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
