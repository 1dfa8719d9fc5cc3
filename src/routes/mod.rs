//! HTTP surface.
//!
//! URL shapes match the legacy frontend: table/ordering endpoints under
//! `/api`, the admin-gated accounting surface under `/api/contabilidad`,
//! the WebSocket push channel at `/ws`, and static assets as the fallback.

use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::{LedgerStore, PosStore};
use crate::topics::TableTopics;

mod accounting;
mod tables;
mod ws;

/// Shared handler state: the two stores and the subscription registry.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub pos: Arc<PosStore>,
    pub topics: Arc<TableTopics>,
}

pub fn router(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/api/auth/login", post(tables::login))
        .route("/api/mesas", get(tables::list_tables))
        .route("/api/mesas/estado", get(tables::list_tables))
        .route("/api/categorias", get(tables::list_categories))
        .route("/api/productos", get(tables::list_all_products))
        .route("/api/productos/{cat_id}", get(tables::list_products))
        .route("/api/mesa/crear-ticket", post(tables::create_ticket))
        .route("/api/mesa/abrir", post(tables::open_table))
        .route("/api/mesa/{table_name}/estado", get(tables::table_state))
        .route("/api/mesa/{table_name}/pedidos", get(tables::synced_items))
        .route("/api/mesa/{table_name}/cerrar", post(tables::close_table))
        .route("/api/pedidos/agregar", post(tables::add_items))
        .route("/api/pedidos/eliminar", post(tables::remove_items))
        .route("/api/web-sync/{table_name}", get(tables::pending_items))
        .route(
            "/api/web-sync-from-unicenta/{table_name}",
            get(tables::synced_items),
        )
        .nest("/api/contabilidad", accounting::router())
        .route("/ws", get(ws::upgrade))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
