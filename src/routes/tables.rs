//! Table, catalog, ordering, and login handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::error::ServiceError;
use crate::{auth, menu, relay, value_str};

use super::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let username = value_str(&body, &["username"]).unwrap_or_default();
    let password = value_str(&body, &["password"]).unwrap_or_default();
    Ok(Json(auth::login(&state.pos, &username, &password)?))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub async fn list_tables(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    Ok(Json(menu::list_tables(&state.pos)?))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(menu::list_categories(&state.pos)?))
}

pub async fn list_products(
    State(state): State<AppState>,
    Path(cat_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(menu::list_products_in_category(&state.pos, &cat_id)?))
}

pub async fn list_all_products(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(menu::list_all_products(&state.pos)?))
}

// ---------------------------------------------------------------------------
// Table lifecycle
// ---------------------------------------------------------------------------

pub async fn create_ticket(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let name = value_str(&body, &["name"])
        .ok_or_else(|| ServiceError::Validation("Mesa requerida".into()))?;
    Ok(Json(relay::create_ticket(&state.pos, &name)?))
}

pub async fn open_table(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let table_name = value_str(&body, &["table_name"])
        .ok_or_else(|| ServiceError::Validation("Mesa requerida".into()))?;
    Ok(Json(relay::open_table(&state.pos, &table_name)?))
}

pub async fn close_table(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(relay::close_table(
        &state.pos,
        &state.topics,
        &table_name,
    )?))
}

pub async fn table_state(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(relay::table_state(&state.pos, &table_name)?))
}

// ---------------------------------------------------------------------------
// Order mutations and item views
// ---------------------------------------------------------------------------

pub async fn add_items(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let table_name = value_str(&body, &["table_name"]).unwrap_or_default();
    let items = body.get("items").cloned().unwrap_or(Value::Null);
    Ok(Json(relay::add_items(
        &state.pos,
        &state.topics,
        &table_name,
        &items,
    )?))
}

pub async fn remove_items(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let table_name = value_str(&body, &["table_name"]).unwrap_or_default();
    let item_ids = body
        .get("itemIds")
        .or_else(|| body.get("item_ids"))
        .cloned()
        .unwrap_or(Value::Null);
    Ok(Json(relay::remove_items(
        &state.pos,
        &state.topics,
        &table_name,
        &item_ids,
    )?))
}

pub async fn pending_items(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(relay::pending_items(&state.pos, &table_name)?))
}

pub async fn synced_items(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(relay::synced_items(&state.pos, &table_name)?))
}
