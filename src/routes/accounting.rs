//! Admin-gated accounting handlers (`/api/contabilidad`).
//!
//! Every handler takes an [`AdminClaim`], so the role requirement is part
//! of the signature rather than ad-hoc header sniffing inside the body.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AdminClaim;
use crate::error::ServiceError;
use crate::ledger::{self, MovementFilter};
use crate::{reconcile, value_str};

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cuentas", get(method_mappings))
        .route("/tipo", get(movement_types))
        .route("/cajas", get(drawers).post(create_drawer))
        .route("/movimientos", get(movements).post(create_movement))
        .route("/ventas-dia", get(sales_today))
        .route("/detalle-movimientos", get(monthly_detail))
        .route("/balances", get(balances))
        .route("/resumen-mensual", get(monthly_summary))
        .route("/sync-unicenta", axum::routing::post(sync_pos))
}

async fn method_mappings(
    _claim: AdminClaim,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::list_method_mappings(&state.ledger)?))
}

async fn movement_types(
    _claim: AdminClaim,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::list_movement_types(&state.ledger)?))
}

async fn drawers(
    _claim: AdminClaim,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::list_drawers(&state.ledger)?))
}

async fn create_drawer(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::create_drawer(&state.ledger, &body)?))
}

async fn movements(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::list_movements(&state.ledger, &filter)?))
}

async fn create_movement(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::record_manual_movement(&state.ledger, &body)?))
}

async fn sales_today(
    _claim: AdminClaim,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::sales_today(&state.pos)?))
}

async fn balances(
    _claim: AdminClaim,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    Ok(Json(ledger::balance_totals(&state.ledger)?))
}

/// Month selector for the monthly report endpoints.
#[derive(Debug, Deserialize)]
struct MonthQuery {
    mes: Option<u32>,
    anio: Option<i32>,
}

impl MonthQuery {
    fn require(&self) -> Result<(u32, i32), ServiceError> {
        match (self.mes, self.anio) {
            (Some(mes @ 1..=12), Some(anio)) => Ok((mes, anio)),
            _ => Err(ServiceError::Validation("Mes y año requeridos".into())),
        }
    }
}

async fn monthly_summary(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Value>, ServiceError> {
    let (mes, anio) = query.require()?;
    Ok(Json(ledger::monthly_summary(&state.ledger, mes, anio)?))
}

async fn monthly_detail(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Value>, ServiceError> {
    let (mes, anio) = query.require()?;
    Ok(Json(ledger::monthly_detail(&state.ledger, mes, anio)?))
}

fn parse_date(body: &Value, key: &str) -> Result<NaiveDate, ServiceError> {
    value_str(body, &[key])
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ServiceError::Validation(format!("Fecha '{key}' requerida (YYYY-MM-DD)")))
}

/// Trigger POS → ledger reconciliation over `[desde, hasta]`.
async fn sync_pos(
    _claim: AdminClaim,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let desde = parse_date(&body, "desde")?;
    let hasta = parse_date(&body, "hasta")?;
    let synced = reconcile::sync_pos_receipts(&state.ledger, &state.pos, desde, hasta)?;
    Ok(Json(serde_json::json!({ "synced": synced })))
}
