//! Accounting operations over the ledger store.
//!
//! Movements (filtered listing, manual entry), drawers, balances, and the
//! monthly reporting queries backing the operator-facing accounting UI.
//! These are plain filtered queries and guarded single-row inserts; the
//! interesting write path (POS reconciliation) lives in `reconcile`.

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter};
use serde_json::Value;
use tracing::info;

use crate::db::{LedgerStore, PosStore};
use crate::error::ServiceError;
use crate::money::{amount_from_cents, cents_from_amount};
use crate::{value_f64, value_i64, value_str};

/// Movement listing cap, matching the UI's expectations.
const MOVEMENT_LIST_LIMIT: u32 = 200;

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// Distinct drawer targets from the payment-method mapping table.
pub fn list_method_mappings(ledger: &LedgerStore) -> Result<Value, ServiceError> {
    let conn = ledger.conn()?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT caja_id, nombre FROM pos_metodos_map ORDER BY nombre",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "caja_id": row.get::<_, i64>(0)?,
                "nombre": row.get::<_, Option<String>>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

pub fn list_movement_types(ledger: &LedgerStore) -> Result<Value, ServiceError> {
    let conn = ledger.conn()?;
    let mut stmt = conn.prepare("SELECT id, nombre FROM tipo_movimiento ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "nombre": row.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

// ---------------------------------------------------------------------------
// Drawers
// ---------------------------------------------------------------------------

pub fn list_drawers(ledger: &LedgerStore) -> Result<Value, ServiceError> {
    let conn = ledger.conn()?;
    let mut stmt = conn.prepare("SELECT id, nombre, tipo FROM cont_cajas ORDER BY nombre")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "nombre": row.get::<_, String>(1)?,
                "tipo": row.get::<_, Option<String>>(2)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

/// Create a drawer (caja). Both name and type are required.
pub fn create_drawer(ledger: &LedgerStore, payload: &Value) -> Result<Value, ServiceError> {
    let nombre = value_str(payload, &["nombre"])
        .ok_or_else(|| ServiceError::Validation("Nombre y tipo requeridos".into()))?;
    let tipo = value_str(payload, &["tipo"])
        .ok_or_else(|| ServiceError::Validation("Nombre y tipo requeridos".into()))?;

    let conn = ledger.conn()?;
    conn.execute(
        "INSERT INTO cont_cajas (nombre, tipo) VALUES (?1, ?2)",
        params![nombre, tipo],
    )?;
    info!(caja = %nombre, "Caja creada");

    Ok(serde_json::json!({ "ok": true, "message": "Caja creada exitosamente" }))
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

/// Optional filters for the movement listing.
#[derive(Debug, Default, serde::Deserialize)]
pub struct MovementFilter {
    pub fecha: Option<String>,
    pub tipo: Option<i64>,
    pub cuenta: Option<i64>,
}

/// List movements newest-first, with optional date / type / account filters.
pub fn list_movements(
    ledger: &LedgerStore,
    filter: &MovementFilter,
) -> Result<Value, ServiceError> {
    let mut sql = String::from(
        "SELECT
            m.id,
            m.fecha,
            t.nombre AS tipo,
            m.monto_cents,
            m.concepto,
            m.origen,
            m.referencia,
            c.nombre AS cuenta,
            cj.nombre AS caja
        FROM cont_movimientos m
        JOIN cont_cuentas c ON c.id = m.cuenta_id
        LEFT JOIN cont_cajas cj ON cj.id = m.caja_id
        LEFT JOIN tipo_movimiento t ON t.id = m.tipo_id
        WHERE 1=1",
    );
    let mut args: Vec<String> = Vec::new();

    if let Some(fecha) = &filter.fecha {
        sql.push_str(" AND m.fecha = ?");
        args.push(fecha.clone());
    }
    if let Some(tipo) = filter.tipo {
        sql.push_str(" AND m.tipo_id = ?");
        args.push(tipo.to_string());
    }
    if let Some(cuenta) = filter.cuenta {
        sql.push_str(" AND m.cuenta_id = ?");
        args.push(cuenta.to_string());
    }
    sql.push_str(&format!(
        " ORDER BY m.fecha DESC, m.id DESC LIMIT {MOVEMENT_LIST_LIMIT}"
    ));

    let conn = ledger.conn()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, i64>(0)?,
                "fecha": row.get::<_, String>(1)?,
                "tipo": row.get::<_, Option<String>>(2)?,
                "monto": amount_from_cents(row.get::<_, i64>(3)?),
                "concepto": row.get::<_, Option<String>>(4)?,
                "origen": row.get::<_, String>(5)?,
                "referencia": row.get::<_, Option<String>>(6)?,
                "cuenta": row.get::<_, String>(7)?,
                "caja": row.get::<_, Option<String>>(8)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

/// Record a manual ledger movement (origen MANUAL, dated today).
pub fn record_manual_movement(
    ledger: &LedgerStore,
    payload: &Value,
) -> Result<Value, ServiceError> {
    let tipo_id = value_i64(payload, &["tipo_id"]);
    let cuenta_id = value_i64(payload, &["cuenta_id"]);
    let monto = value_f64(payload, &["monto"]);
    let (Some(tipo_id), Some(cuenta_id), Some(monto)) = (tipo_id, cuenta_id, monto) else {
        return Err(ServiceError::Validation("Datos incompletos".into()));
    };
    let monto_cents = cents_from_amount(monto)
        .filter(|&c| c > 0)
        .ok_or_else(|| ServiceError::Validation("Monto inválido".into()))?;
    let concepto = value_str(payload, &["concepto"]);
    let caja_id = value_i64(payload, &["caja_id"]);

    let conn = ledger.conn()?;
    conn.execute(
        "INSERT INTO cont_movimientos
             (fecha, tipo_id, cuenta_id, caja_id, concepto, monto_cents, origen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'MANUAL')",
        params![
            local_today().format("%Y-%m-%d").to_string(),
            tipo_id,
            cuenta_id,
            caja_id,
            concepto,
            monto_cents
        ],
    )?;
    info!(tipo_id, cuenta_id, monto, "Movimiento manual registrado");

    Ok(serde_json::json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// Balances and monthly reports
// ---------------------------------------------------------------------------

/// Global income/expense totals and the running balance.
pub fn balance_totals(ledger: &LedgerStore) -> Result<Value, ServiceError> {
    let conn = ledger.conn()?;
    let (ingresos, egresos): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN tipo_id = 1 THEN monto_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN tipo_id = 2 THEN monto_cents ELSE 0 END), 0)
         FROM cont_movimientos",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(serde_json::json!({
        "ingresos": amount_from_cents(ingresos),
        "egresos": amount_from_cents(egresos),
        "saldo": amount_from_cents(ingresos - egresos),
    }))
}

/// Half-open `[first-of-month, first-of-next-month)` as ISO date strings.
fn month_range(mes: u32, anio: i32) -> Result<(String, String), ServiceError> {
    let desde = NaiveDate::from_ymd_opt(anio, mes, 1)
        .ok_or_else(|| ServiceError::Validation("Mes y año requeridos".into()))?;
    let hasta = if mes == 12 {
        NaiveDate::from_ymd_opt(anio + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(anio, mes + 1, 1)
    }
    .ok_or_else(|| ServiceError::Validation("Mes y año requeridos".into()))?;
    Ok((
        desde.format("%Y-%m-%d").to_string(),
        hasta.format("%Y-%m-%d").to_string(),
    ))
}

/// Monthly totals plus a per-(drawer, type) breakdown.
pub fn monthly_summary(
    ledger: &LedgerStore,
    mes: u32,
    anio: i32,
) -> Result<Value, ServiceError> {
    let (desde, hasta) = month_range(mes, anio)?;
    let conn = ledger.conn()?;

    let (ingresos, egresos): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN tipo_id = 1 THEN monto_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN tipo_id = 2 THEN monto_cents ELSE 0 END), 0)
         FROM cont_movimientos
         WHERE fecha >= ?1 AND fecha < ?2",
        params![desde, hasta],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT c.nombre AS caja, t.nombre AS tipo, SUM(m.monto_cents) AS total
         FROM cont_movimientos m
         JOIN cont_cajas c ON c.id = m.caja_id
         JOIN tipo_movimiento t ON t.id = m.tipo_id
         WHERE m.fecha >= ?1 AND m.fecha < ?2
         GROUP BY c.id, m.tipo_id
         ORDER BY c.nombre, m.tipo_id",
    )?;
    let por_metodo = stmt
        .query_map(params![desde, hasta], |row| {
            Ok(serde_json::json!({
                "caja": row.get::<_, String>(0)?,
                "tipo": row.get::<_, String>(1)?,
                "total": amount_from_cents(row.get::<_, i64>(2)?),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(serde_json::json!({
        "mes": format!("{anio}-{mes:02}"),
        "ingresos": amount_from_cents(ingresos),
        "egresos": amount_from_cents(egresos),
        "saldo": amount_from_cents(ingresos - egresos),
        "por_metodo": por_metodo,
    }))
}

/// Month's movements grouped per drawer: income total plus expense line
/// items. Movements without a drawer land in the `SIN ASIGNAR` bucket.
pub fn monthly_detail(
    ledger: &LedgerStore,
    mes: u32,
    anio: i32,
) -> Result<Value, ServiceError> {
    let (desde, hasta) = month_range(mes, anio)?;
    let conn = ledger.conn()?;

    let mut stmt = conn.prepare(
        "SELECT m.fecha, t.nombre AS tipo, m.concepto, m.monto_cents, cj.nombre AS caja
         FROM cont_movimientos m
         LEFT JOIN cont_cajas cj ON cj.id = m.caja_id
         LEFT JOIN tipo_movimiento t ON t.id = m.tipo_id
         WHERE m.fecha >= ?1 AND m.fecha < ?2
         ORDER BY cj.nombre, t.nombre DESC, m.fecha DESC",
    )?;
    let rows = stmt
        .query_map(params![desde, hasta], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut cajas = serde_json::Map::new();
    for (fecha, tipo, concepto, monto_cents, caja) in rows {
        let nombre = caja.unwrap_or_else(|| "SIN ASIGNAR".into());
        let entry = cajas.entry(nombre.clone()).or_insert_with(|| {
            serde_json::json!({
                "nombre": nombre,
                "ingresos": 0.0,
                "egresos": [],
                "totalEgresos": 0.0,
            })
        });

        let monto = amount_from_cents(monto_cents);
        if tipo.as_deref() == Some("INGRESO") {
            entry["ingresos"] = Value::from(entry["ingresos"].as_f64().unwrap_or(0.0) + monto);
        } else {
            entry["totalEgresos"] =
                Value::from(entry["totalEgresos"].as_f64().unwrap_or(0.0) + monto);
            if let Some(egresos) = entry["egresos"].as_array_mut() {
                egresos.push(serde_json::json!({
                    "tipo": tipo,
                    "monto": monto,
                    "concepto": concepto,
                    "fecha": fecha,
                }));
            }
        }
    }

    Ok(Value::Object(cajas))
}

/// Today's POS sales total (all payments on receipts dated today).
pub fn sales_today(pos: &PosStore) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(p.total_cents), 0)
         FROM receipts r
         JOIN payments p ON p.receipt = r.id
         WHERE date(r.datenew) = ?1",
        params![local_today().format("%Y-%m-%d").to_string()],
        |row| row.get(0),
    )?;
    Ok(serde_json::json!({ "total": amount_from_cents(total) }))
}

/// The till writes receipt timestamps in server local time, so "today" is
/// the local calendar day, not UTC.
fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_ledger() -> LedgerStore {
        let ledger = LedgerStore::open_in_memory();
        {
            let conn = ledger.conn().unwrap();
            conn.execute_batch(
                "INSERT INTO cont_cajas (nombre, tipo) VALUES ('EFECTIVO','FISICA'), ('DATAFONO','BANCO');
                 INSERT INTO cont_movimientos (fecha, tipo_id, cuenta_id, caja_id, concepto, monto_cents, origen) VALUES
                    ('2024-06-01', 1, 6, 1, NULL, 10000, 'POS'),
                    ('2024-06-02', 1, 6, 2, NULL, 5000, 'POS'),
                    ('2024-06-03', 2, 7, 1, 'Harina', 2500, 'MANUAL'),
                    ('2024-06-04', 2, 7, NULL, 'Servicios', 1000, 'MANUAL'),
                    ('2024-07-01', 1, 6, 1, NULL, 9999, 'POS');",
            )
            .unwrap();
        }
        ledger
    }

    #[test]
    fn test_balance_totals() {
        let ledger = seed_ledger();
        let balances = balance_totals(&ledger).unwrap();
        assert_eq!(balances["ingresos"], 249.99);
        assert_eq!(balances["egresos"], 35.0);
        assert_eq!(balances["saldo"], 214.99);
    }

    #[test]
    fn test_monthly_summary_excludes_other_months() {
        let ledger = seed_ledger();
        let summary = monthly_summary(&ledger, 6, 2024).unwrap();
        assert_eq!(summary["mes"], "2024-06");
        assert_eq!(summary["ingresos"], 150.0);
        assert_eq!(summary["egresos"], 35.0);
        assert_eq!(summary["saldo"], 115.0);

        // Breakdown only covers drawer-assigned movements.
        let por_metodo = summary["por_metodo"].as_array().unwrap();
        assert_eq!(por_metodo.len(), 3);
    }

    #[test]
    fn test_monthly_detail_groups_by_drawer() {
        let ledger = seed_ledger();
        let detail = monthly_detail(&ledger, 6, 2024).unwrap();

        assert_eq!(detail["EFECTIVO"]["ingresos"], 100.0);
        assert_eq!(detail["EFECTIVO"]["totalEgresos"], 25.0);
        assert_eq!(detail["EFECTIVO"]["egresos"][0]["concepto"], "Harina");
        assert_eq!(detail["DATAFONO"]["ingresos"], 50.0);
        assert_eq!(detail["SIN ASIGNAR"]["totalEgresos"], 10.0);
    }

    #[test]
    fn test_list_movements_filters() {
        let ledger = seed_ledger();

        let all = list_movements(&ledger, &MovementFilter::default()).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 5);

        let filter = MovementFilter {
            fecha: Some("2024-06-01".into()),
            ..Default::default()
        };
        let by_date = list_movements(&ledger, &filter).unwrap();
        assert_eq!(by_date.as_array().unwrap().len(), 1);
        assert_eq!(by_date[0]["monto"], 100.0);
        assert_eq!(by_date[0]["cuenta"], "VENTAS");

        let filter = MovementFilter {
            tipo: Some(2),
            ..Default::default()
        };
        let expenses = list_movements(&ledger, &filter).unwrap();
        assert_eq!(expenses.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_record_manual_movement_validation() {
        let ledger = LedgerStore::open_in_memory();

        let err = record_manual_movement(&ledger, &serde_json::json!({ "tipo_id": 2 }))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = record_manual_movement(
            &ledger,
            &serde_json::json!({ "tipo_id": 2, "cuenta_id": 7, "monto": -5.0 }),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let ok = record_manual_movement(
            &ledger,
            &serde_json::json!({
                "tipo_id": 2, "cuenta_id": 7, "monto": 19.99, "concepto": "Gas"
            }),
        )
        .unwrap();
        assert_eq!(ok["ok"], true);

        let conn = ledger.conn().unwrap();
        let (origen, monto, fecha): (String, i64, String) = conn
            .query_row(
                "SELECT origen, monto_cents, fecha FROM cont_movimientos",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(origen, "MANUAL");
        assert_eq!(monto, 1999);
        // Dated on the local calendar day, not UTC.
        assert_eq!(fecha, local_today().format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_create_drawer_requires_name_and_type() {
        let ledger = LedgerStore::open_in_memory();
        let err = create_drawer(&ledger, &serde_json::json!({ "nombre": "EFECTIVO" }))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        create_drawer(
            &ledger,
            &serde_json::json!({ "nombre": "EFECTIVO", "tipo": "FISICA" }),
        )
        .unwrap();
        let drawers = list_drawers(&ledger).unwrap();
        assert_eq!(drawers.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_sales_today() {
        let pos = PosStore::open_in_memory();
        {
            let conn = pos.conn().unwrap();
            let today = local_today().format("%Y-%m-%d").to_string();
            conn.execute(
                "INSERT INTO receipts (id, datenew) VALUES ('r1', ?1 || ' 12:00:00')",
                params![today],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO receipts (id, datenew) VALUES ('r2', '2020-01-01 12:00:00')",
                [],
            )
            .unwrap();
            conn.execute_batch(
                "INSERT INTO payments (id, receipt, payment, total_cents) VALUES
                    ('p1', 'r1', 'cash', 4250),
                    ('p2', 'r2', 'cash', 100000);",
            )
            .unwrap();
        }
        let total = sales_today(&pos).unwrap();
        assert_eq!(total["total"], 42.50);
    }
}
