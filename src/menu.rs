//! POS catalog reads for the ordering UI.
//!
//! Tables, categories, and products come straight out of the uniCenta-shaped
//! POS store; the companion never writes any of them.

use rusqlite::params;
use serde_json::Value;

use crate::db::PosStore;
use crate::error::ServiceError;
use crate::money::amount_from_cents;

/// All tables with their current ticket assignment, ordered by name.
pub fn list_tables(pos: &PosStore) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let mut stmt = conn.prepare("SELECT name, ticketid FROM places ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "name": row.get::<_, String>(0)?,
                "ticketid": row.get::<_, Option<i64>>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

pub fn list_categories(pos: &PosStore) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

/// Products of one category, priced for the frontend.
pub fn list_products_in_category(
    pos: &PosStore,
    category_id: &str,
) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, pricesell_cents FROM products WHERE category = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![category_id], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "price": amount_from_cents(row.get::<_, i64>(2)?),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}

/// Every product with its category reference (used for full catalog sync).
pub fn list_all_products(pos: &PosStore) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let mut stmt =
        conn.prepare("SELECT id, name, pricesell_cents, category FROM products ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "price": amount_from_cents(row.get::<_, i64>(2)?),
                "category": row.get::<_, Option<String>>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rows))
}
