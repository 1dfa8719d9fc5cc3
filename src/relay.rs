//! Web-originated order relay.
//!
//! Each user action on a table (add items, remove items, open, close)
//! becomes one append-only PENDING row in `web_orders`; the till-side
//! consumer drains those rows into the POS proper and writes the resulting
//! order state back into `web_sync`, one snapshot per table, overwritten
//! wholesale. The relay never mutates a pending row after creating it, and
//! the state read path returns only the last write-back — pending mutations
//! are not merged in, so clients can observe stale state until the till
//! catches up. That gap is deliberate: the till is the source of truth.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::PosStore;
use crate::error::ServiceError;
use crate::topics::TableTopics;

/// Relay-originated payloads carry this tag so the till can distinguish
/// them from its own writes.
const SOURCE_WEB: &str = "WEB";

fn table_exists(pos: &PosStore, table_name: &str) -> Result<bool, ServiceError> {
    let conn = pos.conn()?;
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM places WHERE name = ?1 LIMIT 1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Append one PENDING mutation row.
fn queue_pending(pos: &PosStore, table_name: &str, payload: &Value) -> Result<(), ServiceError> {
    let conn = pos.conn()?;
    conn.execute(
        "INSERT INTO web_orders (table_name, payload, status) VALUES (?1, ?2, 'PENDING')",
        params![table_name, payload.to_string()],
    )?;
    Ok(())
}

fn mutation_payload(action: &str, table_name: &str) -> Value {
    serde_json::json!({
        "action": action,
        "table_name": table_name,
        "source": SOURCE_WEB,
        "ts": Utc::now().timestamp_millis(),
    })
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Queue an add-items mutation. The only mutation that validates table
/// existence up front; the rest are accepted unconditionally.
pub fn add_items(
    pos: &PosStore,
    topics: &TableTopics,
    table_name: &str,
    items: &Value,
) -> Result<Value, ServiceError> {
    let non_empty = items.as_array().is_some_and(|a| !a.is_empty());
    if table_name.is_empty() || !non_empty {
        return Err(ServiceError::Validation("Datos incompletos".into()));
    }
    if !table_exists(pos, table_name)? {
        return Err(ServiceError::NotFound("Mesa no existe".into()));
    }

    let mut payload = mutation_payload("ADD_ITEMS", table_name);
    payload["items"] = items.clone();
    queue_pending(pos, table_name, &payload)?;

    topics.publish_tables_changed();
    info!(mesa = %table_name, "Pedido web encolado");
    Ok(serde_json::json!({ "ok": true }))
}

/// Queue a remove-items mutation and notify the table's subscribers.
pub fn remove_items(
    pos: &PosStore,
    topics: &TableTopics,
    table_name: &str,
    item_ids: &Value,
) -> Result<Value, ServiceError> {
    let non_empty = item_ids.as_array().is_some_and(|a| !a.is_empty());
    if table_name.is_empty() || !non_empty {
        return Err(ServiceError::Validation("Datos incompletos".into()));
    }

    let mut payload = mutation_payload("DELETE_ITEMS", table_name);
    payload["itemIds"] = item_ids.clone();
    queue_pending(pos, table_name, &payload)?;

    topics.publish_order_removed(table_name, payload);
    Ok(serde_json::json!({ "success": true }))
}

/// Queue an open-table intent.
pub fn open_table(pos: &PosStore, table_name: &str) -> Result<Value, ServiceError> {
    if table_name.is_empty() {
        return Err(ServiceError::Validation("Mesa requerida".into()));
    }
    let payload = mutation_payload("OPEN_TABLE", table_name);
    queue_pending(pos, table_name, &payload)?;
    Ok(serde_json::json!({ "success": true }))
}

/// Queue a close-table intent and broadcast the change.
pub fn close_table(
    pos: &PosStore,
    topics: &TableTopics,
    table_name: &str,
) -> Result<Value, ServiceError> {
    if table_name.is_empty() {
        return Err(ServiceError::Validation("Mesa requerida".into()));
    }
    let payload = mutation_payload("CLOSE", table_name);
    queue_pending(pos, table_name, &payload)?;
    topics.publish_tables_changed();
    Ok(serde_json::json!({ "ok": true }))
}

/// Create a POS ticket for a table and assign it. This is a direct write
/// into the POS schema, not a pending mutation: the till picks the ticket
/// up through its normal shared-ticket flow.
pub fn create_ticket(pos: &PosStore, table_name: &str) -> Result<Value, ServiceError> {
    if table_name.is_empty() {
        return Err(ServiceError::Validation("Mesa requerida".into()));
    }
    if !table_exists(pos, table_name)? {
        return Err(ServiceError::NotFound("Mesa no encontrada".into()));
    }

    let conn = pos.conn()?;
    let last: i64 = conn.query_row(
        "SELECT COALESCE(MAX(ticketid), 0) FROM tickets",
        [],
        |row| row.get(0),
    )?;
    let ticket_num = last + 1;

    conn.execute(
        "INSERT INTO tickets (id, tickettype, ticketid, person, status)
         VALUES (?1, 0, ?2, '0', 0)",
        params![Uuid::new_v4().to_string(), ticket_num],
    )?;
    conn.execute(
        "UPDATE places SET ticketid = ?1 WHERE name = ?2",
        params![ticket_num, table_name],
    )?;

    info!(ticket = ticket_num, mesa = %table_name, "Ticket creado");
    Ok(serde_json::json!({ "ok": true, "ticketId": ticket_num }))
}

// ---------------------------------------------------------------------------
// State reads
// ---------------------------------------------------------------------------

/// Last externally-synchronized state of a table, or the FREE default.
///
/// Pending mutations are intentionally not merged in (see module docs).
pub fn table_state(pos: &PosStore, table_name: &str) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let snapshot: Option<String> = conn
        .query_row(
            "SELECT payload FROM web_sync WHERE table_name = ?1 LIMIT 1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match snapshot.and_then(|s| serde_json::from_str(&s).ok()) {
        Some(state) => state,
        None => serde_json::json!({
            "table_name": table_name,
            "sharedticket": null,
            "status": "FREE",
        }),
    })
}

/// Items of the most recent still-pending web mutation for a table.
pub fn pending_items(pos: &PosStore, table_name: &str) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM web_orders
             WHERE table_name = ?1 AND status = 'PENDING'
             ORDER BY id DESC LIMIT 1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;

    let items = payload
        .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        .and_then(|p| p.get("items").cloned())
        .unwrap_or_else(|| Value::Array(vec![]));
    Ok(serde_json::json!({ "items": items }))
}

/// Items from the till's write-back snapshot, always as `{ items: [...] }`.
pub fn synced_items(pos: &PosStore, table_name: &str) -> Result<Value, ServiceError> {
    let conn = pos.conn()?;
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM web_sync
             WHERE table_name = ?1 ORDER BY updated_at DESC LIMIT 1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;

    let items = payload
        .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        .map(|p| match p.get("items") {
            Some(items) => items.clone(),
            // Some till versions write the bare item array.
            None => p,
        })
        .filter(Value::is_array)
        .unwrap_or_else(|| Value::Array(vec![]));
    Ok(serde_json::json!({ "items": items }))
}
