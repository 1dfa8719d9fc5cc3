//! POS companion server.
//!
//! Web backend that sits next to a uniCenta-style POS database: it mirrors
//! table state to web clients, relays pending order mutations back to the
//! POS, and reconciles settled receipts into a small accounting ledger.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod menu;
pub mod money;
pub mod reconcile;
pub mod relay;
pub mod routes;
pub mod topics;

/// First non-empty string under any of `keys`, trimmed.
pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}
