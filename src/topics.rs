//! Table-scoped publish/subscribe fan-out.
//!
//! One broadcast topic per table plus an untargeted all-tables topic,
//! carried in application state (no ambient global registry). Fire and
//! forget: no acknowledgement, no replay, and lagged receivers drop events
//! — a reconnecting client re-fetches current state instead of relying on
//! buffered notifications.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per topic before lagged receivers start dropping.
const TOPIC_CAPACITY: usize = 64;

/// Events pushed to web clients. Names match the legacy socket.io channel
/// events the frontend listens on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum TableEvent {
    /// Something changed somewhere: clients reload the table overview.
    #[serde(rename = "mesas-actualizadas")]
    TablesChanged,
    /// Items were removed from a specific table's order.
    #[serde(rename = "pedido-eliminado")]
    OrderRemoved(Value),
}

/// Subscription registry: an all-tables broadcast plus lazily-created
/// per-table topics.
pub struct TableTopics {
    all: broadcast::Sender<TableEvent>,
    tables: RwLock<HashMap<String, broadcast::Sender<TableEvent>>>,
}

impl Default for TableTopics {
    fn default() -> Self {
        Self::new()
    }
}

impl TableTopics {
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            all,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to the untargeted all-tables topic.
    pub fn subscribe_all(&self) -> broadcast::Receiver<TableEvent> {
        self.all.subscribe()
    }

    /// Subscribe to one table's topic, creating it on first use.
    ///
    /// Topics whose last receiver went away are dropped here, so the map
    /// stays bounded by the number of tables with live subscribers rather
    /// than every name a client ever joined.
    pub fn subscribe_table(&self, table_name: &str) -> broadcast::Receiver<TableEvent> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.retain(|_, topic| topic.receiver_count() > 0);
        tables
            .entry(table_name.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish the broad "tables changed" event.
    pub fn publish_tables_changed(&self) {
        // Err just means nobody is listening right now.
        let _ = self.all.send(TableEvent::TablesChanged);
    }

    /// Publish a targeted removal event to one table's topic. A topic with
    /// no remaining receivers is removed instead.
    pub fn publish_order_removed(&self, table_name: &str, payload: Value) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if let Some(topic) = tables.get(table_name) {
            if topic.receiver_count() == 0 {
                tables.remove(table_name);
                return;
            }
            let delivered = topic.send(TableEvent::OrderRemoved(payload)).unwrap_or(0);
            debug!(table = %table_name, delivered, "pedido-eliminado published");
        }
    }

    #[cfg(test)]
    fn topic_count(&self) -> usize {
        self.tables.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
