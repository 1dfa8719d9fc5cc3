//! SQLite storage layer for the POS companion.
//!
//! Two independent stores, mirroring the legacy deployment's two MySQL
//! schemas: the uniCenta-shaped POS store (tables, tickets, products,
//! receipts, payments, plus the bridge-owned `web_orders` / `web_sync`
//! tables) and the accounting ledger store (`cont_*` tables). Each store
//! uses WAL mode, versioned migrations through a `schema_version` table,
//! and a `Mutex<Connection>` as its bounded connection resource — acquired
//! per operation via the lock guard and released on drop.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::ServiceError;

/// Current ledger schema version. Bump when adding new migrations.
const LEDGER_SCHEMA_VERSION: i32 = 2;
/// Current POS-mirror schema version.
const POS_SCHEMA_VERSION: i32 = 2;

/// Open the database file and apply pragmas shared by both stores.
fn open_and_configure(path: &Path) -> Result<Connection, ServiceError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn current_version(conn: &Connection) -> Result<i32, ServiceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn record_version(conn: &Connection, version: i32) -> Result<(), ServiceError> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger store
// ---------------------------------------------------------------------------

/// The accounting ledger: accounts, drawers, movement types, movements, and
/// the POS payment-method → drawer mapping table.
pub struct LedgerStore {
    conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl LedgerStore {
    /// Open (creating if needed) the ledger database at `path` and run any
    /// pending migrations plus reference-data seeding.
    pub fn init(path: &Path) -> Result<Self, ServiceError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ServiceError::Config(format!("create ledger dir: {e}")))?;
        }
        info!("Opening ledger database at {}", path.display());
        let conn = open_and_configure(path)?;
        run_ledger_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Acquire the store's connection for one operation.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ServiceError> {
        Ok(self.conn.lock()?)
    }

    /// In-memory store with full migrations, for tests.
    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory ledger db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        run_ledger_migrations(&conn).expect("ledger migrations");
        Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }
}

fn run_ledger_migrations(conn: &Connection) -> Result<(), ServiceError> {
    let current = current_version(conn)?;
    if current >= LEDGER_SCHEMA_VERSION {
        info!("Ledger schema up to date (v{current})");
        return Ok(());
    }
    info!("Migrating ledger schema from v{current} to v{LEDGER_SCHEMA_VERSION}");

    if current < 1 {
        ledger_migrate_v1(conn)?;
        record_version(conn, 1)?;
    }
    if current < 2 {
        ledger_migrate_v2(conn)?;
        record_version(conn, 2)?;
    }
    Ok(())
}

/// Migration v1: core accounting tables and seeded reference data.
fn ledger_migrate_v1(conn: &Connection) -> Result<(), ServiceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cont_cuentas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL UNIQUE,
            tipo TEXT NOT NULL CHECK (tipo IN ('ACTIVO','PASIVO','RESULTADO')),
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS tipo_movimiento (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS cont_cajas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL,
            tipo TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS cont_movimientos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fecha TEXT NOT NULL,
            tipo_id INTEGER REFERENCES tipo_movimiento(id),
            cuenta_id INTEGER NOT NULL REFERENCES cont_cuentas(id),
            caja_id INTEGER REFERENCES cont_cajas(id),
            concepto TEXT,
            monto_cents INTEGER NOT NULL,
            origen TEXT NOT NULL DEFAULT 'MANUAL'
                CHECK (origen IN ('POS','MANUAL','AJUSTE')),
            referencia TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pos_metodos_map (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pos_codigo TEXT NOT NULL UNIQUE,
            caja_id INTEGER NOT NULL REFERENCES cont_cajas(id),
            nombre TEXT
        );

        INSERT OR IGNORE INTO tipo_movimiento (id, nombre) VALUES
            (1, 'INGRESO'),
            (2, 'EGRESO'),
            (3, 'AJUSTE');

        INSERT OR IGNORE INTO cont_cuentas (nombre, tipo) VALUES
            ('CAJA', 'ACTIVO'),
            ('BANCO', 'ACTIVO'),
            ('TARJETA', 'ACTIVO'),
            ('NEQUI', 'ACTIVO'),
            ('DAVIPLATA', 'ACTIVO'),
            ('VENTAS', 'RESULTADO'),
            ('GASTOS', 'RESULTADO'),
            ('IMPUESTOS', 'RESULTADO');
        ",
    )?;
    Ok(())
}

/// Migration v2: the POS-sync idempotency key.
///
/// One movement per (receipt, drawer) pair. Split payments routed to
/// different drawers keep the same referencia but occupy distinct rows;
/// re-running reconciliation over an overlapping range is absorbed by
/// INSERT OR IGNORE against this index.
fn ledger_migrate_v2(conn: &Connection) -> Result<(), ServiceError> {
    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_mov_pos_ref
             ON cont_movimientos (referencia, caja_id)
             WHERE origen = 'POS';
         CREATE INDEX IF NOT EXISTS idx_mov_fecha ON cont_movimientos (fecha);",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// POS store
// ---------------------------------------------------------------------------

/// The uniCenta-shaped POS mirror. Read-mostly: the companion only writes
/// tickets/place assignments on explicit ticket creation, and the two
/// bridge tables (`web_orders`, `web_sync`) it shares with the till-side
/// consumer.
pub struct PosStore {
    conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl PosStore {
    pub fn init(path: &Path) -> Result<Self, ServiceError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ServiceError::Config(format!("create pos dir: {e}")))?;
        }
        info!("Opening POS database at {}", path.display());
        let conn = open_and_configure(path)?;
        run_pos_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Acquire the store's connection for one operation.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ServiceError> {
        Ok(self.conn.lock()?)
    }

    /// In-memory store with full migrations, for tests.
    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory pos db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        run_pos_migrations(&conn).expect("pos migrations");
        Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }
}

fn run_pos_migrations(conn: &Connection) -> Result<(), ServiceError> {
    let current = current_version(conn)?;
    if current >= POS_SCHEMA_VERSION {
        info!("POS schema up to date (v{current})");
        return Ok(());
    }
    info!("Migrating POS schema from v{current} to v{POS_SCHEMA_VERSION}");

    if current < 1 {
        pos_migrate_v1(conn)?;
        record_version(conn, 1)?;
    }
    if current < 2 {
        pos_migrate_v2(conn)?;
        record_version(conn, 2)?;
    }
    Ok(())
}

/// Migration v1: uniCenta-compatible core tables.
fn pos_migrate_v1(conn: &Connection) -> Result<(), ServiceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS people (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            card TEXT,
            role TEXT,
            visible INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS places (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            ticketid INTEGER
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT REFERENCES categories(id),
            pricesell_cents INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            tickettype INTEGER NOT NULL DEFAULT 0,
            ticketid INTEGER,
            person TEXT,
            status INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            datenew TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            receipt TEXT NOT NULL REFERENCES receipts(id),
            payment TEXT NOT NULL,
            total_cents INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_payments_receipt ON payments (receipt);
        CREATE INDEX IF NOT EXISTS idx_receipts_datenew ON receipts (datenew);
        ",
    )?;
    Ok(())
}

/// Migration v2: bridge-owned tables shared with the till-side consumer.
fn pos_migrate_v2(conn: &Connection) -> Result<(), ServiceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS web_orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS web_sync (
            table_name TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_web_orders_table
            ON web_orders (table_name, status);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_seeds_reference_data() {
        let store = LedgerStore::open_in_memory();
        let conn = store.conn().unwrap();

        let cuentas: i64 = conn
            .query_row("SELECT COUNT(*) FROM cont_cuentas", [], |row| row.get(0))
            .unwrap();
        assert_eq!(cuentas, 8);

        let ventas: String = conn
            .query_row(
                "SELECT tipo FROM cont_cuentas WHERE nombre = 'VENTAS'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ventas, "RESULTADO");

        let tipos: i64 = conn
            .query_row("SELECT COUNT(*) FROM tipo_movimiento", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tipos, 3);
    }

    #[test]
    fn test_migrations_are_rerunnable() {
        let store = LedgerStore::open_in_memory();
        let conn = store.conn().unwrap();
        run_ledger_migrations(&conn).expect("second run is a no-op");
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, LEDGER_SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotency_index_allows_distinct_drawers() {
        let store = LedgerStore::open_in_memory();
        let conn = store.conn().unwrap();
        conn.execute_batch(
            "INSERT INTO cont_cajas (nombre, tipo) VALUES ('EFECTIVO','FISICA'), ('DATAFONO','BANCO');",
        )
        .unwrap();

        let insert = "INSERT OR IGNORE INTO cont_movimientos
             (fecha, tipo_id, cuenta_id, caja_id, monto_cents, origen, referencia)
             VALUES ('2024-06-01', 1, 1, ?1, 1000, 'POS', 'rcpt-1')";
        conn.execute(insert, [1]).unwrap();
        assert_eq!(conn.changes(), 1);
        // Same receipt, different drawer: new row.
        conn.execute(insert, [2]).unwrap();
        assert_eq!(conn.changes(), 1);
        // Same receipt, same drawer: absorbed.
        conn.execute(insert, [1]).unwrap();
        assert_eq!(conn.changes(), 0);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM cont_movimientos", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 2);
    }
}
