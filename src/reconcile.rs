//! POS → ledger reconciliation.
//!
//! Reads receipts (with their payments) from the POS store over a date
//! range, maps each payment method to an accounting drawer, and inserts one
//! INGRESO movement per (receipt, drawer) into the ledger. The insert is
//! guarded by the partial unique index on (referencia, caja_id) for
//! origen='POS', so re-running the job over the same or an overlapping
//! range is a no-op rather than a double-credit. Unmapped payment methods
//! skip the receipt and are surfaced through the log for operator
//! follow-up; they never fail the batch. A missing VENTAS account is a
//! configuration error and aborts before anything is written.

use chrono::{Days, NaiveDate};
use rusqlite::{params, OptionalExtension};
use tracing::{info, warn};

use crate::db::{LedgerStore, PosStore};
use crate::error::ServiceError;
use crate::money::format_cents;

/// Ledger account credited with POS sales; must exist (seeded at init).
const SALES_ACCOUNT: &str = "VENTAS";
/// tipo_movimiento id for INGRESO rows.
const TIPO_INGRESO: i64 = 1;

/// One payment row joined to its receipt, as read from the POS store.
#[derive(Debug)]
struct ReceiptPayment {
    receipt_id: String,
    datenew: String,
    method: String,
    total_cents: i64,
}

/// Sync POS receipts with payments dated in `[desde, hasta]` (day
/// granularity; the upper bound is exclusive at the start of the day after
/// `hasta`) into the ledger. Returns the number of movements actually
/// inserted — re-processed receipts absorbed by the idempotency key do not
/// count.
pub fn sync_pos_receipts(
    ledger: &LedgerStore,
    pos: &PosStore,
    desde: NaiveDate,
    hasta: NaiveDate,
) -> Result<u32, ServiceError> {
    info!(%desde, %hasta, "Sincronizando ventas POS");

    // Resolve the sales account first: if it is missing, nothing at all
    // may be written.
    let cuenta_ventas: i64 = {
        let conn = ledger.conn()?;
        conn.query_row(
            "SELECT id FROM cont_cuentas WHERE nombre = ?1",
            params![SALES_ACCOUNT],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ServiceError::Config(format!("No existe la cuenta {SALES_ACCOUNT}")))?
    };

    // Upper bound: start of the day after `hasta`.
    let hasta_excl = hasta
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ServiceError::Validation("Rango de fechas inválido".into()))?;

    let ventas: Vec<ReceiptPayment> = {
        let conn = pos.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.datenew, p.payment, p.total_cents
             FROM receipts r
             JOIN payments p ON p.receipt = r.id
             WHERE r.datenew >= ?1 AND r.datenew < ?2
             ORDER BY r.datenew",
        )?;
        let rows = stmt.query_map(
            params![
                desde.format("%Y-%m-%d").to_string(),
                hasta_excl.format("%Y-%m-%d").to_string(),
            ],
            |row| {
                Ok(ReceiptPayment {
                    receipt_id: row.get(0)?,
                    datenew: row.get(1)?,
                    method: row.get(2)?,
                    total_cents: row.get(3)?,
                })
            },
        )?;
        rows.collect::<Result<_, _>>()?
    };

    info!(count = ventas.len(), "Ventas encontradas");

    let conn = ledger.conn()?;
    let mut synced: u32 = 0;

    for venta in &ventas {
        // Map POS payment method → drawer. A gap skips this payment only.
        let caja_id: Option<i64> = conn
            .query_row(
                "SELECT caja_id FROM pos_metodos_map WHERE pos_codigo = ?1",
                params![venta.method],
                |row| row.get(0),
            )
            .optional()?;

        let Some(caja_id) = caja_id else {
            warn!(
                metodo = %venta.method,
                receipt = %venta.receipt_id,
                monto = %format_cents(venta.total_cents),
                "Método POS no mapeado, recibo omitido"
            );
            continue;
        };

        conn.execute(
            "INSERT OR IGNORE INTO cont_movimientos
                 (fecha, tipo_id, cuenta_id, caja_id, monto_cents, origen, referencia)
             VALUES (date(?1), ?2, ?3, ?4, ?5, 'POS', ?6)",
            params![
                venta.datenew,
                TIPO_INGRESO,
                cuenta_ventas,
                caja_id,
                venta.total_cents,
                venta.receipt_id,
            ],
        )?;
        synced += u32::from(conn.changes() > 0);
    }

    info!(synced, "Movimientos insertados");
    Ok(synced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (LedgerStore, PosStore) {
        (LedgerStore::open_in_memory(), PosStore::open_in_memory())
    }

    fn seed_drawer_mapping(ledger: &LedgerStore) {
        let conn = ledger.conn().unwrap();
        conn.execute_batch(
            "INSERT INTO cont_cajas (nombre, tipo) VALUES ('EFECTIVO','FISICA'), ('DATAFONO','BANCO');
             INSERT INTO pos_metodos_map (pos_codigo, caja_id, nombre) VALUES
                 ('cash', 1, 'EFECTIVO'),
                 ('magcard', 2, 'DATAFONO');",
        )
        .unwrap();
    }

    fn seed_receipt(pos: &PosStore, receipt: &str, datenew: &str, method: &str, cents: i64) {
        let conn = pos.conn().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO receipts (id, datenew) VALUES (?1, ?2)",
            params![receipt, datenew],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO payments (id, receipt, payment, total_cents)
             VALUES (?1, ?2, ?3, ?4)",
            params![format!("{receipt}-{method}"), receipt, method, cents],
        )
        .unwrap();
    }

    fn movement_count(ledger: &LedgerStore) -> i64 {
        let conn = ledger.conn().unwrap();
        conn.query_row("SELECT COUNT(*) FROM cont_movimientos", [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_single_day_single_receipt() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-1", "2024-06-01 13:45:00", "cash", 4250);

        let synced =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01")).unwrap();
        assert_eq!(synced, 1);

        let conn = ledger.conn().unwrap();
        let (fecha, monto, origen, referencia): (String, i64, String, String) = conn
            .query_row(
                "SELECT fecha, monto_cents, origen, referencia FROM cont_movimientos",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(fecha, "2024-06-01");
        assert_eq!(monto, 4250);
        assert_eq!(origen, "POS");
        assert_eq!(referencia, "rcpt-1");
    }

    #[test]
    fn test_second_run_is_noop() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-1", "2024-06-01 13:45:00", "cash", 4250);

        let first =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01")).unwrap();
        assert_eq!(first, 1);
        let second =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01")).unwrap();
        assert_eq!(second, 0);
        assert_eq!(movement_count(&ledger), 1);
    }

    #[test]
    fn test_overlapping_ranges_do_not_double_credit() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-1", "2024-06-02 12:00:00", "cash", 1000);
        seed_receipt(&pos, "rcpt-2", "2024-06-04 20:00:00", "magcard", 2000);

        let first =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-03")).unwrap();
        assert_eq!(first, 1);
        // Overlap covers rcpt-1 again plus the new rcpt-2.
        let second =
            sync_pos_receipts(&ledger, &pos, date("2024-06-02"), date("2024-06-05")).unwrap();
        assert_eq!(second, 1);
        assert_eq!(movement_count(&ledger), 2);
    }

    #[test]
    fn test_unmapped_method_is_skipped_not_fatal() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-1", "2024-06-01 10:00:00", "cheque", 9900);
        seed_receipt(&pos, "rcpt-2", "2024-06-01 11:00:00", "cash", 1500);

        let synced =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01")).unwrap();
        assert_eq!(synced, 1);
        assert_eq!(movement_count(&ledger), 1);

        let conn = ledger.conn().unwrap();
        let referencia: String = conn
            .query_row("SELECT referencia FROM cont_movimientos", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(referencia, "rcpt-2");
    }

    #[test]
    fn test_missing_sales_account_aborts_with_no_side_effects() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-1", "2024-06-01 10:00:00", "cash", 1500);
        {
            let conn = ledger.conn().unwrap();
            conn.execute("DELETE FROM cont_cuentas WHERE nombre = 'VENTAS'", [])
                .unwrap();
        }

        let err = sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
        assert_eq!(movement_count(&ledger), 0);
    }

    #[test]
    fn test_split_payment_across_drawers() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        // One receipt paid half cash, half card.
        seed_receipt(&pos, "rcpt-1", "2024-06-01 21:00:00", "cash", 1000);
        seed_receipt(&pos, "rcpt-1", "2024-06-01 21:00:00", "magcard", 1250);

        let synced =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-01")).unwrap();
        assert_eq!(synced, 2);

        let conn = ledger.conn().unwrap();
        let refs: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cont_movimientos WHERE referencia = 'rcpt-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(refs, 2);
    }

    #[test]
    fn test_range_bounds_are_day_granular() {
        let (ledger, pos) = stores();
        seed_drawer_mapping(&ledger);
        seed_receipt(&pos, "rcpt-before", "2024-05-31 23:59:00", "cash", 100);
        seed_receipt(&pos, "rcpt-start", "2024-06-01 00:00:00", "cash", 200);
        seed_receipt(&pos, "rcpt-end", "2024-06-02 23:30:00", "cash", 300);
        seed_receipt(&pos, "rcpt-after", "2024-06-03 00:10:00", "cash", 400);

        let synced =
            sync_pos_receipts(&ledger, &pos, date("2024-06-01"), date("2024-06-02")).unwrap();
        // `hasta` itself is included up to end of day; the day after is not.
        assert_eq!(synced, 2);

        let conn = ledger.conn().unwrap();
        let total: i64 = conn
            .query_row(
                "SELECT SUM(monto_cents) FROM cont_movimientos",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total, 500);
    }
}
