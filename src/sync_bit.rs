use rusqlite::Connection;

use crate::error::MergeError;

/// Fixed control strings executed against the handle to toggle the
/// connection-local flag that installed change-capture triggers consult to
/// decide whether to record a change. The merge engine treats them as
/// opaque; their only contract is that `SET_SYNC_BIT` followed by
/// `CLEAR_SYNC_BIT` leaves the flag cleared.
pub const SET_SYNC_BIT: &str = "UPDATE \"__crsql_siteid\" SET sync_bit = 1";
pub const CLEAR_SYNC_BIT: &str = "UPDATE \"__crsql_siteid\" SET sync_bit = 0";

/// Scoped acquisition of the sync bit. Change-capture triggers on the
/// connection are suspended for the lifetime of the guard so that merged
/// remote writes are not re-captured as local writes: the flag must be set
/// before any user-table write that must not be re-captured, and cleared on
/// every exit path, including unwind.
///
/// Release is best-effort: a failure to clear the bit is logged but does
/// not mask whatever error (if any) caused the guard to drop.
pub struct SyncBitGuard<'c> {
    conn: &'c Connection,
}

impl<'c> SyncBitGuard<'c> {
    pub fn acquire(conn: &'c Connection) -> Result<Self, MergeError> {
        conn.execute_batch(SET_SYNC_BIT)
            .map_err(|e| MergeError::SyncBit(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl Drop for SyncBitGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch(CLEAR_SYNC_BIT) {
            log::warn!("failed to clear sync bit, leaving it best-effort: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_siteid_table() -> Connection {
        let _ = env_logger::try_init();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE __crsql_siteid (site_id BLOB, sync_bit INTEGER NOT NULL DEFAULT 0);
             INSERT INTO __crsql_siteid (site_id, sync_bit) VALUES (x'01', 0);",
        )
        .unwrap();
        conn
    }

    fn read_bit(conn: &Connection) -> i64 {
        conn.query_row("SELECT sync_bit FROM __crsql_siteid", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn acquire_sets_and_drop_clears() {
        let conn = conn_with_siteid_table();
        assert_eq!(read_bit(&conn), 0);
        {
            let _guard = SyncBitGuard::acquire(&conn).unwrap();
            assert_eq!(read_bit(&conn), 1);
        }
        assert_eq!(read_bit(&conn), 0);
    }

    #[test]
    fn drop_clears_even_without_explicit_use() {
        let conn = conn_with_siteid_table();
        let guard = SyncBitGuard::acquire(&conn).unwrap();
        assert_eq!(read_bit(&conn), 1);
        drop(guard);
        assert_eq!(read_bit(&conn), 0);
    }
}
