use rusqlite::{params, Connection, OptionalExtension};

use crate::error::MergeError;
use crate::pkcodec::quote_ident;
use crate::schema::clock_table_name;

/// Outcome of a tombstone lookup for a pk tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneState {
    NotDeleted,
    LocallyDeleted,
}

/// Sentinels persisted in `__crsql_col_num`. Negative, distinct, and part of
/// the on-disk format — they must never change once shipped.
pub const DELETE_CID_SENTINEL: i32 = -1;
pub const PKS_ONLY_CID_SENTINEL: i32 = -2;

/// Read/write access to a CRR's `"<tbl>__crsql_clock"` shadow table.
pub struct ClockStore<'c> {
    conn: &'c Connection,
}

impl<'c> ClockStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Current stored version for `(tbl, pk, cid)`, or `None` if no clock
    /// row exists yet for that cell.
    pub fn lookup_cell_clock(
        &self,
        tbl: &str,
        pk_where: &str,
        cid: i32,
    ) -> Result<Option<i64>, MergeError> {
        let sql = format!(
            "SELECT __crsql_version FROM {} WHERE {} AND __crsql_col_num = ?1",
            quote_ident(&clock_table_name(tbl)),
            pk_where
        );
        let version = self
            .conn
            .query_row(&sql, params![cid], |r| r.get::<_, i64>(0))
            .optional()?;
        Ok(version)
    }

    /// Whether this pk tuple already carries a delete tombstone clock row.
    /// Any row count other than 0 or 1 is an invariant violation (a clock
    /// table's primary key is `(pk..., col_num)`, so there can be at most
    /// one tombstone row per pk tuple).
    pub fn check_delete_tombstone(
        &self,
        tbl: &str,
        pk_where: &str,
    ) -> Result<TombstoneState, MergeError> {
        let sql = format!(
            "SELECT count(*) FROM {} WHERE {} AND __crsql_col_num = {}",
            quote_ident(&clock_table_name(tbl)),
            pk_where,
            DELETE_CID_SENTINEL
        );
        let count: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
        match count {
            0 => Ok(TombstoneState::NotDeleted),
            1 => Ok(TombstoneState::LocallyDeleted),
            n => Err(MergeError::Schema(format!(
                "invariant violation: {tbl} has {n} tombstone clock rows for one pk tuple"
            ))),
        }
    }

    /// `INSERT OR REPLACE` the winning `(version, site)` for one cell. The
    /// single write point for clock rows.
    pub fn upsert_winner(
        &self,
        tbl: &str,
        pk_idents: &str,
        pk_vals: &str,
        cid: i32,
        version: i64,
        site_id: Option<&[u8]>,
    ) -> Result<(), MergeError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, \"__crsql_col_num\", \"__crsql_version\", \"__crsql_site_id\") \
             VALUES ({}, ?1, ?2, ?3)",
            quote_ident(&clock_table_name(tbl)),
            pk_idents,
            pk_vals
        );
        self.conn.execute(&sql, params![cid, version, site_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE \"t__crsql_clock\" (
                id INTEGER NOT NULL,
                __crsql_col_num INTEGER NOT NULL,
                __crsql_version INTEGER NOT NULL,
                __crsql_site_id BLOB,
                PRIMARY KEY (id, __crsql_col_num)
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn lookup_missing_cell_is_none() {
        let conn = setup();
        let store = ClockStore::new(&conn);
        assert_eq!(store.lookup_cell_clock("t", "id=1", 0).unwrap(), None);
    }

    #[test]
    fn upsert_then_lookup_round_trips() {
        let conn = setup();
        let store = ClockStore::new(&conn);
        store
            .upsert_winner("t", "\"id\"", "1", 0, 7, Some(b"\x02"))
            .unwrap();
        assert_eq!(store.lookup_cell_clock("t", "id=1", 0).unwrap(), Some(7));
    }

    #[test]
    fn tombstone_absent_then_present() {
        let conn = setup();
        let store = ClockStore::new(&conn);
        assert_eq!(
            store.check_delete_tombstone("t", "id=1").unwrap(),
            TombstoneState::NotDeleted
        );
        store
            .upsert_winner("t", "\"id\"", "1", DELETE_CID_SENTINEL, 8, None)
            .unwrap();
        assert_eq!(
            store.check_delete_tombstone("t", "id=1").unwrap(),
            TombstoneState::LocallyDeleted
        );
    }

    #[test]
    fn upsert_null_site_id() {
        let conn = setup();
        let store = ClockStore::new(&conn);
        store
            .upsert_winner("t", "\"id\"", "2", PKS_ONLY_CID_SENTINEL, 3, None)
            .unwrap();
        let site: Option<Vec<u8>> = conn
            .query_row(
                "SELECT __crsql_site_id FROM \"t__crsql_clock\" WHERE id = 2",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(site, None);
    }
}
