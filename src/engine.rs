use rusqlite::Connection;

use crate::clock::{ClockStore, TombstoneState, DELETE_CID_SENTINEL, PKS_ONLY_CID_SENTINEL};
use crate::decide::{decide, Decision};
use crate::error::MergeError;
use crate::pkcodec::{pk_identifier_list, pk_vals_str, pk_where_list, quote_ident, split_quote, split_quote_value};
use crate::schema::{resolve, TableInfoProvider};
use crate::site::SiteId;
use crate::sync_bit::SyncBitGuard;

/// Bound on an incoming table name, in bytes.
pub const MAX_TBL_NAME_LEN: usize = 64;

/// One incoming change record from the remote change-feed.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub table: String,
    pub pk: Vec<u8>,
    pub cid: i32,
    pub val: Vec<u8>,
    pub version: i64,
    pub site_id: Option<SiteId>,
}

/// Result of attempting to merge one change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Accepted and applied; `row_id` mirrors the virtual-table row-id
    /// convention (`version`, not globally unique).
    Applied { row_id: i64 },
    /// Lost a genuine LWW conflict: a local clock row for this cell outranks
    /// the incoming one.
    Rejected,
    /// Dropped without evaluating a conflict at all: the pk already carries
    /// a delete tombstone, so the record was absorbed rather than compared.
    NoOp,
}

/// Orchestrates one change record end to end: decode, consult the clock
/// table, gate through the conflict rule, mutate the user table under
/// `SyncBitGuard`, and record the new winner.
pub struct MergeEngine<'c, 't, P: TableInfoProvider> {
    conn: &'c Connection,
    tables: &'t mut P,
    local_site: SiteId,
}

impl<'c, 't, P: TableInfoProvider> MergeEngine<'c, 't, P> {
    pub fn new(conn: &'c Connection, tables: &'t mut P, local_site: SiteId) -> Self {
        Self {
            conn,
            tables,
            local_site,
        }
    }

    /// Consume one change record, applying it against the local store.
    pub fn merge_change(&mut self, change: &ChangeRecord) -> Result<MergeOutcome, MergeError> {
        // 1. Refresh the TableInfo directory.
        self.tables
            .refresh()
            .map_err(MergeError::Schema)?;

        // 2. Bound-check table name and site id.
        if change.table.len() > MAX_TBL_NAME_LEN {
            return Err(MergeError::InputTooLong { what: "table name" });
        }
        if let Some(site) = &change.site_id {
            if site.as_bytes().len() > crate::site::SITE_ID_LEN {
                return Err(MergeError::InputTooLong { what: "site id" });
            }
        }

        // A record on the merge path always carries the originating site; a
        // missing one is a distinct protocol violation from a remote site id
        // equal to the local one (that self-patch case is checked inside
        // `decide`, once a site id actually exists to compare).
        let remote_site = change
            .site_id
            .as_ref()
            .ok_or(MergeError::MissingSiteId)?
            .as_bytes();

        // 3. Resolve TableInfo.
        let table_info = resolve(&*self.tables, &change.table)?;

        // 4. Validate cid.
        if change.cid != DELETE_CID_SENTINEL
            && change.cid != PKS_ONLY_CID_SENTINEL
            && !(0..table_info.base_cols_len()).contains(&change.cid)
        {
            return Err(MergeError::BadColumn {
                table: change.table.clone(),
                cid: change.cid,
            });
        }

        // 5. Decode pk.
        let pk_cols = table_info.pk_names();
        let pk_vals = split_quote(&change.pk, pk_cols.len())?;
        let pk_where = pk_where_list(&pk_cols, &pk_vals);
        let pk_vals_str = pk_vals_str(&pk_vals);
        let pk_idents = pk_identifier_list(&pk_cols);

        let clock = ClockStore::new(self.conn);

        // 6. Tombstone check. A repeat delete must still refresh the
        // tombstone clock (a documented exception); every other
        // record targeting an already-deleted pk is absorbed silently.
        if clock.check_delete_tombstone(&change.table, &pk_where)? == TombstoneState::LocallyDeleted
            && change.cid != DELETE_CID_SENTINEL
        {
            log::debug!(
                "tombstone-absorb: {} pk already deleted, dropping cid={}",
                change.table,
                change.cid
            );
            return Ok(MergeOutcome::NoOp);
        }

        match change.cid {
            DELETE_CID_SENTINEL => self.merge_delete(
                &change.table,
                &pk_where,
                &pk_vals_str,
                &pk_idents,
                change.version,
                remote_site,
            ),
            PKS_ONLY_CID_SENTINEL => self.merge_pk_only(
                &change.table,
                &pk_vals_str,
                &pk_idents,
                change.version,
                remote_site,
            ),
            cid => self.merge_cell(
                &change.table,
                &pk_where,
                &pk_vals_str,
                &pk_idents,
                cid,
                &change.val,
                change.version,
                remote_site,
            ),
        }
    }

    fn merge_delete(
        &self,
        tbl: &str,
        pk_where: &str,
        pk_vals: &str,
        pk_idents: &str,
        version: i64,
        remote_site: &[u8],
    ) -> Result<MergeOutcome, MergeError> {
        {
            let _guard = SyncBitGuard::acquire(self.conn)?;
            let sql = format!("DELETE FROM {} WHERE {}", quote_ident(tbl), pk_where);
            self.conn.execute(&sql, [])?;
        }
        let clock = ClockStore::new(self.conn);
        clock.upsert_winner(
            tbl,
            pk_idents,
            pk_vals,
            DELETE_CID_SENTINEL,
            version,
            Some(remote_site),
        )?;
        Ok(MergeOutcome::Applied { row_id: version })
    }

    fn merge_pk_only(
        &self,
        tbl: &str,
        pk_vals: &str,
        pk_idents: &str,
        version: i64,
        remote_site: &[u8],
    ) -> Result<MergeOutcome, MergeError> {
        {
            let _guard = SyncBitGuard::acquire(self.conn)?;
            let sql = format!(
                "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
                quote_ident(tbl),
                pk_idents,
                pk_vals
            );
            self.conn.execute(&sql, [])?;
        }
        let clock = ClockStore::new(self.conn);
        clock.upsert_winner(
            tbl,
            pk_idents,
            pk_vals,
            PKS_ONLY_CID_SENTINEL,
            version,
            Some(remote_site),
        )?;
        Ok(MergeOutcome::Applied { row_id: version })
    }

    fn merge_cell(
        &self,
        tbl: &str,
        pk_where: &str,
        pk_vals: &str,
        pk_idents: &str,
        cid: i32,
        val: &[u8],
        version: i64,
        remote_site: &[u8],
    ) -> Result<MergeOutcome, MergeError> {
        let clock = ClockStore::new(self.conn);
        let local_version = clock.lookup_cell_clock(tbl, pk_where, cid)?;

        match decide(remote_site, version, local_version, self.local_site.as_bytes())? {
            Decision::Reject => {
                log::debug!("merge rejected for {tbl} cid={cid}: remote loses conflict");
                return Ok(MergeOutcome::Rejected);
            }
            Decision::Accept => {}
        }

        let col_name = self.column_name(tbl, cid)?;
        let quoted_val = split_quote_value(val)?;
        let quoted_val = &quoted_val;

        {
            let _guard = SyncBitGuard::acquire(self.conn)?;
            let sql = format!(
                "INSERT INTO {} ({}, {col}) VALUES ({}, {val}) \
                 ON CONFLICT ({}) DO UPDATE SET {col} = {val}",
                quote_ident(tbl),
                pk_idents,
                pk_vals,
                pk_idents,
                col = quote_ident(&col_name),
                val = quoted_val,
            );
            self.conn.execute(&sql, [])?;
        }

        clock.upsert_winner(tbl, pk_idents, pk_vals, cid, version, Some(remote_site))?;
        Ok(MergeOutcome::Applied { row_id: version })
    }

    fn column_name(&self, tbl: &str, cid: i32) -> Result<String, MergeError> {
        let info = resolve(&*self.tables, tbl)?;
        info.base_cols
            .get(cid as usize)
            .map(|c| c.name.clone())
            .ok_or_else(|| MergeError::BadColumn {
                table: tbl.to_string(),
                cid,
            })
    }
}
