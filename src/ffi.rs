use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use rusqlite::Connection;

use crate::engine::{ChangeRecord, MergeEngine, MergeOutcome};
use crate::error::MergeError;
use crate::schema::{StaticTableInfoProvider, TableInfo};
use crate::site::SiteId;

/// Opaque handle bundling a SQLite connection, the local site id, and a
/// `TableInfo` directory. A virtual-table shim written in C (or any other
/// FFI consumer) holds this as an unsafe pointer and passes it back into
/// `crsql_merge_insert` once per incoming change record.
pub struct MergeHandle {
    conn: Connection,
    tables: StaticTableInfoProvider,
    local_site: SiteId,
}

thread_local! {
    static LAST_ERROR: RefCell<(i32, String)> = RefCell::new((0, String::new()));
}

fn set_last_error(code: i32, msg: &str) {
    LAST_ERROR.with(|le| *le.borrow_mut() = (code, msg.to_string()));
}
fn clear_last_error() {
    LAST_ERROR.with(|le| *le.borrow_mut() = (0, String::new()));
}

fn error_code(err: &MergeError) -> i32 {
    match err {
        MergeError::SelfPatch => 10,
        MergeError::UnknownTable(_) => 11,
        MergeError::InputTooLong { .. } => 12,
        MergeError::BadColumn { .. } => 13,
        MergeError::PkDecode(_) => 14,
        MergeError::BadValue(_) => 15,
        MergeError::Schema(_) => 16,
        MergeError::SyncBit(_) => 17,
        MergeError::Db(_) => 18,
        MergeError::MissingSiteId => 19,
    }
}

/// Values written to `*out_outcome` by `crsql_merge_insert` on success (return
/// code 0). Kept out of the function's own return-code space, which is
/// reserved for argument-validation sentinels (2, 3, 4) and `error_code`'s
/// range (10-19), so a caller can always tell a genuine LWW loss apart from a
/// tombstone absorption.
pub const MERGE_APPLIED: c_int = 0;
pub const MERGE_REJECTED: c_int = 1;
pub const MERGE_NOOP: c_int = 2;

fn ptr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, ()> {
    if ptr.is_null() {
        return Err(());
    }
    unsafe { CStr::from_ptr(ptr).to_str().map_err(|_| ()) }
}

fn to_cstring_ptr(s: &str) -> *mut c_char {
    CString::new(s).map(|cs| cs.into_raw()).unwrap_or(std::ptr::null_mut())
}

/// Free a C string previously returned by this library.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}

/// Open a SQLite connection and bind an (initially empty) merge handle to
/// it. `path` may be a file path or `":memory:"`. Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_open(
    path: *const c_char,
    local_site_id: *const u8,
    local_site_id_len: usize,
) -> *mut MergeHandle {
    let path = match ptr_to_str(path) {
        Ok(s) => s,
        Err(_) => {
            set_last_error(4, "invalid path");
            return std::ptr::null_mut();
        }
    };
    if local_site_id.is_null() && local_site_id_len > 0 {
        set_last_error(4, "local_site_id null but len > 0");
        return std::ptr::null_mut();
    }
    let local_site = unsafe { std::slice::from_raw_parts(local_site_id, local_site_id_len) }.to_vec();

    match Connection::open(path) {
        Ok(conn) => {
            clear_last_error();
            Box::into_raw(Box::new(MergeHandle {
                conn,
                tables: StaticTableInfoProvider::new(Vec::new()),
                local_site: SiteId(local_site),
            }))
        }
        Err(e) => {
            set_last_error(18, &format!("sqlite: {e}"));
            std::ptr::null_mut()
        }
    }
}

/// Close a previously opened handle.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_close(handle: *mut MergeHandle) {
    if handle.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(handle);
    }
}

/// Register (or replace) the `TableInfo` for one CRR, given as JSON
/// matching `schema::TableInfo`'s serde representation. Returns 0 on
/// success.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_register_table(handle: *mut MergeHandle, table_info_json: *const c_char) -> c_int {
    let h = unsafe { handle.as_mut() };
    let Some(h) = h else {
        set_last_error(4, "null handle");
        return 2;
    };
    let json = match ptr_to_str(table_info_json) {
        Ok(s) => s,
        Err(_) => {
            set_last_error(4, "invalid table_info_json");
            return 3;
        }
    };
    match serde_json::from_str::<TableInfo>(json) {
        Ok(info) => {
            h.tables.insert(info);
            clear_last_error();
            0
        }
        Err(e) => {
            set_last_error(4, &format!("bad table info json: {e}"));
            3
        }
    }
}

/// Merge one change record. Mirrors `original_source`'s
/// `crsql_mergeInsert`: on accept, writes `version` into `*out_row_id` and
/// `MERGE_APPLIED` into `*out_outcome`. On a genuine LWW loss, writes
/// `MERGE_REJECTED`; on tombstone absorption, writes `MERGE_NOOP` — neither
/// is an error, but callers that need to tell them apart (e.g. to log a real
/// conflict differently from a routine absorb) can read `*out_outcome`.
/// `out_outcome` may be null if the caller doesn't care. Returns 0 with
/// `*out_outcome` set on success; a nonzero `error_code` otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_insert(
    handle: *mut MergeHandle,
    table: *const c_char,
    pk: *const u8,
    pk_len: usize,
    cid: i32,
    val: *const u8,
    val_len: usize,
    version: i64,
    site_id: *const u8,
    site_id_len: usize,
    out_row_id: *mut i64,
    out_outcome: *mut c_int,
) -> c_int {
    let h = unsafe { handle.as_mut() };
    let Some(h) = h else {
        set_last_error(4, "null handle");
        return 2;
    };
    let table = match ptr_to_str(table) {
        Ok(s) => s.to_string(),
        Err(_) => {
            set_last_error(4, "invalid table name");
            return 3;
        }
    };
    if (pk.is_null() && pk_len > 0) || (val.is_null() && val_len > 0) || (site_id.is_null() && site_id_len > 0) {
        set_last_error(4, "null buffer with nonzero length");
        return 3;
    }
    let pk_bytes = unsafe { std::slice::from_raw_parts(pk, pk_len) }.to_vec();
    let val_bytes = unsafe { std::slice::from_raw_parts(val, val_len) }.to_vec();
    let site = if site_id_len == 0 {
        None
    } else {
        Some(SiteId(unsafe { std::slice::from_raw_parts(site_id, site_id_len) }.to_vec()))
    };

    let change = ChangeRecord {
        table,
        pk: pk_bytes,
        cid,
        val: val_bytes,
        version,
        site_id: site,
    };

    let local_site = h.local_site.clone();
    let mut engine = MergeEngine::new(&h.conn, &mut h.tables, local_site);

    match engine.merge_change(&change) {
        Ok(MergeOutcome::Applied { row_id }) => {
            if !out_row_id.is_null() {
                unsafe { *out_row_id = row_id };
            }
            if !out_outcome.is_null() {
                unsafe { *out_outcome = MERGE_APPLIED };
            }
            clear_last_error();
            0
        }
        Ok(MergeOutcome::Rejected) => {
            if !out_outcome.is_null() {
                unsafe { *out_outcome = MERGE_REJECTED };
            }
            clear_last_error();
            0
        }
        Ok(MergeOutcome::NoOp) => {
            if !out_outcome.is_null() {
                unsafe { *out_outcome = MERGE_NOOP };
            }
            clear_last_error();
            0
        }
        Err(e) => {
            let code = error_code(&e);
            set_last_error(code, &e.to_string());
            code
        }
    }
}

/// Return the last error code for the current thread. 0 means no error.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_last_error_code() -> c_int {
    LAST_ERROR.with(|le| le.borrow().0)
}

/// Return the last error message for the current thread as a newly
/// allocated C string. Caller must free with `crsql_merge_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn crsql_merge_last_error_message() -> *mut c_char {
    to_cstring_ptr(&LAST_ERROR.with(|le| le.borrow().1.clone()))
}
