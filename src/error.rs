use thiserror::Error;

/// Error taxonomy for the merge engine. Every variant carries a human-readable
/// message; the engine never retries internally and expects the caller to
/// roll back its enclosing transaction on any `Err`.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("crsql - a site is trying to patch itself")]
    SelfPatch,

    #[error("crsql - change record arrived on the merge path with no site id")]
    MissingSiteId,

    #[error("crsql - could not find the schema information for table {0}")]
    UnknownTable(String),

    #[error("crsql - {what} exceeded max length")]
    InputTooLong { what: &'static str },

    #[error("out of bounds column id ({cid}) provided for patch to {table}")]
    BadColumn { table: String, cid: i32 },

    #[error("crsql - failed decoding primary keys: {0}")]
    PkDecode(String),

    #[error("crsql - failed sanitizing value for changeset: {0}")]
    BadValue(String),

    #[error("crsql - failed to update crr table information: {0}")]
    Schema(String),

    #[error("crsql - failed setting sync bit: {0}")]
    SyncBit(String),

    #[error("sqlite: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type MergeResult<T> = Result<T, MergeError>;
