pub mod clock;
pub mod decide;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod pkcodec;
pub mod schema;
pub mod site;
pub mod sync_bit;

pub use clock::{ClockStore, TombstoneState, DELETE_CID_SENTINEL, PKS_ONLY_CID_SENTINEL};
pub use decide::{decide, Decision};
pub use engine::{ChangeRecord, MergeEngine, MergeOutcome, MAX_TBL_NAME_LEN};
pub use error::{MergeError, MergeResult};
pub use schema::{ColumnInfo, StaticTableInfoProvider, TableInfo, TableInfoProvider};
pub use site::{site_id_cmp, SiteId, SITE_ID_LEN};
pub use sync_bit::SyncBitGuard;
