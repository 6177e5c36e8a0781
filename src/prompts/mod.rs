//! Filesystem side of the sync: discovering item directories, assigning ids,
//! and loading records for the push.
pub mod id_assign;
pub mod loader;
pub mod metadata;
pub mod scanner;

pub use id_assign::{assign_missing_ids, AssignReport};
pub use loader::{load_records, LoadReport};
pub use metadata::{MetadataRecord, METADATA_FILE_NAME};
pub use scanner::{scan_item_dirs, ItemDirectory};
