pub mod cli;
pub mod database_ops;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod prompts;

pub mod util {
    pub mod env;
}

pub use database_ops::db::{with_connection, Db, DocumentStore};
pub use errors::{SkipReason, Skipped};
pub use pipeline::{run_sync, SyncConfig, SyncSummary, COLLECTION};
pub use prompts::MetadataRecord;
