use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::db::{DocumentStore, KEY_FIELD};
use crate::prompts::MetadataRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub upserted: usize,
}

/// Upsert every record concurrently, keyed by `prompt_id`.
///
/// Each record gets its own task; all tasks are awaited whether or not others
/// fail. Returns the first failure in record order, or the number of records
/// written. Successful writes are kept when others fail.
pub async fn upsert_all(
    store: Arc<dyn DocumentStore>,
    collection: &str,
    records: Vec<MetadataRecord>,
) -> Result<UpsertSummary> {
    if records.is_empty() {
        info!(collection, "no records to upsert");
        return Ok(UpsertSummary::default());
    }

    let total = records.len();
    let mut tasks = Vec::with_capacity(total);
    for record in records {
        let store = store.clone();
        let collection = collection.to_string();
        tasks.push(tokio::spawn(async move {
            let res = upsert_one(store.as_ref(), &collection, &record).await;
            if let Err(e) = &res {
                error!(prompt_id = ?record.prompt_id(), error = %e, "upsert failed");
            }
            res
        }));
    }

    let results = join_all(tasks).await;
    let mut first_err: Option<anyhow::Error> = None;
    let mut failed = 0usize;
    for r in results {
        let outcome = match r {
            Ok(inner) => inner,
            Err(join_err) => Err(anyhow!(join_err)),
        };
        if let Err(e) = outcome {
            failed += 1;
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    if let Some(e) = first_err {
        return Err(e.context(format!("{failed} of {total} upserts failed")));
    }
    info!(collection, upserted = total, "upsert batch complete");
    Ok(UpsertSummary { upserted: total })
}

async fn upsert_one(
    store: &dyn DocumentStore,
    collection: &str,
    record: &MetadataRecord,
) -> Result<()> {
    let key = record
        .prompt_id()
        .ok_or_else(|| anyhow!("record has no {KEY_FIELD}"))?;
    let doc = record.to_document();
    store
        .upsert(collection, key, &doc)
        .await
        .with_context(|| format!("upsert of {key} failed"))?;
    debug!(prompt_id = key, "upserted");
    Ok(())
}
