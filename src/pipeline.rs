//! One-shot sync: assign ids on disk, then push every record to the collection.
use anyhow::Result;
use chrono::Local;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::database_ops::db::{with_connection, Db, DocumentStore};
use crate::database_ops::upsert::upsert_all;
use crate::prompts::{assign_missing_ids, load_records, scan_item_dirs, AssignReport};
use crate::util::env as env_util;

/// Collection the records are pushed to. Used as-is, never pluralized.
pub const COLLECTION: &str = "text2text";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub prompts_root: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            prompts_root: env_util::prompts_root(),
            database_url: env_util::db_url()?,
            max_connections: env_util::env_parse("DB_MAX_CONNS", 5u32).max(1),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub discovered: usize,
    pub with_metadata: usize,
    pub ids_assigned: usize,
    pub ids_unchanged: usize,
    pub assign_skipped: usize,
    pub loaded: usize,
    pub load_skipped: usize,
    pub upserted: usize,
}

fn now_label() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Scan the root and assign missing ids. No database access.
pub fn assign_ids_only(prompts_root: &std::path::Path) -> Result<AssignReport> {
    let dirs = scan_item_dirs(prompts_root)?;
    Ok(assign_missing_ids(&dirs))
}

/// Run the whole sync, writing status lines to stdout.
///
/// Ids are assigned before the connection is opened, so an unreachable
/// database still leaves new ids on disk. The connection is closed before
/// this returns, on success and on failure.
pub async fn run_sync(cfg: &SyncConfig) -> Result<SyncSummary> {
    let mut out = std::io::stdout();
    run_sync_with(cfg, &mut out, |db| Arc::new(db) as Arc<dyn DocumentStore>).await
}

/// [`run_sync`] with the status sink and the store wrapping made explicit.
///
/// `store_for` receives the open connection and returns the store the batch
/// is upserted through.
pub(crate) async fn run_sync_with<W, F>(
    cfg: &SyncConfig,
    out: &mut W,
    store_for: F,
) -> Result<SyncSummary>
where
    W: Write,
    F: FnOnce(Db) -> Arc<dyn DocumentStore>,
{
    writeln!(out, "Starting data pull at {}", now_label())?;
    info!(root = %cfg.prompts_root.display(), collection = COLLECTION, "starting prompt sync");

    let dirs = scan_item_dirs(&cfg.prompts_root)?;
    let assign = assign_missing_ids(&dirs);
    let mut summary = SyncSummary {
        discovered: dirs.len(),
        with_metadata: dirs.iter().filter(|d| d.has_metadata).count(),
        ids_assigned: assign.assigned.len(),
        ids_unchanged: assign.unchanged,
        assign_skipped: assign.skipped.len(),
        ..Default::default()
    };
    info!(
        discovered = summary.discovered,
        with_metadata = summary.with_metadata,
        assigned = summary.ids_assigned,
        skipped = summary.assign_skipped,
        "id assignment finished"
    );

    let (loaded, load_skipped, pushed) =
        with_connection(&cfg.database_url, cfg.max_connections, |db| async move {
            db.ensure_collection(COLLECTION).await?;
            let batch = load_records(&dirs);
            let loaded = batch.records.len();
            let load_skipped = batch.skipped.len();
            let pushed = upsert_all(store_for(db), COLLECTION, batch.records).await;
            Ok::<_, anyhow::Error>((loaded, load_skipped, pushed))
        })
        .await?;

    let upserted = match pushed {
        Ok(up) => up.upserted,
        Err(e) => {
            writeln!(out, "FINAL ERR: {e:#}")?;
            error!(error = %format!("{e:#}"), "push failed");
            return Err(e);
        }
    };

    summary.loaded = loaded;
    summary.load_skipped = load_skipped;
    summary.upserted = upserted;
    writeln!(out, "Data pulled at {}", now_label())?;
    info!(summary = ?summary, "prompt sync complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::sqlite_url;
    use crate::prompts::METADATA_FILE_NAME;
    use anyhow::bail;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;

    fn write_item(root: &Path, name: &str, body: &str) {
        fs::create_dir_all(root.join(name)).unwrap();
        fs::write(root.join(name).join(METADATA_FILE_NAME), body).unwrap();
    }

    fn prompt_id_on_disk(root: &Path, name: &str) -> Option<String> {
        let raw = fs::read_to_string(root.join(name).join(METADATA_FILE_NAME)).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        v[0]["prompt_id"].as_str().map(str::to_string)
    }

    fn config(root: &Path, db_dir: &Path) -> SyncConfig {
        SyncConfig {
            prompts_root: root.to_path_buf(),
            database_url: sqlite_url(db_dir),
            max_connections: 4,
        }
    }

    fn seed(root: &Path) {
        write_item(
            root,
            "ner",
            r#"[{"models":["gpt-3.5-turbo"],"language":"en","task":"ner","authors":"a","file_name":"ner.jinja","created":"2023-01-01"}]"#,
        );
        write_item(
            root,
            "qa",
            r#"[{"task":"qa","language":"en","prompt_id":"11111111-1111-4111-8111-111111111111"}]"#,
        );
        write_item(root, "broken", "[{ this is not json");
        fs::create_dir_all(root.join("assets")).unwrap();
    }

    #[tokio::test]
    async fn pushes_valid_records_and_skips_broken_ones() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        seed(items.path());

        let summary = run_sync(&config(items.path(), db_dir.path())).await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                discovered: 4,
                with_metadata: 3,
                ids_assigned: 1,
                ids_unchanged: 1,
                assign_skipped: 1,
                loaded: 2,
                load_skipped: 1,
                upserted: 2,
            }
        );

        let new_id = prompt_id_on_disk(items.path(), "ner").unwrap();
        let db = Db::connect(&sqlite_url(db_dir.path()), 1).await.unwrap();
        assert_eq!(db.count(COLLECTION).await.unwrap(), 2);
        let doc = db.find_by_key(COLLECTION, &new_id).await.unwrap().unwrap();
        assert_eq!(doc["task"], "ner");
        assert_eq!(doc["models"][0], "gpt-3.5-turbo");
        assert_eq!(doc["prompt_id"], Value::String(new_id));
        db.close().await;
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        seed(items.path());
        let cfg = config(items.path(), db_dir.path());

        run_sync(&cfg).await.unwrap();
        let id_after_first = prompt_id_on_disk(items.path(), "ner").unwrap();
        let db = Db::connect(&cfg.database_url, 1).await.unwrap();
        let doc_after_first = db.find_by_key(COLLECTION, &id_after_first).await.unwrap();
        db.close().await;

        let second = run_sync(&cfg).await.unwrap();
        assert_eq!(second.ids_assigned, 0);
        assert_eq!(second.upserted, 2);
        assert_eq!(prompt_id_on_disk(items.path(), "ner").unwrap(), id_after_first);

        let db = Db::connect(&cfg.database_url, 1).await.unwrap();
        assert_eq!(db.count(COLLECTION).await.unwrap(), 2);
        assert_eq!(
            db.find_by_key(COLLECTION, &id_after_first).await.unwrap(),
            doc_after_first
        );
        db.close().await;
    }

    #[tokio::test]
    async fn ids_are_assigned_even_when_database_is_unreachable() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        seed(items.path());
        let mut cfg = config(items.path(), db_dir.path());
        cfg.database_url = sqlite_url(&db_dir.path().join("does_not_exist"));

        assert!(run_sync(&cfg).await.is_err());
        let id = prompt_id_on_disk(items.path(), "ner").unwrap();
        assert_eq!(uuid::Uuid::parse_str(&id).unwrap().get_version_num(), 4);
    }

    #[tokio::test]
    async fn missing_root_aborts_before_connecting() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let cfg = config(&items.path().join("gone"), db_dir.path());

        let err = run_sync(&cfg).await.unwrap_err();
        assert!(err.to_string().contains("failed to read prompts root"));
        assert!(!db_dir.path().join("docs.db").exists());
    }

    #[tokio::test]
    async fn empty_root_succeeds_with_nothing_pushed() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let summary = run_sync(&config(items.path(), db_dir.path())).await.unwrap();
        assert_eq!(summary, SyncSummary::default());
    }

    #[test]
    fn assign_only_touches_files_without_ids() {
        let items = tempfile::tempdir().unwrap();
        seed(items.path());
        let report = assign_ids_only(items.path()).unwrap();
        assert_eq!(report.assigned.len(), 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            prompt_id_on_disk(items.path(), "qa").as_deref(),
            Some("11111111-1111-4111-8111-111111111111")
        );
    }

    const QA_ID: &str = "11111111-1111-4111-8111-111111111111";

    /// Delegates to the real connection but rejects one key.
    struct RejectingStore {
        inner: Db,
        reject: &'static str,
    }

    #[async_trait::async_trait]
    impl DocumentStore for RejectingStore {
        async fn upsert(&self, collection: &str, key: &str, doc: &Value) -> Result<()> {
            if key == self.reject {
                bail!("write rejected for {key}");
            }
            self.inner.upsert(collection, key, doc).await
        }

        async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>> {
            self.inner.find_by_key(collection, key).await
        }

        async fn count(&self, collection: &str) -> Result<i64> {
            self.inner.count(collection).await
        }
    }

    #[tokio::test]
    async fn failed_upsert_prints_final_err_and_closes_connection() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        seed(items.path());
        let cfg = config(items.path(), db_dir.path());

        let mut out = Vec::new();
        let mut seen = None;
        let err = run_sync_with(&cfg, &mut out, |db| {
            seen = Some(db.clone());
            Arc::new(RejectingStore {
                inner: db,
                reject: QA_ID,
            }) as Arc<dyn DocumentStore>
        })
        .await
        .unwrap_err();

        let msg = format!("{err:#}");
        assert!(msg.contains("1 of 2 upserts failed"), "{msg}");
        assert!(msg.contains(&format!("write rejected for {QA_ID}")), "{msg}");
        assert!(seen.unwrap().is_closed());

        let status = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = status.lines().collect();
        assert_eq!(lines.len(), 2, "{status}");
        assert!(lines[0].starts_with("Starting data pull at "));
        assert!(lines[1].starts_with("FINAL ERR: 1 of 2 upserts failed"));

        // The other record still made it.
        let db = Db::connect(&cfg.database_url, 1).await.unwrap();
        assert_eq!(db.count(COLLECTION).await.unwrap(), 1);
        let ner_id = prompt_id_on_disk(items.path(), "ner").unwrap();
        assert!(db.find_by_key(COLLECTION, &ner_id).await.unwrap().is_some());
        db.close().await;
    }

    #[tokio::test]
    async fn success_prints_start_and_done_lines_only() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        seed(items.path());

        let mut out = Vec::new();
        run_sync_with(&config(items.path(), db_dir.path()), &mut out, |db| {
            Arc::new(db) as Arc<dyn DocumentStore>
        })
        .await
        .unwrap();
        let status = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = status.lines().collect();
        assert_eq!(lines.len(), 2, "{status}");
        assert!(lines[0].starts_with("Starting data pull at "));
        assert!(lines[1].starts_with("Data pulled at "));
    }

    #[tokio::test]
    async fn mistyped_fields_are_assigned_and_pushed() {
        let items = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        write_item(
            items.path(),
            "odd",
            r#"[{"task":"qa","created":20230401,"models":"gpt-4","authors":null}]"#,
        );
        let cfg = config(items.path(), db_dir.path());

        let summary = run_sync(&cfg).await.unwrap();
        assert_eq!(summary.ids_assigned, 1);
        assert_eq!(summary.upserted, 1);

        let id = prompt_id_on_disk(items.path(), "odd").unwrap();
        let db = Db::connect(&cfg.database_url, 1).await.unwrap();
        let doc = db.find_by_key(COLLECTION, &id).await.unwrap().unwrap();
        assert_eq!(doc["created"], 20230401);
        assert_eq!(doc["models"], "gpt-4");
        assert_eq!(doc["authors"], Value::Null);
        db.close().await;
    }
}
