use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
    PgPool, SqlitePool,
};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Field every collection document is keyed on.
pub const KEY_FIELD: &str = "prompt_id";

/// A schema-flexible collection of JSON documents keyed by `prompt_id`.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `doc` under `key`, or replace the whole stored document if the key exists.
    async fn upsert(&self, collection: &str, key: &str, doc: &Value) -> Result<()>;
    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>>;
    async fn count(&self, collection: &str) -> Result<i64>;
}

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Handle to the document database for the duration of one run.
///
/// Cloning shares the same underlying connection; all upsert tasks use it.
#[derive(Clone)]
pub struct Db {
    backend: Backend,
}

impl Db {
    /// Open the connection. `postgres://`/`postgresql://` and `sqlite:` URLs are supported.
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let scheme = database_url
            .split_once(':')
            .map(|(s, _)| s.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("database URL has no scheme"))?;
        let backend = match scheme.as_str() {
            "postgres" | "postgresql" => {
                Backend::Postgres(connect_postgres(database_url, max_connections).await?)
            }
            "sqlite" => Backend::Sqlite(connect_sqlite(database_url, max_connections).await?),
            other => bail!("unsupported database scheme {other:?}"),
        };
        info!(backend = %scheme, max_connections, "connected to db");
        Ok(Self { backend })
    }

    /// Create the collection's backing table if this is its first use.
    pub async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let table = collection_ident(collection)?;
        match &self.backend {
            Backend::Postgres(pool) => {
                let stmt = format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        prompt_id TEXT PRIMARY KEY,
                        doc JSONB NOT NULL,
                        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                     )"
                );
                sqlx::raw_sql(&stmt).execute(pool).await?;
            }
            Backend::Sqlite(pool) => {
                let stmt = format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        prompt_id TEXT PRIMARY KEY,
                        doc TEXT NOT NULL,
                        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                     )"
                );
                sqlx::raw_sql(&stmt).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) {
        match &self.backend {
            Backend::Postgres(pool) => pool.close().await,
            Backend::Sqlite(pool) => pool.close().await,
        }
        info!("db connection closed");
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        match &self.backend {
            Backend::Postgres(pool) => pool.is_closed(),
            Backend::Sqlite(pool) => pool.is_closed(),
        }
    }
}

async fn connect_postgres(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let use_prepared = crate::util::env::env_flag("USE_PREPARED", false);
    let mut connect_options = PgConnectOptions::from_str(database_url)?;

    if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
        connect_options = connect_options.ssl_mode(PgSslMode::Require);
    }
    if !use_prepared {
        // PgBouncer txn mode safe
        connect_options = connect_options.statement_cache_capacity(0);
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(connect_options)
        .await
        .context("failed to connect to postgres")?;
    Ok(pool)
}

async fn connect_sqlite(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await
        .context("failed to open sqlite database")?;
    Ok(pool)
}

/// Quote a collection name for use as a table identifier.
fn collection_ident(collection: &str) -> Result<String> {
    let mut chars = collection.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid collection name {collection:?}");
    }
    Ok(format!("\"{collection}\""))
}

#[async_trait::async_trait]
impl DocumentStore for Db {
    async fn upsert(&self, collection: &str, key: &str, doc: &Value) -> Result<()> {
        let table = collection_ident(collection)?;
        match &self.backend {
            Backend::Postgres(pool) => {
                let stmt = format!(
                    "INSERT INTO {table} (prompt_id, doc) VALUES ($1, $2)
                     ON CONFLICT (prompt_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = now()"
                );
                sqlx::query(&stmt)
                    .persistent(false)
                    .bind(key)
                    .bind(Json(doc))
                    .execute(pool)
                    .await?;
            }
            Backend::Sqlite(pool) => {
                let stmt = format!(
                    "INSERT INTO {table} (prompt_id, doc) VALUES (?1, ?2)
                     ON CONFLICT (prompt_id) DO UPDATE SET doc = excluded.doc, updated_at = CURRENT_TIMESTAMP"
                );
                sqlx::query(&stmt)
                    .bind(key)
                    .bind(Json(doc))
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn find_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let table = collection_ident(collection)?;
        let found: Option<Json<Value>> = match &self.backend {
            Backend::Postgres(pool) => {
                let stmt = format!("SELECT doc FROM {table} WHERE prompt_id = $1");
                sqlx::query_scalar(&stmt)
                    .persistent(false)
                    .bind(key)
                    .fetch_optional(pool)
                    .await?
            }
            Backend::Sqlite(pool) => {
                let stmt = format!("SELECT doc FROM {table} WHERE prompt_id = ?1");
                sqlx::query_scalar(&stmt)
                    .bind(key)
                    .fetch_optional(pool)
                    .await?
            }
        };
        Ok(found.map(|Json(v)| v))
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        let table = collection_ident(collection)?;
        let stmt = format!("SELECT COUNT(*) FROM {table}");
        let n: i64 = match &self.backend {
            Backend::Postgres(pool) => {
                sqlx::query_scalar(&stmt)
                    .persistent(false)
                    .fetch_one(pool)
                    .await?
            }
            Backend::Sqlite(pool) => sqlx::query_scalar(&stmt).fetch_one(pool).await?,
        };
        Ok(n)
    }
}

/// Run `f` with an open connection and close it afterwards, whatever `f` returned.
pub async fn with_connection<T, F, Fut>(database_url: &str, max_connections: u32, f: F) -> Result<T>
where
    F: FnOnce(Db) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let db = Db::connect(database_url, max_connections).await?;
    let result = f(db.clone()).await;
    db.close().await;
    result
}

#[cfg(test)]
pub(crate) fn sqlite_url(dir: &std::path::Path) -> String {
    format!("sqlite://{}", dir.join("docs.db").display())
}
