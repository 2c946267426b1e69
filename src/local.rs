//! Embedded, file-backed backend on SQLite.
//!
//! Collections of every tenant/database share one database file; a client only
//! sees the namespace it was opened with. Nearest-neighbour search is exact:
//! every stored vector of the collection is scored.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::backend::{BackendRow, VectorBackend};
use crate::batch::{BatchLimits, RecordBatch};
use crate::config::{CollectionConfig, DistanceMetric, LocalConfig};
use crate::error::{Result, VecDbError};
use crate::types::{CollectionInfo, Embedding, GetResult, Metadata, QueryResult, Record};

/// Database file created inside `storage_path`.
pub const DB_FILE_NAME: &str = "vecdb.sqlite3";

/// Same ceiling as the embedded Chroma engine.
const LOCAL_MAX_BATCH_RECORDS: usize = 5461;
const LOCAL_MAX_BATCH_BYTES: usize = 64 * 1024 * 1024;

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY NOT NULL,
        tenant TEXT NOT NULL,
        database TEXT NOT NULL,
        name TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        distance TEXT NOT NULL,
        UNIQUE (tenant, database, name)
    )",
    "CREATE TABLE IF NOT EXISTS records (
        collection_id TEXT NOT NULL,
        id TEXT NOT NULL,
        document TEXT NOT NULL,
        embedding TEXT NOT NULL,
        metadata TEXT NOT NULL,
        PRIMARY KEY (collection_id, id)
    )",
];

/// Local persistent engine.
#[derive(Clone)]
pub struct LocalBackend {
    pool: SqlitePool,
    tenant: String,
    database: String,
    allow_reset: bool,
}

impl LocalBackend {
    /// Open (creating if needed) the store described by `config`.
    pub async fn connect(config: LocalConfig) -> Result<Self> {
        let pool = if config.is_in_memory() {
            // Each in-memory connection is its own database: pin a single one.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let dir = Path::new(&config.storage_path);
            std::fs::create_dir_all(dir).map_err(|e| {
                VecDbError::Config(format!(
                    "cannot create storage path {}: {e}",
                    dir.display()
                ))
            })?;
            let options = SqliteConnectOptions::new()
                .filename(dir.join(DB_FILE_NAME))
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?
        };

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        info!(
            path = %config.storage_path,
            tenant = %config.tenant,
            database = %config.database,
            "opened local vector store"
        );
        Ok(Self {
            pool,
            tenant: config.tenant,
            database: config.database,
            allow_reset: config.allow_reset,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn fetch_records(&self, collection: &CollectionInfo) -> Result<Vec<Record>> {
        let collection_id = self.collection_id(collection)?;
        ensure_exists(&self.pool, collection, collection_id).await?;
        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata FROM records \
             WHERE collection_id = ? ORDER BY rowid",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    fn collection_id<'a>(&self, collection: &'a CollectionInfo) -> Result<&'a str> {
        collection.id.as_deref().ok_or_else(|| {
            VecDbError::InvalidArgument(format!(
                "collection {} has no local id; obtain it from this client",
                collection.name
            ))
        })
    }
}

#[async_trait]
impl VectorBackend for LocalBackend {
    async fn create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo> {
        let id = uuid::Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            "INSERT INTO collections (id, tenant, database, name, dimension, distance) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&self.tenant)
        .bind(&self.database)
        .bind(name)
        .bind(config.dimension as i64)
        .bind(config.distance.as_str())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(VecDbError::AlreadyExists(format!(
                    "collection already exists: {name}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(collection = name, dimension = config.dimension, "created local collection");
        Ok(CollectionInfo {
            name: name.to_string(),
            id: Some(id),
            dimension: Some(config.dimension),
            distance: config.distance,
        })
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        let row = sqlx::query(
            "SELECT id, name, dimension, distance FROM collections \
             WHERE tenant = ? AND database = ? AND name = ?",
        )
        .bind(&self.tenant)
        .bind(&self.database)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(VecDbError::NotFound(format!(
                "collection not found: {name}"
            )));
        };
        collection_from_row(&row)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT id, name, dimension, distance FROM collections \
             WHERE tenant = ? AND database = ? ORDER BY rowid",
        )
        .bind(&self.tenant)
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(collection_from_row).collect()
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let info = self.get_collection(name).await?;
        let id = self.collection_id(&info)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(collection = name, "deleted local collection");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if !self.allow_reset {
            return Err(VecDbError::Config(
                "reset is disabled for this client (allow_reset = false)".into(),
            ));
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM records WHERE collection_id IN \
             (SELECT id FROM collections WHERE tenant = ? AND database = ?)",
        )
        .bind(&self.tenant)
        .bind(&self.database)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM collections WHERE tenant = ? AND database = ?")
            .bind(&self.tenant)
            .bind(&self.database)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(tenant = %self.tenant, database = %self.database, "reset local vector store");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &CollectionInfo, batch: RecordBatch) -> Result<()> {
        let collection_id = self.collection_id(collection)?;
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut *tx, collection, collection_id).await?;
        for record in batch.into_records() {
            sqlx::query(
                "INSERT INTO records (collection_id, id, document, embedding, metadata) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT (collection_id, id) DO UPDATE SET \
                 document = excluded.document, \
                 embedding = excluded.embedding, \
                 metadata = excluded.metadata",
            )
            .bind(collection_id)
            .bind(&record.id)
            .bind(&record.document)
            .bind(vector_to_string(&record.embedding))
            .bind(serde_json::to_string(&record.metadata)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &CollectionInfo) -> Result<GetResult> {
        let mut result = GetResult::default();
        for record in self.fetch_records(collection).await? {
            result.push(record.id, record.document, record.metadata);
        }
        Ok(result)
    }

    async fn query(
        &self,
        collection: &CollectionInfo,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult> {
        let records = self.fetch_records(collection).await?;
        let mut result = QueryResult::default();
        for query in query_embeddings {
            let hits = rank_nearest(&records, query, collection.distance, n_results)
                .into_iter()
                .map(|(index, distance)| (records[index].clone(), distance))
                .collect();
            result.push_query(hits);
        }
        Ok(result)
    }

    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        let collection_id = self.collection_id(collection)?;
        ensure_exists(&self.pool, collection, collection_id).await?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM records WHERE collection_id = ?")
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?;
        let cnt = row.get_i64("cnt")?.unwrap_or(0);
        Ok(cnt as usize)
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits::new(LOCAL_MAX_BATCH_RECORDS, LOCAL_MAX_BATCH_BYTES)
    }

    fn mode(&self) -> &'static str {
        "local"
    }
}

/// `NotFound` unless the collection row still exists.
async fn ensure_exists<'e, E>(executor: E, collection: &CollectionInfo, id: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query("SELECT 1 FROM collections WHERE id = ?")
        .bind(id.to_owned())
        .fetch_optional(executor)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(VecDbError::NotFound(format!(
            "collection not found: {}",
            collection.name
        ))),
    }
}

fn collection_from_row<R: BackendRow>(row: &R) -> Result<CollectionInfo> {
    let name = row.get_string("name")?.unwrap_or_default();
    let distance_str = row.get_string("distance")?.unwrap_or_default();
    let distance = DistanceMetric::parse(&distance_str).ok_or_else(|| {
        VecDbError::Backend(format!(
            "collection {name} has unknown distance {distance_str}"
        ))
    })?;
    Ok(CollectionInfo {
        id: row.get_string("id")?,
        dimension: row.get_i64("dimension")?.map(|d| d as u32),
        distance,
        name,
    })
}

fn record_from_row<R: BackendRow>(row: &R) -> Result<Record> {
    let metadata = match row.get_string("metadata")? {
        Some(s) => serde_json::from_str::<Metadata>(&s)?,
        None => Metadata::new(),
    };
    Ok(Record {
        id: row.get_string("id")?.unwrap_or_default(),
        document: row.get_string("document")?.unwrap_or_default(),
        embedding: row
            .get_string("embedding")?
            .map(parse_vector_string)
            .unwrap_or_default(),
        metadata,
    })
}

fn vector_to_string(v: &Embedding) -> String {
    let inner = v
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{inner}]")
}

fn parse_vector_string(s: String) -> Embedding {
    s.trim_matches(&['[', ']'][..])
        .split(',')
        .filter_map(|x| x.trim().parse::<f32>().ok())
        .collect()
}

/// Distance where smaller is nearer: cosine distance, squared L2, or `1 - dot`.
fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        DistanceMetric::InnerProduct => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                return 1.0;
            }
            1.0 - dot / (norm_a * norm_b)
        }
    }
}

/// Indices and distances of the `n` records nearest to `query`.
///
/// Ties keep insertion order.
fn rank_nearest(
    records: &[Record],
    query: &[f32],
    metric: DistanceMetric,
    n: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i, distance(metric, &r.embedding, query)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(n);
    scored
}
