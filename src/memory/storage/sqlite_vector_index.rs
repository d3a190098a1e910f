//! `SQLite` vector index on top of sqlite-vec `vec0` tables.
//!
//! Each index `name` owns two tables: `{name}_embeddings` (the `vec0` table,
//! cosine distance) and `{name}_documents` (entry id and JSON metadata keyed
//! by the same rowid). Dimensions are tracked in a registry table.

use rusqlite::OptionalExtension;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tokio_rusqlite::Connection;

use crate::memory::core::config::{StorageConfig, validate_identifier};
use crate::memory::core::errors::{AdapterErrorCode, MemoryError, MemoryResult};
use crate::memory::core::thread::{Candidate, Metadata};
use crate::memory::storage::filter::MetadataFilter;
use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;
use crate::memory::storage::vector_index::{IndexedVector, VectorIndex};
use crate::memory::storage::{StoreFuture, classify_sqlite, other_error, unwrap_sqlite};

const REGISTRY_TABLE: &str = "vector_index_registry";
/// Upper bound sqlite-vec accepts for `k`.
const MAX_KNN: usize = 4096;

/// `SQLite` implementation of [`VectorIndex`].
pub struct SqliteVectorIndex {
    conn: Connection,
}

impl SqliteVectorIndex {
    /// Open the database at `config.sqlite_path`, loading sqlite-vec first.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        init_sqlite_vec_extension();
        let conn = Connection::open(&config.sqlite_path)
            .await
            .map_err(classify_sqlite)?;

        conn.call(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (
                    name TEXT PRIMARY KEY,
                    dimension INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await
        .map_err(classify_sqlite)?;

        Ok(Self { conn })
    }

    async fn dimension(&self, index_name: &str) -> MemoryResult<usize> {
        let name = index_name.to_string();
        let dimension = self
            .conn
            .call(move |conn| {
                let dimension = conn
                    .query_row(
                        &format!("SELECT dimension FROM {REGISTRY_TABLE} WHERE name = ?1"),
                        rusqlite::params![name],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                Ok(dimension)
            })
            .await
            .map_err(classify_sqlite)?
            .ok_or_else(|| {
                MemoryError::adapter(
                    AdapterErrorCode::IndexNotFound,
                    format!("index '{index_name}' does not exist"),
                )
            })?;

        usize::try_from(dimension).map_err(|_| {
            MemoryError::adapter(
                AdapterErrorCode::Corrupted,
                format!("index '{index_name}' has dimension {dimension}"),
            )
        })
    }
}

/// SQL predicate and bound values for each filter condition.
///
/// A condition checks both the JSON type and the value, so `1`, `1.0`,
/// `"1"` and `true` stay distinct. Keys are quoted in the path, so a
/// dotted key names a single top-level field.
fn filter_clause(filter: &MetadataFilter, first_param: usize) -> (String, Vec<SqlValue>) {
    let mut predicates = Vec::new();
    let mut params = Vec::new();
    for (key, value) in filter.conditions() {
        let (kind, bound) = match value {
            Value::Bool(true) => ("true", SqlValue::Integer(1)),
            Value::Bool(false) => ("false", SqlValue::Integer(0)),
            Value::String(text) => ("text", SqlValue::Text(text.clone())),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(int), _) => ("integer", SqlValue::Integer(int)),
                (None, Some(real)) => ("real", SqlValue::Real(real)),
                (None, None) => ("null", SqlValue::Null),
            },
            Value::Null | Value::Array(_) | Value::Object(_) => ("null", SqlValue::Null),
        };
        let path = first_param + params.len();
        predicates.push(format!(
            "json_type(d.metadata, ?{path}) = ?{} AND json_extract(d.metadata, ?{path}) = ?{}",
            path + 1,
            path + 2
        ));
        params.push(SqlValue::Text(format!("$.\"{key}\"")));
        params.push(SqlValue::Text(kind.to_string()));
        params.push(bound);
    }
    (predicates.join(" AND "), params)
}

fn dimension_mismatch(index_name: &str, expected: usize, actual: usize) -> MemoryError {
    MemoryError::adapter(
        AdapterErrorCode::DimensionMismatch,
        format!("index '{index_name}' expects {expected} dimensions, got {actual}"),
    )
}

impl VectorIndex for SqliteVectorIndex {
    fn create_index(&self, index_name: &str, dimension: usize) -> StoreFuture<'_, MemoryResult<()>> {
        let name = index_name.to_string();
        Box::pin(async move {
            validate_identifier("index_name", &name)?;
            if dimension == 0 {
                return Err(MemoryError::InvalidConfig(
                    "index dimension must be > 0".to_string(),
                ));
            }
            let requested = i64::try_from(dimension)
                .map_err(|_| MemoryError::InvalidConfig("dimension exceeds i64".to_string()))?;

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let existing = tx
                        .query_row(
                            &format!("SELECT dimension FROM {REGISTRY_TABLE} WHERE name = ?1"),
                            rusqlite::params![name],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;

                    match existing {
                        Some(current) if current == requested => return Ok(()),
                        Some(current) => {
                            return Err(other_error(MemoryError::adapter(
                                AdapterErrorCode::DimensionMismatch,
                                format!(
                                    "index '{name}' exists with {current} dimensions, requested {requested}"
                                ),
                            )));
                        }
                        None => {}
                    }

                    tx.execute_batch(&format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS {name}_embeddings USING vec0(
                            embedding float[{requested}] distance_metric=cosine
                        );
                        CREATE TABLE IF NOT EXISTS {name}_documents (
                            id TEXT UNIQUE NOT NULL,
                            metadata TEXT NOT NULL
                        );"
                    ))?;
                    tx.execute(
                        &format!("INSERT INTO {REGISTRY_TABLE} (name, dimension) VALUES (?1, ?2)"),
                        rusqlite::params![name, requested],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await
                .map_err(unwrap_sqlite)
        })
    }

    fn upsert(
        &self,
        index_name: &str,
        items: Vec<IndexedVector>,
    ) -> StoreFuture<'_, MemoryResult<()>> {
        let name = index_name.to_string();
        Box::pin(async move {
            validate_identifier("index_name", &name)?;
            let dimension = self.dimension(&name).await?;
            if let Some(bad) = items.iter().find(|item| item.vector.len() != dimension) {
                return Err(dimension_mismatch(&name, dimension, bad.vector.len()));
            }
            if items.is_empty() {
                return Ok(());
            }

            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                rows.push((
                    item.id,
                    serde_json::to_string(&item.metadata)?,
                    serde_json::to_string(&item.vector)?,
                ));
            }

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    for (id, metadata, vector) in rows {
                        let existing = tx
                            .query_row(
                                &format!("SELECT rowid FROM {name}_documents WHERE id = ?1"),
                                rusqlite::params![id],
                                |row| row.get::<_, i64>(0),
                            )
                            .optional()?;

                        let rowid = if let Some(rowid) = existing {
                            tx.execute(
                                &format!(
                                    "UPDATE {name}_documents SET metadata = ?2 WHERE rowid = ?1"
                                ),
                                rusqlite::params![rowid, metadata],
                            )?;
                            tx.execute(
                                &format!("DELETE FROM {name}_embeddings WHERE rowid = ?1"),
                                rusqlite::params![rowid],
                            )?;
                            rowid
                        } else {
                            tx.execute(
                                &format!(
                                    "INSERT INTO {name}_documents (id, metadata) VALUES (?1, ?2)"
                                ),
                                rusqlite::params![id, metadata],
                            )?;
                            tx.last_insert_rowid()
                        };

                        tx.execute(
                            &format!(
                                "INSERT INTO {name}_embeddings (rowid, embedding) VALUES (?1, ?2)"
                            ),
                            rusqlite::params![rowid, vector],
                        )?;
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await
                .map_err(classify_sqlite)
        })
    }

    fn query(
        &self,
        index_name: &str,
        query_vector: &[f64],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Candidate>>> {
        let name = index_name.to_string();
        let query_vector = query_vector.to_vec();
        let filter = filter.cloned().filter(|f| !f.is_empty());
        Box::pin(async move {
            if let Some(filter) = &filter {
                filter.validate()?;
            }
            validate_identifier("index_name", &name)?;
            let dimension = self.dimension(&name).await?;
            if query_vector.len() != dimension {
                return Err(dimension_mismatch(&name, dimension, query_vector.len()));
            }
            if top_k == 0 {
                return Ok(Vec::new());
            }

            let k = i64::try_from(top_k.min(MAX_KNN))
                .map_err(|_| MemoryError::InvalidConfig("top_k exceeds i64".to_string()))?;
            let vector = serde_json::to_string(&query_vector)?;

            // vec0 has no metadata predicate, so filtered queries scan the
            // matching documents exactly instead of going through the kNN.
            let (sql, params) = match &filter {
                None => (
                    format!(
                        "WITH knn AS (
                            SELECT rowid, distance FROM {name}_embeddings
                            WHERE embedding MATCH ?1 AND k = ?2
                        )
                        SELECT d.id, d.metadata, knn.distance
                        FROM knn JOIN {name}_documents d ON d.rowid = knn.rowid
                        ORDER BY knn.distance"
                    ),
                    vec![SqlValue::Text(vector), SqlValue::Integer(k)],
                ),
                Some(filter) => {
                    let (predicate, mut params) = filter_clause(filter, 3);
                    let limit = i64::try_from(top_k).unwrap_or(i64::MAX);
                    params.splice(0..0, [SqlValue::Text(vector), SqlValue::Integer(limit)]);
                    (
                        format!(
                            "SELECT d.id, d.metadata, vec_distance_cosine(e.embedding, ?1) AS distance
                            FROM {name}_documents d JOIN {name}_embeddings e ON e.rowid = d.rowid
                            WHERE {predicate}
                            ORDER BY distance, d.rowid
                            LIMIT ?2"
                        ),
                        params,
                    )
                }
            };

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                            let id: String = row.get(0)?;
                            let metadata: String = row.get(1)?;
                            let distance: f64 = row.get(2)?;
                            Ok((id, metadata, distance))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await
                .map_err(classify_sqlite)?;

            let mut candidates = Vec::with_capacity(rows.len());
            for (id, metadata, distance) in rows {
                let metadata: Metadata = serde_json::from_str(&metadata).map_err(|err| {
                    MemoryError::adapter(
                        AdapterErrorCode::Corrupted,
                        format!("entry '{id}' metadata: {err}"),
                    )
                })?;
                candidates.push(Candidate {
                    id,
                    score: 1.0 - distance,
                    metadata,
                });
            }
            candidates.truncate(top_k);
            Ok(candidates)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn index() -> SqliteVectorIndex {
        let config = StorageConfig {
            sqlite_path: ":memory:".into(),
            ..StorageConfig::default()
        };
        SqliteVectorIndex::new(&config).await.unwrap()
    }

    fn entry(id: &str, vector: Vec<f64>, sequence_index: u64) -> IndexedVector {
        let mut metadata = Metadata::new();
        metadata.insert("thread_id".to_string(), json!("t1"));
        metadata.insert("sequence_index".to_string(), json!(sequence_index));
        IndexedVector {
            id: id.to_string(),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn nearest_entries_come_first() {
        let index = index().await;
        index.create_index("msgs", 3).await.unwrap();
        index
            .upsert(
                "msgs",
                vec![
                    entry("a", vec![1.0, 0.0, 0.0], 0),
                    entry("b", vec![0.0, 1.0, 0.0], 1),
                    entry("c", vec![0.9, 0.1, 0.0], 2),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("msgs", &[1.0, 0.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[1].sequence_index(), Some(2));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_entries() {
        let index = index().await;
        index.create_index("msgs", 2).await.unwrap();
        index
            .upsert("msgs", vec![entry("a", vec![0.0, 1.0], 0)])
            .await
            .unwrap();
        index
            .upsert("msgs", vec![entry("a", vec![1.0, 0.0], 5)])
            .await
            .unwrap();

        let hits = index.query("msgs", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sequence_index(), Some(5));
    }

    #[tokio::test]
    async fn registry_enforces_dimensions() {
        let index = index().await;
        let err = index.query("msgs", &[1.0], 1, None).await.unwrap_err();
        assert_eq!(err.code(), "INDEX_NOT_FOUND");

        index.create_index("msgs", 2).await.unwrap();
        index.create_index("msgs", 2).await.unwrap();
        let err = index.create_index("msgs", 4).await.unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");

        let err = index.query("msgs", &[1.0, 0.0, 0.0], 1, None).await.unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }

    #[tokio::test]
    async fn filters_skip_closer_entries_from_other_threads() {
        let index = index().await;
        index.create_index("msgs", 2).await.unwrap();
        let mut other = entry("other", vec![1.0, 0.0], 9);
        other.metadata.insert("thread_id".to_string(), json!("t2"));
        index
            .upsert("msgs", vec![other, entry("mine", vec![0.5, 0.5], 1)])
            .await
            .unwrap();

        let filter = MetadataFilter::new().field("thread_id", "t1");
        let hits = index
            .query("msgs", &[1.0, 0.0], 1, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");
    }

    #[tokio::test]
    async fn filtered_queries_are_exact_across_shared_threads() {
        let index = index().await;
        index.create_index("msgs", 2).await.unwrap();
        let mut items: Vec<IndexedVector> = (0..20_u32)
            .map(|i| {
                let vector = vec![1.0, f64::from(i) * 0.01];
                let mut busy = entry(&format!("busy-{i}"), vector, i.into());
                busy.metadata.insert("thread_id".to_string(), json!("busy"));
                busy
            })
            .collect();
        for (i, vector) in (0_u64..).zip([vec![0.2, 1.0], vec![0.1, 1.0], vec![0.0, 1.0]]) {
            let mut quiet = entry(&format!("quiet-{i}"), vector, i);
            quiet.metadata.insert("thread_id".to_string(), json!("quiet"));
            items.push(quiet);
        }
        index.upsert("msgs", items).await.unwrap();

        let filter = MetadataFilter::new().field("thread_id", "quiet");
        let hits = index
            .query("msgs", &[1.0, 0.0], 3, Some(&filter))
            .await
            .unwrap();

        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["quiet-0", "quiet-1", "quiet-2"]);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test]
    async fn filter_values_match_by_json_type() {
        let index = index().await;
        index.create_index("msgs", 2).await.unwrap();
        let mut flagged = entry("flagged", vec![1.0, 0.0], 1);
        flagged.metadata.insert("pinned".to_string(), json!(true));
        flagged.metadata.insert("meta.lang".to_string(), json!("en"));
        let mut labelled = entry("labelled", vec![0.0, 1.0], 2);
        labelled.metadata.insert("sequence_index".to_string(), json!("1"));
        index.upsert("msgs", vec![flagged, labelled]).await.unwrap();

        let query = |filter: MetadataFilter| {
            let index = &index;
            async move {
                index
                    .query("msgs", &[1.0, 0.0], 5, Some(&filter))
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|c| c.id)
                    .collect::<Vec<_>>()
            }
        };

        let by_int = query(MetadataFilter::new().field("sequence_index", 1)).await;
        assert_eq!(by_int, vec!["flagged"]);
        let by_text = query(MetadataFilter::new().field("sequence_index", "1")).await;
        assert_eq!(by_text, vec!["labelled"]);
        let pinned = query(MetadataFilter::new().field("pinned", true)).await;
        assert_eq!(pinned, vec!["flagged"]);
        assert!(query(MetadataFilter::new().field("pinned", 1)).await.is_empty());
        let dotted = query(MetadataFilter::new().field("meta.lang", "en")).await;
        assert_eq!(dotted, vec!["flagged"]);
    }
}
