//! Bundled vector-store backend over SQLite with the `sqlite-vec` extension.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use super::{DistanceMetric, SearchHit, UpsertRecord, VectorStore};
use crate::types::IngestError;

/// SQLite-backed [`VectorStore`].
///
/// Each index maps to a pair of tables: `<name>` holds id, content, and
/// metadata; `<name>_vec` is a `vec0` virtual table holding the embeddings,
/// joined on rowid. Index bookkeeping lives in `vector_indexes`.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (or creates) a store at `path` and verifies the sqlite-vec
    /// extension is loadable.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| IngestError::store(err.to_string()))?;
        conn.call::<_, _, tokio_rusqlite::rusqlite::Error>(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                ?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS vector_indexes (
                     name TEXT PRIMARY KEY,
                     table_name TEXT NOT NULL,
                     dimension INTEGER NOT NULL,
                     metric TEXT NOT NULL
                 )",
                [],
            )
            ?;
            Ok(())
        })
        .await
        .map_err(|err| IngestError::store(err.to_string()))?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), IngestError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(IngestError::store)
    }

    async fn index_entry(
        &self,
        name: &str,
    ) -> Result<Option<(String, usize, DistanceMetric)>, IngestError> {
        let name = name.to_string();
        self.conn
            .call::<_, _, tokio_rusqlite::rusqlite::Error>(move |conn| {
                conn.query_row(
                    "SELECT table_name, dimension, metric FROM vector_indexes WHERE name = ?",
                    [&name],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)? as usize,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()
            })
            .await
            .map_err(|err| IngestError::store(err.to_string()))
            .map(|entry| {
                entry.map(|(table, dimension, metric)| {
                    let metric = if metric == DistanceMetric::Euclidean.as_str() {
                        DistanceMetric::Euclidean
                    } else {
                        DistanceMetric::Cosine
                    };
                    (table, dimension, metric)
                })
            })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), IngestError> {
        if let Some((_, existing_dimension, existing_metric)) = self.index_entry(name).await? {
            if existing_dimension != dimension || existing_metric != metric {
                return Err(IngestError::store(format!(
                    "index '{name}' exists with dimension {existing_dimension} and metric \
                     {existing_metric}, requested {dimension}/{metric}"
                )));
            }
            return Ok(());
        }

        let table = sanitize_ident(name);
        let index_name = name.to_string();
        let metric_name = metric.as_str().to_string();
        self.conn
            .call::<_, _, tokio_rusqlite::rusqlite::Error>(move |conn| {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS \"{table}\" (
                             id TEXT PRIMARY KEY,
                             content TEXT NOT NULL,
                             metadata TEXT NOT NULL
                         )"
                    ),
                    [],
                )
                ?;
                conn.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS \"{table}_vec\"
                         USING vec0(embedding float[{dimension}])"
                    ),
                    [],
                )
                ?;
                conn.execute(
                    "INSERT OR IGNORE INTO vector_indexes (name, table_name, dimension, metric)
                     VALUES (?1, ?2, ?3, ?4)",
                    (&index_name, &table, dimension as i64, &metric_name),
                )
                ?;
                Ok(())
            })
            .await
            .map_err(|err| IngestError::store(err.to_string()))
    }

    async fn await_ready(&self, name: &str) -> Result<(), IngestError> {
        match self.index_entry(name).await? {
            Some(_) => Ok(()),
            None => Err(IngestError::store(format!("unknown index '{name}'"))),
        }
    }

    async fn upsert(
        &self,
        index: &str,
        records: Vec<UpsertRecord>,
    ) -> Result<usize, IngestError> {
        let Some((table, _, _)) = self.index_entry(index).await? else {
            return Err(IngestError::store(format!("unknown index '{index}'")));
        };
        if records.is_empty() {
            return Ok(0);
        }

        // Serialize embeddings up front so the closure only touches SQL.
        let rows: Vec<(String, String, String, String)> = records
            .into_iter()
            .map(|record| {
                let embedding = serde_json::to_string(&record.embedding)
                    .map_err(|err| IngestError::store(err.to_string()))?;
                Ok((
                    record.id,
                    record.content,
                    record.metadata.to_string(),
                    embedding,
                ))
            })
            .collect::<Result<_, IngestError>>()?;

        let index_name = index.to_string();
        let (written, failed_ids) = self
            .conn
            .call::<_, _, tokio_rusqlite::rusqlite::Error>(move |conn| {
                let tx = conn
                    .transaction()
                    ?;
                let mut written = 0usize;
                let mut failed_ids = Vec::new();

                for (id, content, metadata, embedding) in rows {
                    let existing: Option<i64> = tx
                        .query_row(
                            &format!("SELECT rowid FROM \"{table}\" WHERE id = ?"),
                            [&id],
                            |row| row.get(0),
                        )
                        .optional()
                        ?;
                    if let Some(rowid) = existing {
                        tx.execute(
                            &format!("DELETE FROM \"{table}\" WHERE rowid = ?"),
                            [rowid],
                        )
                        ?;
                        tx.execute(
                            &format!("DELETE FROM \"{table}_vec\" WHERE rowid = ?"),
                            [rowid],
                        )
                        ?;
                    }

                    let inserted = tx
                        .execute(
                            &format!(
                                "INSERT INTO \"{table}\" (id, content, metadata)
                                 VALUES (?1, ?2, ?3)"
                            ),
                            (&id, &content, &metadata),
                        )
                        .and_then(|_| {
                            let rowid = tx.last_insert_rowid();
                            tx.execute(
                                &format!(
                                    "INSERT INTO \"{table}_vec\" (rowid, embedding)
                                     VALUES (?1, vec_f32(?2))"
                                ),
                                (rowid, &embedding),
                            )
                        });
                    match inserted {
                        Ok(_) => written += 1,
                        Err(_) => failed_ids.push(id),
                    }
                }

                tx.commit()?;
                Ok((written, failed_ids))
            })
            .await
            .map_err(|err| IngestError::store(err.to_string()))?;

        if failed_ids.is_empty() {
            Ok(written)
        } else {
            Err(IngestError::Store {
                reason: format!("index '{index_name}' rejected part of the batch"),
                failed_ids,
            })
        }
    }

    async fn similarity_search(
        &self,
        index: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IngestError> {
        let Some((table, _, metric)) = self.index_entry(index).await? else {
            return Err(IngestError::store(format!("unknown index '{index}'")));
        };
        let query_json = serde_json::to_string(query)
            .map_err(|err| IngestError::store(err.to_string()))?;

        let distance_fn = match metric {
            DistanceMetric::Cosine => "vec_distance_cosine",
            DistanceMetric::Euclidean => "vec_distance_l2",
        };

        self.conn
            .call::<_, _, tokio_rusqlite::rusqlite::Error>(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.content, c.metadata, \
                         {distance_fn}(v.embedding, vec_f32(?)) AS distance \
                         FROM \"{table}\" c \
                         JOIN \"{table}_vec\" v ON c.rowid = v.rowid \
                         ORDER BY distance ASC \
                         LIMIT {k}"
                    ))
                    ?;

                let rows = stmt
                    .query_map([&query_json], |row| {
                        let content: String = row.get(0)?;
                        let metadata: String = row.get(1)?;
                        let distance: f32 = row.get(2)?;
                        let score = match metric {
                            DistanceMetric::Cosine => 1.0 - distance,
                            DistanceMetric::Euclidean => -distance,
                        };
                        Ok(SearchHit {
                            content,
                            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                            score,
                        })
                    })
                    ?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| IngestError::store(err.to_string()))
    }
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>) -> UpsertRecord {
        UpsertRecord {
            id: id.to_string(),
            embedding,
            content: format!("content for {id}"),
            metadata: json!({"source": "https://site/doc", "title": "Doc"}),
        }
    }

    async fn open_temp() -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("chunks.sqlite"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let (_dir, store) = open_temp().await;
        store
            .ensure_index("web-rag", 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .ensure_index("web-rag", 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        store.await_ready("web-rag").await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected() {
        let (_dir, store) = open_temp().await;
        store
            .ensure_index("web-rag", 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        let result = store.ensure_index("web-rag", 8, DistanceMetric::Cosine).await;
        assert!(matches!(result, Err(IngestError::Store { .. })));
    }

    #[tokio::test]
    async fn upsert_then_search_returns_the_nearest_record() {
        let (_dir, store) = open_temp().await;
        store
            .ensure_index("web-rag", 2, DistanceMetric::Cosine)
            .await
            .unwrap();

        let written = store
            .upsert(
                "web-rag",
                vec![record("x", vec![1.0, 0.0]), record("y", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let hits = store
            .similarity_search("web-rag", &[1.0, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "content for x");
        assert_eq!(hits[0].metadata["title"], "Doc");
    }

    #[tokio::test]
    async fn reupserting_the_same_id_does_not_duplicate() {
        let (_dir, store) = open_temp().await;
        store
            .ensure_index("web-rag", 2, DistanceMetric::Cosine)
            .await
            .unwrap();

        store
            .upsert("web-rag", vec![record("x", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("web-rag", vec![record("x", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = store
            .similarity_search("web-rag", &[0.0, 1.0], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn unknown_index_is_a_store_error() {
        let (_dir, store) = open_temp().await;
        let result = store.upsert("missing", vec![record("x", vec![1.0])]).await;
        assert!(matches!(result, Err(IngestError::Store { .. })));
    }
}
