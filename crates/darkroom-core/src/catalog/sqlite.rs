//! SQLite catalog via `rusqlite`.
//!
//! The schema carries every uniqueness and cascade rule natively, so the
//! database is the final arbiter when two writers race. The connection sits
//! behind a mutex and every call runs on tokio's blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::CatalogStore;
use crate::error::{CatalogError, CatalogResult};
use crate::types::{
    ArtifactId, ArtifactStatus, Collection, CollectionId, CollectionSummary, DerivedArtifact,
    NewDerivedArtifact, NewSourceImage, PurgedKeys, SourceImage, SourceImageId, SourceMetadata,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source_images (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    storage_key         TEXT NOT NULL UNIQUE,
    file_name           TEXT NOT NULL,
    media_type          TEXT NOT NULL,
    file_size           INTEGER NOT NULL,
    checksum            TEXT,
    metadata            TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_source_images_owner ON source_images(owner_collection_id);

CREATE TABLE IF NOT EXISTS derived_artifacts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    source_image_id     INTEGER NOT NULL REFERENCES source_images(id) ON DELETE CASCADE,
    owner_collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    storage_key         TEXT NOT NULL UNIQUE,
    file_name           TEXT NOT NULL,
    media_type          TEXT NOT NULL,
    file_size           INTEGER NOT NULL,
    fingerprint         TEXT,
    params              TEXT,
    status              TEXT NOT NULL DEFAULT 'completed',
    error_message       TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (source_image_id, fingerprint)
);
CREATE INDEX IF NOT EXISTS idx_derived_artifacts_owner ON derived_artifacts(owner_collection_id);

CREATE TABLE IF NOT EXISTS collection_images (
    collection_id   INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    source_image_id INTEGER NOT NULL REFERENCES source_images(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (collection_id, source_image_id)
);
CREATE INDEX IF NOT EXISTS idx_collection_images_image ON collection_images(source_image_id);

CREATE TABLE IF NOT EXISTS collection_artifacts (
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    artifact_id   INTEGER NOT NULL REFERENCES derived_artifacts(id) ON DELETE CASCADE,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (collection_id, artifact_id)
);
CREATE INDEX IF NOT EXISTS idx_collection_artifacts_artifact ON collection_artifacts(artifact_id);
"#;

const IMAGE_COLUMNS: &str = "i.id, i.owner_collection_id, i.storage_key, i.file_name, \
     i.media_type, i.file_size, i.checksum, i.metadata, i.created_at, i.updated_at";

const ARTIFACT_COLUMNS: &str = "a.id, a.source_image_id, a.owner_collection_id, a.storage_key, \
     a.file_name, a.media_type, a.file_size, a.fingerprint, a.params, a.status, \
     a.error_message, a.created_at, a.updated_at";

/// [`CatalogStore`] on a SQLite database file (or `:memory:`).
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open or create the database at `path` and apply the schema.
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CatalogError::Backend(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            Connection::open(path)?
        };
        tracing::debug!("Catalog at {:?}", path);
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CatalogResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut Connection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| CatalogError::Backend(format!("catalog task failed: {e}")))?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<SourceImage> {
    let metadata: Option<String> = row.get(7)?;
    let metadata = metadata
        .map(|raw| serde_json::from_str::<SourceMetadata>(&raw))
        .transpose()
        .map_err(|e| conversion_error(7, e))?;
    Ok(SourceImage {
        id: row.get(0)?,
        owner_collection_id: row.get(1)?,
        storage_key: row.get(2)?,
        file_name: row.get(3)?,
        media_type: row.get(4)?,
        file_size: row.get::<_, i64>(5)?.max(0) as u64,
        checksum: row.get(6)?,
        metadata,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<DerivedArtifact> {
    let status: String = row.get(9)?;
    let status = ArtifactStatus::parse(&status).ok_or_else(|| {
        conversion_error(
            9,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("status {status:?}")),
        )
    })?;
    Ok(DerivedArtifact {
        id: row.get(0)?,
        source_image_id: row.get(1)?,
        owner_collection_id: row.get(2)?,
        storage_key: row.get(3)?,
        file_name: row.get(4)?,
        media_type: row.get(5)?,
        file_size: row.get::<_, i64>(6)?.max(0) as u64,
        fingerprint: row.get(7)?,
        params: row.get(8)?,
        status,
        error_message: row.get(10)?,
        created_at: timestamp(row, 11)?,
        updated_at: timestamp(row, 12)?,
    })
}

fn exists(tx: &Transaction<'_>, table: &str, id: i64) -> CatalogResult<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
    Ok(tx
        .query_row(&sql, params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn require(tx: &Transaction<'_>, table: &str, entity: &'static str, id: i64) -> CatalogResult<()> {
    if exists(tx, table, id)? {
        Ok(())
    } else {
        Err(CatalogError::NotFound { entity, id })
    }
}

fn load_image(conn: &Connection, id: SourceImageId) -> CatalogResult<Option<SourceImage>> {
    let sql = format!("SELECT {IMAGE_COLUMNS} FROM source_images i WHERE i.id = ?1");
    Ok(conn.query_row(&sql, params![id], image_from_row).optional()?)
}

fn load_artifact(conn: &Connection, id: ArtifactId) -> CatalogResult<Option<DerivedArtifact>> {
    let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts a WHERE a.id = ?1");
    Ok(conn.query_row(&sql, params![id], artifact_from_row).optional()?)
}

fn string_column(tx: &Transaction<'_>, sql: &str, id: i64) -> CatalogResult<Vec<String>> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<Collection> {
        let name = name.to_string();
        let description = description.map(str::to_string);
        self.run(move |conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO collections (name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![name, description, ts],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                "SELECT id, name, description, created_at, updated_at FROM collections WHERE id = ?1",
                params![id],
                collection_from_row,
            )?)
        })
        .await
    }

    async fn list_collections(&self) -> CatalogResult<Vec<CollectionSummary>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description,
                        (SELECT COUNT(*) FROM collection_images ci WHERE ci.collection_id = c.id),
                        (SELECT COUNT(*) FROM collection_artifacts ca WHERE ca.collection_id = c.id)
                 FROM collections c ORDER BY c.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(CollectionSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    image_count: row.get::<_, i64>(3)? as usize,
                    artifact_count: row.get::<_, i64>(4)? as usize,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn get_collection(&self, id: CollectionId) -> CatalogResult<Option<Collection>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, created_at, updated_at FROM collections WHERE id = ?1",
                    params![id],
                    collection_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn delete_collection(&self, id: CollectionId) -> CatalogResult<Option<PurgedKeys>> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "collections", id)? {
                return Ok(None);
            }

            let source_keys = string_column(
                &tx,
                "SELECT storage_key FROM source_images WHERE owner_collection_id = ?1 ORDER BY id",
                id,
            )?;
            let artifact_keys = string_column(
                &tx,
                "SELECT storage_key FROM derived_artifacts
                 WHERE owner_collection_id = ?1
                    OR source_image_id IN (SELECT id FROM source_images WHERE owner_collection_id = ?1)
                 ORDER BY id",
                id,
            )?;

            // Foreign-key cascades remove owned rows, their artifacts and every link.
            tx.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
            tx.commit()?;

            Ok(Some(PurgedKeys {
                source_keys,
                artifact_keys,
            }))
        })
        .await
    }

    async fn create_source_image(
        &self,
        image: NewSourceImage,
        collection_id: CollectionId,
    ) -> CatalogResult<SourceImage> {
        self.run(move |conn| {
            let metadata = image
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let tx = conn.transaction()?;
            require(&tx, "collections", "collection", collection_id)?;

            let ts = now();
            tx.execute(
                "INSERT INTO source_images
                   (owner_collection_id, storage_key, file_name, media_type, file_size,
                    checksum, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    collection_id,
                    image.storage_key,
                    image.file_name,
                    image.media_type,
                    size_to_sql(image.file_size),
                    image.checksum,
                    metadata,
                    ts,
                ],
            )?;
            let image_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO collection_images (collection_id, source_image_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![collection_id, image_id, ts],
            )?;
            let record = load_image(&tx, image_id)?.ok_or(CatalogError::NotFound {
                entity: "source image",
                id: image_id,
            })?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn get_source_image(&self, id: SourceImageId) -> CatalogResult<Option<SourceImage>> {
        self.run(move |conn| load_image(conn, id)).await
    }

    async fn link_source_image(
        &self,
        collection_id: CollectionId,
        image_id: SourceImageId,
    ) -> CatalogResult<bool> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            require(&tx, "collections", "collection", collection_id)?;
            require(&tx, "source_images", "source image", image_id)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO collection_images (collection_id, source_image_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![collection_id, image_id, now()],
            )?;
            tx.commit()?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn images_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<SourceImage>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {IMAGE_COLUMNS} FROM source_images i
                 JOIN collection_images ci ON ci.source_image_id = i.id
                 WHERE ci.collection_id = ?1 ORDER BY i.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![collection_id], image_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn find_artifact(
        &self,
        image_id: SourceImageId,
        fingerprint: &str,
    ) -> CatalogResult<Option<DerivedArtifact>> {
        let fingerprint = fingerprint.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts a
                 WHERE a.source_image_id = ?1 AND a.fingerprint = ?2"
            );
            Ok(conn
                .query_row(&sql, params![image_id, fingerprint], artifact_from_row)
                .optional()?)
        })
        .await
    }

    async fn create_artifact(
        &self,
        artifact: NewDerivedArtifact,
        collection_id: CollectionId,
    ) -> CatalogResult<DerivedArtifact> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            require(&tx, "collections", "collection", collection_id)?;
            require(&tx, "source_images", "source image", artifact.source_image_id)?;

            let ts = now();
            tx.execute(
                "INSERT INTO derived_artifacts
                   (source_image_id, owner_collection_id, storage_key, file_name, media_type,
                    file_size, fingerprint, params, status, error_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    artifact.source_image_id,
                    collection_id,
                    artifact.storage_key,
                    artifact.file_name,
                    artifact.media_type,
                    size_to_sql(artifact.file_size),
                    artifact.fingerprint,
                    artifact.params,
                    artifact.status.as_str(),
                    artifact.error_message,
                    ts,
                ],
            )?;
            let artifact_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO collection_artifacts (collection_id, artifact_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![collection_id, artifact_id, ts],
            )?;
            let record = load_artifact(&tx, artifact_id)?.ok_or(CatalogError::NotFound {
                entity: "artifact",
                id: artifact_id,
            })?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn artifact_linked(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM collection_artifacts WHERE collection_id = ?1 AND artifact_id = ?2",
                    params![collection_id, artifact_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    async fn link_artifact(
        &self,
        collection_id: CollectionId,
        artifact_id: ArtifactId,
    ) -> CatalogResult<bool> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            require(&tx, "collections", "collection", collection_id)?;
            require(&tx, "derived_artifacts", "artifact", artifact_id)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO collection_artifacts (collection_id, artifact_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![collection_id, artifact_id, now()],
            )?;
            tx.commit()?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn artifacts_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CatalogResult<Vec<DerivedArtifact>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts a
                 JOIN collection_artifacts ca ON ca.artifact_id = a.id
                 WHERE ca.collection_id = ?1 ORDER BY a.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![collection_id], artifact_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn artifacts_for_image(
        &self,
        image_id: SourceImageId,
    ) -> CatalogResult<Vec<DerivedArtifact>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts a
                 WHERE a.source_image_id = ?1 ORDER BY a.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![image_id], artifact_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::conformance;

    #[tokio::test]
    async fn test_conformance_in_memory() {
        conformance::run_all(&SqliteCatalog::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/catalog.db");

        let id = {
            let catalog = SqliteCatalog::open(&path).unwrap();
            let c = catalog.create_collection("persisted", None).await.unwrap();
            catalog
                .create_source_image(conformance::new_image("reopen-img"), c.id)
                .await
                .unwrap();
            c.id
        };

        let catalog = SqliteCatalog::open(&path).unwrap();
        let images = catalog.images_for_collection(id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].metadata.as_ref().unwrap().height, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_fingerprint_maps_to_duplicate() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let c = catalog.create_collection("c", None).await.unwrap();
        let img = catalog
            .create_source_image(conformance::new_image("img"), c.id)
            .await
            .unwrap();
        catalog
            .create_artifact(conformance::new_artifact(img.id, "a1", "fp"), c.id)
            .await
            .unwrap();
        let err = catalog
            .create_artifact(conformance::new_artifact(img.id, "a2", "fp"), c.id)
            .await
            .unwrap_err();
        match err {
            CatalogError::Duplicate { constraint } => assert!(constraint.contains("fingerprint")),
            other => panic!("expected Duplicate, got {other}"),
        }
    }
}
