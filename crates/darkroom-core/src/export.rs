//! Collection export as a ZIP archive.
//!
//! Blobs are streamed in bounded chunks from the artifact store to a
//! blocking writer task over a bounded channel, so at most a few chunks are
//! in flight. The archive itself lives in a spooled temp file: in memory up
//! to `export.spool_threshold_mb`, on disk beyond it.

use serde::Serialize;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Instant;
use tempfile::SpooledTempFile;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::CatalogStore;
use crate::config::ExportConfig;
use crate::error::{DarkroomError, Result};
use crate::store::ArtifactStore;
use crate::types::{ArtifactId, CollectionId, DerivedArtifact};

/// Chunks buffered between the store reader and the zip writer.
const CHANNEL_DEPTH: usize = 4;

enum ArchiveOp {
    StartEntry(String),
    Data(Vec<u8>),
}

/// Summary of a finished archive.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub file_name: String,
    pub entries: Vec<String>,
    /// Artifacts whose blobs were missing from the store
    pub skipped: Vec<ArtifactId>,
    pub size: u64,
}

/// A finished archive, readable in bounded chunks.
///
/// Owns the spooled temp file; dropping it releases memory or deletes the
/// on-disk spill, whether or not it was read to the end.
pub struct ExportedArchive {
    pub summary: ExportSummary,
    file: SpooledTempFile,
    chunk_size: usize,
}

impl ExportedArchive {
    pub fn file_name(&self) -> &str {
        &self.summary.file_name
    }

    pub fn size(&self) -> u64 {
        self.summary.size
    }

    /// Next chunk of at most `chunk_size` bytes, `None` at the end.
    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }

    /// Copy the archive to `out`, chunk by chunk. Returns bytes written.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<u64> {
        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk()? {
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        out.flush()?;
        Ok(written)
    }
}

impl Iterator for ExportedArchive {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Packs a collection's linked artifacts into a ZIP.
pub struct ArchiveExporter {
    artifacts: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn CatalogStore>,
    config: ExportConfig,
}

impl ArchiveExporter {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        catalog: Arc<dyn CatalogStore>,
        config: ExportConfig,
    ) -> Self {
        Self {
            artifacts,
            catalog,
            config,
        }
    }

    /// Build the archive for `collection_id`.
    ///
    /// Missing blobs are skipped. Fails with `EmptyExport` when nothing could
    /// be added, and `NotFound` when the collection does not exist.
    pub async fn export_zip(&self, collection_id: CollectionId) -> Result<ExportedArchive> {
        let start = Instant::now();
        if self.catalog.get_collection(collection_id).await?.is_none() {
            return Err(DarkroomError::NotFound(format!("collection {collection_id}")));
        }
        let linked = self.catalog.artifacts_for_collection(collection_id).await?;
        if linked.is_empty() {
            return Err(DarkroomError::EmptyExport { collection_id });
        }

        let (tx, rx) = mpsc::channel::<ArchiveOp>(CHANNEL_DEPTH);
        let spool_threshold = self.config.spool_threshold_bytes();
        let writer = tokio::task::spawn_blocking(move || write_archive(rx, spool_threshold));

        // On a send error the writer has already failed; its result carries the cause.
        let fed = self.feed(&linked, &tx).await;
        drop(tx);

        let (file, size) = writer
            .await
            .map_err(|e| DarkroomError::Io(io::Error::other(format!("archive task failed: {e}"))))??;
        let (entries, skipped) = fed?;

        if entries.is_empty() {
            return Err(DarkroomError::EmptyExport { collection_id });
        }

        tracing::info!(
            "Exported collection {}: {} entries, {} skipped, {} bytes in {:?}",
            collection_id,
            entries.len(),
            skipped.len(),
            size,
            start.elapsed()
        );

        Ok(ExportedArchive {
            summary: ExportSummary {
                file_name: format!("collection_{collection_id}_filtered_images.zip"),
                entries,
                skipped,
                size,
            },
            file,
            chunk_size: self.config.chunk_size_bytes(),
        })
    }

    /// Stream every available blob into the writer task.
    async fn feed(
        &self,
        linked: &[DerivedArtifact],
        tx: &mpsc::Sender<ArchiveOp>,
    ) -> Result<(Vec<String>, Vec<ArtifactId>)> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let closed = || DarkroomError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "archive writer stopped"));

        for artifact in linked {
            let mut reader = match self.artifacts.get(&artifact.storage_key).await {
                Ok(reader) => reader,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        "Skipping artifact {}: blob {} missing",
                        artifact.id,
                        artifact.storage_key
                    );
                    skipped.push(artifact.id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let entry_name = format!("{}_{}", artifact.id, artifact.file_name);
            tx.send(ArchiveOp::StartEntry(entry_name.clone()))
                .await
                .map_err(|_| closed())?;
            while let Some(chunk) = reader.next_chunk(self.config.chunk_size_bytes()).await? {
                tx.send(ArchiveOp::Data(chunk)).await.map_err(|_| closed())?;
            }
            entries.push(entry_name);
        }
        Ok((entries, skipped))
    }
}

/// Blocking side: drain the channel into a deflate ZIP on a spooled file.
fn write_archive(
    mut rx: mpsc::Receiver<ArchiveOp>,
    spool_threshold: usize,
) -> Result<(SpooledTempFile, u64)> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let mut zip = ZipWriter::new(SpooledTempFile::new(spool_threshold));

    while let Some(op) = rx.blocking_recv() {
        match op {
            ArchiveOp::StartEntry(name) => zip.start_file(name, options).map_err(io::Error::other)?,
            ArchiveOp::Data(bytes) => zip.write_all(&bytes)?,
        }
    }

    let mut file = zip.finish().map_err(io::Error::other)?;
    let size = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok((file, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::store::MemoryArtifactStore;
    use crate::types::{ArtifactStatus, NewDerivedArtifact, NewSourceImage};
    use std::io::Cursor;

    async fn seeded(keys: &[(&str, bool)]) -> (Arc<MemoryArtifactStore>, Arc<MemoryCatalog>, i64) {
        let blobs = Arc::new(MemoryArtifactStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let c = catalog.create_collection("c", None).await.unwrap();
        let img = catalog
            .create_source_image(
                NewSourceImage {
                    storage_key: "orig".into(),
                    file_name: "orig.png".into(),
                    media_type: "image/png".into(),
                    file_size: 1,
                    checksum: None,
                    metadata: None,
                },
                c.id,
            )
            .await
            .unwrap();
        for (i, (key, present)) in keys.iter().enumerate() {
            if *present {
                blobs
                    .put(key, format!("payload-{key}").into_bytes(), "image/png")
                    .await
                    .unwrap();
            }
            catalog
                .create_artifact(
                    NewDerivedArtifact {
                        source_image_id: img.id,
                        storage_key: key.to_string(),
                        file_name: "filtered_orig.png".into(),
                        media_type: "image/png".into(),
                        file_size: 1,
                        fingerprint: Some(format!("fp{i}")),
                        params: None,
                        status: ArtifactStatus::Completed,
                        error_message: None,
                    },
                    c.id,
                )
                .await
                .unwrap();
        }
        (blobs, catalog, c.id)
    }

    fn exporter(blobs: Arc<MemoryArtifactStore>, catalog: Arc<MemoryCatalog>) -> ArchiveExporter {
        let config = ExportConfig {
            chunk_size_kb: 1,
            ..Default::default()
        };
        ArchiveExporter::new(blobs, catalog, config)
    }

    #[tokio::test]
    async fn test_export_skips_missing_blobs() {
        let (blobs, catalog, cid) = seeded(&[("k1", true), ("k2", false), ("k3", true)]).await;
        let mut archive = exporter(blobs, catalog).export_zip(cid).await.unwrap();

        assert_eq!(archive.summary.entries.len(), 2);
        assert_eq!(archive.summary.skipped.len(), 1);
        assert!(archive.file_name().ends_with(".zip"));

        let mut bytes = Vec::new();
        let written = archive.write_to(&mut bytes).unwrap();
        assert_eq!(written, archive.size());

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);
        let first = archive.summary.entries[0].clone();
        assert!(first.ends_with("_filtered_orig.png"));
        let mut content = String::new();
        zip.by_name(&first).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "payload-k1");
    }

    #[tokio::test]
    async fn test_export_all_missing_is_empty_export() {
        let (blobs, catalog, cid) = seeded(&[("k1", false), ("k2", false)]).await;
        let err = exporter(blobs, catalog).export_zip(cid).await.err().unwrap();
        assert!(matches!(err, DarkroomError::EmptyExport { .. }));
    }

    #[tokio::test]
    async fn test_export_no_artifacts_or_no_collection() {
        let (blobs, catalog, cid) = seeded(&[]).await;
        let exp = exporter(blobs, catalog);
        assert!(matches!(
            exp.export_zip(cid).await.err().unwrap(),
            DarkroomError::EmptyExport { .. }
        ));
        assert!(matches!(
            exp.export_zip(cid + 100).await.err().unwrap(),
            DarkroomError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_archive_iterates_in_bounded_chunks() {
        let (blobs, catalog, cid) = seeded(&[("k1", true)]).await;
        blobs.put("k1", vec![9u8; 10_000], "image/png").await.unwrap();
        let archive = exporter(blobs, catalog).export_zip(cid).await.unwrap();
        let size = archive.size();

        let chunks: Vec<Vec<u8>> = archive.map(|c| c.unwrap()).collect();
        assert!(chunks.iter().all(|c| c.len() <= 1024));
        assert_eq!(chunks.iter().map(|c| c.len() as u64).sum::<u64>(), size);
    }
}
