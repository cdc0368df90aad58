//! Cloud storage output support (S3, GCS, Azure, local)

use crate::error::{Error, Result};
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::buffered::BufWriter;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Bytes buffered locally before an upload switches to multipart
pub const DEFAULT_UPLOAD_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Stream name as used in object keys (leading dots removed)
pub fn sanitize_stream_name(stream_name: &str) -> &str {
    stream_name.trim_start_matches('.')
}

/// Key of a daily partitioned archive object
///
/// Format: `{stream}/{YYYY-MM-DD}/{epoch}_{checksum}.ndjson`
pub fn daily_key(stream_name: &str, day: &str, epoch: i64, checksum: &str) -> String {
    let stream = sanitize_stream_name(stream_name);
    format!("{stream}/{day}/{epoch}_{checksum}.ndjson")
}

/// Key of a batch archive object
///
/// Format: `export-{YYYY-MM-DD}/{stream}_{epoch}_{checksum}.ndjson`
pub fn batch_key(stream_name: &str, today: &str, epoch: i64, checksum: &str) -> String {
    let stream = sanitize_stream_name(stream_name);
    format!("export-{today}/{stream}_{epoch}_{checksum}.ndjson")
}

/// Archive destination parsed from URL
#[derive(Debug, Clone)]
pub struct ArchiveDestination {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// URL scheme as given, for logging
    scheme: String,
    /// Local buffer size per open writer
    buffer_bytes: usize,
}

impl ArchiveDestination {
    /// Parse a destination URL and create appropriate object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3 (or S3-compatible via `AWS_ENDPOINT`)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `/local/path/` or `file:///local/path/` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, prefix) = split_bucket(rest);
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "s3"))
        } else if let Some(rest) = url.strip_prefix("gs://") {
            let (bucket, prefix) = split_bucket(rest);
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "gs"))
        } else if let Some(rest) = url.strip_prefix("az://") {
            let (container, prefix) = split_bucket(rest);
            let store = MicrosoftAzureBuilder::from_env()
                .with_container_name(container)
                .build()
                .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;
            Ok(Self::from_store(Arc::new(store), prefix, "az"))
        } else {
            Self::parse_local(url)
        }
    }

    /// Parse local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self::from_store(Arc::new(store), String::new(), "file"))
    }

    /// Wrap an already configured object store
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, scheme: &str) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            scheme: scheme.to_string(),
            buffer_bytes: DEFAULT_UPLOAD_BUFFER_BYTES,
        }
    }

    /// Set the local buffer size per writer
    #[must_use]
    pub fn with_buffer_bytes(mut self, bytes: usize) -> Self {
        self.buffer_bytes = bytes.max(1);
        self
    }

    /// Check if this is a cloud destination (not local)
    pub fn is_cloud(&self) -> bool {
        self.scheme != "file"
    }

    /// Get the scheme (s3, gs, az, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Full object path of a key, including the destination prefix
    pub fn object_path(&self, key: &str) -> ObjectPath {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{prefix}/{key}"))
        }
    }

    /// Open a streaming writer for one archive object
    pub fn writer(&self, key: &str) -> NdjsonWriter {
        let path = self.object_path(key);
        debug!("Opening archive object {}://{path}", self.scheme);
        NdjsonWriter {
            location: format!("{}://{path}", self.scheme),
            inner: BufWriter::with_capacity(self.store.clone(), path, self.buffer_bytes),
            records: 0,
            bytes: 0,
        }
    }

    /// Keys of every object under `prefix`, relative to the destination prefix
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let list_prefix = match prefix {
            Some(p) => Some(self.object_path(p)),
            None => self.base_path(),
        };
        let objects: Vec<_> = self.store.list(list_prefix.as_ref()).try_collect().await?;
        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|meta| self.relative_key(&meta.location))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Delete every object under the destination last modified before `until`.
    ///
    /// With `dry_run` the matching objects are only reported.
    pub async fn purge_before(&self, until: DateTime<Utc>, dry_run: bool) -> Result<PurgeReport> {
        info!(
            dry_run,
            "Purging {}://{} objects modified before {until}",
            self.scheme,
            self.prefix.trim_matches('/')
        );
        let base = self.base_path();
        let objects: Vec<ObjectMeta> = self.store.list(base.as_ref()).try_collect().await?;

        let mut report = PurgeReport {
            dry_run,
            ..PurgeReport::default()
        };
        for meta in objects {
            if meta.last_modified >= until {
                report.kept += 1;
                continue;
            }
            let key = self.relative_key(&meta.location);
            if dry_run {
                info!("(dry-run) deleting {key}");
            } else {
                self.store.delete(&meta.location).await?;
                info!("Deleted {key}");
                report.deleted += 1;
            }
            report.matched.push(key);
        }
        report.matched.sort();
        Ok(report)
    }

    fn base_path(&self) -> Option<ObjectPath> {
        let base = self.prefix.trim_matches('/');
        (!base.is_empty()).then(|| ObjectPath::from(base))
    }

    fn relative_key(&self, location: &ObjectPath) -> String {
        let base = self.prefix.trim_matches('/');
        let full = location.to_string();
        match full.strip_prefix(base) {
            Some(rest) if !base.is_empty() => rest.trim_start_matches('/').to_string(),
            _ => full,
        }
    }

    /// Read a whole object back as text
    pub async fn read_to_string(&self, key: &str) -> Result<String> {
        let bytes = self.store.get(&self.object_path(key)).await?.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::output(format!("Object {key} is not UTF-8: {e}")))
    }
}

fn split_bucket(rest: &str) -> (&str, String) {
    match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.to_string()),
        None => (rest, String::new()),
    }
}

/// Outcome of [`ArchiveDestination::purge_before`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Keys older than the cut-off, sorted
    pub matched: Vec<String>,
    /// Objects actually removed; zero on a dry run
    pub deleted: usize,
    /// Objects at or after the cut-off
    pub kept: usize,
    pub dry_run: bool,
}

/// A completed archive object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenObject {
    /// `scheme://path` of the object
    pub location: String,
    pub records: usize,
    pub bytes: usize,
}

/// Streaming NDJSON writer for one archive object.
///
/// Content is buffered locally up to the destination's buffer size and then
/// uploaded in parts; nothing becomes visible until [`NdjsonWriter::finish`].
pub struct NdjsonWriter {
    location: String,
    inner: BufWriter,
    records: usize,
    bytes: usize,
}

impl NdjsonWriter {
    /// Append one JSON document as a line
    pub async fn write_record(&mut self, record: &JsonValue) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.inner
            .write_all(&line)
            .await
            .map_err(|e| Error::output(format!("Failed to write {}: {e}", self.location)))?;
        self.records += 1;
        self.bytes += line.len();
        Ok(())
    }

    /// Records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Complete the upload
    pub async fn finish(mut self) -> Result<WrittenObject> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::output(format!("Failed to complete {}: {e}", self.location)))?;
        debug!("Wrote {} records to {}", self.records, self.location);
        Ok(WrittenObject {
            location: self.location,
            records: self.records,
            bytes: self.bytes,
        })
    }

    /// Discard the upload; nothing is left behind at the destination
    pub async fn abort(mut self) {
        if let Err(e) = self.inner.abort().await {
            warn!("Failed to abort upload of {}: {e}", self.location);
        }
    }
}

impl std::fmt::Debug for NdjsonWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonWriter")
            .field("location", &self.location)
            .field("records", &self.records)
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}
