//! Multipart upload orchestrator
//!
//! Splits a file into fixed-size parts, uploads them with a bounded
//! in-flight pool against the active connection, and reports progress
//! over an event channel. Parts may complete out of order; they are
//! tracked by part number so final assembly is correct.

use crate::config::UploadConfig;
use crate::error::{PrismError, Result};
use crate::store::manager::StoreManager;
use crate::store::models::{UploadEvent, UploadOutcome, UploadRequest};
use crate::store::transform;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Destination key for an upload: `dir/name`, or the bare name when the
/// directory is empty
pub fn destination_key(directory: &str, file_name: &str) -> String {
    let dir = directory.trim().trim_end_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

/// Byte ranges `(offset, len)` covering `total` in `part_size` steps
pub fn part_ranges(total: u64, part_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < total {
        let len = part_size.min(total - offset);
        ranges.push((offset, len));
        offset += len;
    }
    ranges
}

/// Progress aggregation for one upload task
///
/// Percent is computed from bytes acknowledged so far and is therefore
/// monotonically non-decreasing; throughput is measured from task start.
pub struct ProgressTracker {
    total: u64,
    loaded: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self { total, loaded: 0, started: Instant::now() }
    }

    /// Record acknowledged bytes and return `(percent, bytes_per_sec)`
    ///
    /// 100 is only ever reported once every byte is acknowledged, even
    /// when rounding would get there early.
    pub fn record(&mut self, bytes: u64) -> (u8, f64) {
        self.loaded = (self.loaded + bytes).min(self.total);
        let percent = if self.loaded == self.total {
            100
        } else {
            (((self.loaded as f64 / self.total as f64) * 100.0).round() as u8).min(99)
        };
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        (percent, self.loaded as f64 / elapsed)
    }
}

/// The bytes behind one upload, either on disk or already in memory
/// after the image transform
enum UploadSource {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

impl UploadSource {
    async fn len(&self) -> Result<u64> {
        match self {
            Self::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
            Self::Memory(data) => Ok(data.len() as u64),
        }
    }

    /// Read one part; file sources open their own handle so concurrent
    /// part reads never share a seek position
    async fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        match self {
            Self::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
            Self::Memory(data) => {
                let start = offset as usize;
                let end = (offset + len) as usize;
                Ok(data[start..end].to_vec())
            }
        }
    }

    async fn whole_body(&self) -> Result<ByteStream> {
        match self {
            Self::File(path) => ByteStream::from_path(path).await.map_err(|e| {
                PrismError::upload(format!("failed to read upload source: {e}"))
            }),
            Self::Memory(data) => Ok(ByteStream::from(data.as_ref().clone())),
        }
    }
}

/// Orchestrates uploads against the manager's active connection
pub struct UploadOrchestrator<'a> {
    manager: &'a StoreManager,
    config: UploadConfig,
    default_dir: String,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(manager: &'a StoreManager, config: UploadConfig, default_dir: &str) -> Self {
        Self { manager, config, default_dir: default_dir.to_string() }
    }

    /// Upload one file, emitting progress and terminal events on
    /// `events`
    ///
    /// Resolves once every part is committed and the upload finalized;
    /// on any unrecoverable part failure the multipart upload is
    /// aborted so no partial object becomes visible.
    pub async fn upload(
        &self,
        request: UploadRequest,
        events: &mpsc::UnboundedSender<UploadEvent>,
    ) -> Result<UploadOutcome> {
        let original_name = request
            .source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PrismError::invalid_argument(format!(
                    "upload source has no file name: {}",
                    request.source.display()
                ))
            })?;

        // transform runs to completion before any part is split off
        let mut processed_name = None;
        let (source, file_name) = if self.config.webp_transform {
            match transform::maybe_reencode(&request.source, self.config.webp_quality).await {
                Some(image) => {
                    processed_name = Some(image.file_name.clone());
                    (UploadSource::Memory(Arc::new(image.data)), image.file_name)
                }
                None => (UploadSource::File(request.source.clone()), original_name),
            }
        } else {
            (UploadSource::File(request.source.clone()), original_name)
        };

        let directory = request
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.default_dir)
            .to_string();
        let key = destination_key(&directory, &file_name);

        let content_type = request.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .to_string()
        });

        let total = source.len().await?;
        let part_size = self.config.part_size_mib * 1024 * 1024;
        let _ = events.send(UploadEvent::Started { key: key.clone(), total_bytes: total });

        let result = if total <= part_size {
            self.upload_single(&source, &key, &content_type, total, events).await
        } else {
            self.upload_multipart(&source, &key, &content_type, total, part_size, events)
                .await
        };

        match result {
            Ok(etag) => {
                let _ = events.send(UploadEvent::Completed {
                    key: key.clone(),
                    processed_name: processed_name.clone(),
                });
                Ok(UploadOutcome { key, etag, bytes: total, processed_name })
            }
            Err(e) => {
                let _ = events.send(UploadEvent::Failed { message: e.to_string() });
                Err(e)
            }
        }
    }

    async fn upload_single(
        &self,
        source: &UploadSource,
        key: &str,
        content_type: &str,
        total: u64,
        events: &mpsc::UnboundedSender<UploadEvent>,
    ) -> Result<Option<String>> {
        let conn = self.manager.connection().await?;
        let mut tracker = ProgressTracker::new(total);

        let output = conn
            .client
            .put_object()
            .bucket(&conn.bucket)
            .key(key)
            .content_type(content_type)
            .body(source.whole_body().await?)
            .send()
            .await
            .map_err(|e| PrismError::upload(format!("{}", DisplayErrorContext(&e))))?;

        let (percent, speed) = tracker.record(total);
        let _ = events.send(UploadEvent::Progress { percent, bytes_per_sec: speed });

        Ok(output.e_tag().map(|t| t.trim_matches('"').to_string()))
    }

    async fn upload_multipart(
        &self,
        source: &UploadSource,
        key: &str,
        content_type: &str,
        total: u64,
        part_size: u64,
        events: &mpsc::UnboundedSender<UploadEvent>,
    ) -> Result<Option<String>> {
        let conn = self.manager.connection().await?;

        let created = conn
            .client
            .create_multipart_upload()
            .bucket(&conn.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PrismError::upload(format!("{}", DisplayErrorContext(&e))))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| PrismError::upload("store returned no upload id"))?
            .to_string();

        let ranges = part_ranges(total, part_size);
        debug!(key, parts = ranges.len(), "starting multipart upload");

        let mut in_flight = futures::stream::iter(ranges.into_iter().enumerate().map(
            |(idx, (offset, len))| {
                let client = conn.client.clone();
                let bucket = conn.bucket.clone();
                let key = key.to_string();
                let upload_id = upload_id.clone();
                async move {
                    let part_number = idx as i32 + 1;
                    let body = source.read_range(offset, len).await?;
                    let output = client
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(body))
                        .send()
                        .await
                        .map_err(|e| {
                            PrismError::upload(format!(
                                "part {part_number}: {}",
                                DisplayErrorContext(&e)
                            ))
                        })?;
                    let etag = output
                        .e_tag()
                        .ok_or_else(|| {
                            PrismError::upload(format!("part {part_number}: no etag returned"))
                        })?
                        .to_string();
                    Ok::<(i32, String, u64), PrismError>((part_number, etag, len))
                }
            },
        ))
        .buffer_unordered(self.config.max_concurrent_parts);

        let mut tracker = ProgressTracker::new(total);
        let mut completed = Vec::new();
        let mut failure = None;
        while let Some(part) = in_flight.next().await {
            match part {
                Ok((part_number, etag, len)) => {
                    let (percent, speed) = tracker.record(len);
                    let _ = events.send(UploadEvent::Progress { percent, bytes_per_sec: speed });
                    completed.push(
                        CompletedPart::builder()
                            .part_number(part_number)
                            .e_tag(etag)
                            .build(),
                    );
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        // dropping the stream cancels any still-running part requests
        drop(in_flight);
        if let Some(e) = failure {
            self.abort_upload(&conn.client, &conn.bucket, key, &upload_id).await;
            return Err(e);
        }

        completed.sort_by_key(|p| p.part_number());
        let assembled = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        let finished = conn
            .client
            .complete_multipart_upload()
            .bucket(&conn.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(assembled)
            .send()
            .await;

        match finished {
            Ok(output) => Ok(output.e_tag().map(|t| t.trim_matches('"').to_string())),
            Err(e) => {
                self.abort_upload(&conn.client, &conn.bucket, key, &upload_id).await;
                Err(PrismError::upload(format!("{}", DisplayErrorContext(&e))))
            }
        }
    }

    async fn abort_upload(
        &self,
        client: &aws_sdk_s3::Client,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) {
        if let Err(e) = client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(key, "failed to abort multipart upload: {}", DisplayErrorContext(&e));
        }
    }
}
