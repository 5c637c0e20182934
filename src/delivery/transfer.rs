//! Chunked transfer of a local file to server-issued upload URLs.
//!
//! The file is opened once per call and every operation reads its own byte
//! range from that handle. Operations run in the order received; the first
//! failure aborts the whole call.

use crate::delivery::error::{Error, ErrorExt, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Method,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use std::{io::SeekFrom, path::Path};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use url::Url;

/// A header the server requires on an upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadHeader {
    pub name: String,
    pub value: String,
}

/// One byte range of the local file and where to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOperation {
    pub method: String,
    pub url: String,
    pub offset: u64,
    pub length: u64,
    pub request_headers: Vec<UploadHeader>,
}

/// Transfers a file according to a list of upload operations.
#[async_trait]
pub trait ChunkedUploadExecutor: Send + Sync {
    async fn execute(&self, file_path: &Path, operations: &[UploadOperation]) -> Result<()>;
}

/// [`ChunkedUploadExecutor`] backed by `reqwest`.
///
/// Upload URLs are pre-signed, so no credential is attached.
#[derive(Debug, Clone, Default)]
pub struct HttpChunkedUploadExecutor {
    client: reqwest::Client,
}

impl HttpChunkedUploadExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute_operation(
        &self,
        file: &mut tokio::fs::File,
        file_path: &Path,
        operation: &UploadOperation,
    ) -> Result<()> {
        let method = Method::from_bytes(operation.method.as_bytes()).map_err(|e| {
            Error::infrastructure_with(
                format!("Upload operation has invalid HTTP method: {}", operation.method),
                e,
            )
        })?;
        let url = Url::parse(&operation.url)?;
        let headers = build_headers(&operation.request_headers)?;

        let mut request = self.client.request(method, url).headers(headers);
        if operation.length > 0 {
            let body = read_chunk(file, file_path, operation.offset, operation.length).await?;
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                body
            };
            return Err(Error::infrastructure(format!(
                "Upload operation failed ({}): {}",
                status.as_u16(),
                detail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkedUploadExecutor for HttpChunkedUploadExecutor {
    async fn execute(&self, file_path: &Path, operations: &[UploadOperation]) -> Result<()> {
        let mut file = tokio::fs::File::open(file_path)
            .await
            .fs_context("opening upload source", file_path)?;

        for (index, operation) in operations.iter().enumerate() {
            log::debug!(
                "Upload operation {}/{}: {} bytes at offset {}",
                index + 1,
                operations.len(),
                operation.length,
                operation.offset
            );
            self.execute_operation(&mut file, file_path, operation).await?;
        }

        log::info!(
            "Transferred {} upload operation(s) for {}",
            operations.len(),
            file_path.display()
        );
        Ok(())
    }
}

fn build_headers(headers: &[UploadHeader]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
            Error::infrastructure_with(
                format!("Upload operation has invalid header name: {}", header.name),
                e,
            )
        })?;
        let value = HeaderValue::from_str(&header.value).map_err(|e| {
            Error::infrastructure_with(
                format!("Upload operation has invalid value for header {}", header.name),
                e,
            )
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Reads exactly `length` bytes at `offset`; a short read is an error.
///
/// `length` comes from the server, so nothing is allocated or read before it
/// is checked against what the file can still provide.
async fn read_chunk(
    file: &mut tokio::fs::File,
    file_path: &Path,
    offset: u64,
    length: u64,
) -> Result<Bytes> {
    let file_len = file
        .metadata()
        .await
        .fs_context("reading metadata of", file_path)?
        .len();
    let available = file_len.saturating_sub(offset);
    if available < length {
        return Err(short_read(length, available));
    }

    file.seek(SeekFrom::Start(offset))
        .await
        .fs_context("seeking in", file_path)?;

    let mut buffer = Vec::with_capacity(usize::try_from(length).unwrap_or(0));
    (&mut *file)
        .take(length)
        .read_to_end(&mut buffer)
        .await
        .fs_context("reading", file_path)?;

    let read = buffer.len() as u64;
    if read != length {
        return Err(short_read(length, read));
    }
    Ok(Bytes::from(buffer))
}

fn short_read(expected: u64, read: u64) -> Error {
    Error::infrastructure(format!(
        "Upload operation expected {} bytes but read {} bytes.",
        expected, read
    ))
}
